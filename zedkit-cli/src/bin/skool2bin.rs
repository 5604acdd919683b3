//! Convert a skool file into a binary (raw memory) file.
//!
//! The input may be a regular file or `-` for standard input; the output
//! defaults to the input name with `.skool` replaced by `.bin`, and `-`
//! means standard output.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::process::exit;

use clap::Parser;
use zedkit_core::{BinWriter, BinWriterOptions};

/// Convert a skool file into a binary (raw memory) file.
#[derive(Parser)]
#[clap(name = "skool2bin", version)]
struct Args {
    /// The skool file to convert ('-' for standard input)
    skoolfile: String,

    /// The output file (defaults to the input with '.skool' replaced by
    /// '.bin'; '-' for standard output)
    binfile: Option<String>,

    /// Apply @ofix and @bfix directives
    #[clap(short = 'b', long = "bfix")]
    bfix: bool,

    /// Process @defb, @defs and @defw directives
    #[clap(short = 'd', long = "data")]
    data: bool,

    /// Stop converting at this address
    #[clap(short = 'E', long = "end", value_name = "ADDR", parse(try_from_str = parse_address), default_value = "65537")]
    end: i64,

    /// Apply @isub directives
    #[clap(short = 'i', long = "isub")]
    isub: bool,

    /// Apply @ofix directives
    #[clap(short = 'o', long = "ofix")]
    ofix: bool,

    /// Apply @isub, @ssub and @rsub directives (implies --ofix)
    #[clap(short = 'r', long = "rsub")]
    rsub: bool,

    /// Apply @ofix, @bfix and @rfix directives (implies --rsub)
    #[clap(short = 'R', long = "rfix")]
    rfix: bool,

    /// Apply @isub and @ssub directives
    #[clap(short = 's', long = "ssub")]
    ssub: bool,

    /// Start converting at this address
    #[clap(short = 'S', long = "start", value_name = "ADDR", parse(try_from_str = parse_address), default_value = "-1")]
    start: i64,

    /// Show info on each converted instruction
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,

    /// Suppress warnings
    #[clap(short = 'w', long = "no-warnings")]
    no_warnings: bool,
}

/// Accept decimal, `$`-hex and `0x`-hex address arguments, plus the
/// conventional `-1` sentinel.
fn parse_address(text: &str) -> Result<i64, String> {
    if text == "-1" {
        return Ok(-1);
    }
    skool::parse_int(text)
        .map(i64::from)
        .ok_or_else(|| format!("invalid address: {text}"))
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        let _ = writeln!(io::stderr(), "Error: {e}");
        exit(1);
    }
}

/// Assemble the skool source and write the binary.
fn run(args: &Args) -> skool::SkoolResult<()> {
    let options = BinWriterOptions {
        asm_mode: mode(args.rsub, args.ssub, args.isub),
        fix_mode: mode(args.rfix, args.bfix, args.ofix),
        start: args.start,
        end: args.end,
        data: args.data,
        verbose: args.verbose,
        warn: !args.no_warnings,
    };

    let writer = if args.skoolfile == "-" {
        let stdin = io::stdin();
        BinWriter::new(stdin.lock(), "-", options)?
    } else {
        let file = File::open(&args.skoolfile)
            .map_err(|e| skool::SkoolError::io(&args.skoolfile, e))?;
        BinWriter::new(BufReader::new(file), &args.skoolfile, options)?
    };

    let binfile = args
        .binfile
        .clone()
        .unwrap_or_else(|| default_binfile(&args.skoolfile));
    let (base, end, size) = if binfile == "-" {
        let stdout = io::stdout();
        writer.write(&mut stdout.lock())?
    } else {
        let mut file = File::create(&binfile)
            .map_err(|e| skool::SkoolError::io(&binfile, e))?;
        writer.write(&mut file)?
    };

    let name = if binfile == "-" { "stdout" } else { binfile.as_str() };
    let _ = writeln!(
        io::stderr(),
        "Wrote {name}: start={base}, end={end}, size={size}"
    );
    Ok(())
}

/// Fold the three mode flags into a mode level; the strongest flag wins.
fn mode(level3: bool, level2: bool, level1: bool) -> u8 {
    if level3 {
        3
    } else if level2 {
        2
    } else if level1 {
        1
    } else {
        0
    }
}

/// The default output name: the input's base name with `.skool` swapped
/// for `.bin`.
fn default_binfile(skoolfile: &str) -> String {
    if skoolfile == "-" {
        return "program.bin".to_owned();
    }
    let base = Path::new(skoolfile)
        .file_name()
        .map_or(skoolfile, |n| n.to_str().unwrap_or(skoolfile));
    base.strip_suffix(".skool")
        .map_or_else(|| format!("{base}.bin"), |stem| format!("{stem}.bin"))
}
