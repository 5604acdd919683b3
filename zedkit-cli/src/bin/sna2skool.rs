//! Convert a 64 KiB memory snapshot into a skool file or a control
//! file.
//!
//! The input is a raw memory image: 65536 bytes loaded at address 0, or
//! 49152 bytes of RAM loaded at 16384.  With `--map`, an execution trace
//! from an emulator guides the code/data classification.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use skool::{Base, SkoolError, SkoolResult, Snapshot};
use zedkit_core::components::Config;
use zedkit_core::ctl::CtlParser;
use zedkit_core::{generate_ctls, write_ctl, SkoolWriter, WriteOptions};

/// Convert a binary (raw memory) file into a skool file.
#[derive(Parser)]
#[clap(name = "sna2skool", version)]
struct Args {
    /// The snapshot file (65536 or 49152 bytes)
    snafile: PathBuf,

    /// Generate a control file instead of a skool file
    #[clap(short = 'g', long = "generate-ctl")]
    generate_ctl: bool,

    /// A code map produced by an emulator
    #[clap(short = 'm', long = "map", value_name = "FILE")]
    map: Option<PathBuf>,

    /// Start disassembling at this address
    #[clap(short = 's', long = "start", value_name = "ADDR", parse(try_from_str = parse_address), default_value = "16384")]
    start: u32,

    /// Stop disassembling at this address
    #[clap(short = 'e', long = "end", value_name = "ADDR", parse(try_from_str = parse_address), default_value = "65536")]
    end: u32,

    /// Write addresses and operands in upper-case hexadecimal
    #[clap(short = 'H', long = "hex")]
    hex: bool,

    /// Write addresses and operands in lower-case hexadecimal
    #[clap(short = 'L', long = "hex-lower")]
    hex_lower: bool,

    /// Maximum line width of the skool file
    #[clap(short = 'w', long = "line-width", value_name = "WIDTH", default_value = "79")]
    line_width: usize,

    /// When to add referrer comments: 0 never, 1 for entries without a
    /// description, 2 always
    #[clap(short = 'r', long = "refs", value_name = "LEVEL", default_value = "1")]
    refs: u8,

    /// Show ASCII text in the comment fields
    #[clap(short = 'T', long = "text")]
    text: bool,
}

/// Accept decimal, `$`-hex and `0x`-hex address arguments up to the
/// one-past-end sentinel.
fn parse_address(text: &str) -> Result<u32, String> {
    skool::parse_addr(text)
        .ok_or_else(|| format!("invalid address: {text}"))
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        let _ = writeln!(io::stderr(), "Error: {e}");
        exit(1);
    }
}

/// Classify the snapshot and write the requested output.
fn run(args: &Args) -> SkoolResult<()> {
    let display = args.snafile.display().to_string();
    let data = std::fs::read(&args.snafile)
        .map_err(|e| SkoolError::io(&display, e))?;
    let snapshot = match data.len() {
        65536 => Snapshot::from_data(&data, 0),
        49152 => Snapshot::from_data(&data, 16384),
        _ => {
            return Err(SkoolError::Parse(format!(
                "{display}: unrecognised snapshot length ({})",
                data.len()
            )))
        }
    };

    let base = if args.hex_lower {
        Base::HexLower
    } else if args.hex {
        Base::Hex
    } else {
        Base::Decimal
    };

    let ctls = generate_ctls(
        &snapshot,
        args.start,
        args.end,
        args.map.as_deref(),
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.generate_ctl {
        return write_ctl(&mut out, &ctls, base)
            .map_err(|e| SkoolError::io("<ctl output>", e));
    }

    let options = WriteOptions {
        line_width: args.line_width,
        base,
        write_refs: args.refs.min(2),
        show_text: args.text,
    };
    let writer = SkoolWriter::new(
        &snapshot,
        &CtlParser::from_ctls(&ctls),
        options,
        &Config::default(),
    )?;
    writer.write_skool(&mut out)
}
