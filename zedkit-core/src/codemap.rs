use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use skool::{Addr, Base, SkoolError, SkoolResult, Snapshot};

use crate::components::Disassembler;
use crate::z80::ZxDisassembler;

/// Read a code map (an emulator's record of executed addresses) and
/// fold it into `[start, length]` code blocks, restricted to
/// `[start, end)`.
///
/// Four formats are auto-detected, by file size first and then by the
/// first non-empty line:
///
/// | Probe | Format |
/// |---|---|
/// | exactly 8192 bytes | Z80 emulator bitmap (bit per address) |
/// | exactly 65536 bytes | SpecEmu bitmap (byte per address) |
/// | line starts `0x` | Fuse profile |
/// | line starts `PC = ` | Spud log |
/// | line starts `PC:` | SpecEmu log |
/// | line ends `decimal` | Zero log |
///
/// Consecutive runs of executed instructions merge into one block: a run
/// starting exactly at the previous block's end extends it.
///
/// # Errors
///
/// Returns an I/O error for a missing file or a directory, and a
/// code-map error for an unrecognised format, an unparseable line, or an
/// address beyond 65535.
pub fn read_code_blocks(
    snapshot: &Snapshot,
    start: Addr,
    end: Addr,
    fname: &Path,
) -> SkoolResult<Vec<(Addr, Addr)>> {
    let display = fname.display().to_string();
    if fname.is_dir() {
        return Err(SkoolError::io(
            &display,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "is a directory",
            ),
        ));
    }
    let data = fs::read(fname).map_err(|e| SkoolError::io(&display, e))?;

    let addresses = match data.len() {
        8192 => {
            progress(&format!("Reading {display}"));
            progress("\n");
            z80_bitmap(&data, start, end)
        }
        65536 => {
            progress(&format!("Reading {display}"));
            progress("\n");
            specemu_bitmap(&data, start, end)
        }
        _ => {
            progress(&format!("Reading {display}: "));
            let addresses = text_addresses(&data, &display, start, end)?;
            progress("\n");
            addresses.into_iter().collect::<Vec<Addr>>()
        }
    };

    let disassembler = ZxDisassembler;
    let mut code_blocks: Vec<(Addr, Addr)> = Vec::new();
    for address in addresses {
        let size = disassembler
            .disassemble(snapshot, address, address + 1, Base::Decimal)[0]
            .size() as Addr;
        if let Some(last) = code_blocks.last_mut() {
            if address <= last.0 + last.1 {
                if address == last.0 + last.1 {
                    last.1 += size;
                }
                continue;
            }
        }
        code_blocks.push((address, size));
    }
    Ok(code_blocks)
}

/// Write to the diagnostic stream, ignoring failures: losing a progress
/// message must not abort a conversion.
fn progress(message: &str) {
    let _ = std::io::stderr().write_all(message.as_bytes());
    let _ = std::io::stderr().flush();
}

/// Decode a Z80 emulator bitmap: bit `i` of byte `b` marks address
/// `b * 8 + i` as executed.
fn z80_bitmap(data: &[u8], start: Addr, end: Addr) -> Vec<Addr> {
    let mut addresses = Vec::new();
    let mut address = start & 65528;
    let first = (start / 8) as usize;
    let last = ((end / 8) as usize + 1).min(data.len());
    for mut b in data[first.min(data.len())..last].iter().copied() {
        for _ in 0..8 {
            if b & 1 != 0 && (start..end).contains(&address) {
                addresses.push(address);
            }
            b >>= 1;
            address += 1;
        }
    }
    addresses
}

/// Decode a SpecEmu bitmap: the low bit of byte `a` marks address `a` as
/// executed.
fn specemu_bitmap(data: &[u8], start: Addr, end: Addr) -> Vec<Addr> {
    (start..end)
        .filter(|address| data[*address as usize] & 1 != 0)
        .collect()
}

/// How a text-format code map yields an address from one line.
struct TextFormat {
    /// Extract the address substring from a trimmed line
    extract: fn(&str) -> &str,

    /// The numeric base of the address substring
    base: u32,

    /// Line prefixes whose parse failures are ignored rather than fatal
    ignore_prefixes: &'static [&'static str],

    /// Whether detection rewinds so the probe line is parsed again
    rewind: bool,
}

/// The first 4 characters of a line, or all of a short line.
fn first_four(line: &str) -> &str {
    line.get(..line.len().min(4)).unwrap_or(line)
}

/// Characters `[2, 6)` of a Fuse profile line.
fn fuse_extract(line: &str) -> &str {
    line.get(2..line.len().min(6)).unwrap_or("")
}

/// Characters `[5, 9)` of a Spud log line.
fn spud_extract(line: &str) -> &str {
    line.get(5..line.len().min(9)).unwrap_or("")
}

/// Probe the first non-empty line for one of the four text formats.
fn detect_format(line: &str, display: &str) -> SkoolResult<TextFormat> {
    if line.starts_with("0x") {
        // Fuse profile
        return Ok(TextFormat {
            extract: fuse_extract,
            base: 16,
            ignore_prefixes: &[],
            rewind: true,
        });
    }
    if line.starts_with("PC = ") {
        // Spud log
        return Ok(TextFormat {
            extract: spud_extract,
            base: 16,
            ignore_prefixes: &[],
            rewind: true,
        });
    }
    if line.starts_with("PC:") {
        // SpecEmu log
        return Ok(TextFormat {
            extract: first_four,
            base: 16,
            ignore_prefixes: &["PC:", "IX:", "HL:", "DE:", "BC:", "AF:"],
            rewind: false,
        });
    }
    if line.ends_with("decimal") {
        // Zero log; the header names the base
        return Ok(TextFormat {
            extract: |l| l.split('\t').next().unwrap_or(l),
            base: if line.ends_with("in decimal") { 10 } else { 16 },
            ignore_prefixes: &[],
            rewind: false,
        });
    }
    Err(SkoolError::CodeMap(format!(
        "{display}: Unrecognised format"
    )))
}

/// Parse a text-format code map into a sorted set of executed addresses.
fn text_addresses(
    data: &[u8],
    display: &str,
    start: Addr,
    end: Addr,
) -> SkoolResult<BTreeSet<Addr>> {
    let text = String::from_utf8_lossy(data);
    let size = data.len().max(1);

    let probe = text
        .lines()
        .enumerate()
        .find(|(_, line)| !line.trim().is_empty());
    let Some((probe_index, probe_line)) = probe else {
        return Err(SkoolError::CodeMap(format!(
            "{display}: Unrecognised format"
        )));
    };
    let format = detect_format(probe_line.trim(), display)?;
    let skip = if format.rewind { 0 } else { probe_index + 1 };

    let mut addresses = BTreeSet::new();
    let mut consumed = 0_usize;
    let mut last_percent = usize::MAX;
    for (index, line) in text.lines().enumerate() {
        consumed += line.len() + 1;
        let percent = 100 * consumed.min(size) / size;
        if percent != last_percent {
            progress(&format!("{percent}%\u{8}\u{8}\u{8}\u{8}"));
            last_percent = percent;
        }
        if index < skip {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let address_str = (format.extract)(trimmed);
        if address_str.is_empty() {
            continue;
        }
        let address = match u32::from_str_radix(address_str.trim(), format.base)
        {
            Ok(address) => address,
            Err(_) => {
                if format
                    .ignore_prefixes
                    .iter()
                    .any(|p| trimmed.starts_with(p))
                {
                    continue;
                }
                return Err(SkoolError::CodeMap(format!(
                    "{display}, line {}: Cannot parse address: {trimmed}",
                    index + 1
                )));
            }
        };
        if address > 65535 {
            return Err(SkoolError::CodeMap(format!(
                "{display}, line {}: Address out of range: {trimmed}",
                index + 1
            )));
        }
        if (start..end).contains(&address) {
            addresses.insert(address);
        }
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    #[test]
    fn z80_bitmap_bits_map_to_addresses() {
        let mut data = vec![0_u8; 8192];
        // Bit 0 of byte 4096 is address 32768; bit 2 is 32770
        data[4096] = 0b0000_0101;
        let addresses = z80_bitmap(&data, 32768, 32772);
        assert_eq!(addresses, vec![32768, 32770]);
        assert_eq!(
            z80_bitmap(&data, 32769, 32772),
            vec![32770],
            "addresses before start are clipped"
        );
    }

    #[test]
    fn specemu_bitmap_uses_the_low_bit() {
        let mut data = vec![0_u8; 65536];
        data[40000] = 1;
        data[40001] = 2;
        data[40002] = 0xFF;
        assert_eq!(
            specemu_bitmap(&data, 40000, 40010),
            vec![40000, 40002]
        );
    }

    #[test]
    fn fuse_profiles_are_detected_and_parsed() {
        let text = b"0x8000 123\n0x8001 45\n";
        let addresses =
            text_addresses(text, "fuse.log", 0, 65536).unwrap();
        assert_eq!(
            addresses.into_iter().collect::<Vec<_>>(),
            vec![0x8000, 0x8001]
        );
    }

    #[test]
    fn spud_logs_rewind_to_include_the_probe_line() {
        let text = b"PC = 8000\nPC = 9000\n";
        let addresses =
            text_addresses(text, "spud.log", 0, 65536).unwrap();
        assert_eq!(
            addresses.into_iter().collect::<Vec<_>>(),
            vec![0x8000, 0x9000]
        );
    }

    #[test]
    fn specemu_logs_skip_register_dumps() {
        let text = b"PC: 8000\n9C40 NOP\nIX: FFFF\n9C42 RET\n";
        let addresses =
            text_addresses(text, "specemu.log", 0, 65536).unwrap();
        assert_eq!(
            addresses.into_iter().collect::<Vec<_>>(),
            vec![0x9C40, 0x9C42],
            "the probe line and register dumps are not addresses"
        );
    }

    #[test]
    fn zero_logs_choose_base_from_the_header() {
        let text = b"All addresses are in decimal\n40000\t1\n40002\t1\n";
        let addresses =
            text_addresses(text, "zero.log", 0, 65536).unwrap();
        assert_eq!(
            addresses.into_iter().collect::<Vec<_>>(),
            vec![40000, 40002]
        );
    }

    #[test]
    fn unknown_text_formats_are_rejected() {
        let err = text_addresses(b"hello world\n", "odd.log", 0, 65536)
            .unwrap_err();
        assert_eq!(err.to_string(), "odd.log: Unrecognised format");
    }

    #[test]
    fn unparseable_addresses_are_rejected() {
        let err = text_addresses(b"0xZZ12 ...\n", "fuse.log", 0, 65536)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "fuse.log, line 1: Cannot parse address: 0xZZ12 ..."
        );
    }

    #[test]
    fn out_of_range_addresses_are_rejected() {
        let text = b"All addresses are in decimal\n70000\t1\n";
        let err =
            text_addresses(text, "zero.log", 0, 65536).unwrap_err();
        assert_eq!(
            err.to_string(),
            "zero.log, line 2: Address out of range: 70000\t1"
        );
    }

    #[test]
    fn executed_runs_fold_into_blocks() {
        use std::io::Write as _;

        // RET at 32768 and 32770, NOPs elsewhere
        let mut snapshot = Snapshot::new();
        snapshot.poke(32768, &[0xC9]);
        snapshot.poke(32770, &[0xC9]);
        let (path, cleanup) = tempfile_path("blocks.log");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "PC = 8000").unwrap();
            writeln!(f, "PC = 8002").unwrap();
        }
        let blocks =
            read_code_blocks(&snapshot, 32768, 32771, &path).unwrap();
        // 32768..32769 and 32770..32771: the gap at 32769 splits them
        assert_eq!(blocks, vec![(32768, 1), (32770, 1)]);
        cleanup();
    }

    /// A throwaway file path in the system temp directory, plus its
    /// cleanup closure.
    fn tempfile_path(
        name: &str,
    ) -> (std::path::PathBuf, impl FnOnce()) {
        let mut path = std::env::temp_dir();
        path.push(format!("zedkit-test-{}-{name}", std::process::id()));
        let cleanup_path = path.clone();
        (path, move || {
            let _ = std::fs::remove_file(cleanup_path);
        })
    }
}
