use skool::{Addr, Base, Snapshot};

use super::{ALU, BLOCK_OPS, CONDITIONS, REG16, REG16_STACK, REG8, ROT};
use crate::components::{Config, DisInstruction, Disassembler};

/// The snapshot-backed Z80 disassembler registered under the name `zx`.
///
/// Decodes every unprefixed opcode, the full CB page, the documented ED
/// page (invalid ED and bare DD/FD prefixes degrade to byte definitions),
/// and the DD/FD index forms, and synthesises the DEFB/DEFM/DEFS/DEFW
/// statement surface for data blocks.
#[derive(Debug)]
pub struct ZxDisassembler;

impl Disassembler for ZxDisassembler {
    fn disassemble(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        base: Base,
    ) -> Vec<DisInstruction> {
        let mut instructions = Vec::new();
        let mut address = start;
        while address < end {
            let (operation, size) = Decoder {
                snapshot,
                address,
                base,
            }
            .decode();
            let bytes =
                snapshot.slice(address, address + size as Addr).to_vec();
            instructions.push(DisInstruction::new(address, bytes, operation));
            address += size as Addr;
        }
        instructions
    }

    fn defb_range(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        sublengths: &[(usize, Base)],
        config: &Config,
        base: Base,
    ) -> Vec<DisInstruction> {
        let mut instructions = Vec::new();
        let mut address = start;
        let mut sublength = sublengths.iter().filter(|s| s.0 > 0).cycle();
        while address < end {
            let (mut length, value_base) = match sublength.next() {
                Some((length, value_base)) => (*length, *value_base),
                None => (config.defb_size, base),
            };
            if sublengths.iter().all(|s| s.0 == 0) && config.defb_mod > 1 {
                let rem = address as usize % config.defb_mod;
                if rem != 0 {
                    length = length.min(config.defb_mod - rem);
                }
            }
            let stop = end.min(address + length.max(1) as Addr);
            let values: Vec<String> = snapshot
                .slice(address, stop)
                .iter()
                .map(|b| defb_value(*b, value_base, config.defb_zfill))
                .collect();
            instructions.push(DisInstruction::new(
                address,
                snapshot.slice(address, stop).to_vec(),
                format!("DEFB {}", values.join(",")),
            ));
            address = stop;
        }
        instructions
    }

    fn defm_range(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        sublengths: &[(usize, Base)],
        config: &Config,
        base: Base,
    ) -> Vec<DisInstruction> {
        let mut instructions = Vec::new();
        let mut address = start;
        let mut sublength = sublengths.iter().filter(|s| s.0 > 0).cycle();
        while address < end {
            let (length, value_base) = match sublength.next() {
                Some((length, value_base)) => (*length, *value_base),
                None => (config.defm_size, base),
            };
            let stop = end.min(address + length.max(1) as Addr);
            let text = defm_values(snapshot.slice(address, stop), value_base);
            instructions.push(DisInstruction::new(
                address,
                snapshot.slice(address, stop).to_vec(),
                format!("DEFM {text}"),
            ));
            address = stop;
        }
        instructions
    }

    fn defs(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        base: Base,
    ) -> DisInstruction {
        let fill = snapshot.byte(start);
        let length = end - start;
        let operation = if fill == 0 {
            format!("DEFS {}", word_str(length, base))
        } else {
            format!(
                "DEFS {},{}",
                word_str(length, base),
                byte_str(fill, base)
            )
        };
        DisInstruction::new(start, snapshot.slice(start, end).to_vec(), operation)
    }

    fn defw_range(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        sublengths: &[(usize, Base)],
        base: Base,
    ) -> Vec<DisInstruction> {
        let mut instructions = Vec::new();
        let mut address = start;
        let mut sublength = sublengths.iter().filter(|s| s.0 > 0).cycle();
        while address < end {
            let (length, value_base) = match sublength.next() {
                Some((length, value_base)) => (*length, *value_base),
                None => (2, base),
            };
            let stop = end.min(address + length.max(2) as Addr);
            let words: Vec<String> = snapshot
                .slice(address, stop)
                .chunks(2)
                .map(|pair| {
                    let word = u32::from(pair[0])
                        + 256 * pair.get(1).map_or(0, |b| u32::from(*b));
                    word_str(word, value_base)
                })
                .collect();
            instructions.push(DisInstruction::new(
                address,
                snapshot.slice(address, stop).to_vec(),
                format!("DEFW {}", words.join(",")),
            ));
            address = stop;
        }
        instructions
    }

    fn ignore(&self, start: Addr, _end: Addr) -> Vec<DisInstruction> {
        vec![DisInstruction::new(start, Vec::new(), String::new())]
    }
}

/// Format a byte operand.
fn byte_str(value: u8, base: Base) -> String {
    match base {
        Base::Decimal => value.to_string(),
        Base::HexLower => format!("${value:02x}"),
        Base::Hex => format!("${value:02X}"),
    }
}

/// Format a word operand or address.
fn word_str(value: Addr, base: Base) -> String {
    match base {
        Base::Decimal => value.to_string(),
        Base::HexLower => format!("${value:04x}"),
        Base::Hex => format!("${value:04X}"),
    }
}

/// Format a DEFB value, honouring the zero-fill option in decimal mode.
fn defb_value(value: u8, base: Base, zfill: bool) -> String {
    match base {
        Base::Decimal if zfill => format!("{value:03}"),
        _ => byte_str(value, base),
    }
}

/// Render a run of bytes as DEFM operands: printable characters gathered
/// into quoted strings, everything else as numeric values.
fn defm_values(data: &[u8], base: Base) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run = String::new();
    for b in data {
        if (32..127).contains(b) && *b != b'"' && *b != b'\\' {
            run.push(char::from(*b));
        } else {
            if !run.is_empty() {
                parts.push(format!("\"{run}\""));
                run.clear();
            }
            parts.push(byte_str(*b, base));
        }
    }
    if !run.is_empty() {
        parts.push(format!("\"{run}\""));
    }
    parts.join(",")
}

/// One decode position: reads operand bytes relative to `address` and
/// produces `(operation, size)` pairs.  Anything undecodable (an invalid
/// ED page, a bare index prefix, operand bytes beyond 65535) degrades to
/// a DEFB statement so classification can keep walking.
struct Decoder<'a> {
    /// The memory being decoded
    snapshot: &'a Snapshot,
    /// The instruction's start address
    address: Addr,
    /// Operand rendering base
    base: Base,
}

impl Decoder<'_> {
    /// The byte at `address + offset`, if it is below 65536.
    fn byte(&self, offset: Addr) -> Option<u8> {
        let address = self.address + offset;
        (address < 65536).then(|| self.snapshot.byte(address))
    }

    /// The little-endian word at `address + offset`.
    fn word(&self, offset: Addr) -> Option<Addr> {
        let low = self.byte(offset)?;
        let high = self.byte(offset + 1)?;
        Some(Addr::from(low) + 256 * Addr::from(high))
    }

    /// A byte-definition fallback covering `size` bytes.
    fn defb(&self, size: Addr) -> (String, usize) {
        let values: Vec<String> = (0..size)
            .filter_map(|i| self.byte(i))
            .map(|b| byte_str(b, self.base))
            .collect();
        (format!("DEFB {}", values.join(",")), values.len().max(1))
    }

    /// Decode the instruction at `address`.
    fn decode(&self) -> (String, usize) {
        match self.byte(0) {
            Some(0xCB) => self.decode_cb(),
            Some(0xED) => self.decode_ed(),
            Some(0xDD) => self.decode_index("IX"),
            Some(0xFD) => self.decode_index("IY"),
            Some(op) => self.decode_main(op),
            None => self.defb(1),
        }
    }

    /// The branch target of a relative jump with displacement `d`.
    fn jr_target(&self, d: u8) -> Addr {
        let target =
            i64::from(self.address) + 2 + i64::from(d as i8);
        (target.rem_euclid(65536)) as Addr
    }

    /// Decode an unprefixed opcode.
    #[allow(
        clippy::too_many_lines,
        reason = "one arm per opcode row keeps the encoding table legible"
    )]
    fn decode_main(&self, op: u8) -> (String, usize) {
        let x = op >> 6;
        let y = usize::from((op >> 3) & 7);
        let z = usize::from(op & 7);
        let p = y >> 1;
        let q = y & 1;
        match (x, z) {
            (0, 0) => match y {
                0 => ("NOP".to_owned(), 1),
                1 => ("EX AF,AF'".to_owned(), 1),
                2 | 3 => {
                    let mnemonic = if y == 2 { "DJNZ" } else { "JR" };
                    match self.byte(1) {
                        Some(d) => (
                            format!(
                                "{mnemonic} {}",
                                word_str(self.jr_target(d), self.base)
                            ),
                            2,
                        ),
                        None => self.defb(1),
                    }
                }
                _ => match self.byte(1) {
                    Some(d) => (
                        format!(
                            "JR {},{}",
                            CONDITIONS[y - 4],
                            word_str(self.jr_target(d), self.base)
                        ),
                        2,
                    ),
                    None => self.defb(1),
                },
            },
            (0, 1) if q == 0 => match self.word(1) {
                Some(nn) => (
                    format!(
                        "LD {},{}",
                        REG16[p],
                        word_str(nn, self.base)
                    ),
                    3,
                ),
                None => self.defb(1),
            },
            (0, 1) => (format!("ADD HL,{}", REG16[p]), 1),
            (0, 2) => self.decode_indirect_load(p, q),
            (0, 3) if q == 0 => (format!("INC {}", REG16[p]), 1),
            (0, 3) => (format!("DEC {}", REG16[p]), 1),
            (0, 4) => (format!("INC {}", REG8[y]), 1),
            (0, 5) => (format!("DEC {}", REG8[y]), 1),
            (0, 6) => match self.byte(1) {
                Some(n) => (
                    format!("LD {},{}", REG8[y], byte_str(n, self.base)),
                    2,
                ),
                None => self.defb(1),
            },
            (0, _) => (
                ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"]
                    [y]
                    .to_owned(),
                1,
            ),
            (1, _) if op == 0x76 => ("HALT".to_owned(), 1),
            (1, _) => (format!("LD {},{}", REG8[y], REG8[z]), 1),
            (2, _) => (format!("{}{}", ALU[y], REG8[z]), 1),
            (3, 0) => (format!("RET {}", CONDITIONS[y]), 1),
            (3, 1) if q == 0 => (format!("POP {}", REG16_STACK[p]), 1),
            (3, 1) => (
                ["RET", "EXX", "JP (HL)", "LD SP,HL"][p].to_owned(),
                1,
            ),
            (3, 2) => match self.word(1) {
                Some(nn) => (
                    format!(
                        "JP {},{}",
                        CONDITIONS[y],
                        word_str(nn, self.base)
                    ),
                    3,
                ),
                None => self.defb(1),
            },
            (3, 3) => self.decode_control(y),
            (3, 4) => match self.word(1) {
                Some(nn) => (
                    format!(
                        "CALL {},{}",
                        CONDITIONS[y],
                        word_str(nn, self.base)
                    ),
                    3,
                ),
                None => self.defb(1),
            },
            (3, 5) if q == 0 => (format!("PUSH {}", REG16_STACK[p]), 1),
            (3, 5) => match self.word(1) {
                // p == 0 is CALL nn; the other q=1 slots are the CB/ED/
                // DD/FD prefixes, handled before decode_main
                Some(nn) => {
                    (format!("CALL {}", word_str(nn, self.base)), 3)
                }
                None => self.defb(1),
            },
            (3, 6) => match self.byte(1) {
                Some(n) => (
                    format!("{}{}", ALU[y], byte_str(n, self.base)),
                    2,
                ),
                None => self.defb(1),
            },
            (_, _) => (format!("RST {}", byte_str(op & 0x38, self.base)), 1),
        }
    }

    /// The `x=0, z=2` row: loads through BC, DE, and absolute addresses.
    fn decode_indirect_load(&self, p: usize, q: usize) -> (String, usize) {
        match (q, p) {
            (0, 0) => ("LD (BC),A".to_owned(), 1),
            (0, 1) => ("LD (DE),A".to_owned(), 1),
            (1, 0) => ("LD A,(BC)".to_owned(), 1),
            (1, 1) => ("LD A,(DE)".to_owned(), 1),
            _ => match self.word(1) {
                Some(nn) => {
                    let nn = word_str(nn, self.base);
                    let operation = match (q, p) {
                        (0, 2) => format!("LD ({nn}),HL"),
                        (0, _) => format!("LD ({nn}),A"),
                        (1, 2) => format!("LD HL,({nn})"),
                        _ => format!("LD A,({nn})"),
                    };
                    (operation, 3)
                }
                None => self.defb(1),
            },
        }
    }

    /// The `x=3, z=3` row: absolute jump, I/O through ports, exchanges,
    /// interrupt control.  (`y=1` is the CB prefix, dispatched earlier.)
    fn decode_control(&self, y: usize) -> (String, usize) {
        match y {
            0 => match self.word(1) {
                Some(nn) => {
                    (format!("JP {}", word_str(nn, self.base)), 3)
                }
                None => self.defb(1),
            },
            2 | 3 => match self.byte(1) {
                Some(n) => {
                    let n = byte_str(n, self.base);
                    if y == 2 {
                        (format!("OUT ({n}),A"), 2)
                    } else {
                        (format!("IN A,({n})"), 2)
                    }
                }
                None => self.defb(1),
            },
            4 => ("EX (SP),HL".to_owned(), 1),
            5 => ("EX DE,HL".to_owned(), 1),
            6 => ("DI".to_owned(), 1),
            _ => ("EI".to_owned(), 1),
        }
    }

    /// Decode a CB-prefixed rotate/shift/bit operation.
    fn decode_cb(&self) -> (String, usize) {
        let Some(sub) = self.byte(1) else {
            return self.defb(1);
        };
        let x = sub >> 6;
        let y = usize::from((sub >> 3) & 7);
        let z = usize::from(sub & 7);
        let operation = match x {
            0 => format!("{} {}", ROT[y], REG8[z]),
            1 => format!("BIT {y},{}", REG8[z]),
            2 => format!("RES {y},{}", REG8[z]),
            _ => format!("SET {y},{}", REG8[z]),
        };
        (operation, 2)
    }

    /// Decode an ED-prefixed operation; the invalid pages fall back to
    /// byte definitions.
    fn decode_ed(&self) -> (String, usize) {
        let Some(sub) = self.byte(1) else {
            return self.defb(1);
        };
        let x = sub >> 6;
        let y = usize::from((sub >> 3) & 7);
        let z = usize::from(sub & 7);
        let p = y >> 1;
        let q = y & 1;
        if x == 2 && z <= 3 && y >= 4 {
            return (BLOCK_OPS[y - 4][z].to_owned(), 2);
        }
        if x != 1 {
            return self.defb(2);
        }
        match z {
            0 if y != 6 => (format!("IN {},(C)", REG8[y]), 2),
            1 if y != 6 => (format!("OUT (C),{}", REG8[y]), 2),
            2 if q == 0 => (format!("SBC HL,{}", REG16[p]), 2),
            2 => (format!("ADC HL,{}", REG16[p]), 2),
            3 => match self.word(2) {
                Some(nn) => {
                    let nn = word_str(nn, self.base);
                    if q == 0 {
                        (format!("LD ({nn}),{}", REG16[p]), 4)
                    } else {
                        (format!("LD {},({nn})", REG16[p]), 4)
                    }
                }
                None => self.defb(2),
            },
            4 if y == 0 => ("NEG".to_owned(), 2),
            5 => {
                // 0x4D is RETI; the other seven slots behave as RETN
                if y == 1 {
                    ("RETI".to_owned(), 2)
                } else {
                    ("RETN".to_owned(), 2)
                }
            }
            6 if y == 0 => ("IM 0".to_owned(), 2),
            6 if y == 2 => ("IM 1".to_owned(), 2),
            6 if y == 3 => ("IM 2".to_owned(), 2),
            7 if y < 6 => (
                ["LD I,A", "LD R,A", "LD A,I", "LD A,R", "RRD", "RLD"][y]
                    .to_owned(),
                2,
            ),
            _ => self.defb(2),
        }
    }

    /// Decode a DD/FD-prefixed index operation; a prefix whose follower
    /// takes no index form degrades to a one-byte definition.
    fn decode_index(&self, reg: &str) -> (String, usize) {
        let Some(sub) = self.byte(1) else {
            return self.defb(1);
        };
        let displaced = |d: u8| index_operand(reg, d as i8, self.base);
        match sub {
            0x09 | 0x19 | 0x29 | 0x39 => {
                let rhs = match usize::from((sub >> 4) & 3) {
                    2 => reg,
                    p => REG16[p],
                };
                (format!("ADD {reg},{rhs}"), 2)
            }
            0x21 => match self.word(2) {
                Some(nn) => (
                    format!("LD {reg},{}", word_str(nn, self.base)),
                    4,
                ),
                None => self.defb(1),
            },
            0x22 | 0x2A => match self.word(2) {
                Some(nn) => {
                    let nn = word_str(nn, self.base);
                    if sub == 0x22 {
                        (format!("LD ({nn}),{reg}"), 4)
                    } else {
                        (format!("LD {reg},({nn})"), 4)
                    }
                }
                None => self.defb(1),
            },
            0x23 => (format!("INC {reg}"), 2),
            0x2B => (format!("DEC {reg}"), 2),
            0x34 | 0x35 => match self.byte(2) {
                Some(d) => {
                    let verb = if sub == 0x34 { "INC" } else { "DEC" };
                    (format!("{verb} {}", displaced(d)), 3)
                }
                None => self.defb(1),
            },
            0x36 => match (self.byte(2), self.byte(3)) {
                (Some(d), Some(n)) => (
                    format!(
                        "LD {},{}",
                        displaced(d),
                        byte_str(n, self.base)
                    ),
                    4,
                ),
                _ => self.defb(1),
            },
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                match self.byte(2) {
                    Some(d) => {
                        let y = usize::from((sub >> 3) & 7);
                        (
                            format!("LD {},{}", REG8[y], displaced(d)),
                            3,
                        )
                    }
                    None => self.defb(1),
                }
            }
            0x70..=0x75 | 0x77 => match self.byte(2) {
                Some(d) => {
                    let z = usize::from(sub & 7);
                    (format!("LD {},{}", displaced(d), REG8[z]), 3)
                }
                None => self.defb(1),
            },
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                match self.byte(2) {
                    Some(d) => {
                        let y = usize::from((sub >> 3) & 7);
                        (format!("{}{}", ALU[y], displaced(d)), 3)
                    }
                    None => self.defb(1),
                }
            }
            0xE1 => (format!("POP {reg}"), 2),
            0xE3 => (format!("EX (SP),{reg}"), 2),
            0xE5 => (format!("PUSH {reg}"), 2),
            0xE9 => (format!("JP ({reg})"), 2),
            0xF9 => (format!("LD SP,{reg}"), 2),
            0xCB => self.decode_index_cb(reg),
            _ => self.defb(1),
        }
    }

    /// Decode a DDCB/FDCB-prefixed operation on a displaced operand.
    fn decode_index_cb(&self, reg: &str) -> (String, usize) {
        let (Some(d), Some(sub)) = (self.byte(2), self.byte(3)) else {
            return self.defb(1);
        };
        let x = sub >> 6;
        let y = usize::from((sub >> 3) & 7);
        let z = usize::from(sub & 7);
        if z != 6 {
            // Undocumented copy-to-register forms
            return self.defb(2);
        }
        let operand = index_operand(reg, d as i8, self.base);
        let operation = match x {
            0 => format!("{} {operand}", ROT[y]),
            1 => format!("BIT {y},{operand}"),
            2 => format!("RES {y},{operand}"),
            _ => format!("SET {y},{operand}"),
        };
        (operation, 4)
    }
}

/// Format an index-register operand with its signed displacement, e.g.
/// `(IX+5)` or `(IY-$02)`.
fn index_operand(reg: &str, d: i8, base: Base) -> String {
    if d < 0 {
        format!("({reg}-{})", byte_str(d.unsigned_abs(), base))
    } else {
        format!("({reg}+{})", byte_str(d as u8, base))
    }
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    /// Decode the single instruction at the start of `bytes` placed at
    /// `address`.
    fn decode_at(address: Addr, bytes: &[u8], base: Base) -> (String, usize) {
        let snapshot = Snapshot::from_data(bytes, address);
        Decoder {
            snapshot: &snapshot,
            address,
            base,
        }
        .decode()
    }

    #[test]
    fn unprefixed_loads_and_arithmetic() {
        assert_eq!(
            decode_at(0, &[0x3E, 0x00], Base::Decimal),
            ("LD A,0".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xAF], Base::Decimal),
            ("XOR A".to_owned(), 1)
        );
        assert_eq!(
            decode_at(0, &[0x01, 0x34, 0x12], Base::Hex),
            ("LD BC,$1234".to_owned(), 3)
        );
        assert_eq!(
            decode_at(0, &[0x32, 0x00, 0x40], Base::Decimal),
            ("LD (16384),A".to_owned(), 3)
        );
        assert_eq!(
            decode_at(0, &[0x76], Base::Decimal),
            ("HALT".to_owned(), 1)
        );
    }

    #[test]
    fn control_flow() {
        assert_eq!(
            decode_at(0, &[0xC9], Base::Decimal),
            ("RET".to_owned(), 1)
        );
        assert_eq!(
            decode_at(0, &[0xC3, 0x00, 0x80], Base::Decimal),
            ("JP 32768".to_owned(), 3)
        );
        assert_eq!(
            decode_at(0, &[0xE9], Base::Decimal),
            ("JP (HL)".to_owned(), 1)
        );
        assert_eq!(
            decode_at(0, &[0xC7], Base::Decimal),
            ("RST 0".to_owned(), 1)
        );
        assert_eq!(
            decode_at(0, &[0xFF], Base::Decimal),
            ("RST 56".to_owned(), 1)
        );
    }

    #[test]
    fn relative_jumps_render_their_target() {
        // JR -2 at 40000 loops onto itself
        assert_eq!(
            decode_at(40000, &[0x18, 0xFE], Base::Decimal),
            ("JR 40000".to_owned(), 2)
        );
        assert_eq!(
            decode_at(40000, &[0x20, 0x02], Base::Decimal),
            ("JR NZ,40004".to_owned(), 2)
        );
        assert_eq!(
            decode_at(40000, &[0x10, 0xFC], Base::Decimal),
            ("DJNZ 39998".to_owned(), 2)
        );
    }

    #[test]
    fn cb_page() {
        assert_eq!(
            decode_at(0, &[0xCB, 0x00], Base::Decimal),
            ("RLC B".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xCB, 0x47], Base::Decimal),
            ("BIT 0,A".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xCB, 0xFE], Base::Decimal),
            ("SET 7,(HL)".to_owned(), 2)
        );
    }

    #[test]
    fn ed_page() {
        assert_eq!(
            decode_at(0, &[0xED, 0x45], Base::Decimal),
            ("RETN".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xED, 0x4D], Base::Decimal),
            ("RETI".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xED, 0xB0], Base::Decimal),
            ("LDIR".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xED, 0x43, 0x00, 0x60], Base::Decimal),
            ("LD (24576),BC".to_owned(), 4)
        );
        assert_eq!(
            decode_at(0, &[0xED, 0x00], Base::Decimal),
            ("DEFB 237,0".to_owned(), 2),
            "an invalid ED page degrades to a byte definition"
        );
    }

    #[test]
    fn index_forms() {
        assert_eq!(
            decode_at(0, &[0xDD, 0x7E, 0x05], Base::Decimal),
            ("LD A,(IX+5)".to_owned(), 3)
        );
        assert_eq!(
            decode_at(0, &[0xFD, 0x36, 0xFE, 0x07], Base::Decimal),
            ("LD (IY-2),7".to_owned(), 4)
        );
        assert_eq!(
            decode_at(0, &[0xDD, 0xE9], Base::Decimal),
            ("JP (IX)".to_owned(), 2)
        );
        assert_eq!(
            decode_at(0, &[0xDD, 0xCB, 0x03, 0x46], Base::Decimal),
            ("BIT 0,(IX+3)".to_owned(), 4)
        );
        assert_eq!(
            decode_at(0, &[0xDD, 0x00], Base::Decimal),
            ("DEFB 221".to_owned(), 1),
            "a bare index prefix degrades to a one-byte definition"
        );
    }

    #[test]
    fn disassemble_walks_a_range() {
        let snapshot =
            Snapshot::from_data(&[0x3E, 0x00, 0xC9], 32768);
        let instructions = ZxDisassembler.disassemble(
            &snapshot, 32768, 32771, Base::Decimal,
        );
        let operations: Vec<&str> = instructions
            .iter()
            .map(|i| i.operation.as_str())
            .collect();
        assert_eq!(operations, vec!["LD A,0", "RET"]);
        assert_eq!(instructions[0].bytes, vec![0x3E, 0x00]);
        assert_eq!(instructions[1].address, 32770);
    }

    #[test]
    fn defb_statements_group_by_size() {
        let config = Config::default();
        let snapshot = Snapshot::from_data(&[1; 20], 30000);
        let statements = ZxDisassembler.defb_range(
            &snapshot,
            30000,
            30020,
            &[],
            &config,
            Base::Decimal,
        );
        assert_eq!(statements.len(), 3, "20 bytes in chunks of 8");
        assert_eq!(statements[0].operation, "DEFB 1,1,1,1,1,1,1,1");
        assert_eq!(statements[2].operation, "DEFB 1,1,1,1");
        assert_eq!(statements[2].address, 30016);
    }

    #[test]
    fn defm_statements_quote_printable_runs() {
        let config = Config::default();
        let mut data = b"HELLO".to_vec();
        data.push(13);
        let snapshot = Snapshot::from_data(&data, 50000);
        let statements = ZxDisassembler.defm_range(
            &snapshot,
            50000,
            50006,
            &[],
            &config,
            Base::Decimal,
        );
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].operation, "DEFM \"HELLO\",13");
    }

    #[test]
    fn defs_names_length_and_fill() {
        let snapshot = Snapshot::new();
        let statement =
            ZxDisassembler.defs(&snapshot, 40000, 40100, Base::Decimal);
        assert_eq!(statement.operation, "DEFS 100");
        let filled = Snapshot::from_data(&[0xAA; 16], 40000);
        let statement =
            ZxDisassembler.defs(&filled, 40000, 40016, Base::Decimal);
        assert_eq!(statement.operation, "DEFS 16,170");
    }

    #[test]
    fn defw_statements_read_little_endian_words() {
        let snapshot = Snapshot::from_data(&[0x00, 0x80, 0x34, 0x12], 30000);
        let statements = ZxDisassembler.defw_range(
            &snapshot,
            30000,
            30004,
            &[],
            Base::Decimal,
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].operation, "DEFW 32768");
        assert_eq!(statements[1].operation, "DEFW 4660");
    }
}
