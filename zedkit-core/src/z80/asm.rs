use skool::{Addr, SkoolError, SkoolResult};
use skool_parser::partition_unquoted;

use super::{CONDITIONS, REG16, REG16_STACK, REG8, ROT};
use crate::components::Assembler;

/// The mnemonic assembler used by the bin writer.
///
/// Accepts the canonical mnemonic set the disassembler produces, plus the
/// pseudo-operations `DEFB`, `DEFM`, `DEFS` and `DEFW`.  Operand numbers
/// may be decimal, `$`/`0x` hex, or `%` binary; relative-jump operands are
/// absolute target addresses, converted to displacements at assembly time.
#[derive(Debug)]
pub struct Z80Assembler;

impl Assembler for Z80Assembler {
    fn get_size(&self, operation: &str, address: Addr) -> SkoolResult<usize> {
        self.assemble(operation, address).map(|bytes| bytes.len())
    }

    fn assemble(
        &self,
        operation: &str,
        address: Addr,
    ) -> SkoolResult<Vec<u8>> {
        assemble_operation(operation, address).ok_or_else(|| {
            SkoolError::Assembly {
                address,
                operation: operation.trim().to_owned(),
            }
        })
    }
}

/// Assemble one operation, or `None` when it does not match any encoding.
#[allow(
    clippy::too_many_lines,
    reason = "one arm per mnemonic family keeps the encoding table legible"
)]
fn assemble_operation(operation: &str, address: Addr) -> Option<Vec<u8>> {
    let trimmed = operation.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    let mnemonic = head.to_ascii_uppercase();

    // Data definitions keep their operand text verbatim (strings are
    // case-sensitive); everything else is normalised
    match mnemonic.as_str() {
        "DEFB" | "DEFM" => return data_bytes(rest),
        "DEFW" => return data_words(rest),
        "DEFS" => return data_space(rest),
        _ => {}
    }

    let ops: Vec<String> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',')
            .map(|op| op.trim().replace(' ', "").to_ascii_uppercase())
            .collect()
    };
    let ops: Vec<&str> = ops.iter().map(String::as_str).collect();

    match (mnemonic.as_str(), ops.as_slice()) {
        ("NOP", []) => Some(vec![0x00]),
        ("HALT", []) => Some(vec![0x76]),
        ("RLCA", []) => Some(vec![0x07]),
        ("RRCA", []) => Some(vec![0x0F]),
        ("RLA", []) => Some(vec![0x17]),
        ("RRA", []) => Some(vec![0x1F]),
        ("DAA", []) => Some(vec![0x27]),
        ("CPL", []) => Some(vec![0x2F]),
        ("SCF", []) => Some(vec![0x37]),
        ("CCF", []) => Some(vec![0x3F]),
        ("EXX", []) => Some(vec![0xD9]),
        ("DI", []) => Some(vec![0xF3]),
        ("EI", []) => Some(vec![0xFB]),
        ("RET", []) => Some(vec![0xC9]),
        ("RET", [cc]) => Some(vec![0xC0 + 8 * condition(cc)?]),
        ("NEG", []) => Some(vec![0xED, 0x44]),
        ("RETN", []) => Some(vec![0xED, 0x45]),
        ("RETI", []) => Some(vec![0xED, 0x4D]),
        ("RRD", []) => Some(vec![0xED, 0x67]),
        ("RLD", []) => Some(vec![0xED, 0x6F]),
        ("LDI", []) => Some(vec![0xED, 0xA0]),
        ("CPI", []) => Some(vec![0xED, 0xA1]),
        ("INI", []) => Some(vec![0xED, 0xA2]),
        ("OUTI", []) => Some(vec![0xED, 0xA3]),
        ("LDD", []) => Some(vec![0xED, 0xA8]),
        ("CPD", []) => Some(vec![0xED, 0xA9]),
        ("IND", []) => Some(vec![0xED, 0xAA]),
        ("OUTD", []) => Some(vec![0xED, 0xAB]),
        ("LDIR", []) => Some(vec![0xED, 0xB0]),
        ("CPIR", []) => Some(vec![0xED, 0xB1]),
        ("INIR", []) => Some(vec![0xED, 0xB2]),
        ("OTIR", []) => Some(vec![0xED, 0xB3]),
        ("LDDR", []) => Some(vec![0xED, 0xB8]),
        ("CPDR", []) => Some(vec![0xED, 0xB9]),
        ("INDR", []) => Some(vec![0xED, 0xBA]),
        ("OTDR", []) => Some(vec![0xED, 0xBB]),
        ("IM", [mode]) => match *mode {
            "0" => Some(vec![0xED, 0x46]),
            "1" => Some(vec![0xED, 0x56]),
            "2" => Some(vec![0xED, 0x5E]),
            _ => None,
        },
        ("LD", [dst, src]) => load(dst, src),
        ("PUSH", [rp]) => stack_op(0xC5, rp),
        ("POP", [rp]) => stack_op(0xC1, rp),
        ("INC", [op]) => inc_dec(0x04, 0x03, 0x34, 0x23, op),
        ("DEC", [op]) => inc_dec(0x05, 0x0B, 0x35, 0x2B, op),
        ("ADD", [dst, src]) => add_16(dst, src).or_else(|| {
            (*dst == "A").then(|| alu_operand(0, src)).flatten()
        }),
        ("ADC", ["A", src]) => alu_operand(1, src),
        ("ADC", ["HL", rp]) => Some(vec![0xED, 0x4A + 16 * reg16(rp)?]),
        ("SUB", [src]) | ("SUB", ["A", src]) => alu_operand(2, src),
        ("SBC", ["A", src]) => alu_operand(3, src),
        ("SBC", ["HL", rp]) => Some(vec![0xED, 0x42 + 16 * reg16(rp)?]),
        ("AND", [src]) | ("AND", ["A", src]) => alu_operand(4, src),
        ("XOR", [src]) | ("XOR", ["A", src]) => alu_operand(5, src),
        ("OR", [src]) | ("OR", ["A", src]) => alu_operand(6, src),
        ("CP", [src]) | ("CP", ["A", src]) => alu_operand(7, src),
        ("JP", ["(HL)"]) => Some(vec![0xE9]),
        ("JP", ["(IX)"]) => Some(vec![0xDD, 0xE9]),
        ("JP", ["(IY)"]) => Some(vec![0xFD, 0xE9]),
        ("JP", [target]) => with_word(0xC3, target),
        ("JP", [cc, target]) => {
            with_word(0xC2 + 8 * condition(cc)?, target)
        }
        ("JR", [target]) => relative(0x18, target, address),
        ("JR", [cc, target]) => {
            let cc = condition(cc).filter(|c| *c < 4)?;
            relative(0x20 + 8 * cc, target, address)
        }
        ("DJNZ", [target]) => relative(0x10, target, address),
        ("CALL", [target]) => with_word(0xCD, target),
        ("CALL", [cc, target]) => {
            with_word(0xC4 + 8 * condition(cc)?, target)
        }
        ("RST", [vector]) => {
            let n = number(vector).filter(|n| n % 8 == 0 && *n < 64)?;
            Some(vec![0xC7 + n as u8])
        }
        ("IN", ["A", port]) if mem(port).is_some() => {
            Some(vec![0xDB, byte(mem(port)?)?])
        }
        ("IN", [r, "(C)"]) => Some(vec![0xED, 0x40 + 8 * reg8(r)?]),
        ("OUT", [port, "A"]) if mem(port).is_some() => {
            Some(vec![0xD3, byte(mem(port)?)?])
        }
        ("OUT", ["(C)", r]) => Some(vec![0xED, 0x41 + 8 * reg8(r)?]),
        ("EX", ["(SP)", "HL"]) => Some(vec![0xE3]),
        ("EX", ["(SP)", "IX"]) => Some(vec![0xDD, 0xE3]),
        ("EX", ["(SP)", "IY"]) => Some(vec![0xFD, 0xE3]),
        ("EX", ["DE", "HL"]) => Some(vec![0xEB]),
        ("EX", ["AF", "AF'"]) => Some(vec![0x08]),
        ("BIT", [bit, op]) => bit_op(0x40, bit, op),
        ("RES", [bit, op]) => bit_op(0x80, bit, op),
        ("SET", [bit, op]) => bit_op(0xC0, bit, op),
        (rot, [op]) if ROT.iter().any(|r| *r == rot) => {
            let code = ROT.iter().position(|r| *r == rot)? as u8;
            if let Some(r) = reg8(op) {
                return Some(vec![0xCB, 8 * code + r]);
            }
            let (prefix, d) = index(op)?;
            Some(vec![prefix, 0xCB, d as u8, 8 * code + 6])
        }
        _ => None,
    }
}

/// Encode `LD dst,src` across its many addressing forms.
fn load(dst: &str, src: &str) -> Option<Vec<u8>> {
    if let (Some(y), Some(z)) = (reg8(dst), reg8(src)) {
        // LD (HL),(HL) would collide with HALT
        return (y != 6 || z != 6).then(|| vec![0x40 + 8 * y + z]);
    }
    if let (Some(y), Some((prefix, d))) = (reg8(dst), index(src)) {
        return (y != 6)
            .then(|| vec![prefix, 0x46 + 8 * y, d as u8]);
    }
    if let (Some((prefix, d)), Some(z)) = (index(dst), reg8(src)) {
        return (z != 6).then(|| vec![prefix, 0x70 + z, d as u8]);
    }
    if let (Some((prefix, d)), Some(n)) = (index(dst), number(src)) {
        return Some(vec![prefix, 0x36, d as u8, byte(n)?]);
    }
    if dst == "A" {
        match src {
            "(BC)" => return Some(vec![0x0A]),
            "(DE)" => return Some(vec![0x1A]),
            "I" => return Some(vec![0xED, 0x57]),
            "R" => return Some(vec![0xED, 0x5F]),
            _ => {
                if let Some(nn) = mem(src) {
                    return Some(with_addr(vec![0x3A], nn));
                }
            }
        }
    }
    if src == "A" {
        match dst {
            "(BC)" => return Some(vec![0x02]),
            "(DE)" => return Some(vec![0x12]),
            "I" => return Some(vec![0xED, 0x47]),
            "R" => return Some(vec![0xED, 0x4F]),
            _ => {
                if let Some(nn) = mem(dst) {
                    return Some(with_addr(vec![0x32], nn));
                }
            }
        }
    }
    if let (Some(y), Some(n)) = (reg8(dst), number(src)) {
        return Some(vec![0x06 + 8 * y, byte(n)?]);
    }
    if let Some(nn) = mem(dst) {
        let opcodes: Vec<u8> = match src {
            "HL" => vec![0x22],
            "BC" => vec![0xED, 0x43],
            "DE" => vec![0xED, 0x53],
            "SP" => vec![0xED, 0x73],
            "IX" => vec![0xDD, 0x22],
            "IY" => vec![0xFD, 0x22],
            _ => return None,
        };
        return Some(with_addr(opcodes, nn));
    }
    match (dst, src) {
        ("SP", "HL") => return Some(vec![0xF9]),
        ("SP", "IX") => return Some(vec![0xDD, 0xF9]),
        ("SP", "IY") => return Some(vec![0xFD, 0xF9]),
        _ => {}
    }
    if let Some(nn) = mem(src) {
        let opcodes: Vec<u8> = match dst {
            "HL" => vec![0x2A],
            "BC" => vec![0xED, 0x4B],
            "DE" => vec![0xED, 0x5B],
            "SP" => vec![0xED, 0x7B],
            "IX" => vec![0xDD, 0x2A],
            "IY" => vec![0xFD, 0x2A],
            _ => return None,
        };
        return Some(with_addr(opcodes, nn));
    }
    if let Some(nn) = number(src).filter(|n| *n < 65536) {
        if let Some(p) = reg16(dst) {
            return Some(with_addr(vec![0x01 + 16 * p], nn));
        }
        match dst {
            "IX" => return Some(with_addr(vec![0xDD, 0x21], nn)),
            "IY" => return Some(with_addr(vec![0xFD, 0x21], nn)),
            _ => {}
        }
    }
    None
}

/// `ADD HL,rp` and the index-register forms `ADD IX,rp` / `ADD IY,rp`.
fn add_16(dst: &str, src: &str) -> Option<Vec<u8>> {
    if dst == "HL" {
        return Some(vec![0x09 + 16 * reg16(src)?]);
    }
    let prefix = match dst {
        "IX" => 0xDD,
        "IY" => 0xFD,
        _ => return None,
    };
    // In the index forms the HL slot is the index register itself
    let p = if src == dst { 2 } else { reg16(src).filter(|p| *p != 2)? };
    Some(vec![prefix, 0x09 + 16 * p])
}

/// Encode the register/immediate/indexed operand of an ALU operation.
fn alu_operand(code: u8, src: &str) -> Option<Vec<u8>> {
    if let Some(r) = reg8(src) {
        return Some(vec![0x80 + 8 * code + r]);
    }
    if let Some((prefix, d)) = index(src) {
        return Some(vec![prefix, 0x86 + 8 * code, d as u8]);
    }
    Some(vec![0xC6 + 8 * code, byte(number(src)?)?])
}

/// `PUSH`/`POP` on a stack pair or index register; `opcode` is the BC
/// form.
fn stack_op(opcode: u8, rp: &str) -> Option<Vec<u8>> {
    if let Some(p) = reg16_stack(rp) {
        return Some(vec![opcode + 16 * p]);
    }
    match rp {
        "IX" => Some(vec![0xDD, opcode + 0x20]),
        "IY" => Some(vec![0xFD, opcode + 0x20]),
        _ => None,
    }
}

/// `INC`/`DEC` across single registers, pairs, index registers and
/// displaced operands.
fn inc_dec(
    r8_opcode: u8,
    rp_opcode: u8,
    displaced_opcode: u8,
    index_opcode: u8,
    op: &str,
) -> Option<Vec<u8>> {
    if let Some(y) = reg8(op) {
        return Some(vec![r8_opcode + 8 * y]);
    }
    if let Some(p) = reg16(op) {
        return Some(vec![rp_opcode + 16 * p]);
    }
    match op {
        "IX" => return Some(vec![0xDD, index_opcode]),
        "IY" => return Some(vec![0xFD, index_opcode]),
        _ => {}
    }
    let (prefix, d) = index(op)?;
    Some(vec![prefix, displaced_opcode, d as u8])
}

/// `BIT`/`RES`/`SET` on a register or displaced operand; `base` selects
/// the group.
fn bit_op(base: u8, bit: &str, op: &str) -> Option<Vec<u8>> {
    let b = number(bit).filter(|b| *b < 8)? as u8;
    if let Some(r) = reg8(op) {
        return Some(vec![0xCB, base + 8 * b + r]);
    }
    let (prefix, d) = index(op)?;
    Some(vec![prefix, 0xCB, d as u8, base + 8 * b + 6])
}

/// An opcode followed by a little-endian word operand.
fn with_word(opcode: u8, operand: &str) -> Option<Vec<u8>> {
    let nn = number(operand).filter(|n| *n < 65536)?;
    Some(with_addr(vec![opcode], nn))
}

/// Append a little-endian word to an opcode sequence.
fn with_addr(mut bytes: Vec<u8>, nn: u32) -> Vec<u8> {
    bytes.push((nn & 0xFF) as u8);
    bytes.push((nn >> 8) as u8);
    bytes
}

/// A relative jump to an absolute target address: the displacement is
/// taken from the end of the two-byte instruction and must fit a signed
/// byte.
fn relative(opcode: u8, target: &str, address: Addr) -> Option<Vec<u8>> {
    let target = number(target).filter(|n| *n < 65536)?;
    let displacement =
        i64::from(target) - (i64::from(address) + 2);
    let displacement = i8::try_from(displacement).ok()?;
    Some(vec![opcode, displacement as u8])
}

/// Single-register operand code, with `(HL)` as code 6.
fn reg8(op: &str) -> Option<u8> {
    REG8.iter().position(|r| *r == op).map(|p| p as u8)
}

/// Register-pair operand code for loads and 16-bit arithmetic.
fn reg16(op: &str) -> Option<u8> {
    REG16.iter().position(|r| *r == op).map(|p| p as u8)
}

/// Register-pair operand code for PUSH/POP.
fn reg16_stack(op: &str) -> Option<u8> {
    REG16_STACK.iter().position(|r| *r == op).map(|p| p as u8)
}

/// Condition-code operand.
fn condition(op: &str) -> Option<u8> {
    CONDITIONS.iter().position(|c| *c == op).map(|p| p as u8)
}

/// A displaced index operand `(IX+d)`, `(IY-d)`, or `(IX)`.
fn index(op: &str) -> Option<(u8, i8)> {
    let inner = op.strip_prefix('(')?.strip_suffix(')')?;
    let (reg, displacement) = if let Some(d) = inner.strip_prefix("IX") {
        (0xDD, d)
    } else if let Some(d) = inner.strip_prefix("IY") {
        (0xFD, d)
    } else {
        return None;
    };
    if displacement.is_empty() {
        return Some((reg, 0));
    }
    let magnitude = number(displacement.get(1..)?)?;
    match displacement.as_bytes()[0] {
        b'+' if magnitude <= 127 => Some((reg, magnitude as i8)),
        b'-' if magnitude <= 128 => Some((reg, (-(magnitude as i16)) as i8)),
        _ => None,
    }
}

/// A parenthesised absolute address operand `(nn)`.
fn mem(op: &str) -> Option<u32> {
    let inner = op.strip_prefix('(')?.strip_suffix(')')?;
    number(inner).filter(|n| *n < 65536)
}

/// An integer literal: decimal, `$`/`0x` hex, or `%` binary.
fn number(op: &str) -> Option<u32> {
    if let Some(bits) = op.strip_prefix('%') {
        u32::from_str_radix(bits, 2).ok()
    } else {
        skool::parse_int(op)
    }
}

/// Range-check a byte operand.
fn byte(value: u32) -> Option<u8> {
    u8::try_from(value).ok()
}

/// Assemble a DEFB/DEFM operand list: numbers and double-quoted strings.
fn data_bytes(rest: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for part in split_unquoted(rest) {
        let part = part.trim();
        if let Some(inner) =
            part.strip_prefix('"').and_then(|p| p.strip_suffix('"'))
        {
            let mut escaped = false;
            for c in inner.chars() {
                if escaped || c != '\\' {
                    bytes.push(c as u8);
                    escaped = false;
                } else {
                    escaped = true;
                }
            }
        } else {
            bytes.push(byte(number(part)?)?);
        }
    }
    (!bytes.is_empty()).then_some(bytes)
}

/// Assemble a DEFW operand list into little-endian words.
fn data_words(rest: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for part in split_unquoted(rest) {
        let word = number(part.trim()).filter(|w| *w < 65536)?;
        bytes.push((word & 0xFF) as u8);
        bytes.push((word >> 8) as u8);
    }
    (!bytes.is_empty()).then_some(bytes)
}

/// Assemble `DEFS count[,fill]`.
fn data_space(rest: &str) -> Option<Vec<u8>> {
    let parts = split_unquoted(rest);
    let count = number(parts.first()?.trim()).filter(|n| *n <= 65536)?;
    let fill = match parts.get(1) {
        Some(part) => byte(number(part.trim())?)?,
        None => 0,
    };
    Some(vec![fill; count as usize])
}

/// Split an operand list on commas outside double quotes.
fn split_unquoted(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let (head, tail) = partition_unquoted(rest, ',');
        parts.push(head);
        match tail {
            Some(tail) => rest = tail,
            None => break,
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    /// Assemble or fail the test with a readable message.
    fn assemble(operation: &str, address: Addr) -> Vec<u8> {
        match assemble_operation(operation, address) {
            Some(bytes) => bytes,
            None => panic!("failed to assemble: {operation}"),
        }
    }

    #[test]
    fn loads() {
        assert_eq!(assemble("LD A,0", 0), vec![0x3E, 0x00]);
        assert_eq!(assemble("LD B,C", 0), vec![0x41]);
        assert_eq!(assemble("LD (HL),255", 0), vec![0x36, 0xFF]);
        assert_eq!(assemble("LD HL,$8000", 0), vec![0x21, 0x00, 0x80]);
        assert_eq!(assemble("LD (16384),A", 0), vec![0x32, 0x00, 0x40]);
        assert_eq!(assemble("LD A,(16384)", 0), vec![0x3A, 0x00, 0x40]);
        assert_eq!(
            assemble("LD (32768),BC", 0),
            vec![0xED, 0x43, 0x00, 0x80]
        );
        assert_eq!(assemble("LD SP,HL", 0), vec![0xF9]);
        assert_eq!(assemble("LD I,A", 0), vec![0xED, 0x47]);
        assert_eq!(assemble("LD A,(IX+5)", 0), vec![0xDD, 0x7E, 0x05]);
        assert_eq!(
            assemble("LD (IY-2),7", 0),
            vec![0xFD, 0x36, 0xFE, 0x07]
        );
    }

    #[test]
    fn arithmetic() {
        assert_eq!(assemble("XOR A", 0), vec![0xAF]);
        assert_eq!(assemble("ADD A,B", 0), vec![0x80]);
        assert_eq!(assemble("ADD A,100", 0), vec![0xC6, 100]);
        assert_eq!(assemble("ADD HL,DE", 0), vec![0x19]);
        assert_eq!(assemble("ADD IX,IX", 0), vec![0xDD, 0x29]);
        assert_eq!(assemble("SBC HL,BC", 0), vec![0xED, 0x42]);
        assert_eq!(assemble("CP 32", 0), vec![0xFE, 32]);
        assert_eq!(assemble("AND (IX+1)", 0), vec![0xDD, 0xA6, 0x01]);
        assert_eq!(assemble("INC HL", 0), vec![0x23]);
        assert_eq!(assemble("DEC (HL)", 0), vec![0x35]);
    }

    #[test]
    fn jumps_and_calls() {
        assert_eq!(assemble("JP 32768", 0), vec![0xC3, 0x00, 0x80]);
        assert_eq!(assemble("JP NZ,$8000", 0), vec![0xC2, 0x00, 0x80]);
        assert_eq!(assemble("JP (HL)", 0), vec![0xE9]);
        assert_eq!(assemble("CALL 1234", 0), vec![0xCD, 0xD2, 0x04]);
        assert_eq!(assemble("RET Z", 0), vec![0xC8]);
        assert_eq!(assemble("RST 56", 0), vec![0xFF]);
        assert_eq!(assemble("RST $28", 0), vec![0xEF]);
    }

    #[test]
    fn relative_jumps_take_absolute_targets() {
        // A jump to its own address is the classic self-loop: d = -2
        assert_eq!(assemble("JR 40000", 40000), vec![0x18, 0xFE]);
        assert_eq!(assemble("JR Z,40004", 40000), vec![0x28, 0x02]);
        assert_eq!(assemble("DJNZ 39998", 40000), vec![0x10, 0xFC]);
        assert!(
            assemble_operation("JR 50000", 40000).is_none(),
            "an out-of-range relative target must not assemble"
        );
        assert!(
            assemble_operation("JR PO,40004", 40000).is_none(),
            "JR supports only the first four conditions"
        );
    }

    #[test]
    fn bit_and_rotate_groups() {
        assert_eq!(assemble("BIT 7,(HL)", 0), vec![0xCB, 0x7E]);
        assert_eq!(assemble("SET 0,A", 0), vec![0xCB, 0xC7]);
        assert_eq!(
            assemble("RES 1,(IX+3)", 0),
            vec![0xDD, 0xCB, 0x03, 0x8E]
        );
        assert_eq!(assemble("RLC B", 0), vec![0xCB, 0x00]);
        assert_eq!(assemble("SRL A", 0), vec![0xCB, 0x3F]);
    }

    #[test]
    fn stack_exchange_and_io() {
        assert_eq!(assemble("PUSH AF", 0), vec![0xF5]);
        assert_eq!(assemble("POP IX", 0), vec![0xDD, 0xE1]);
        assert_eq!(assemble("EX (SP),HL", 0), vec![0xE3]);
        assert_eq!(assemble("EX AF,AF'", 0), vec![0x08]);
        assert_eq!(assemble("IN A,(254)", 0), vec![0xDB, 254]);
        assert_eq!(assemble("OUT (C),B", 0), vec![0xED, 0x41]);
        assert_eq!(assemble("IM 1", 0), vec![0xED, 0x56]);
    }

    #[test]
    fn data_definitions() {
        assert_eq!(assemble("DEFB 1,2,$FF", 0), vec![1, 2, 0xFF]);
        assert_eq!(assemble("DEFM \"AB\",13", 0), vec![65, 66, 13]);
        assert_eq!(
            assemble("DEFM \"a;b\"", 0),
            vec![97, 59, 98],
            "semicolons inside strings are data, not comments"
        );
        assert_eq!(assemble("DEFW $8000,1", 0), vec![0x00, 0x80, 1, 0]);
        assert_eq!(assemble("DEFS 3,7", 0), vec![7, 7, 7]);
        assert_eq!(assemble("DEFS 2", 0), vec![0, 0]);
    }

    #[test]
    fn binary_literals() {
        assert_eq!(assemble("LD A,%10000001", 0), vec![0x3E, 0x81]);
    }

    #[test]
    fn lower_case_mnemonics_assemble_too() {
        assert_eq!(assemble("ld a,0", 0), vec![0x3E, 0x00]);
        assert_eq!(assemble("xor a", 0), vec![0xAF]);
    }

    #[test]
    fn unknown_operations_do_not_assemble() {
        assert!(assemble_operation("XOR Q", 0).is_none());
        assert!(assemble_operation("MOV A,B", 0).is_none());
        assert!(assemble_operation("LD (HL),(HL)", 0).is_none());
        assert!(assemble_operation("", 0).is_none());
    }

    #[test]
    fn every_unprefixed_opcode_round_trips() {
        use skool::{Base, Snapshot};

        use crate::components::Disassembler;
        use crate::z80::ZxDisassembler;

        // Assemble what the decoder prints and expect the original bytes
        // back.  Skip the prefix bytes: they are not instructions.
        for opcode in 0..=255_u8 {
            if [0xCB, 0xDD, 0xED, 0xFD].contains(&opcode) {
                continue;
            }
            let snapshot =
                Snapshot::from_data(&[opcode, 0x12, 0x40], 30000);
            let decoded = &ZxDisassembler
                .disassemble(&snapshot, 30000, 30001, Base::Decimal)[0];
            let assembled = assemble(&decoded.operation, 30000);
            assert_eq!(
                assembled, decoded.bytes,
                "opcode {opcode:#04X} decoded to {:?} which assembled \
                 differently",
                decoded.operation
            );
        }
    }
}
