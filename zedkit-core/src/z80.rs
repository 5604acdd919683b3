//! The Z80 instruction oracle.
//!
//! Two halves share one vocabulary: [`Z80Assembler`] sizes and encodes
//! mnemonics for the bin writer, and [`ZxDisassembler`] decodes snapshot
//! bytes and synthesises data statements for the disassembly model.  Both
//! are resolved through the component registry.

use std::sync::OnceLock;

use regex::Regex;
use skool::Addr;

/// Mnemonic assembly for the bin writer
mod asm;
pub use asm::Z80Assembler;

/// Byte decoding and data-statement synthesis for the disassembly model
mod dis;
pub use dis::ZxDisassembler;

/// The eight single registers in encoding order; index 6 is the `(HL)`
/// memory operand.
const REG8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];

/// Register pairs in encoding order for loads and 16-bit arithmetic.
const REG16: [&str; 4] = ["BC", "DE", "HL", "SP"];

/// Register pairs in encoding order for PUSH and POP.
const REG16_STACK: [&str; 4] = ["BC", "DE", "HL", "AF"];

/// Condition codes in encoding order.
const CONDITIONS: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];

/// The arithmetic/logic group in encoding order.  `SUB` takes no `A,`
/// prefix in canonical form.
const ALU: [&str; 8] =
    ["ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP "];

/// The rotate/shift group in encoding order.
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

/// Block instructions in ED-page encoding order (`y` 4..=7, `z` 0..=3).
const BLOCK_OPS: [[&str; 4]; 4] = [
    ["LDI", "CPI", "INI", "OUTI"],
    ["LDD", "CPD", "IND", "OUTD"],
    ["LDIR", "CPIR", "INIR", "OTIR"],
    ["LDDR", "CPDR", "INDR", "OTDR"],
];

/// Extract the target address from an operation's operand text: the last
/// decimal or `$`-prefixed hex literal in the operation, e.g. `32768` from
/// `JP 32768` or `LD HL,(32768)`.  Returns `None` for operations without
/// a numeric operand or with one beyond 65535.
#[must_use]
pub fn operand_address(operation: &str) -> Option<Addr> {
    /// Matches a decimal or hex integer literal.
    static ADDR_RE: OnceLock<Regex> = OnceLock::new();
    let re = ADDR_RE.get_or_init(|| {
        #[allow(
            clippy::unwrap_used,
            reason = "the pattern is a literal and compiles"
        )]
        let re = Regex::new(r"(\$[0-9A-Fa-f]+|\d+)").unwrap();
        re
    });
    let last = re.find_iter(operation).last()?;
    skool::parse_int(last.as_str()).filter(|a| *a < 65536)
}
