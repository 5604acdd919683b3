use core::fmt;

use serde::{Deserialize, Serialize};

/// Addresses are 16-bit values stored widened to `u32` so that the
/// one-past-end sentinel [`ADDR_LIMIT`] is representable.
pub type Addr = u32;

/// The number of addressable bytes in a snapshot.
pub const MEMORY_SIZE: usize = 65536;

/// One past the last valid address.  Used as the terminal key of a ctl
/// map and as the open upper bound of address ranges.
pub const ADDR_LIMIT: Addr = 65536;

/// The kind assigned to a block of the address space.
///
/// The first eight variants are the persistent kinds that appear in ctl
/// and skool files.  `ByteRange`, `TextRange` and `CodeRange` mark
/// sub-block ranges inside an entry.  `Unknown` and `Deferred` only occur
/// while the block classifier is running and never reach an output file.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    FromPrimitive,
    ToPrimitive,
    Serialize,
    Deserialize,
)]
pub enum BlockKind {
    /// `b`: data declared byte by byte
    Data,

    /// `c`: executable machine code
    Code,

    /// `g`: game state variables
    Game,

    /// `i`: addresses excluded from the disassembly
    Ignore,

    /// `s`: a repeated-byte (usually zero-filled) region
    Zero,

    /// `t`: character data
    Text,

    /// `u`: bytes that are never read or executed
    Unused,

    /// `w`: data declared as little-endian words
    Word,

    /// `B`: a byte-data range inside a code entry
    ByteRange,

    /// `T`: a text range inside a code entry
    TextRange,

    /// `C`: a forced code range inside an entry
    CodeRange,

    /// `U`: not yet classified (classifier working state)
    Unknown,

    /// `X`: examined and deferred (classifier working state)
    Deferred,
}

impl BlockKind {
    /// The single-character form used in ctl and skool files.
    #[must_use]
    pub const fn to_char(self) -> char {
        match self {
            Self::Data => 'b',
            Self::Code => 'c',
            Self::Game => 'g',
            Self::Ignore => 'i',
            Self::Zero => 's',
            Self::Text => 't',
            Self::Unused => 'u',
            Self::Word => 'w',
            Self::ByteRange => 'B',
            Self::TextRange => 'T',
            Self::CodeRange => 'C',
            Self::Unknown => 'U',
            Self::Deferred => 'X',
        }
    }

    /// Parse the single-character form.  Returns `None` for characters
    /// that do not name a block kind.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'b' => Some(Self::Data),
            'c' => Some(Self::Code),
            'g' => Some(Self::Game),
            'i' => Some(Self::Ignore),
            's' => Some(Self::Zero),
            't' => Some(Self::Text),
            'u' => Some(Self::Unused),
            'w' => Some(Self::Word),
            'B' => Some(Self::ByteRange),
            'T' => Some(Self::TextRange),
            'C' => Some(Self::CodeRange),
            'U' => Some(Self::Unknown),
            'X' => Some(Self::Deferred),
            _ => None,
        }
    }

    /// True for the eight kinds that may begin a top-level entry in a ctl
    /// or skool file.
    #[must_use]
    pub const fn is_entry_kind(self) -> bool {
        matches!(
            self,
            Self::Data
                | Self::Code
                | Self::Game
                | Self::Ignore
                | Self::Zero
                | Self::Text
                | Self::Unused
                | Self::Word
        )
    }

    /// True for kinds rendered as synthesised data statements
    /// (DEFB/DEFM/DEFS/DEFW) rather than decoded instructions.
    #[must_use]
    pub const fn is_data_kind(self) -> bool {
        matches!(
            self,
            Self::Data
                | Self::Game
                | Self::Zero
                | Self::Text
                | Self::Unused
                | Self::Word
        )
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// The kind of a substitution or fix directive.
///
/// The discriminant of each variant is its weight: when several enabled
/// substitutions compete for one instruction, the highest weight wins.
/// A weight of zero (no variant) stands for "no substitution".
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    FromPrimitive,
    ToPrimitive,
    Serialize,
    Deserialize,
)]
pub enum SubKind {
    /// `@isub`: instruction-level substitution, enabled at `asm_mode >= 1`
    Isub = 1,

    /// `@ssub`: skool-level substitution, enabled at `asm_mode >= 2`
    Ssub = 2,

    /// `@rsub`: reassembly substitution, enabled at `asm_mode >= 3`
    Rsub = 3,

    /// `@ofix`: operand fix, enabled at `fix_mode >= 1`
    Ofix = 4,

    /// `@bfix`: byte fix, enabled at `fix_mode >= 2`
    Bfix = 5,

    /// `@rfix`: reassembly fix, enabled at `fix_mode >= 3`
    Rfix = 6,
}

impl SubKind {
    /// Every substitution kind, in weight order.
    pub const ALL: [Self; 6] = [
        Self::Isub,
        Self::Ssub,
        Self::Rsub,
        Self::Ofix,
        Self::Bfix,
        Self::Rfix,
    ];

    /// The directive keyword as written in skool files.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Isub => "isub",
            Self::Ssub => "ssub",
            Self::Rsub => "rsub",
            Self::Ofix => "ofix",
            Self::Bfix => "bfix",
            Self::Rfix => "rfix",
        }
    }

    /// Parse a directive keyword.
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.keyword() == word)
    }

    /// True for the fix family (`ofix`, `bfix`, `rfix`).
    #[must_use]
    pub const fn is_fix(self) -> bool {
        matches!(self, Self::Ofix | Self::Bfix | Self::Rfix)
    }

    /// The weight this kind carries under the given modes, or 0 when the
    /// kind is disabled.  Weights order competing substitutions; only the
    /// highest populated weight is applied.
    #[must_use]
    pub const fn weight(self, asm_mode: u8, fix_mode: u8) -> u8 {
        let (mode, rank) = if self.is_fix() {
            (fix_mode, self as u8 - 3)
        } else {
            (asm_mode, self as u8)
        };
        if mode >= rank {
            self as u8
        } else {
            0
        }
    }
}

impl fmt::Display for SubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// The numeric base used when rendering addresses and data values.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    FromPrimitive,
    ToPrimitive,
    Serialize,
    Deserialize,
)]
pub enum Base {
    /// Zero-padded five-digit decimal, e.g. `32768`
    #[default]
    Decimal,

    /// `$`-prefixed four-digit lower-case hex, e.g. `$8000`
    HexLower,

    /// `$`-prefixed four-digit upper-case hex, e.g. `$8000`
    Hex,
}

impl Base {
    /// Format an address in this base, zero-padded to its fixed width.
    #[must_use]
    pub fn addr_str(self, address: Addr) -> String {
        match self {
            Self::Decimal => format!("{address:05}"),
            Self::HexLower => format!("${address:04x}"),
            Self::Hex => format!("${address:04X}"),
        }
    }

    /// Format an address without zero padding, for prose such as titles
    /// and referrer comments.
    #[must_use]
    pub fn addr_str_short(self, address: Addr) -> String {
        match self {
            Self::Decimal => format!("{address}"),
            Self::HexLower => format!("${address:04x}"),
            Self::Hex => format!("${address:04X}"),
        }
    }

    /// Format a data value (a byte or word operand) in this base.
    #[must_use]
    pub fn value_str(self, value: u32) -> String {
        match self {
            Self::Decimal => format!("{value}"),
            Self::HexLower if value < 256 => format!("${value:02x}"),
            Self::HexLower => format!("${value:04x}"),
            Self::Hex if value < 256 => format!("${value:02X}"),
            Self::Hex => format!("${value:04X}"),
        }
    }
}

/// Parse an address or integer literal: decimal, `$`-prefixed hex, or
/// `0x`-prefixed hex.  Returns `None` for anything else.
#[must_use]
pub fn parse_int(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Parse an address literal and range-check it against [`ADDR_LIMIT`].
#[must_use]
pub fn parse_addr(text: &str) -> Option<Addr> {
    parse_int(text).filter(|a| *a <= ADDR_LIMIT)
}

/// Utilities for enumerating block and substitution kinds in tests
pub mod test_utils {
    use super::{BlockKind, SubKind};

    /// Every block kind, persistent and working, in declaration order
    pub const BLOCK_KINDS: [BlockKind; 13] = [
        BlockKind::Data,
        BlockKind::Code,
        BlockKind::Game,
        BlockKind::Ignore,
        BlockKind::Zero,
        BlockKind::Text,
        BlockKind::Unused,
        BlockKind::Word,
        BlockKind::ByteRange,
        BlockKind::TextRange,
        BlockKind::CodeRange,
        BlockKind::Unknown,
        BlockKind::Deferred,
    ];

    /// Every substitution kind in weight order
    pub const SUB_KINDS: [SubKind; 6] = SubKind::ALL;
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;
    use itertools::Itertools;
    use num_traits::ToPrimitive;

    use super::*;

    #[test]
    fn block_kind_chars_round_trip() {
        for kind in test_utils::BLOCK_KINDS {
            assert_eq!(
                BlockKind::from_char(kind.to_char()),
                Some(kind),
                "char form of {kind:?} should parse back to itself"
            );
        }
    }

    #[test]
    fn block_kind_chars_are_unique() {
        let chars: Vec<char> =
            test_utils::BLOCK_KINDS.iter().map(|k| k.to_char()).collect();
        assert_eq!(
            chars.iter().unique().count(),
            chars.len(),
            "every block kind must have a distinct character"
        );
    }

    #[test]
    fn entry_kinds_are_the_lower_case_eight() {
        let entry_chars: String = test_utils::BLOCK_KINDS
            .iter()
            .filter(|k| k.is_entry_kind())
            .map(|k| k.to_char())
            .collect();
        assert_eq!(entry_chars, "bcgistuw");
    }

    #[test]
    fn sub_kind_weights_match_discriminants() {
        for kind in SubKind::ALL {
            assert_eq!(
                kind.weight(3, 3),
                kind.to_u8().unwrap(),
                "{kind} fully enabled should weigh its discriminant"
            );
        }
    }

    #[test]
    fn sub_kind_weights_vanish_when_disabled() {
        for kind in SubKind::ALL {
            assert_eq!(kind.weight(0, 0), 0, "{kind} disabled at mode 0");
        }
        // asm_mode 1 enables isub only; fix_mode 1 enables ofix only
        assert_eq!(SubKind::Isub.weight(1, 0), 1);
        assert_eq!(SubKind::Ssub.weight(1, 0), 0);
        assert_eq!(SubKind::Ofix.weight(0, 1), 4);
        assert_eq!(SubKind::Bfix.weight(0, 1), 0);
    }

    #[test]
    fn address_formats() {
        assert_eq!(Base::Decimal.addr_str(708), "00708");
        assert_eq!(Base::Hex.addr_str(0x8000), "$8000");
        assert_eq!(Base::HexLower.addr_str(0x79AB), "$79ab");
        assert_eq!(Base::Decimal.addr_str_short(708), "708");
    }

    #[test]
    fn integer_literals() {
        assert_eq!(parse_int("32768"), Some(32768));
        assert_eq!(parse_int("$8000"), Some(0x8000));
        assert_eq!(parse_int("0x8000"), Some(0x8000));
        assert_eq!(parse_int(" 49152 "), Some(49152));
        assert_eq!(parse_int("8000h"), None, "suffix hex is not accepted");
        assert_eq!(parse_addr("65536"), Some(65536), "sentinel is allowed");
        assert_eq!(parse_addr("65537"), None, "beyond the sentinel is not");
    }
}
