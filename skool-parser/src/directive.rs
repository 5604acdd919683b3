use skool::{parse_addr, parse_int, Addr, SkoolError, SkoolResult, SubKind};

use crate::primitives::partition_unquoted;

/// A parsed `@`-prefixed directive line (without the leading `@`).
///
/// Directive lines never produce bytes directly; they mutate pending state
/// that the next instruction line consumes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Directive {
    /// `@org[=ADDR]`: reset the emission address, or clear it so the next
    /// instruction line re-establishes it
    Org(Option<Addr>),

    /// `@keep[=A,B,...]`: do not substitute operand addresses of the next
    /// instruction (an empty list keeps every operand)
    Keep(Vec<Addr>),

    /// `@nowarn`: suppress warnings for the next instruction
    Nowarn,

    /// `@isub=`/`@ssub=`/`@rsub=`/`@ofix=`/`@bfix=`/`@rfix=`: a
    /// substitution at the kind's weight; the raw value may carry flag
    /// characters or a `!`-prefixed removal range
    Sub {
        /// Which substitution family and weight the directive carries
        kind: SubKind,
        /// The raw directive value, flags and all
        value: String,
    },

    /// `@if(COND)(DIRECTIVE)`: apply the embedded directive only when the
    /// condition holds for the current asm/fix modes
    If {
        /// The condition text between the first pair of parentheses
        condition: String,
        /// The embedded directive text
        inner: String,
    },

    /// `@defb=`/`@defs=`/`@defw=`: raw data attached to the next
    /// instruction (honoured only in data-processing mode)
    Data(DataDirective),

    /// `@remote=NAME:A,B,...`: an out-of-body entry referenced by address
    Remote {
        /// The name of the remote disassembly (unused by the bin writer)
        name: String,
        /// The addresses the remote entry exposes
        addresses: Vec<Addr>,
    },

    /// Any directive this tool does not act on (`@label=...`, `@start`,
    /// HTML-side directives, ...), carried verbatim and never an error
    Other(String),
}

/// Parse one directive line (the text after the leading `@`).
///
/// # Errors
///
/// Returns a parse error only for a malformed `@org=` operand; anything
/// else unrecognised degrades to [`Directive::Other`].
pub fn parse_directive(text: &str) -> SkoolResult<Directive> {
    let text = text.trim_end();
    if text.len() >= 5 && text.as_bytes()[4] == b'=' {
        if let Some(kind) = text.get(..4).and_then(SubKind::from_keyword) {
            return Ok(Directive::Sub {
                kind,
                value: text[5..].to_owned(),
            });
        }
    }
    if let Some(rest) = text.strip_prefix("if(") {
        return Ok(parse_if(rest)
            .unwrap_or_else(|| Directive::Other(text.to_owned())));
    }
    if let Some(rest) = text.strip_prefix("org") {
        let org = rest.trim();
        if org.is_empty() {
            return Ok(Directive::Org(None));
        }
        if let Some(value) = org.strip_prefix('=') {
            return parse_addr(value)
                .map(|a| Directive::Org(Some(a)))
                .ok_or_else(|| {
                    SkoolError::Parse(format!("Invalid org address: {value}"))
                });
        }
    }
    if let Some(rest) = text.strip_prefix("keep") {
        let addresses = rest
            .strip_prefix('=')
            .map(|list| {
                list.split(',').filter_map(skool::parse_addr).collect()
            })
            .unwrap_or_default();
        return Ok(Directive::Keep(addresses));
    }
    if text == "nowarn" {
        return Ok(Directive::Nowarn);
    }
    if let Some(data) = DataDirective::parse(text) {
        return Ok(Directive::Data(data));
    }
    if let Some(rest) = text.strip_prefix("remote=") {
        let (name, addr_list) = match rest.split_once(':') {
            Some((name, addrs)) => (name, addrs),
            None => ("", rest),
        };
        let addresses: Vec<Addr> = addr_list
            .split(',')
            .map_while(skool::parse_addr)
            .collect();
        if !addresses.is_empty() {
            return Ok(Directive::Remote {
                name: name.to_owned(),
                addresses,
            });
        }
    }
    Ok(Directive::Other(text.to_owned()))
}

/// Parse the body of an `@if` directive (the text after `if(`).  Returns
/// `None` when the condition or the embedded directive is malformed; the
/// caller treats that as a silent no-op.
fn parse_if(rest: &str) -> Option<Directive> {
    let close = matching_paren(rest)?;
    let condition = &rest[..close];
    let tail = &rest[close + 1..];
    let inner = tail.strip_prefix('(')?;
    let inner_close = matching_paren(inner)?;
    if !inner[inner_close + 1..].trim().is_empty() {
        return None;
    }
    Some(Directive::If {
        condition: condition.to_owned(),
        inner: inner[..inner_close].to_owned(),
    })
}

/// The index of the `)` that balances an already-open parenthesis at the
/// start of `text`, or `None` if the text ends first.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 1_u32;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A substitution variant decoded from a raw sub/fix directive value.
///
/// Leading flag characters select placement: `>` emits the replacement
/// before the original instruction, `+` chains it after the previous
/// variant, and `|` overwrites: the addresses the replacement covers are
/// marked consumed so the original instructions there are suppressed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubVariant {
    /// Emit before the original instruction
    pub prepend: bool,

    /// Mark the replaced region as consumed
    pub overwrite: bool,

    /// Chain after the previous variant instead of replacing the original
    pub append: bool,

    /// The replacement operation text (may be empty, meaning "keep the
    /// original operation")
    pub text: String,
}

impl SubVariant {
    /// Decode a raw directive value into flags and replacement text.  Any
    /// trailing `; comment` is discarded.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut variant = Self::default();
        let mut rest = value;
        loop {
            match rest.as_bytes().first() {
                Some(b'>') if !variant.prepend => variant.prepend = true,
                Some(b'|') if !variant.overwrite => variant.overwrite = true,
                Some(b'+') if !variant.append => variant.append = true,
                _ => break,
            }
            rest = &rest[1..];
        }
        variant.text =
            partition_unquoted(rest, ';').0.trim().to_owned();
        variant
    }
}

/// The family of a data directive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataKind {
    /// `@defb=`: byte values and strings
    Defb,

    /// `@defs=`: a repeated byte
    Defs,

    /// `@defw=`: little-endian words
    Defw,
}

/// A raw data directive: `defb=[ADDR:]v1,v2,...`, `defs=[ADDR:]N[,v]`, or
/// `defw=[ADDR:]w1,w2,...`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataDirective {
    /// Which of defb/defs/defw this is
    pub kind: DataKind,

    /// The explicit target address, when the value carries an `ADDR:` prefix
    pub address: Option<Addr>,

    /// The unevaluated value list
    pub values: String,
}

impl DataDirective {
    /// Recognise a `defb=`/`defs=`/`defw=` directive.  Returns `None` for
    /// any other directive text.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let kind = match text.get(..5) {
            Some("defb=") => DataKind::Defb,
            Some("defs=") => DataKind::Defs,
            Some("defw=") => DataKind::Defw,
            _ => return None,
        };
        let value = &text[5..];
        let (address, values) = match partition_unquoted(value, ':') {
            (addr, Some(rest)) => match parse_addr(addr) {
                Some(a) => (Some(a), rest),
                None => (None, value),
            },
            (_, None) => (None, value),
        };
        Some(Self {
            kind,
            address,
            values: values.to_owned(),
        })
    }

    /// Evaluate the value list into bytes, anchored at `default_address`
    /// when no explicit address was given.
    ///
    /// # Errors
    ///
    /// Returns a parse error for out-of-range values, malformed numbers,
    /// or an unterminated string.
    pub fn eval(&self, default_address: Addr) -> SkoolResult<(Addr, Vec<u8>)> {
        let address = self.address.unwrap_or(default_address);
        let mut bytes = Vec::new();
        let parts = split_unquoted(&self.values, ',');
        match self.kind {
            DataKind::Defb => {
                for part in &parts {
                    push_byte_values(&mut bytes, part)?;
                }
            }
            DataKind::Defw => {
                for part in &parts {
                    let word = parse_int(part)
                        .filter(|w| *w < 65536)
                        .ok_or_else(|| self.bad_value(part))?;
                    bytes.push((word & 0xFF) as u8);
                    bytes.push((word >> 8) as u8);
                }
            }
            DataKind::Defs => {
                let count = parts
                    .first()
                    .and_then(|p| parse_int(p))
                    .filter(|n| *n <= 65536)
                    .ok_or_else(|| self.bad_value(&self.values))?;
                let fill = match parts.get(1) {
                    Some(part) => parse_int(part)
                        .filter(|v| *v < 256)
                        .ok_or_else(|| self.bad_value(part))?
                        as u8,
                    None => 0,
                };
                bytes.resize(count as usize, fill);
            }
        }
        Ok((address, bytes))
    }

    /// A parse error naming the offending value.
    fn bad_value(&self, part: &str) -> SkoolError {
        SkoolError::Parse(format!(
            "Invalid data directive value: {}",
            part.trim()
        ))
    }
}

/// Append the bytes of one defb value: a quoted string contributes its
/// characters, anything else must be a byte literal.
fn push_byte_values(bytes: &mut Vec<u8>, part: &str) -> SkoolResult<()> {
    let part = part.trim();
    if let Some(inner) = part
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
    {
        let mut escape = false;
        for c in inner.chars() {
            if escape {
                bytes.push(c as u8);
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else {
                bytes.push(c as u8);
            }
        }
        return Ok(());
    }
    let value = parse_int(part).filter(|v| *v < 256).ok_or_else(|| {
        SkoolError::Parse(format!("Invalid data directive value: {part}"))
    })?;
    bytes.push(value as u8);
    Ok(())
}

/// Split on `sep` outside double quotes.
fn split_unquoted(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let (head, tail) = partition_unquoted(rest, sep);
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

    #[test]
    fn sub_directives_carry_kind_and_value() {
        assert_eq!(
            parse_directive("isub=LD A,0").unwrap(),
            Directive::Sub {
                kind: SubKind::Isub,
                value: "LD A,0".to_owned(),
            }
        );
        assert_eq!(
            parse_directive("bfix=!32770-32770").unwrap(),
            Directive::Sub {
                kind: SubKind::Bfix,
                value: "!32770-32770".to_owned(),
            }
        );
    }

    #[test]
    fn org_directive_forms() {
        assert_eq!(
            parse_directive("org=32768").unwrap(),
            Directive::Org(Some(32768))
        );
        assert_eq!(
            parse_directive("org=$8000").unwrap(),
            Directive::Org(Some(0x8000))
        );
        assert_eq!(parse_directive("org").unwrap(), Directive::Org(None));
        assert!(
            parse_directive("org=skool").is_err(),
            "a non-numeric org operand is a parse error"
        );
    }

    #[test]
    fn keep_directive_forms() {
        assert_eq!(parse_directive("keep").unwrap(), Directive::Keep(vec![]));
        assert_eq!(
            parse_directive("keep=32768,$8002").unwrap(),
            Directive::Keep(vec![32768, 0x8002])
        );
    }

    #[test]
    fn if_directive_nests() {
        assert_eq!(
            parse_directive("if({asm}>1)(ssub=XOR A)").unwrap(),
            Directive::If {
                condition: "{asm}>1".to_owned(),
                inner: "ssub=XOR A".to_owned(),
            }
        );
    }

    #[test]
    fn malformed_if_is_silently_other() {
        // Missing the embedded directive: dropped, never an error
        assert_eq!(
            parse_directive("if({asm}>1)").unwrap(),
            Directive::Other("if({asm}>1)".to_owned())
        );
        assert_eq!(
            parse_directive("if({asm}>1").unwrap(),
            Directive::Other("if({asm}>1".to_owned())
        );
    }

    #[test]
    fn remote_directive() {
        assert_eq!(
            parse_directive("remote=loader:24576,24579").unwrap(),
            Directive::Remote {
                name: "loader".to_owned(),
                addresses: vec![24576, 24579],
            }
        );
    }

    #[test]
    fn unknown_directives_degrade_to_other() {
        assert_eq!(
            parse_directive("label=START").unwrap(),
            Directive::Other("label=START".to_owned())
        );
        assert_eq!(
            parse_directive("start").unwrap(),
            Directive::Other("start".to_owned())
        );
    }

    #[test]
    fn sub_variant_flags() {
        let plain = SubVariant::parse("LD A,0");
        assert!(!plain.prepend && !plain.overwrite && !plain.append);
        assert_eq!(plain.text, "LD A,0");

        let prepended = SubVariant::parse(">XOR A");
        assert!(prepended.prepend);
        assert_eq!(prepended.text, "XOR A");

        let overwriting = SubVariant::parse("|LD A,5 ; patched");
        assert!(overwriting.overwrite);
        assert_eq!(overwriting.text, "LD A,5", "comment is discarded");

        let chained = SubVariant::parse("+INC A");
        assert!(chained.append);
        assert_eq!(chained.text, "INC A");

        let empty = SubVariant::parse("|");
        assert!(empty.overwrite);
        assert_eq!(empty.text, "", "empty text falls back to the original");
    }

    #[test]
    fn defb_values_and_strings() {
        let data = DataDirective::parse("defb=30000:1,$FF,\"AB\"").unwrap();
        assert_eq!(data.address, Some(30000));
        assert_eq!(
            data.eval(0).unwrap(),
            (30000, vec![1, 0xFF, b'A', b'B'])
        );
    }

    #[test]
    fn defb_without_address_uses_the_anchor() {
        let data = DataDirective::parse("defb=7,8").unwrap();
        assert_eq!(data.eval(40000).unwrap(), (40000, vec![7, 8]));
    }

    #[test]
    fn defw_is_little_endian() {
        let data = DataDirective::parse("defw=$8000,513").unwrap();
        assert_eq!(data.eval(0).unwrap(), (0, vec![0x00, 0x80, 0x01, 0x02]));
    }

    #[test]
    fn defs_repeats_a_fill_byte() {
        let data = DataDirective::parse("defs=4,$AA").unwrap();
        assert_eq!(data.eval(0).unwrap(), (0, vec![0xAA; 4]));
        let zeroes = DataDirective::parse("defs=3").unwrap();
        assert_eq!(zeroes.eval(0).unwrap(), (0, vec![0, 0, 0]));
    }

    #[test]
    fn out_of_range_bytes_are_rejected() {
        let data = DataDirective::parse("defb=256").unwrap();
        assert!(data.eval(0).is_err());
    }
}
