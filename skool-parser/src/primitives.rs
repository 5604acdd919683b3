use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::space0,
    combinator::{map, map_opt, opt},
    error::VerboseError,
    sequence::{pair, preceded},
    IResult,
};
use skool::Addr;

/// Parses a decimal integer literal.
fn decimal(input: &str) -> IResult<&str, u32, VerboseError<&str>> {
    map_opt(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
        s.parse().ok()
    })(input)
}

/// Parses a `$`- or `0x`-prefixed hex integer literal.
fn hex(input: &str) -> IResult<&str, u32, VerboseError<&str>> {
    preceded(
        alt((tag("$"), tag("0x"))),
        map_opt(
            take_while1(|c: char| c.is_ascii_hexdigit()),
            |s: &str| u32::from_str_radix(s, 16).ok(),
        ),
    )(input)
}

/// Parses an integer in any accepted base (`$`/`0x` hex, else decimal).
pub fn number(input: &str) -> IResult<&str, u32, VerboseError<&str>> {
    alt((hex, decimal))(input)
}

/// Parses a single address, surrounded by optional spaces.
pub fn address(input: &str) -> IResult<&str, Addr, VerboseError<&str>> {
    preceded(space0, number)(input)
}

/// Parses an address range `A[-B]` into the inclusive list of addresses it
/// covers.  `A` alone yields one address; `A-B` yields every address from
/// `A` to `B`.  A descending range is empty.
pub fn range(input: &str) -> IResult<&str, Vec<Addr>, VerboseError<&str>> {
    map(
        pair(address, opt(preceded(tag("-"), address))),
        |(first, last)| {
            let last = last.unwrap_or(first);
            (first..=last).collect()
        },
    )(input)
}

/// Parse a comma-separated list of address ranges, e.g. `32768-32770,40000`.
/// Returns `None` when the text is not entirely a range list.
#[must_use]
pub fn address_range(text: &str) -> Option<Vec<Addr>> {
    let mut addresses = Vec::new();
    for part in text.trim().split(',') {
        match range(part) {
            Ok(("", mut addrs)) => addresses.append(&mut addrs),
            _ => return None,
        }
    }
    Some(addresses)
}

/// Split `text` at the first `sep` that is not inside double quotes.
/// Returns the text before the separator and the remainder after it (or
/// `None` when the separator never occurs unquoted).
#[must_use]
pub fn partition_unquoted(text: &str, sep: char) -> (&str, Option<&str>) {
    let mut quoted = false;
    let mut escape = false;
    for (i, c) in text.char_indices() {
        if escape {
            escape = false;
        } else if quoted && c == '\\' {
            escape = true;
        } else if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            return (&text[..i], Some(&text[i + c.len_utf8()..]));
        }
    }
    (text, None)
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    #[test]
    fn numbers_in_all_bases() {
        assert_eq!(number("32768"), Ok(("", 32768)));
        assert_eq!(number("$8000"), Ok(("", 0x8000)));
        assert_eq!(number("0x4000"), Ok(("", 0x4000)));
        assert_eq!(number("$8000,"), Ok((",", 0x8000)));
        assert!(number("-5").is_err(), "addresses are unsigned");
    }

    #[test]
    fn single_address_range() {
        assert_eq!(address_range("40000"), Some(vec![40000]));
    }

    #[test]
    fn inclusive_address_range() {
        assert_eq!(
            address_range("32770-32772"),
            Some(vec![32770, 32771, 32772]),
            "both endpoints are included"
        );
    }

    #[test]
    fn comma_separated_ranges() {
        assert_eq!(
            address_range("$8000-$8001,40000"),
            Some(vec![0x8000, 0x8001, 40000])
        );
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert_eq!(address_range("start-end"), None);
        assert_eq!(address_range("32768-"), None);
        assert_eq!(address_range(""), None);
    }

    #[test]
    fn partition_respects_quotes() {
        assert_eq!(
            partition_unquoted("LD A,1 ; set A", ';'),
            ("LD A,1 ", Some(" set A"))
        );
        assert_eq!(
            partition_unquoted("DEFM \"a;b\" ; text", ';'),
            ("DEFM \"a;b\" ", Some(" text"))
        );
        assert_eq!(partition_unquoted("RET", ';'), ("RET", None));
    }
}
