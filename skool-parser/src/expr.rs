use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::space0,
    combinator::map,
    error::VerboseError,
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::primitives::number;

/// Evaluate an `@if` condition against the current asm and fix modes.
///
/// The grammar accepts integer literals, the fields `{asm}` and `{fix}`,
/// parentheses, `+ - * / %`, the six comparison operators, and `&&`/`||`.
/// Returns `None` when the text is not a complete, well-formed condition;
/// callers treat that as "silently drop the directive".
#[must_use]
pub fn eval_condition(text: &str, asm_mode: u8, fix_mode: u8) -> Option<bool> {
    let fields = Fields {
        asm: i64::from(asm_mode),
        fix: i64::from(fix_mode),
    };
    match or_expr(text, &fields) {
        Ok((rest, value)) if rest.trim().is_empty() => Some(value != 0),
        _ => None,
    }
}

/// The substitution-mode fields a condition may reference.
#[derive(Copy, Clone)]
struct Fields {
    /// Current asm mode (0..=3)
    asm: i64,
    /// Current fix mode (0..=3)
    fix: i64,
}

/// Shorthand for the parser result type used throughout this module.
type ExprResult<'a> = IResult<&'a str, i64, VerboseError<&'a str>>;

/// `or := and ('||' and)*`
fn or_expr<'a>(input: &'a str, fields: &Fields) -> ExprResult<'a> {
    let (input, first) = and_expr(input, fields)?;
    let (input, rest) = many0(preceded(symbol("||"), |i| {
        and_expr(i, fields)
    }))(input)?;
    let value = rest
        .iter()
        .fold(first != 0, |acc, v| acc || *v != 0);
    Ok((input, i64::from(value)))
}

/// `and := cmp ('&&' cmp)*`
fn and_expr<'a>(input: &'a str, fields: &Fields) -> ExprResult<'a> {
    let (input, first) = cmp_expr(input, fields)?;
    let (input, rest) = many0(preceded(symbol("&&"), |i| {
        cmp_expr(i, fields)
    }))(input)?;
    let value = rest
        .iter()
        .fold(first != 0, |acc, v| acc && *v != 0);
    Ok((input, i64::from(value)))
}

/// `cmp := sum (CMPOP sum)?`; a bare sum is its own truth value.
fn cmp_expr<'a>(input: &'a str, fields: &Fields) -> ExprResult<'a> {
    let (input, left) = sum_expr(input, fields)?;
    // Two-character operators must be tried before their prefixes
    let op = alt((
        symbol("=="),
        symbol("!="),
        symbol("<="),
        symbol(">="),
        symbol("<"),
        symbol(">"),
    ));
    let (input, tail) = nom::combinator::opt(pair(op, |i| {
        sum_expr(i, fields)
    }))(input)?;
    let value = match tail {
        None => left,
        Some((op, right)) => i64::from(match op {
            "==" => left == right,
            "!=" => left != right,
            "<=" => left <= right,
            ">=" => left >= right,
            "<" => left < right,
            _ => left > right,
        }),
    };
    Ok((input, value))
}

/// `sum := term (('+'|'-') term)*`
fn sum_expr<'a>(input: &'a str, fields: &Fields) -> ExprResult<'a> {
    let (input, first) = term_expr(input, fields)?;
    let (input, rest) = many0(pair(alt((symbol("+"), symbol("-"))), |i| {
        term_expr(i, fields)
    }))(input)?;
    let value = rest.iter().fold(first, |acc, (op, v)| match *op {
        "+" => acc.wrapping_add(*v),
        _ => acc.wrapping_sub(*v),
    });
    Ok((input, value))
}

/// `term := factor (('*'|'/'|'%') factor)*`; division by zero fails the
/// whole condition rather than panicking.
fn term_expr<'a>(input: &'a str, fields: &Fields) -> ExprResult<'a> {
    let (input, first) = factor(input, fields)?;
    let (input, rest) = many0(pair(
        alt((symbol("*"), symbol("/"), symbol("%"))),
        |i| factor(i, fields),
    ))(input)?;
    let mut value = first;
    for (op, v) in rest {
        value = match op {
            "*" => value.wrapping_mul(v),
            _ if v == 0 => {
                return Err(nom::Err::Failure(VerboseError {
                    errors: vec![(
                        input,
                        nom::error::VerboseErrorKind::Context(
                            "division by zero",
                        ),
                    )],
                }));
            }
            "/" => value / v,
            _ => value % v,
        };
    }
    Ok((input, value))
}

/// `factor := INT | '{asm}' | '{fix}' | '(' or ')'`
fn factor<'a>(input: &'a str, fields: &Fields) -> ExprResult<'a> {
    delimited(
        space0,
        alt((
            map(number, i64::from),
            map(tag("{asm}"), |_| fields.asm),
            map(tag("{fix}"), |_| fields.fix),
            |i| delimited(symbol("("), |j| or_expr(j, fields), symbol(")"))(i),
        )),
        space0,
    )(input)
}

/// A literal token surrounded by optional spaces.
fn symbol(
    token: &'static str,
) -> impl FnMut(&str) -> IResult<&str, &str, VerboseError<&str>> {
    move |input| delimited(space0, tag(token), space0)(input)
}
