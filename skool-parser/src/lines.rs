use std::io::BufRead;

use skool::{SkoolError, SkoolResult};

use crate::primitives::partition_unquoted;

/// The control characters that may begin an instruction line: the eight
/// entry kinds, `*` for entry points, and space for continuation lines.
const VALID_CTLS: &str = "bcgistuw* ";

/// A container for the classified content of one skool line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineKind<'a> {
    /// An `@`-prefixed directive; carries the text after the `@`
    Directive(&'a str),

    /// An instruction line: `CTL ADDR OPERATION [; COMMENT]`
    Instruction {
        /// The control character (`b c g i s t u w *`, or space for a
        /// continuation line)
        ctl: char,
        /// The five-character address field (may be blank on
        /// continuation lines)
        addr_field: &'a str,
        /// The operation text, trimmed, with any comment removed
        operation: &'a str,
        /// The comment after the first unquoted `;`, if any
        comment: Option<&'a str>,
    },

    /// Comment prose attached to the surrounding entry
    Comment(&'a str),

    /// A line of nothing but whitespace; separates entries
    Blank,

    /// Anything else (unrecognised prose between entries)
    Other(&'a str),
}

/// Classify one line of a skool file.
#[must_use]
pub fn classify_line(line: &str) -> LineKind<'_> {
    if let Some(directive) = line.strip_prefix('@') {
        return LineKind::Directive(directive);
    }
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    if let Some(comment) = line.trim_start().strip_prefix(';') {
        return LineKind::Comment(comment);
    }
    let first = line.chars().next().unwrap_or(' ');
    if VALID_CTLS.contains(first) && line.len() > 1 {
        let addr_end = line.len().min(6);
        let (operation, comment) =
            partition_unquoted(&line[addr_end..], ';');
        return LineKind::Instruction {
            ctl: first,
            addr_field: &line[1..addr_end],
            operation: operation.trim(),
            comment: comment.map(str::trim),
        };
    }
    LineKind::Other(line)
}

/// One blank-line-delimited block of a skool file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SkoolBlock {
    /// True when the block contains at least one instruction line (blocks
    /// of pure prose or directives are not entries)
    pub is_entry: bool,

    /// The block's lines, verbatim
    pub lines: Vec<String>,
}

/// Read a skool stream into blank-line-delimited blocks.
///
/// # Errors
///
/// Returns an I/O error (wrapped with the stream name) if reading fails.
pub fn read_skool<R: BufRead>(
    reader: R,
    name: &str,
) -> SkoolResult<Vec<SkoolBlock>> {
    let mut blocks = Vec::new();
    let mut block = SkoolBlock::default();
    for line in reader.lines() {
        let line = line.map_err(|e| SkoolError::io(name, e))?;
        if line.trim().is_empty() {
            if !block.lines.is_empty() {
                blocks.push(core::mem::take(&mut block));
            }
            continue;
        }
        if matches!(classify_line(&line), LineKind::Instruction { .. }) {
            block.is_entry = true;
        }
        block.lines.push(line);
    }
    if !block.lines.is_empty() {
        blocks.push(block);
    }
    Ok(blocks)
}
