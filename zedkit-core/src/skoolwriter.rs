use std::io::Write;

use skool::{
    Addr, Base, BlockKind, SkoolError, SkoolResult, Snapshot, ADDR_LIMIT,
};

use crate::components::{format_template, Config};
use crate::ctl::{CommentType, CtlParser, SubBlock};
use crate::disassembly::{Disassembly, Entry};

/// Minimum width of the operation column.
const OP_WIDTH: usize = 13;

/// Floor for the wrapped-comment width of the right-hand column.
const MIN_COMMENT_WIDTH: usize = 10;

/// Floor for the instruction-comment column width.
const MIN_INSTRUCTION_COMMENT_WIDTH: usize = 10;

/// Markup markers recognised by the wrapper: `(open, close)` pairs.
const MARKERS: [(&str, &str); 3] = [
    ("#TABLE", "TABLE#"),
    ("#UDGTABLE", "TABLE#"),
    ("#LIST", "LIST#"),
];

/// Output shaping options for the skool formatter.
#[derive(Copy, Clone, Debug)]
pub struct WriteOptions {
    /// Maximum output line width
    pub line_width: usize,

    /// Rendering base for addresses and operands
    pub base: Base,

    /// Referrer comments: 0 never, 1 only for entries without a
    /// description, 2 always
    pub write_refs: u8,

    /// Show an ASCII gutter for instruction bytes in non-text entries
    pub show_text: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            line_width: 79,
            base: Base::Decimal,
            write_refs: 1,
            show_text: false,
        }
    }
}

/// Formats a disassembly as skool text: entry headers, titles,
/// descriptions, colon-aligned registers, width-aware wrapped comments
/// with table/list markup, instruction lines, and referrer comments.
pub struct SkoolWriter<'a> {
    /// The model being written
    disassembly: Disassembly<'a>,

    /// Comment templates
    config: Config,

    /// Output shaping
    options: WriteOptions,

    /// Width available to wrapped comment text
    comment_width: usize,
}

impl<'a> SkoolWriter<'a> {
    /// Build the final disassembly for `snapshot` and prepare to write
    /// it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the configured disassembler
    /// selector is unknown.
    pub fn new(
        snapshot: &'a Snapshot,
        ctl_parser: &CtlParser,
        options: WriteOptions,
        config: &Config,
    ) -> SkoolResult<Self> {
        let disassembly = Disassembly::new(
            snapshot,
            ctl_parser,
            config,
            options.base,
            true,
        )?;
        Ok(Self {
            disassembly,
            config: config.clone(),
            options,
            comment_width: options
                .line_width
                .saturating_sub(2)
                .max(MIN_COMMENT_WIDTH),
        })
    }

    /// Write every entry, separated by single blank lines.
    ///
    /// # Errors
    ///
    /// Returns a parse error for unterminated markup in a comment, or an
    /// I/O error from the writer.
    pub fn write_skool<W: Write>(&self, w: &mut W) -> SkoolResult<()> {
        for (index, entry) in self.disassembly.entries.iter().enumerate()
        {
            if index > 0 {
                write_line(w, "")?;
            }
            self.write_entry(w, entry)?;
        }
        Ok(())
    }

    /// Format one address in the configured base.
    fn address_str(&self, address: Addr) -> String {
        self.options.base.addr_str(address)
    }

    /// Format one address without padding, for prose.
    fn address_str_short(&self, address: Addr) -> String {
        self.options.base.addr_str_short(address)
    }

    /// Write one entry: header, title, description, registers, body,
    /// end comment, footer.
    fn write_entry<W: Write>(
        &self,
        w: &mut W,
        entry: &Entry,
    ) -> SkoolResult<()> {
        if !entry.header.is_empty() {
            for line in &entry.header {
                write_line(w, line)?;
            }
            write_line(w, "")?;
        }

        self.write_asm_directives(w, &entry.asm_directives)?;
        if entry.has_ignoreua(CommentType::Title) {
            write_line(w, "@ignoreua")?;
        }

        // A bare ignore tail reaching the top of memory writes nothing
        let pure_ignore_tail = entry.ctl == BlockKind::Ignore
            && entry.end() >= ADDR_LIMIT
            && entry.title.is_none()
            && entry
                .blocks
                .iter()
                .all(|b| b.ctl == BlockKind::Ignore);
        if pure_ignore_tail {
            return Ok(());
        }

        for block_index in &entry.bad_blocks {
            let block = &entry.blocks[*block_index];
            warn(&format!(
                "Code block at {} overlaps the following block at {}",
                self.address_str_short(block.start),
                self.address_str_short(block.end)
            ));
        }

        let mut wrote_desc = false;
        if let Some(title) = &entry.title {
            self.write_comment(w, title)?;
            wrote_desc = self.write_entry_description(w, entry)?;
            if !entry.registers.is_empty() {
                if !wrote_desc {
                    self.write_empty_paragraph(w)?;
                    wrote_desc = true;
                }
                self.write_registers(w, entry)?;
            }
        }

        self.write_body(w, entry, wrote_desc)?;

        if entry.has_ignoreua(CommentType::End) {
            write_line(w, "@ignoreua")?;
        }
        self.write_paragraphs(w, &entry.end_comment)?;

        if !entry.footer.is_empty() {
            write_line(w, "")?;
            for line in &entry.footer {
                write_line(w, line)?;
            }
        }
        Ok(())
    }

    /// Write the referrer comment and description paragraphs under the
    /// title.  Returns whether anything was written.
    fn write_entry_description<W: Write>(
        &self,
        w: &mut W,
        entry: &Entry,
    ) -> SkoolResult<bool> {
        let mut wrote_desc = false;
        let ignoreua_d = entry.has_ignoreua(CommentType::Description);
        if self.options.write_refs > 0 {
            let referrers = entry
                .instructions()
                .next()
                .map_or(&[] as &[Addr], |i| &i.referrers);
            if !referrers.is_empty()
                && (self.options.write_refs == 2
                    || entry.description.is_empty())
            {
                self.write_comment(w, "")?;
                if ignoreua_d {
                    write_line(w, "@ignoreua")?;
                }
                self.write_referrers(w, referrers, false)?;
                wrote_desc = true;
            }
        }
        if !entry.description.is_empty() {
            if wrote_desc {
                self.write_paragraph_separator(w)?;
            } else {
                self.write_comment(w, "")?;
                if ignoreua_d {
                    write_line(w, "@ignoreua")?;
                }
            }
            self.write_paragraphs(w, &entry.description)?;
            wrote_desc = true;
        }
        Ok(wrote_desc)
    }

    /// Write the register documentation, aligning every colon to the
    /// deepest one.
    fn write_registers<W: Write>(
        &self,
        w: &mut W,
        entry: &Entry,
    ) -> SkoolResult<()> {
        self.write_comment(w, "")?;
        if entry.has_ignoreua(CommentType::Registers) {
            write_line(w, "@ignoreua")?;
        }
        let colon = |reg: &str| {
            reg.find(':').map_or(-1_isize, |p| p as isize)
        };
        let max_indent = entry
            .registers
            .iter()
            .map(|(reg, _)| colon(reg))
            .max()
            .unwrap_or(-1);
        for (reg, desc) in &entry.registers {
            let width = (max_indent + reg.len() as isize - colon(reg))
                .max(0) as usize;
            let reg = format!("{reg:>width$}");
            if desc.is_empty() {
                write_line(w, &format!("; {reg}"))?;
                continue;
            }
            let desc_indent = reg.len() + 1;
            let desc_lines = word_wrap(
                desc,
                self.comment_width
                    .saturating_sub(desc_indent)
                    .max(MIN_COMMENT_WIDTH),
            );
            write_line(w, &format!("; {reg} {}", desc_lines[0]))?;
            let desc_prefix = format!("{:<desc_indent$}", ".");
            for line in &desc_lines[1..] {
                write_line(w, &format!("; {desc_prefix}{line}"))?;
            }
        }
        Ok(())
    }

    /// Write an entry's blocks: headers, referrer comments, instruction
    /// lines, and any comment lines overflowing the instruction count.
    fn write_body<W: Write>(
        &self,
        w: &mut W,
        entry: &Entry,
        wrote_desc: bool,
    ) -> SkoolResult<()> {
        let op_width = OP_WIDTH.max(entry.width());
        let line_width = op_width + 8;
        let mut first_block = true;
        for block in &entry.blocks {
            let ignoreua_m =
                block.has_ignoreua(block.start, CommentType::MidBlock);
            let mut begun_header = false;
            if !first_block
                && entry.ctl == BlockKind::Code
                && self.options.write_refs > 0
            {
                let referrers = block
                    .instructions
                    .first()
                    .map_or(&[] as &[Addr], |i| &i.referrers);
                if !referrers.is_empty()
                    && (self.options.write_refs == 2
                        || block.header.is_empty())
                {
                    if ignoreua_m {
                        write_line(w, "@ignoreua")?;
                    }
                    self.write_referrers(w, referrers, true)?;
                    begun_header = true;
                }
            }
            if !block.header.is_empty() {
                if first_block {
                    if !wrote_desc {
                        self.write_empty_paragraph(w)?;
                    }
                    if entry.registers.is_empty() {
                        self.write_empty_paragraph(w)?;
                    }
                    self.write_comment(w, "")?;
                }
                if begun_header {
                    self.write_paragraph_separator(w)?;
                } else if ignoreua_m {
                    write_line(w, "@ignoreua")?;
                }
                self.write_paragraphs(w, &block.header)?;
            }
            let comment_width = self
                .comment_width
                .saturating_sub(line_width)
                .max(MIN_INSTRUCTION_COMMENT_WIDTH);
            let comment_lines =
                self.format_block_comment(block, comment_width)?;
            self.write_instructions(
                w,
                entry,
                block,
                op_width,
                &comment_lines,
            )?;
            let indent = " ".repeat(line_width);
            for line in comment_lines.iter().skip(block.instructions.len())
            {
                write_line(w, &format!("{indent}; {line}"))?;
            }
            first_block = false;
        }
        Ok(())
    }

    /// Wrap a block comment, framing multi-line comments with balanced
    /// braces.  A comment of nothing but dots means "blank multi-line":
    /// the leading dot is dropped.
    fn format_block_comment(
        &self,
        block: &SubBlock,
        width: usize,
    ) -> SkoolResult<Vec<String>> {
        let rowspan = block.instructions.len();
        let mut comment = block.comment.as_str();
        let multi_line = rowspan > 1 && !comment.is_empty();
        if multi_line && comment.chars().all(|c| c == '.') {
            comment = &comment[1..];
        }
        if !multi_line && !comment.starts_with('{') {
            return self.wrap(comment, width);
        }
        let balance = comment.matches('{').count() as isize
            - comment.matches('}').count() as isize;
        let mut opening = if multi_line && balance < 0 {
            "{".repeat((1 - balance) as usize)
        } else {
            "{".to_owned()
        };
        if comment.starts_with('{') {
            opening.push(' ');
        }
        let mut closing = "}".repeat(balance.max(0) as usize + 1);
        if comment.ends_with('}') {
            closing.insert(0, ' ');
        }
        let mut comment_lines =
            self.wrap(&format!("{opening}{comment}"), width)?;
        if comment_lines.len() < rowspan {
            while comment_lines.len() < rowspan - 1 {
                comment_lines.push(String::new());
            }
            comment_lines.push(closing.trim_start().to_owned());
        } else if comment_lines
            .last()
            .map_or(0, |l| l.len() + closing.len())
            <= width
        {
            if let Some(last) = comment_lines.last_mut() {
                last.push_str(&closing);
            }
        } else {
            comment_lines.push(closing.trim_start().to_owned());
        }
        Ok(comment_lines)
    }

    /// Write a block's instruction lines with their comment column.
    fn write_instructions<W: Write>(
        &self,
        w: &mut W,
        entry: &Entry,
        block: &SubBlock,
        op_width: usize,
        comment_lines: &[String],
    ) -> SkoolResult<()> {
        for (index, instruction) in block.instructions.iter().enumerate()
        {
            let ctl = instruction.ctl.unwrap_or(' ');
            let address = self.address_str(instruction.address);
            let operation = &instruction.operation;
            let comment = if block.comment.is_empty() {
                if self.options.show_text
                    && entry.ctl != BlockKind::Text
                {
                    to_ascii(&instruction.bytes)
                } else {
                    String::new()
                }
            } else {
                comment_lines.get(index).cloned().unwrap_or_default()
            };
            if index > 0
                && entry.ctl == BlockKind::Code
                && ctl == '*'
                && self.options.write_refs > 0
            {
                self.write_referrers(w, &instruction.referrers, true)?;
            }
            self.write_asm_directives(w, &instruction.asm_directives)?;
            if block
                .has_ignoreua(instruction.address, CommentType::Instruction)
            {
                write_line(w, "@ignoreua")?;
            }
            let line = if entry.ctl == BlockKind::Code
                || !comment.is_empty()
                || !block.comment.is_empty()
            {
                format!("{ctl}{address} {operation:<op_width$} ; {comment}")
            } else {
                format!("{ctl}{address} {operation}")
            };
            write_line(w, line.trim_end())?;
        }
        Ok(())
    }

    /// Write one comment, wrapped; an empty text writes a bare `;`.
    fn write_comment<W: Write>(
        &self,
        w: &mut W,
        text: &str,
    ) -> SkoolResult<()> {
        if text.is_empty() {
            return write_line(w, ";");
        }
        for line in self.wrap(text, self.comment_width)? {
            write_line(w, &format!("; {line}"))?;
        }
        Ok(())
    }

    /// An empty paragraph: a bare `;` followed by a `.` separator.
    fn write_empty_paragraph<W: Write>(&self, w: &mut W) -> SkoolResult<()> {
        self.write_comment(w, "")?;
        self.write_paragraph_separator(w)
    }

    /// The `.` line separating comment paragraphs.
    fn write_paragraph_separator<W: Write>(
        &self,
        w: &mut W,
    ) -> SkoolResult<()> {
        self.write_comment(w, ".")
    }

    /// Write paragraphs separated by `.` lines.
    fn write_paragraphs<W: Write>(
        &self,
        w: &mut W,
        paragraphs: &[String],
    ) -> SkoolResult<()> {
        let Some((last, rest)) = paragraphs.split_last() else {
            return Ok(());
        };
        for paragraph in rest {
            self.write_comment(w, paragraph)?;
            self.write_paragraph_separator(w)?;
        }
        self.write_comment(w, last)
    }

    /// Write a referrer comment from the configured templates.
    fn write_referrers<W: Write>(
        &self,
        w: &mut W,
        referrers: &[Addr],
        entry_point: bool,
    ) -> SkoolResult<()> {
        let Some((last, rest)) = referrers.split_last() else {
            return Ok(());
        };
        let mut key = if entry_point { "EntryPointRef" } else { "Ref" }
            .to_owned();
        let reference = format!("#R{}", self.address_str_short(*last));
        let mut fields = vec![("ref", reference.clone())];
        if !rest.is_empty() {
            key.push('s');
            let references: Vec<String> = rest
                .iter()
                .map(|r| format!("#R{}", self.address_str_short(*r)))
                .collect();
            fields.push(("refs", references.join(", ")));
        }
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let comment =
            format_template(self.config.template(&key), &borrowed);
        self.write_comment(w, &comment)
    }

    /// Write `@`-prefixed directive lines.
    fn write_asm_directives<W: Write>(
        &self,
        w: &mut W,
        directives: &[String],
    ) -> SkoolResult<()> {
        for directive in directives {
            write_line(w, &format!("@{directive}"))?;
        }
        Ok(())
    }

    /// Wrap comment text, honouring table/list markup segments.
    fn wrap(&self, text: &str, width: usize) -> SkoolResult<Vec<String>> {
        let mut lines = Vec::new();
        for (segment, policy) in parse_blocks(text)? {
            match policy {
                WrapPolicy::NoWrap => lines.push(segment),
                WrapPolicy::Wrap => {
                    lines.extend(word_wrap(&segment, width));
                }
                WrapPolicy::WrapAlign => {
                    let block = word_wrap(&segment, width);
                    let Some(first) = block.first() else {
                        continue;
                    };
                    lines.push(first.clone());
                    if block.len() > 1 {
                        let mut indent = if first.ends_with(" |") {
                            2
                        } else {
                            first
                                .rfind(" | ")
                                .map_or(2, |p| p + 3)
                        };
                        while indent < first.len()
                            && first.as_bytes()[indent] == b' '
                        {
                            indent += 1;
                        }
                        let pad = " ".repeat(indent);
                        let rest = block[1..].join(" ");
                        lines.extend(
                            word_wrap(
                                &rest,
                                width.saturating_sub(indent).max(1),
                            )
                            .into_iter()
                            .map(|line| format!("{pad}{line}")),
                        );
                    }
                }
            }
        }
        Ok(lines)
    }
}

/// How one tokenised comment segment may be laid out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum WrapPolicy {
    /// Emit the segment as one indivisible line
    NoWrap,

    /// Wrap freely at spaces
    Wrap,

    /// Wrap with continuation lines aligned after the first ` | `
    WrapAlign,
}

/// Split comment text into `(segment, policy)` pairs around table/list
/// markup.  Rows and items delimited by `{ ... }` become indivisible or
/// aligned segments according to the marker's `<nowrap>`/`<wrapalign>`
/// flag.
fn parse_blocks(text: &str) -> SkoolResult<Vec<(String, WrapPolicy)>> {
    let mut indexes: Vec<(usize, WrapPolicy)> = Vec::new();
    let mut index = 0;
    loop {
        let found = MARKERS.iter().find_map(|(marker, end_marker)| {
            text.get(index..)
                .and_then(|t| t.find(*marker))
                .map(|p| (*marker, *end_marker, index + p))
        });
        let Some((marker, end_marker, start)) = found else {
            break;
        };
        if start > 0 {
            indexes.push((start - 1, WrapPolicy::Wrap));
        }
        let end = text
            .get(start..)
            .and_then(|t| t.find(end_marker))
            .map(|p| start + p + end_marker.len())
            .ok_or_else(|| {
                SkoolError::Parse(format!(
                    "No end marker found: {}...",
                    safe_prefix(text, start, marker.len() + 15)
                ))
            })?;
        indexes.extend(parse_markup_block(
            &text[..end],
            start + marker.len(),
        )?);
        index = indexes.last().map_or(end, |(p, _)| p + 1);
    }

    if indexes.last().map_or(true, |(p, _)| *p != text.len()) {
        indexes.push((text.len(), WrapPolicy::Wrap));
    }
    indexes.sort_by_key(|(p, _)| *p);
    let mut segments = Vec::new();
    let mut start = 0;
    for (end, policy) in indexes {
        segments.push((text[start..end].trim().to_owned(), policy));
        start = end;
    }
    Ok(segments)
}

/// Tokenise the inside of one table/list block: an optional `(...)`
/// parameter list, an optional `<...>` wrap flag, then `{ ... }` rows.
fn parse_markup_block(
    text: &str,
    begin: usize,
) -> SkoolResult<Vec<(usize, WrapPolicy)>> {
    let (index, _params) =
        parse_brackets(text, begin, '(', ')').map_err(|_| {
            SkoolError::Parse(format!(
                "No closing ')' on parameter list: {}...",
                safe_prefix(text, begin, 15)
            ))
        })?;
    let (index, flag) =
        parse_brackets(text, index, '<', '>').map_err(|_| {
            SkoolError::Parse(format!(
                "No closing '>' on flags: {}...",
                safe_prefix(text, index, 15)
            ))
        })?;
    let row_policy = match flag.as_deref() {
        Some("nowrap") => WrapPolicy::NoWrap,
        Some("wrapalign") => WrapPolicy::WrapAlign,
        _ => WrapPolicy::Wrap,
    };

    let mut indexes = vec![(index, WrapPolicy::Wrap)];
    let mut index = index;
    loop {
        let Some(start) =
            text.get(index..).and_then(|t| t.find("{ "))
        else {
            break;
        };
        let start = index + start;
        let end = text
            .get(start..)
            .and_then(|t| t.find(" }"))
            .map(|p| start + p)
            .ok_or_else(|| {
                SkoolError::Parse(format!(
                    "No closing ' }}' on row/item: {}...",
                    safe_prefix(text, start, 15)
                ))
            })?;
        index = end + 2;
        indexes.push((index, row_policy));
    }
    indexes.push((text.len(), WrapPolicy::Wrap));
    Ok(indexes)
}

/// Parse an optional bracketed group starting exactly at `index`.
/// Returns the index after the group and its contents, or the input
/// index and `None` when the group is absent.  An unclosed group is an
/// error.
fn parse_brackets(
    text: &str,
    index: usize,
    open: char,
    close: char,
) -> Result<(usize, Option<String>), ()> {
    if text[index..].chars().next() != Some(open) {
        return Ok((index, None));
    }
    let mut depth = 0_i32;
    for (offset, c) in text[index..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let inner = &text[index + open.len_utf8()..index + offset];
                return Ok((
                    index + offset + close.len_utf8(),
                    Some(inner.to_owned()),
                ));
            }
        }
    }
    Err(())
}

/// Up to `len` characters of `text` from `start`, for error messages.
fn safe_prefix(text: &str, start: usize, len: usize) -> &str {
    let end = (start + len).min(text.len());
    text.get(start..end).unwrap_or("")
}

/// Greedy word wrap at spaces; words longer than the width stand alone.
fn word_wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_owned();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_owned();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// The ASCII gutter: printable bytes as characters, everything else as
/// dots, inside brackets.
fn to_ascii(data: &[u8]) -> String {
    let mut chars = String::with_capacity(data.len() + 2);
    chars.push('[');
    for b in data {
        if (32..127).contains(b) {
            chars.push(char::from(*b));
        } else {
            chars.push('.');
        }
    }
    chars.push(']');
    chars
}

/// Report a non-fatal problem on the diagnostic stream.
fn warn(message: &str) {
    let _ = writeln!(std::io::stderr(), "WARNING: {message}");
}

/// Write one output line.
fn write_line<W: Write>(w: &mut W, line: &str) -> SkoolResult<()> {
    writeln!(w, "{line}")
        .map_err(|e| SkoolError::io("<skool output>", e))
}
