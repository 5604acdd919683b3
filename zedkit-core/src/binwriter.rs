use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, Write};
use std::sync::OnceLock;

use regex::Regex;
use skool::{Addr, SkoolError, SkoolResult, Snapshot};
use skool_parser::{
    address_range, classify_line, parse_directive, read_skool,
    DataDirective, Directive, LineKind, SubVariant,
};

use crate::components::{get_assembler, Assembler};

/// Conversion options for the skool-to-binary assembler.
#[derive(Clone, Debug)]
pub struct BinWriterOptions {
    /// Substitution mode: 1 enables `@isub`, 2 adds `@ssub`, 3 adds
    /// `@rsub`
    pub asm_mode: u8,

    /// Fix mode: 1 enables `@ofix`, 2 adds `@bfix`, 3 adds `@rfix`
    pub fix_mode: u8,

    /// First address to convert; negative means "wherever the first
    /// poke lands"
    pub start: i64,

    /// Stop converting at this address; above 65536 means "wherever the
    /// last poke ends"
    pub end: i64,

    /// Process `@defb`, `@defs` and `@defw` directives
    pub data: bool,

    /// Report each converted instruction on the diagnostic stream
    pub verbose: bool,

    /// Emit label warnings
    pub warn: bool,
}

impl Default for BinWriterOptions {
    fn default() -> Self {
        Self {
            asm_mode: 0,
            fix_mode: 0,
            start: -1,
            end: 65537,
            data: false,
            verbose: false,
            warn: true,
        }
    }
}

/// One instruction gathered from the skool source.
#[derive(Clone, Debug)]
struct Instruction {
    /// The address declared in the source, when the line had one
    skool_address: Option<Addr>,

    /// Where the instruction lands after relocation
    real_address: Addr,

    /// The operation as written in the source
    original: String,

    /// The operation to assemble (substituted, then label-rewritten)
    operation: String,

    /// `@keep` addresses: `Some([])` keeps every operand, a non-empty
    /// list keeps only those values
    keep: Option<Vec<Addr>>,

    /// Suppress warnings for this instruction
    nowarn: bool,

    /// Data directives to execute before assembling
    data: Vec<DataDirective>,

    /// Placement marker: space, `>` prepended, `+` appended, `|`
    /// overwriting
    marker: char,
}

/// One blank-line-delimited entry of instructions.
#[derive(Clone, Debug, Default)]
struct Entry {
    /// The entry's control character (`None` for remote entries)
    #[allow(dead_code, reason = "kept for parity with remote entries")]
    ctl: Option<char>,

    /// The entry's instructions in source order
    instructions: Vec<Instruction>,
}

/// The two-pass relocating skool-to-binary assembler.
///
/// Pass one parses the source, resolves which substitution wins each
/// instruction (highest enabled weight), sizes every emitted operation
/// and records the skool-to-real address map.  Pass two rewrites operand
/// addresses through that map, assembles, and pokes the bytes into the
/// snapshot.  [`BinWriter::write`] then dumps the poked slice.
#[derive(Debug)]
pub struct BinWriter {
    /// Conversion options with the modes normalised
    options: BinWriterOptions,

    /// The memory image being assembled into
    snapshot: Snapshot,

    /// Lowest poked address
    base_address: Addr,

    /// One past the highest poked address
    end_address: Addr,

    /// Pending substitutions by weight; the 0 bucket is always present
    /// so that a run with no enabled substitutions selects the original
    /// operation
    subs: BTreeMap<u8, Vec<String>>,

    /// Pending `@keep` for the next instruction
    keep: Option<Vec<Addr>>,

    /// Pending `@nowarn` for the next instruction
    nowarn: bool,

    /// Pending data directives (`None` when data mode is off)
    data: Option<Vec<DataDirective>>,

    /// The control character of the entry being parsed
    entry_ctl: Option<char>,

    /// Completed entries
    entries: Vec<Entry>,

    /// Entries declared by `@remote` directives
    remote_entries: Vec<Entry>,

    /// Instructions of the entry being parsed
    instructions: Vec<Instruction>,

    /// Skool address to real address, first winner per skool address
    address_map: HashMap<Addr, Addr>,

    /// The mnemonic encoder
    assembler: Box<dyn Assembler>,
}

impl BinWriter {
    /// Parse and assemble a skool stream.
    ///
    /// Mode coupling happens here: a fix mode above 2 forces asm mode 3,
    /// and an asm mode above 2 raises the fix mode to at least 1.
    ///
    /// # Errors
    ///
    /// Returns a parse error for a malformed line or directive, an
    /// assembly error for an operation the oracle cannot size or encode,
    /// or an I/O error from the reader.
    pub fn new<R: BufRead>(
        reader: R,
        name: &str,
        options: BinWriterOptions,
    ) -> SkoolResult<Self> {
        let mut options = options;
        if options.fix_mode > 2 {
            options.asm_mode = 3;
        } else if options.asm_mode > 2 {
            options.fix_mode = options.fix_mode.max(1);
        }
        let data = options.data.then(Vec::new);
        let mut writer = Self {
            options,
            snapshot: Snapshot::new(),
            base_address: 65536,
            end_address: 0,
            subs: BTreeMap::from([(0, Vec::new())]),
            keep: None,
            nowarn: false,
            data,
            entry_ctl: None,
            entries: Vec::new(),
            remote_entries: Vec::new(),
            instructions: Vec::new(),
            address_map: HashMap::new(),
            assembler: get_assembler(),
        };
        writer.parse_skool(reader, name)?;
        writer.relocate()?;
        Ok(writer)
    }

    /// The address map recorded in pass one: skool address to real
    /// address, first winner.
    #[must_use]
    pub fn address_map(&self) -> &HashMap<Addr, Addr> {
        &self.address_map
    }

    /// Write the assembled slice: `[start, end)` when both were given,
    /// otherwise the observed poke bounds.  Returns `(base, end, size)`
    /// for the caller's report.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the writer.
    pub fn write<W: Write>(
        &self,
        w: &mut W,
    ) -> SkoolResult<(Addr, Addr, usize)> {
        let base = if self.options.start < 0 {
            self.base_address
        } else {
            self.options.start as Addr
        };
        let end = if self.options.end > 65536 {
            self.end_address
        } else {
            self.options.end as Addr
        };
        let data = self.snapshot.slice(base, end);
        w.write_all(data)
            .map_err(|e| SkoolError::io("<bin output>", e))?;
        Ok((base, end, data.len()))
    }

    /// Pass one: lex lines, fold directives into pending state, size
    /// and place every instruction.
    fn parse_skool<R: BufRead>(
        &mut self,
        reader: R,
        name: &str,
    ) -> SkoolResult<()> {
        let mut address: Option<Addr> = None;
        for block in read_skool(reader, name)? {
            if !block.is_entry {
                continue;
            }
            let mut removed: HashSet<Addr> = HashSet::new();
            for line in &block.lines {
                match classify_line(line) {
                    LineKind::Directive(text) => {
                        address = self.parse_asm_directive(
                            address,
                            text,
                            &mut removed,
                        )?;
                    }
                    LineKind::Instruction { .. } => {
                        address = self.parse_instruction(
                            address,
                            line,
                            &mut removed,
                        )?;
                    }
                    _ => {}
                }
            }
            self.entries.push(Entry {
                ctl: self.entry_ctl.take(),
                instructions: core::mem::take(&mut self.instructions),
            });
        }
        Ok(())
    }

    /// Parse one instruction line: resolve the winning substitution
    /// list, emit prepends, the replacement, and chained appends, and
    /// advance the running address.
    fn parse_instruction(
        &mut self,
        address: Option<Addr>,
        line: &str,
        removed: &mut HashSet<Addr>,
    ) -> SkoolResult<Option<Addr>> {
        let LineKind::Instruction {
            ctl,
            addr_field,
            operation: original_op,
            ..
        } = classify_line(line)
        else {
            return Ok(address);
        };
        if self.entry_ctl.is_none() {
            self.entry_ctl = Some(ctl);
        }
        let skool_address =
            skool::parse_int(addr_field).filter(|a| *a < 65536);
        if skool_address.is_none()
            && (address.is_none() || !addr_field.trim().is_empty())
        {
            return Err(SkoolError::Parse(format!(
                "Invalid address ({addr_field}):\n{}",
                line.trim_end()
            )));
        }
        let Some(mut address) = address.or(skool_address) else {
            return Err(SkoolError::Parse(format!(
                "Invalid address ({addr_field}):\n{}",
                line.trim_end()
            )));
        };
        let original_op = original_op.to_owned();

        // The highest populated weight wins; weight 0 is the original
        // operation
        let subbed = self.subs.keys().max().copied().unwrap_or(0);
        let operations: Vec<String> = if subbed > 0 {
            self.subs.get(&subbed).cloned().unwrap_or_default()
        } else {
            vec![original_op.clone()]
        };
        self.subs = BTreeMap::from([(0, Vec::new())]);

        let parsed: Vec<SubVariant> =
            operations.iter().map(|v| SubVariant::parse(v)).collect();

        for variant in
            parsed.iter().filter(|v| v.prepend && !v.text.is_empty())
        {
            address += self.get_size(
                &variant.text,
                address,
                '>',
                false,
                removed,
                0,
                None,
            )?;
        }
        if let Some(sa) = skool_address {
            self.address_map.entry(sa).or_insert(address);
        }
        let mut after: Vec<(bool, String, bool)> = parsed
            .iter()
            .filter(|v| !v.prepend)
            .map(|v| (v.overwrite, v.text.clone(), v.append))
            .collect();
        let offset = skool_address
            .map_or(0, |sa| i64::from(sa) - i64::from(address));
        let (overwrite, operation) =
            if after.first().map_or(true, |(_, _, append)| *append) {
                (false, original_op.clone())
            } else {
                let (overwrite, text, _) = after.remove(0);
                let operation = if text.is_empty() {
                    original_op.clone()
                } else {
                    text
                };
                (overwrite, operation)
            };
        if !operation.is_empty()
            && skool_address.map_or(true, |sa| !removed.contains(&sa))
        {
            address += self.get_size(
                &operation,
                address,
                ' ',
                overwrite,
                removed,
                offset,
                skool_address,
            )?;
        }
        for (overwrite, operation, _) in &after {
            if !operation.is_empty() {
                address += self.get_size(
                    operation, address, '+', *overwrite, removed, offset,
                    None,
                )?;
            }
        }
        Ok(Some(address))
    }

    /// Size one emitted operation and record its instruction.
    fn get_size(
        &mut self,
        operation: &str,
        address: Addr,
        marker: char,
        overwrite: bool,
        removed: &mut HashSet<Addr>,
        offset: i64,
        skool_address: Option<Addr>,
    ) -> SkoolResult<Addr> {
        let upper = operation.to_ascii_uppercase();
        let size = if upper.starts_with("DJNZ ") || upper.starts_with("JR ")
        {
            2
        } else {
            self.assembler.get_size(operation, address)?
        };
        if size == 0 {
            return Err(SkoolError::Assembly {
                address,
                operation: operation.to_owned(),
            });
        }
        let mut marker = marker;
        if overwrite {
            let base = i64::from(address) + offset;
            for a in base..base + size as i64 {
                if (0..65536).contains(&a) {
                    removed.insert(a as Addr);
                }
            }
            marker = '|';
        }
        let addr64 = i64::from(address);
        if self.options.start <= addr64 && addr64 < self.options.end {
            self.instructions.push(Instruction {
                skool_address,
                real_address: address,
                original: operation.to_owned(),
                operation: operation.to_owned(),
                keep: self.keep.clone(),
                nowarn: self.nowarn,
                data: self.data.clone().unwrap_or_default(),
                marker,
            });
        }
        self.keep = None;
        self.nowarn = false;
        if let Some(data) = &mut self.data {
            data.clear();
        }
        Ok(size as Addr)
    }

    /// Fold one directive into pending state.
    fn parse_asm_directive(
        &mut self,
        address: Option<Addr>,
        text: &str,
        removed: &mut HashSet<Addr>,
    ) -> SkoolResult<Option<Addr>> {
        match parse_directive(text)? {
            Directive::Sub { kind, value } => {
                let weight = kind
                    .weight(self.options.asm_mode, self.options.fix_mode);
                if let Some(ranges) = value.strip_prefix('!') {
                    if weight > 0 {
                        if let Some(addresses) = address_range(ranges) {
                            removed.extend(addresses);
                        }
                    }
                } else {
                    self.subs.entry(weight).or_default().push(value);
                }
                Ok(address)
            }
            Directive::If { condition, inner } => {
                if skool_parser::eval_condition(
                    &condition,
                    self.options.asm_mode,
                    self.options.fix_mode,
                ) == Some(true)
                {
                    return self
                        .parse_asm_directive(address, &inner, removed);
                }
                Ok(address)
            }
            Directive::Org(org) => Ok(org),
            Directive::Keep(addresses) => {
                self.keep = Some(addresses);
                Ok(address)
            }
            Directive::Nowarn => {
                self.nowarn = true;
                Ok(address)
            }
            Directive::Data(directive) => {
                if let Some(data) = &mut self.data {
                    data.push(directive);
                }
                Ok(address)
            }
            Directive::Remote { addresses, .. } => {
                let instructions = addresses
                    .into_iter()
                    .map(|a| Instruction {
                        skool_address: Some(a),
                        real_address: a,
                        original: String::new(),
                        operation: String::new(),
                        keep: None,
                        nowarn: false,
                        data: Vec::new(),
                        marker: ' ',
                    })
                    .collect();
                self.remote_entries.push(Entry {
                    ctl: None,
                    instructions,
                });
                Ok(address)
            }
            Directive::Other(_) => Ok(address),
        }
    }

    /// Pass two: rewrite operand addresses through the address map,
    /// execute data directives, assemble, and poke.
    fn relocate(&mut self) -> SkoolResult<()> {
        self.substitute_labels();
        let entries = core::mem::take(&mut self.entries);
        for entry in &entries {
            for instruction in &entry.instructions {
                let mut address = instruction.real_address;
                for directive in &instruction.data {
                    let (data_address, data) = directive.eval(address)?;
                    self.poke(data_address, &data);
                    address = data_address + data.len() as Addr;
                }
                let bytes = self.assembler.assemble(
                    &instruction.operation,
                    instruction.real_address,
                )?;
                self.poke(instruction.real_address, &bytes);
                if self.options.verbose {
                    report_instruction(instruction);
                }
            }
        }
        self.entries = entries;
        Ok(())
    }

    /// Rewrite numeric operand addresses of every instruction through
    /// the address map, honouring `@keep`, and warn about branch
    /// targets that fall inside the assembled span without a mapping.
    fn substitute_labels(&mut self) {
        let span = self.address_map.keys().copied().min().zip(
            self.address_map.keys().copied().max(),
        );
        let mut remote: HashSet<Addr> = HashSet::new();
        for entry in &self.remote_entries {
            for instruction in &entry.instructions {
                if let Some(a) = instruction.skool_address {
                    remote.insert(a);
                }
            }
        }
        for entry in &mut self.entries {
            for instruction in &mut entry.instructions {
                let Some((target, span_of)) =
                    last_operand_address(&instruction.operation)
                else {
                    continue;
                };
                let kept = match &instruction.keep {
                    Some(addresses) => {
                        addresses.is_empty()
                            || addresses.contains(&target)
                    }
                    None => false,
                };
                if kept {
                    continue;
                }
                if let Some(new) = self.address_map.get(&target) {
                    if *new != target {
                        instruction.operation.replace_range(
                            span_of,
                            &new.to_string(),
                        );
                    }
                    continue;
                }
                let is_branch = ["DJ", "JR", "JP", "CA", "RS"]
                    .iter()
                    .any(|p| {
                        instruction
                            .operation
                            .to_ascii_uppercase()
                            .starts_with(p)
                    });
                let in_span = span.map_or(false, |(lo, hi)| {
                    (lo..=hi).contains(&target)
                });
                if is_branch
                    && in_span
                    && !remote.contains(&target)
                    && self.options.warn
                    && !instruction.nowarn
                {
                    warn_instruction(
                        &format!("Unreplaced address ({target})"),
                        instruction,
                    );
                }
            }
        }
    }

    /// Poke bytes and widen the observed bounds.
    fn poke(&mut self, address: Addr, data: &[u8]) {
        self.snapshot.poke(address, data);
        self.base_address = self.base_address.min(address);
        self.end_address = self
            .end_address
            .max((address as usize + data.len()).min(65536) as Addr);
    }
}

/// Find the last decimal or `$`-hex literal in an operation, returning
/// its value and byte range.
fn last_operand_address(
    operation: &str,
) -> Option<(Addr, core::ops::Range<usize>)> {
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
    let value = skool::parse_int(last.as_str())
        .filter(|a| *a < 65536)?;
    Some((value, last.range()))
}

/// Report a label problem on the diagnostic stream in the
/// `message:\n  DDDDD HHHH OPERATION` shape.
fn warn_instruction(message: &str, instruction: &Instruction) {
    let address = instruction.skool_address
        .unwrap_or(instruction.real_address);
    let _ = writeln!(
        std::io::stderr(),
        "WARNING: {message}:\n  {address:05} {address:04X} {}",
        instruction.operation
    );
}

/// Report one converted instruction on the diagnostic stream.
fn report_instruction(instruction: &Instruction) {
    let real = instruction.real_address;
    let suffix = match instruction.skool_address {
        Some(a) if a == real && instruction.original == instruction.operation => {
            String::new()
        }
        None if instruction.original == instruction.operation => {
            String::new()
        }
        None => format!(":            {}", instruction.original),
        Some(a) => {
            format!(": {a:05} {a:04X} {}", instruction.original)
        }
    };
    let line = format!(
        "{real:05} {real:04X} {} {:13} {suffix}",
        instruction.marker, instruction.operation
    );
    let _ = writeln!(std::io::stderr(), "{}", line.trim_end());
}
