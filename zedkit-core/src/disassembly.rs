use std::collections::HashMap;

use skool::{Addr, Base, BlockKind, SkoolResult, Snapshot};

use crate::components::{
    format_template, get_disassembler, Config, DisInstruction, Disassembler,
};
use crate::ctl::{CommentType, CtlParser, SubBlock};
use crate::z80::operand_address;

/// A location in the entry arena: entry index, block index, instruction
/// index.  Handles are only valid until the next `build`.
type InstrHandle = (usize, usize, usize);

/// A top-level block of the disassembly: one kind, a bounding address
/// range, and the sub-blocks (which own the instructions).
#[derive(Clone, Debug)]
pub struct Entry {
    /// The entry kind
    pub ctl: BlockKind,

    /// The entry's first address
    pub address: Addr,

    /// The entry title (absent when neither the control source nor the
    /// title templates produced one)
    pub title: Option<String>,

    /// Description paragraphs
    pub description: Vec<String>,

    /// `(register, description)` documentation pairs
    pub registers: Vec<(String, String)>,

    /// The sub-blocks, each owning its instructions
    pub blocks: Vec<SubBlock>,

    /// Paragraphs written after the last instruction
    pub end_comment: Vec<String>,

    /// Verbatim lines above the entry
    pub header: Vec<String>,

    /// Verbatim lines below the entry
    pub footer: Vec<String>,

    /// Entry-level `@` directives
    pub asm_directives: Vec<String>,

    /// Entry-level `@ignoreua` annotations
    pub ignoreua: std::collections::HashSet<CommentType>,

    /// The next entry's address; `None` on the last entry.  A non-owning
    /// forward link, never traversed for destruction.
    pub next_address: Option<Addr>,

    /// Indices of sub-blocks whose last instruction overruns the block
    /// end (an instruction straddles the boundary)
    pub bad_blocks: Vec<usize>,
}

impl Entry {
    /// Every instruction of the entry, in address order.
    pub fn instructions(&self) -> impl Iterator<Item = &DisInstruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// The widest operation text in the entry.
    #[must_use]
    pub fn width(&self) -> usize {
        self.instructions()
            .map(|i| i.operation.len())
            .max()
            .unwrap_or(0)
    }

    /// One past the entry's last address.
    #[must_use]
    pub fn end(&self) -> Addr {
        self.blocks.last().map_or(self.address, |b| b.end)
    }

    /// True when an `@ignoreua` annotates `comment_type` on this entry.
    #[must_use]
    pub fn has_ignoreua(&self, comment_type: CommentType) -> bool {
        self.ignoreua.contains(&comment_type)
    }
}

/// The disassembly model: entries regenerated from a control layout, an
/// address-to-instruction index, and cross-references.
///
/// Entries own their blocks; blocks own their instructions; referrers are
/// entry addresses, so no owning cycle exists.  Entries are cached by
/// address across rebuilds; [`Disassembly::remove_entry`] evicts one so
/// the next build regenerates it from the current ctl map.
pub struct Disassembly<'a> {
    /// The memory being disassembled
    snapshot: &'a Snapshot,

    /// The oracle resolved from the configuration
    codec: Box<dyn Disassembler>,

    /// Data-statement shaping and title templates
    config: Config,

    /// Default rendering base for operands and addresses
    base: Base,

    /// Cached entries keyed by start address
    entry_map: HashMap<Addr, Entry>,

    /// The entries of the current build, in address order
    pub entries: Vec<Entry>,

    /// Address-to-instruction index for the current build
    index: HashMap<Addr, InstrHandle>,

    /// The first entry's address, when any entry exists
    pub org: Option<Addr>,
}

impl<'a> Disassembly<'a> {
    /// Build a disassembly over `snapshot` from a control layout.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the configured disassembler
    /// selector is unknown.
    pub fn new(
        snapshot: &'a Snapshot,
        ctl_parser: &CtlParser,
        config: &Config,
        base: Base,
        final_build: bool,
    ) -> SkoolResult<Self> {
        let mut disassembly = Self {
            snapshot,
            codec: get_disassembler(&config.disassembler)?,
            config: config.clone(),
            base,
            entry_map: HashMap::new(),
            entries: Vec::new(),
            index: HashMap::new(),
            org: None,
        };
        disassembly.build(ctl_parser, final_build);
        Ok(disassembly)
    }

    /// Regenerate the entries from the control layout.  Entries cached
    /// from earlier builds are reused unless evicted; `final_build`
    /// additionally recalculates cross-references.
    pub fn build(&mut self, ctl_parser: &CtlParser, final_build: bool) {
        self.entries.clear();
        self.index.clear();
        for block in ctl_parser.get_blocks() {
            let entry = match self.entry_map.get(&block.start) {
                Some(entry) => entry.clone(),
                None => {
                    let entry = self.create_entry(block);
                    self.entry_map.insert(block.start, entry.clone());
                    entry
                }
            };
            self.entries.push(entry);
        }
        for i in 0..self.entries.len() {
            self.entries[i].next_address =
                self.entries.get(i + 1).map(|e| e.address);
        }
        self.reindex();
        self.org = self.entries.first().map(|e| e.address);
        if final_build {
            self.calculate_references();
        }
    }

    /// Drop a cached entry so the next build regenerates it.
    pub fn remove_entry(&mut self, address: Addr) {
        self.entry_map.remove(&address);
    }

    /// The instruction at `address`, if one starts there.
    #[must_use]
    pub fn instruction(&self, address: Addr) -> Option<&DisInstruction> {
        let (e, b, i) = *self.index.get(&address)?;
        Some(&self.entries[e].blocks[b].instructions[i])
    }

    /// Disassemble or synthesise one top-level block into an entry.
    fn create_entry(&self, block: &crate::ctl::CtlBlock) -> Entry {
        let mut blocks: Vec<SubBlock> = Vec::new();
        for sub_block in &block.blocks {
            let mut sub_block = sub_block.clone();
            sub_block.instructions = self.disassemble_sub_block(&sub_block);
            annotate_instructions(&mut sub_block);
            blocks.push(sub_block);
        }

        // Absorb the sub-blocks covered by a multi-line comment group
        let mut grouped: Vec<SubBlock> = Vec::new();
        for sub_block in blocks {
            let absorb = grouped.last().is_some_and(|last| {
                last.multiline_comment
                    .as_ref()
                    .is_some_and(|(end, _)| sub_block.start < *end)
            });
            if absorb {
                if let Some(last) = grouped.last_mut() {
                    last.instructions.extend(sub_block.instructions);
                    last.end = sub_block.end;
                }
            } else {
                grouped.push(sub_block);
            }
        }
        for sub_block in &mut grouped {
            if let Some((_, text)) = sub_block.multiline_comment.take() {
                sub_block.comment = text;
            }
        }

        // The first instruction carries the entry's control character
        if let Some(first) = grouped
            .first_mut()
            .and_then(|b| b.instructions.first_mut())
        {
            first.ctl = Some(block.ctl.to_char());
        }

        let bad_blocks = grouped
            .iter()
            .enumerate()
            .filter(|(_, b)| {
                b.instructions.last().is_some_and(|last| {
                    last.address + last.size() as Addr > b.end
                })
            })
            .map(|(i, _)| i)
            .collect();

        Entry {
            ctl: block.ctl,
            address: block.start,
            title: self.entry_title(block),
            description: block.description.clone(),
            registers: block.registers.clone(),
            blocks: grouped,
            end_comment: block.end_comment.clone(),
            header: block.header.clone(),
            footer: block.footer.clone(),
            asm_directives: block.asm_directives.clone(),
            ignoreua: block.ignoreua.clone(),
            next_address: None,
            bad_blocks,
        }
    }

    /// The block's explicit title, or one derived from the `Title-*`
    /// templates.  A bare ignore tail gets none.
    fn entry_title(&self, block: &crate::ctl::CtlBlock) -> Option<String> {
        if let Some(title) = &block.title {
            return Some(title.clone());
        }
        let plain_ignore = block.ctl == BlockKind::Ignore
            && block.description.is_empty()
            && block.registers.is_empty()
            && block.blocks.first().map_or(true, |b| b.header.is_empty());
        if plain_ignore {
            return None;
        }
        let template = self
            .config
            .template(&format!("Title-{}", block.ctl.to_char()))
            .to_owned();
        let title = format_template(
            &template,
            &[("address", &self.base.addr_str_short(block.start))],
        );
        (!title.is_empty()).then_some(title)
    }

    /// Dispatch one sub-block to the oracle according to its kind.
    fn disassemble_sub_block(
        &self,
        sub_block: &SubBlock,
    ) -> Vec<DisInstruction> {
        let base = sub_block
            .sublengths
            .first()
            .map_or(self.base, |(_, base)| *base);
        match sub_block.ctl {
            BlockKind::Code
            | BlockKind::ByteRange
            | BlockKind::TextRange
            | BlockKind::CodeRange
            | BlockKind::Unknown
            | BlockKind::Deferred => self.codec.disassemble(
                self.snapshot,
                sub_block.start,
                sub_block.end,
                base,
            ),
            BlockKind::Ignore => {
                self.codec.ignore(sub_block.start, sub_block.end)
            }
            kind => self.data_statements(sub_block, kind, base),
        }
    }

    /// Synthesise the data statements of a `b`/`g`/`s`/`t`/`u`/`w`
    /// sub-block, honouring its sublengths.
    fn data_statements(
        &self,
        sub_block: &SubBlock,
        kind: BlockKind,
        base: Base,
    ) -> Vec<DisInstruction> {
        let sublengths = &sub_block.sublengths;
        let declared = sublengths.first().map_or(0, |(length, _)| *length);
        let length = if declared > 0 {
            if kind == BlockKind::Zero {
                declared
            } else {
                sublengths.iter().map(|(length, _)| length).sum()
            }
        } else {
            (sub_block.end - sub_block.start) as usize
        };
        let mut instructions = Vec::new();
        let mut address = sub_block.start;
        while address < sub_block.end {
            let stop = sub_block.end.min(address + length.max(1) as Addr);
            match kind {
                BlockKind::Text => instructions.extend(
                    self.codec.defm_range(
                        self.snapshot,
                        address,
                        stop,
                        sublengths,
                        &self.config,
                        base,
                    ),
                ),
                BlockKind::Word => {
                    instructions.extend(self.codec.defw_range(
                        self.snapshot,
                        address,
                        stop,
                        sublengths,
                        base,
                    ));
                }
                BlockKind::Zero => instructions.push(
                    self.codec.defs(self.snapshot, address, stop, base),
                ),
                _ => instructions.extend(self.codec.defb_range(
                    self.snapshot,
                    address,
                    stop,
                    sublengths,
                    &self.config,
                    base,
                )),
            }
            address = stop;
        }
        instructions
    }

    /// Rebuild the address-to-instruction index over the current
    /// entries.
    fn reindex(&mut self) {
        for (e, entry) in self.entries.iter().enumerate() {
            for (b, block) in entry.blocks.iter().enumerate() {
                for (i, instruction) in
                    block.instructions.iter().enumerate()
                {
                    self.index.insert(instruction.address, (e, b, i));
                }
            }
        }
    }

    /// Recompute every instruction's referrer list from the branch,
    /// call and restart operations in the current entries.
    fn calculate_references(&mut self) {
        for entry in &mut self.entries {
            for block in &mut entry.blocks {
                for instruction in &mut block.instructions {
                    instruction.referrers.clear();
                }
            }
        }
        let mut references: Vec<(InstrHandle, Addr)> = Vec::new();
        for (e, entry) in self.entries.iter().enumerate() {
            for instruction in entry.instructions() {
                let operation = instruction.operation.to_ascii_uppercase();
                let is_branch = ["DJ", "JR", "JP", "CA", "RS"]
                    .iter()
                    .any(|prefix| operation.starts_with(prefix));
                if !is_branch {
                    continue;
                }
                let Some(target) = operand_address(&operation) else {
                    continue;
                };
                let Some(handle) = self.index.get(&target) else {
                    continue;
                };
                let callee =
                    &self.entries[handle.0].blocks[handle.1].instructions
                        [handle.2];
                let internal = handle.0 == e;
                let unlabelled =
                    callee.label.as_deref() == Some("");
                if (entry.ctl != BlockKind::Unused || internal)
                    && !unlabelled
                {
                    references.push((*handle, entry.address));
                }
            }
        }
        for ((e, b, i), referrer) in references {
            self.entries[e].blocks[b].instructions[i]
                .add_referrer(referrer);
        }
    }
}

/// Attach per-address `@` directives to a sub-block's instructions and
/// honour `@label=` (a `*`-prefixed label marks an entry point).
fn annotate_instructions(sub_block: &mut SubBlock) {
    for instruction in &mut sub_block.instructions {
        let Some(directives) =
            sub_block.asm_directives.get(&instruction.address)
        else {
            continue;
        };
        instruction.asm_directives = directives.clone();
        for directive in directives {
            if let Some(label) = directive.strip_prefix("label=") {
                instruction.label = Some(label.to_owned());
                if label.starts_with('*') {
                    instruction.ctl = Some('*');
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;
    use skool::ADDR_LIMIT;

    use super::*;
    use crate::ctl::CtlMap;

    /// Build a disassembly over `ctls` with default config, decimal base.
    fn build<'a>(snapshot: &'a Snapshot, ctls: &CtlMap) -> Disassembly<'a> {
        Disassembly::new(
            snapshot,
            &CtlParser::from_ctls(ctls),
            &Config::default(),
            Base::Decimal,
            true,
        )
        .unwrap()
    }

    /// `{30000: c, 30003: i}` over `LD A,0 / RET`.
    fn code_snapshot() -> (Snapshot, CtlMap) {
        let snapshot = Snapshot::from_data(&[0x3E, 0x00, 0xC9], 30000);
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30003, BlockKind::Ignore);
        (snapshot, ctls)
    }

    #[test]
    fn code_entries_decode_their_instructions() {
        let (snapshot, ctls) = code_snapshot();
        let disassembly = build(&snapshot, &ctls);
        // The sentinel key closes the block without becoming an entry
        assert_eq!(disassembly.entries.len(), 1);
        let entry = &disassembly.entries[0];
        assert_eq!(entry.ctl, BlockKind::Code);
        let operations: Vec<&str> = entry
            .instructions()
            .map(|i| i.operation.as_str())
            .collect();
        assert_eq!(operations, vec!["LD A,0", "RET"]);
        assert_eq!(entry.width(), 6);
        assert_eq!(entry.title.as_deref(), Some("Routine at 30000"));
    }

    #[test]
    fn entries_link_forward() {
        let mut snapshot = Snapshot::new();
        snapshot.poke(30000, &[0xC9]);
        snapshot.poke(30010, &[0xC9]);
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30010, BlockKind::Code);
        ctls.insert(30011, BlockKind::Ignore);
        let disassembly = build(&snapshot, &ctls);
        assert_eq!(disassembly.entries[0].next_address, Some(30010));
        assert_eq!(disassembly.entries[1].next_address, None);
        assert_eq!(disassembly.org, Some(30000));
    }

    #[test]
    fn referrers_record_the_calling_entry() {
        // 30000: CALL 30010 / RET;  30010: RET
        let mut snapshot = Snapshot::new();
        snapshot.poke(30000, &[0xCD, 0x3A, 0x75, 0xC9]);
        snapshot.poke(30010, &[0xC9]);
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30010, BlockKind::Code);
        ctls.insert(30011, BlockKind::Ignore);
        let disassembly = build(&snapshot, &ctls);
        let callee = disassembly.instruction(30010).unwrap();
        assert_eq!(callee.referrers, vec![30000]);
    }

    #[test]
    fn references_from_unused_entries_only_count_internally() {
        // An unused block that jumps to a routine: no referrer recorded
        let mut snapshot = Snapshot::new();
        snapshot.poke(30000, &[0xC3, 0x3A, 0x75]);
        snapshot.poke(30010, &[0xC9]);
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Unused);
        ctls.insert(30010, BlockKind::Code);
        ctls.insert(30011, BlockKind::Ignore);
        let disassembly = build(&snapshot, &ctls);
        assert!(
            disassembly
                .instruction(30010)
                .unwrap()
                .referrers
                .is_empty(),
            "an unused entry must not contribute external referrers"
        );
    }

    #[test]
    fn removed_entries_are_rebuilt_from_the_new_map() {
        let (snapshot, mut ctls) = code_snapshot();
        let mut disassembly = build(&snapshot, &ctls);
        assert_eq!(disassembly.entries[0].ctl, BlockKind::Code);

        // Reclassify the block as data; the cached entry must go stale
        // only after eviction
        ctls.insert(30000, BlockKind::Data);
        disassembly.build(&CtlParser::from_ctls(&ctls), false);
        assert_eq!(
            disassembly.entries[0].ctl,
            BlockKind::Code,
            "cached entry survives until evicted"
        );
        disassembly.remove_entry(30000);
        disassembly.build(&CtlParser::from_ctls(&ctls), false);
        assert_eq!(disassembly.entries[0].ctl, BlockKind::Data);
        assert!(disassembly.entries[0]
            .instructions()
            .next()
            .unwrap()
            .operation
            .starts_with("DEFB"));
    }

    #[test]
    fn bad_blocks_flag_boundary_overruns() {
        // A 3-byte JP truncated by a block boundary one byte in
        let snapshot = Snapshot::from_data(&[0xC3, 0x00, 0x80], 30000);
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30001, BlockKind::Code);
        ctls.insert(30004, BlockKind::Ignore);
        let disassembly = build(&snapshot, &ctls);
        assert_eq!(
            disassembly.entries[0].bad_blocks.len(),
            1,
            "the instruction overruns its block and must be flagged"
        );
    }

    #[test]
    fn zero_blocks_become_defs_statements() {
        let snapshot = Snapshot::new();
        let mut ctls = CtlMap::new();
        ctls.insert(40000, BlockKind::Zero);
        ctls.insert(40100, BlockKind::Ignore);
        let disassembly = build(&snapshot, &ctls);
        let operations: Vec<&str> = disassembly.entries[0]
            .instructions()
            .map(|i| i.operation.as_str())
            .collect();
        assert_eq!(operations, vec!["DEFS 100"]);
    }

    #[test]
    fn ignore_tail_is_a_placeholder_entry() {
        let snapshot = Snapshot::new();
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30001, BlockKind::Ignore);
        ctls.insert(ADDR_LIMIT, BlockKind::Ignore);
        let disassembly = build(&snapshot, &ctls);
        let tail = &disassembly.entries[1];
        assert_eq!(tail.ctl, BlockKind::Ignore);
        assert!(tail.title.is_none(), "a bare ignore tail has no title");
        assert_eq!(tail.instructions().count(), 1);
        assert_eq!(tail.instructions().next().unwrap().operation, "");
    }
}
