//! Ctl maps and the control layout built from them.
//!
//! A ctl map is a sorted mapping from address to block kind whose largest
//! key is a terminal `i` sentinel; walking it as adjacent pairs yields the
//! blocks that partition the address space.  The [`CtlParser`] expands a
//! ctl map into [`CtlBlock`]/[`SubBlock`] structures: the shape the
//! disassembly model consumes, and the seam where a full control-file
//! parser plugs in.

use std::collections::{BTreeMap, HashMap, HashSet};

use itertools::Itertools;
use skool::{Addr, Base, BlockKind, SkoolResult, Snapshot};
use skool_parser::DataDirective;

use crate::components::DisInstruction;

/// A sorted address-to-kind mapping describing how to partition memory.
pub type CtlMap = BTreeMap<Addr, BlockKind>;

/// Walk a ctl map as adjacent pairs, yielding `(kind, start, next_start)`
/// for every block.  The final sentinel key closes the last block and
/// yields none of its own.
#[must_use]
pub fn get_blocks(ctls: &CtlMap) -> Vec<(BlockKind, Addr, Addr)> {
    ctls.iter()
        .tuple_windows()
        .map(|((start, kind), (end, _))| (*kind, *start, *end))
        .collect()
}

/// The comment positions an `@ignoreua` directive can annotate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CommentType {
    /// The entry title
    Title,
    /// The entry description paragraphs
    Description,
    /// The register documentation
    Registers,
    /// A mid-entry block header
    MidBlock,
    /// An instruction-level comment
    Instruction,
    /// The end comment
    End,
}

/// A contiguous portion of an entry with one rendering policy.
#[derive(Clone, Debug)]
pub struct SubBlock {
    /// How the range is rendered (code, data, text, ...)
    pub ctl: BlockKind,

    /// First address of the range
    pub start: Addr,

    /// One past the last address of the range
    pub end: Addr,

    /// `(length, base)` pairs grouping bytes into synthetic data
    /// statements; empty means "use the configured defaults"
    pub sublengths: Vec<(usize, Base)>,

    /// The comment shared by the range's instructions
    pub comment: String,

    /// Paragraphs written above the range
    pub header: Vec<String>,

    /// When set, following sub-blocks up to the given address are
    /// absorbed into this one and the text becomes its comment
    pub multiline_comment: Option<(Addr, String)>,

    /// `@` directives keyed by the instruction address they precede
    pub asm_directives: HashMap<Addr, Vec<String>>,

    /// `@ignoreua` annotations keyed by address and comment position
    pub ignoreua: HashSet<(Addr, CommentType)>,

    /// The instructions the range disassembles or synthesises to;
    /// populated by the disassembly model
    pub instructions: Vec<DisInstruction>,
}

impl SubBlock {
    /// A bare sub-block covering `[start, end)` with kind `ctl`.
    #[must_use]
    pub fn new(ctl: BlockKind, start: Addr, end: Addr) -> Self {
        Self {
            ctl,
            start,
            end,
            sublengths: Vec::new(),
            comment: String::new(),
            header: Vec::new(),
            multiline_comment: None,
            asm_directives: HashMap::new(),
            ignoreua: HashSet::new(),
            instructions: Vec::new(),
        }
    }

    /// True when an `@ignoreua` annotates `comment_type` at `address`.
    #[must_use]
    pub fn has_ignoreua(
        &self,
        address: Addr,
        comment_type: CommentType,
    ) -> bool {
        self.ignoreua.contains(&(address, comment_type))
    }
}

/// One top-level block of the control layout.
#[derive(Clone, Debug)]
pub struct CtlBlock {
    /// The entry kind
    pub ctl: BlockKind,

    /// First address of the block
    pub start: Addr,

    /// One past the last address of the block
    pub end: Addr,

    /// The entry title, when the control source declared one
    pub title: Option<String>,

    /// Description paragraphs
    pub description: Vec<String>,

    /// `(register, description)` documentation pairs
    pub registers: Vec<(String, String)>,

    /// Paragraphs written after the entry's last instruction
    pub end_comment: Vec<String>,

    /// Verbatim lines written above the entry
    pub header: Vec<String>,

    /// Verbatim lines written below the entry
    pub footer: Vec<String>,

    /// Entry-level `@` directives
    pub asm_directives: Vec<String>,

    /// Entry-level `@ignoreua` annotations
    pub ignoreua: HashSet<CommentType>,

    /// The block's sub-blocks, in address order
    pub blocks: Vec<SubBlock>,
}

impl CtlBlock {
    /// A bare block covering `[start, end)` with a single sub-block.
    #[must_use]
    pub fn new(ctl: BlockKind, start: Addr, end: Addr) -> Self {
        Self {
            ctl,
            start,
            end,
            title: None,
            description: Vec::new(),
            registers: Vec::new(),
            end_comment: Vec::new(),
            header: Vec::new(),
            footer: Vec::new(),
            asm_directives: Vec::new(),
            ignoreua: HashSet::new(),
            blocks: vec![SubBlock::new(ctl, start, end)],
        }
    }
}

/// Expands a ctl map into the block/sub-block layout the disassembly
/// model consumes.
pub struct CtlParser {
    /// The expanded top-level blocks
    blocks: Vec<CtlBlock>,

    /// Data directives to apply to the snapshot before disassembly
    data_directives: Vec<DataDirective>,
}

impl CtlParser {
    /// Build the layout from a ctl map: one top-level block per adjacent
    /// pair, each carrying a single sub-block spanning the block.
    #[must_use]
    pub fn from_ctls(ctls: &CtlMap) -> Self {
        let blocks = get_blocks(ctls)
            .into_iter()
            .map(|(kind, start, end)| CtlBlock::new(kind, start, end))
            .collect();
        Self {
            blocks,
            data_directives: Vec::new(),
        }
    }

    /// The expanded top-level blocks, in address order.
    #[must_use]
    pub fn get_blocks(&self) -> &[CtlBlock] {
        &self.blocks
    }

    /// Attach a data directive to be applied before disassembly.
    pub fn add_data_directive(&mut self, directive: DataDirective) {
        self.data_directives.push(directive);
    }

    /// Poke every attached `@defb`/`@defs`/`@defw` directive into the
    /// snapshot.  Directives without an explicit address are ignored
    /// here; they only make sense anchored to an instruction.
    ///
    /// # Errors
    ///
    /// Returns a parse error for a malformed directive value.
    pub fn apply_asm_data_directives(
        &self,
        snapshot: &mut Snapshot,
    ) -> SkoolResult<()> {
        for directive in &self.data_directives {
            if directive.address.is_some() {
                let (address, data) = directive.eval(0)?;
                snapshot.poke(address, &data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    /// A three-block map: code at 30000, data at 30010, sentinel at 30020.
    fn sample_ctls() -> CtlMap {
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30010, BlockKind::Data);
        ctls.insert(30020, BlockKind::Ignore);
        ctls
    }

    #[test]
    fn blocks_come_from_adjacent_pairs() {
        assert_eq!(
            get_blocks(&sample_ctls()),
            vec![
                (BlockKind::Code, 30000, 30010),
                (BlockKind::Data, 30010, 30020),
            ],
            "the sentinel closes the last block without yielding one"
        );
    }

    #[test]
    fn layout_covers_every_block() {
        let parser = CtlParser::from_ctls(&sample_ctls());
        let blocks = parser.get_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].ctl, BlockKind::Code);
        assert_eq!(blocks[0].blocks.len(), 1);
        assert_eq!(blocks[0].blocks[0].start, 30000);
        assert_eq!(blocks[0].blocks[0].end, 30010);
        assert_eq!(blocks[1].ctl, BlockKind::Data);
    }

    #[test]
    fn data_directives_poke_the_snapshot() {
        let mut parser = CtlParser::from_ctls(&sample_ctls());
        parser.add_data_directive(
            DataDirective::parse("defb=30010:1,2,3").unwrap(),
        );
        let mut snapshot = Snapshot::new();
        parser.apply_asm_data_directives(&mut snapshot).unwrap();
        assert_eq!(snapshot.slice(30010, 30013), &[1, 2, 3]);
    }
}
