//! Named components and the configuration value that selects and tunes
//! them.
//!
//! The instruction oracle is consumed through the [`Assembler`] and
//! [`Disassembler`] traits so that alternative implementations can be
//! selected by name.  [`get_disassembler`] resolves a selector from a
//! small registry; an unknown selector is a configuration error raised at
//! lookup time, before any analysis starts.

use std::collections::HashMap;

use skool::{Addr, Base, SkoolError, SkoolResult, Snapshot};

use crate::z80::{Z80Assembler, ZxDisassembler};

/// One decoded or synthesised statement of a disassembly.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DisInstruction {
    /// Where the statement starts
    pub address: Addr,

    /// The bytes the statement covers (empty for ignore placeholders)
    pub bytes: Vec<u8>,

    /// The operation text, e.g. `LD A,(31337)` or `DEFB 1,2,3`
    pub operation: String,

    /// The control character the formatter prefixes the line with
    /// (the entry kind on first instructions, `*` on entry points)
    pub ctl: Option<char>,

    /// The label attached by an `@label=` directive, if any.  An empty
    /// string is the "no label ever" sentinel: such an instruction never
    /// collects referrers.
    pub label: Option<String>,

    /// `@` directives attached to this address
    pub asm_directives: Vec<String>,

    /// Addresses of the entries that branch or call into this statement
    pub referrers: Vec<Addr>,
}

impl DisInstruction {
    /// A plain statement covering `bytes` at `address`.
    #[must_use]
    pub fn new(address: Addr, bytes: Vec<u8>, operation: String) -> Self {
        Self {
            address,
            bytes,
            operation,
            ..Self::default()
        }
    }

    /// The number of bytes the statement covers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Record a referring entry, preserving declaration order.
    pub fn add_referrer(&mut self, entry_address: Addr) {
        if !self.referrers.contains(&entry_address) {
            self.referrers.push(entry_address);
        }
    }
}

/// Sizes and encodes Z80 operations.
pub trait Assembler: std::fmt::Debug {
    /// The number of bytes `operation` assembles to at `address`.
    ///
    /// # Errors
    ///
    /// Returns an assembly error when the operation cannot be sized.
    fn get_size(&self, operation: &str, address: Addr) -> SkoolResult<usize>;

    /// Assemble `operation` into bytes at `address`.
    ///
    /// # Errors
    ///
    /// Returns an assembly error when the operation cannot be encoded.
    fn assemble(&self, operation: &str, address: Addr)
        -> SkoolResult<Vec<u8>>;
}

/// Decodes snapshot bytes into statements and synthesises data statements.
///
/// Implementations are stateless; the snapshot, range and configuration
/// arrive with every call so one boxed component serves a whole run.
pub trait Disassembler: std::fmt::Debug {
    /// Decode the instructions covering `[start, end)`.
    fn disassemble(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        base: Base,
    ) -> Vec<DisInstruction>;

    /// Synthesise DEFB statements over `[start, end)`.
    fn defb_range(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        sublengths: &[(usize, Base)],
        config: &Config,
        base: Base,
    ) -> Vec<DisInstruction>;

    /// Synthesise DEFM statements over `[start, end)`.
    fn defm_range(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        sublengths: &[(usize, Base)],
        config: &Config,
        base: Base,
    ) -> Vec<DisInstruction>;

    /// Synthesise one DEFS statement covering `[start, end)`.
    fn defs(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        base: Base,
    ) -> DisInstruction;

    /// Synthesise DEFW statements over `[start, end)`.
    fn defw_range(
        &self,
        snapshot: &Snapshot,
        start: Addr,
        end: Addr,
        sublengths: &[(usize, Base)],
        base: Base,
    ) -> Vec<DisInstruction>;

    /// An ignore placeholder covering `[start, end)`: present in the
    /// model, absent from assembled output.
    fn ignore(&self, start: Addr, end: Addr) -> Vec<DisInstruction>;
}

/// Configuration consumed by the disassembly-side components.
///
/// The keys correspond to the user-configurable section of a zedkit
/// configuration file: data-statement shaping, the disassembler selector,
/// and the comment templates.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum bytes per DEFB statement (`DefbSize`)
    pub defb_size: usize,

    /// Align DEFB statement addresses to this modulus (`DefbMod`)
    pub defb_mod: usize,

    /// Zero-pad decimal DEFB values to three digits (`DefbZfill`)
    pub defb_zfill: bool,

    /// Maximum characters per DEFM statement (`DefmSize`)
    pub defm_size: usize,

    /// The named disassembler variant to resolve (`Disassembler`)
    pub disassembler: String,

    /// Overrides for the comment templates (`Ref`, `Refs`,
    /// `EntryPointRef`, `EntryPointRefs`, `Title-{b,c,g,i,s,t,u,w}`)
    pub templates: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defb_size: 8,
            defb_mod: 1,
            defb_zfill: false,
            defm_size: 66,
            disassembler: "zx".to_owned(),
            templates: HashMap::new(),
        }
    }
}

impl Config {
    /// The template text for `key`, falling back to the built-in default.
    /// Unknown keys fall back to the empty string, which formats to an
    /// empty comment.
    #[must_use]
    pub fn template(&self, key: &str) -> &str {
        if let Some(text) = self.templates.get(key) {
            return text;
        }
        match key {
            "Ref" => "Used by the routine at {ref}.",
            "Refs" => "Used by the routines at {refs} and {ref}.",
            "EntryPointRef" => {
                "This entry point is used by the routine at {ref}."
            }
            "EntryPointRefs" => {
                "This entry point is used by the routines at {refs} and \
                 {ref}."
            }
            "Title-b" | "Title-w" => "Data block at {address}",
            "Title-c" => "Routine at {address}",
            "Title-g" => "Game status buffer entry at {address}",
            "Title-t" => "Message at {address}",
            "Title-s" | "Title-u" => "Unused",
            _ => "",
        }
    }
}

/// Fill `{name}` fields in a template.  Fields without a binding are left
/// in place, which makes a half-filled template visible in output rather
/// than silently wrong.
#[must_use]
pub fn format_template(
    template: &str,
    fields: &[(&str, &str)],
) -> String {
    let mut text = template.to_owned();
    for (name, value) in fields {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}

/// The assembler component.  There is one implementation; the seam exists
/// so reassembly experiments can swap it without touching the bin writer.
#[must_use]
pub fn get_assembler() -> Box<dyn Assembler> {
    Box::new(Z80Assembler)
}

/// Resolve a named disassembler variant.
///
/// # Errors
///
/// Returns a configuration error for a selector not present in the
/// registry.
pub fn get_disassembler(name: &str) -> SkoolResult<Box<dyn Disassembler>> {
    match name {
        "zx" => Ok(Box::new(ZxDisassembler)),
        _ => Err(SkoolError::Config(name.to_owned())),
    }
}
