//! # Zedkit-Core
//!
//! Zedkit-Core holds the analyses behind the Zedkit tools: converting
//! annotated Z80 disassembly sources ("skool" files) back into raw memory
//! images, and converting 64 KiB ZX Spectrum snapshots into control files
//! or fully formatted skool files.
//!
//! ## The two pipelines
//!
//! **Skool to binary.**  [`BinWriter`] reads a skool file, applies the
//! substitution and fix directives enabled by the chosen asm/fix modes,
//! relocates instructions whose sizes change, assembles every operation
//! with the instruction oracle, and pokes the result into a [`Snapshot`]
//! ready to be written out as a raw binary.
//!
//! **Snapshot to skool.**  [`generate_ctls`] partitions a snapshot into
//! code, text, data and zero blocks, guided by an execution trace from an
//! emulator when one is available ([`read_code_blocks`]), producing a ctl
//! map.  [`Disassembly`] turns a ctl map into entries, blocks and
//! instructions with cross-references, and [`SkoolWriter`] formats the
//! model as skool text.  [`write_ctl`] serialises the ctl map directly.
//!
//! Both pipelines lean on the same oracle: a Z80 mnemonic assembler and
//! disassembler selected through the component registry in [`components`].
//!
//! [`Snapshot`]: skool::Snapshot

// Make clippy as annoying as possible
#![deny(
    // All typically enabled warnings are converted into errors
    // includes correctness, suspicious, style, complexity, and perf
    clippy::all,
    // Error on cargo lints
    clippy::cargo,
)]
#![warn(
    // Warn on pedantic and in-development nursery lints
    clippy::pedantic,
    clippy::nursery,
    // Lints from "restriction" group - enforce a consistent if arbitrary style
    clippy::alloc_instead_of_core,
    clippy::unnecessary_cast,
    clippy::as_underscore,
    clippy::assertions_on_result_states,
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_drop,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::expect_used,
    clippy::filetype_is_file,
    clippy::float_arithmetic,
    clippy::fn_to_numeric_cast_any,
    clippy::format_push_string,
    clippy::get_unwrap,
    clippy::if_then_some_else_none,
    clippy::large_include_file,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::map_err_ignore,
    clippy::mem_forget,
    clippy::missing_docs_in_private_items,
    clippy::missing_enforced_import_renames,
    clippy::mixed_read_write_in_expression,
    clippy::mod_module_files,
    clippy::multiple_inherent_impl,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::partial_pub_fields,
    clippy::pattern_type_mismatch,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::unseparated_literal_suffix,
    clippy::shadow_unrelated,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::suspicious_xor_used_as_pow,
    clippy::todo,
    clippy::try_err,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented,
    clippy::unnecessary_safety_comment,
    clippy::unnecessary_safety_doc,
    clippy::unnecessary_self_imports,
    clippy::unneeded_field_pattern,
    clippy::unreachable,
    clippy::unwrap_in_result,
    clippy::unwrap_used,
    clippy::use_debug,
    clippy::verbose_file_reads,
)]

/// The component registry and the typed configuration threaded through it
pub mod components;

/// The Z80 instruction oracle: mnemonic assembly, byte decoding, and the
/// synthesised DEFB/DEFM/DEFS/DEFW statement surface
pub mod z80;

/// Ctl maps and the control layout (blocks and sub-blocks)
pub mod ctl;

/// Code-map readers for the four supported profiler formats
mod codemap;
pub use codemap::read_code_blocks;

/// The block classifier and the ctl emitter
mod ctlgen;
pub use ctlgen::{generate_ctls, write_ctl};

/// The disassembly model: entries, blocks, instructions, referrers
mod disassembly;
pub use disassembly::{Disassembly, Entry};

/// The skool formatter
mod skoolwriter;
pub use skoolwriter::{SkoolWriter, WriteOptions};

/// The two-pass relocating skool-to-binary assembler
mod binwriter;
pub use binwriter::{BinWriter, BinWriterOptions};
