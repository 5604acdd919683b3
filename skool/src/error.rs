use core::fmt;
use std::io;

use crate::Addr;

/// Result type shared by the tools in this workspace
pub type SkoolResult<T> = core::result::Result<T, SkoolError>;

/// Possible error kinds for skool, ctl, snapshot and code-map processing.
///
/// Structural faults are fatal: the first error aborts the run so users
/// see correct output or none.  Warnings (overlapping blocks, unresolved
/// operand addresses) are not errors; they travel through warning sinks.
#[derive(Debug)]
pub enum SkoolError {
    /// A malformed skool line, address literal, directive operand, or an
    /// unclosed bracket/brace/marker in wrapped text
    Parse(String),

    /// The instruction oracle refused to size or encode an operation
    Assembly {
        /// The address the operation was to be assembled at
        address: Addr,
        /// The operation text as written in the source
        operation: String,
    },

    /// An unrecognised or unparseable code-map file
    CodeMap(String),

    /// An I/O failure, with the path or stream that caused it
    Io {
        /// What was being read or written
        context: String,
        /// The underlying OS error
        source: io::Error,
    },

    /// An unknown component selector in the configuration
    Config(String),
}

impl SkoolError {
    /// Wrap an I/O error with the path it occurred on.
    #[must_use]
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl fmt::Display for SkoolError {
    #[allow(clippy::pattern_type_mismatch)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "{msg}"),
            Self::Assembly { address, operation } => {
                write!(f, "Failed to assemble:\n {address} {operation}")
            }
            Self::CodeMap(msg) => write!(f, "{msg}"),
            Self::Io { context, source } => {
                write!(f, "{context}: {source}")
            }
            Self::Config(component) => {
                write!(f, "Unknown component: {component}")
            }
        }
    }
}

impl std::error::Error for SkoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
