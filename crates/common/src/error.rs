//! Container decode errors.

use thiserror::Error;

/// Errors raised while loading a bytecode container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// File is shorter than the 20-byte header.
    #[error("container truncated: {0} bytes, header needs 20")]
    TruncatedHeader(usize),

    /// The first eight bytes are not `OAKSCODE`.
    #[error("bad magic: not an OakScript container")]
    BadMagic,

    /// Format version newer than this loader supports.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    /// Declared section sizes do not fit within the file.
    #[error("declared sections need {declared} bytes, file holds {available}")]
    SectionOverrun { declared: u64, available: u64 },

    /// A string record extends past the end of the data section.
    #[error("string record {index} overruns the data section")]
    StringOverrun { index: usize },

    /// A string record is not valid UTF-8.
    #[error("string record {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },

    /// Leftover bytes inside the data section too short to form a record.
    #[error("{bytes} stray bytes at the end of the data section")]
    TrailingData { bytes: usize },
}
