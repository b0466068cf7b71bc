//! Bytecode errors

use thiserror::Error;

use crate::value::Tag;

/// Errors that can occur while decoding or encoding a bytecode object stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Version byte differs from [`crate::BC_VERSION`]
    #[error("Unsupported version: {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version byte found in the stream
        found: u8,
        /// The only version this codec reads
        expected: u8,
    },

    /// A read needs more bytes than the buffer holds
    #[error("Unexpected end of bytecode at offset {offset}: need {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Offset of the failed read
        offset: usize,
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Five varint bytes all had the continuation bit set
    #[error("Unterminated varint at offset {offset}")]
    UnterminatedVarint {
        /// Offset of the varint's first byte
        offset: usize,
    },

    /// Varint value does not fit the target integer
    #[error("Varint overflow at offset {offset}")]
    VarintOverflow {
        /// Offset of the varint's first byte
        offset: usize,
    },

    /// Varint carries redundant trailing zero groups
    #[error("Non-canonical varint at offset {offset}")]
    NonCanonicalVarint {
        /// Offset of the varint's first byte
        offset: usize,
    },

    /// Signed varint with the sign bit set and a zero magnitude
    #[error("Negative zero signed varint at offset {offset}")]
    NegativeZero {
        /// Offset of the varint's first byte
        offset: usize,
    },

    /// Tag byte outside the known enumeration
    #[error("Invalid tag {byte} at offset {offset}")]
    InvalidTag {
        /// Offset of the tag byte
        offset: usize,
        /// The offending byte
        byte: u8,
    },

    /// Tag is known but this codec does not read or write it
    #[error("Unsupported tag: {}", .0.name())]
    UnsupportedTag(Tag),

    /// Atom id past the end of builtin plus dynamic atoms
    #[error("Atom index {index} out of range (table has {len} atoms)")]
    AtomOutOfRange {
        /// Requested atom id
        index: u32,
        /// builtin + dynamic atom count
        len: usize,
    },

    /// A flag byte has bits set that the format leaves unused
    #[error("Reserved bits set in {what} at offset {offset}")]
    ReservedBits {
        /// Offset of the flag byte
        offset: usize,
        /// Which record the byte belongs to
        what: &'static str,
    },

    /// Function bytecode was found but the options forbid it
    #[error("Function bytecode not allowed")]
    BytecodeNotAllowed,

    /// Function nesting deeper than [`crate::CodecOptions::max_depth`]
    #[error("Function nesting exceeds depth limit {limit}")]
    DepthLimitExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Bytes left over after the top-level value
    #[error("{remaining} trailing bytes at offset {offset}")]
    TrailingBytes {
        /// Offset just past the top-level value
        offset: usize,
        /// Number of unread bytes
        remaining: usize,
    },

    /// An atom in the tree is not in the table handed to the encoder
    #[error("Atom {index} does not match the encoder's atom table")]
    AtomMismatch {
        /// Atom id carried by the tree
        index: u32,
    },

    /// `hasDebug` flag and the presence of debug info disagree
    #[error("Function flags and debug info disagree")]
    DebugFlagMismatch,

    /// A length or count does not fit the wire's 32-bit range
    #[error("{what} length {len} exceeds u32 range")]
    LengthOverflow {
        /// What was being counted
        what: &'static str,
        /// The actual length
        len: usize,
    },
}

/// Coarse classification of a [`BytecodeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input is not a valid bytecode object stream
    Format,
    /// The input uses a tag this codec does not implement
    UnsupportedTag,
    /// The tree handed to the encoder cannot be written
    Encode,
}

impl BytecodeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedTag(_) => ErrorKind::UnsupportedTag,
            Self::AtomMismatch { .. } | Self::DebugFlagMismatch | Self::LengthOverflow { .. } => {
                ErrorKind::Encode
            }
            Self::UnsupportedVersion { .. }
            | Self::UnexpectedEnd { .. }
            | Self::UnterminatedVarint { .. }
            | Self::VarintOverflow { .. }
            | Self::NonCanonicalVarint { .. }
            | Self::NegativeZero { .. }
            | Self::InvalidTag { .. }
            | Self::AtomOutOfRange { .. }
            | Self::ReservedBits { .. }
            | Self::BytecodeNotAllowed
            | Self::DepthLimitExceeded { .. }
            | Self::TrailingBytes { .. } => ErrorKind::Format,
        }
    }

    /// True for errors meaning "not a valid bytecode object stream"
    pub fn is_format_error(&self) -> bool {
        self.kind() == ErrorKind::Format
    }
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
