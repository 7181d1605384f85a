//! Codec error types.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing or serializing DNS messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer ended before the expected structure was complete.
    #[error("unexpected end of message at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// The fixed 12-byte header could not be read.
    #[error("malformed header: message is {actual} bytes, need {expected}")]
    MalformedHeader { expected: usize, actual: usize },

    /// A section held fewer records than its header count promised.
    #[error("section count mismatch in {section}: expected {expected} records")]
    SectionCountMismatch {
        section: &'static str,
        expected: u16,
    },

    /// A label exceeded 63 bytes.
    #[error("label too long: {length} bytes")]
    LabelTooLong { length: usize },

    /// A name exceeded 255 bytes of wire format.
    #[error("name too long: {length} bytes")]
    NameTooLong { length: usize },

    /// A label carried a character outside the hostname alphabet.
    #[error("invalid character {character:?} in label")]
    InvalidLabelChar { character: char },

    /// A compression pointer referenced an equal or later offset.
    #[error("invalid compression pointer at offset {offset} targeting {target}")]
    InvalidCompressionPointer { offset: usize, target: usize },

    /// Pointer chasing exceeded the loop-detection bound.
    #[error("too many compression pointer jumps (limit {limit})")]
    TooManyCompressionJumps { limit: usize },

    /// A reserved label type (0x40/0x80 prefix) appeared.
    #[error("invalid label type {value:#04x} at offset {offset}")]
    InvalidLabelType { value: u8, offset: usize },

    /// A message carried more than one OPT pseudo-record.
    #[error("multiple OPT records in additional section")]
    MultipleOptRecords,

    /// RDATA did not match the declared RDLENGTH for its type.
    #[error("bad RDATA for {rtype}: {message}")]
    BadRData {
        rtype: &'static str,
        message: String,
    },

    /// The message did not fit the 16-bit TCP length prefix.
    #[error("message too large for transport: {length} bytes")]
    MessageTooLarge { length: usize },
}

impl Error {
    pub(crate) fn eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }
}
