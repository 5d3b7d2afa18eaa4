//! Error types for message decoding and encoding.

/// Errors produced while parsing a record or a message payload.
///
/// Any of these means the input is malformed. A stream reader that hits one
/// must stop, since the byte position of the next record can no longer be
/// trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Truncated record: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown message type {0}")]
    UnknownType(u8),

    #[error("Invalid payload length {len} for {name} (expected {min}..={max})")]
    InvalidLength {
        name: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },

    #[error("Invalid field: {0}")]
    InvalidField(&'static str),
}

/// Errors produced while writing a message record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Payload of {len} bytes exceeds the maximum of {max}")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Invalid field: {0}")]
    InvalidField(&'static str),
}
