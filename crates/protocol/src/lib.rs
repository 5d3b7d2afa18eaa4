//! Tessera message protocol
//!
//! Binary codec for the ordered operation log that drives the canvas engine:
//! - [`Message`] - an immutable, reference-counted, author-tagged record
//! - [`MessageBody`] - the closed set of message variants
//! - [`RecordHeader`] - the 4 byte frame in front of every payload
//!
//! ## Wire format
//!
//! ```text
//! len: u16 | type: u8 | context_id: u8 | payload[len]
//! ```
//!
//! All multi-byte numbers, in the header and in payloads, are big-endian.

mod error;
mod messages;
mod reader;
mod types;
mod writer;

pub use error::{DecodeError, EncodeError};
pub use messages::{Message, MessageBody, MessageType, RecordHeader};
pub use reader::PayloadReader;
pub use types::*;
pub use writer::PayloadWriter;

/// Size of the record header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload a record can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Edge length of a canvas tile in pixels.
pub const TILE_SIZE: u32 = 64;

/// Bytes in one tile of RGBA pixels.
pub const TILE_BYTES: usize = (TILE_SIZE * TILE_SIZE * 4) as usize;

/// Pack straight-alpha RGBA components into the ARGB word used on the wire.
#[inline]
pub const fn argb(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Unpack an ARGB word into `[r, g, b, a]`.
#[inline]
pub const fn unpack_argb(color: u32) -> [u8; 4] {
    [
        (color >> 16) as u8,
        (color >> 8) as u8,
        color as u8,
        (color >> 24) as u8,
    ]
}
