//! Session membership and chat payloads.

use crate::error::{DecodeError, EncodeError};
use crate::reader::PayloadReader;
use crate::writer::PayloadWriter;
use crate::MAX_PAYLOAD_LEN;

/// A user joined the session.
///
/// Wire layout: `flags(1) | name_len(1) | name(name_len) | hash(remainder)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinMessage {
    pub flags: u8,
    pub name: String,
    /// Avatar or identity hash; may be empty.
    pub hash: Vec<u8>,
}

impl JoinMessage {
    pub const FLAGS_AUTH: u8 = 0x1;
    pub const FLAGS_MOD: u8 = 0x2;
    pub const FLAGS_BOT: u8 = 0x4;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("Join", 2, MAX_PAYLOAD_LEN)?;

        let flags = r.read_u8()?;
        let name_len = r.read_u8()? as usize;
        // Name must be at least one character long, the hash is optional
        if name_len == 0 {
            return Err(DecodeError::InvalidField("Join::name is empty"));
        }
        if r.remaining() < name_len {
            return Err(DecodeError::InvalidField("Join::name exceeds payload"));
        }
        let name = r.read_str(name_len)?;
        let hash = r.read_remaining().to_vec();

        Ok(Self { flags, name, hash })
    }

    pub(crate) fn check(&self) -> Result<(), EncodeError> {
        if self.name.is_empty() || self.name.len() > u8::MAX as usize {
            return Err(EncodeError::InvalidField("Join::name must be 1..=255 bytes"));
        }
        Ok(())
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u8(self.flags)
            .u8(self.name.len() as u8)
            .bytes(self.name.as_bytes())
            .bytes(&self.hash);
    }

    pub(crate) fn payload_len(&self) -> usize {
        2 + self.name.len() + self.hash.len()
    }
}

/// A chat line. Carried in recordings but never touches the canvas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub flags: u8,
    pub text: String,
}

impl ChatMessage {
    pub const FLAGS_SHOUT: u8 = 0x1;
    pub const FLAGS_ACTION: u8 = 0x2;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("Chat", 1, MAX_PAYLOAD_LEN)?;

        let flags = r.read_u8()?;
        let text = r.read_remaining_str();

        Ok(Self { flags, text })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u8(self.flags).bytes(self.text.as_bytes());
    }

    pub(crate) fn payload_len(&self) -> usize {
        1 + self.text.len()
    }
}
