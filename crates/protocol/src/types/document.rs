//! Document metadata, timeline and undo payloads.

use crate::error::DecodeError;
use crate::reader::PayloadReader;
use crate::writer::PayloadWriter;
use crate::MAX_PAYLOAD_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetMetadataIntMessage {
    pub field: u8,
    pub value: i32,
}

impl SetMetadataIntMessage {
    pub const FIELD_DPIX: u8 = 0;
    pub const FIELD_DPIY: u8 = 1;
    pub const FIELD_FRAMERATE: u8 = 2;
    pub const FIELD_FRAME_COUNT: u8 = 3;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("SetMetadataInt", 5, 5)?;
        Ok(Self {
            field: r.read_u8()?,
            value: r.read_i32()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u8(self.field).i32(self.value);
    }
}

/// Set (or insert) a timeline frame as the list of layers it shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetTimelineFrameMessage {
    pub frame: u16,
    pub insert: bool,
    pub layers: Vec<u16>,
}

impl SetTimelineFrameMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("SetTimelineFrame", 3, MAX_PAYLOAD_LEN)?;

        let frame = r.read_u16()?;
        let insert = r.read_bool()?;
        let layers = r.read_remaining_u16s()?;

        Ok(Self { frame, insert, layers })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.frame).bool(self.insert).u16s(&self.layers);
    }

    pub(crate) fn payload_len(&self) -> usize {
        3 + self.layers.len() * 2
    }
}

/// Undo or redo the latest undoable sequence of a user.
///
/// A nonzero `override_user` targets another user's history, which requires
/// operator privileges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UndoMessage {
    pub override_user: u8,
    pub redo: bool,
}

impl UndoMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("Undo", 2, 2)?;
        Ok(Self {
            override_user: r.read_u8()?,
            redo: r.read_bool()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u8(self.override_user).bool(self.redo);
    }
}
