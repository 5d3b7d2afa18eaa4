//! Annotation payloads.

use crate::error::DecodeError;
use crate::reader::PayloadReader;
use crate::writer::PayloadWriter;
use crate::MAX_PAYLOAD_LEN;

/// Position and size of an annotation. Used by both create and reshape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnnotationShapeMessage {
    pub id: u16,
    pub x: i32,
    pub y: i32,
    pub w: u16,
    pub h: u16,
}

impl AnnotationShapeMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("AnnotationShape", 14, 14)?;
        Ok(Self {
            id: r.read_u16()?,
            x: r.read_i32()?,
            y: r.read_i32()?,
            w: r.read_u16()?,
            h: r.read_u16()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id).i32(self.x).i32(self.y).u16(self.w).u16(self.h);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationEditMessage {
    pub id: u16,
    pub background: u32,
    pub flags: u8,
    pub text: String,
}

impl AnnotationEditMessage {
    pub const FLAGS_PROTECT: u8 = 0x1;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("AnnotationEdit", 7, MAX_PAYLOAD_LEN)?;

        let id = r.read_u16()?;
        let background = r.read_u32()?;
        let flags = r.read_u8()?;
        let text = r.read_remaining_str();

        Ok(Self { id, background, flags, text })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id)
            .u32(self.background)
            .u8(self.flags)
            .bytes(self.text.as_bytes());
    }

    pub(crate) fn payload_len(&self) -> usize {
        7 + self.text.len()
    }
}
