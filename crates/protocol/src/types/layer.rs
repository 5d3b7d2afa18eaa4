//! Canvas size and layer management payloads.

use crate::error::DecodeError;
use crate::reader::PayloadReader;
use crate::writer::PayloadWriter;
use crate::MAX_PAYLOAD_LEN;

/// Grow or shrink the canvas by moving each border.
///
/// The initial resize of an empty canvas is `(0, w, h, 0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasResizeMessage {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl CanvasResizeMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("CanvasResize", 16, 16)?;
        Ok(Self {
            top: r.read_i32()?,
            right: r.read_i32()?,
            bottom: r.read_i32()?,
            left: r.read_i32()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.i32(self.top).i32(self.right).i32(self.bottom).i32(self.left);
    }
}

/// Create a layer on top of the stack.
///
/// A nonzero `source` copies that layer's pixels; otherwise the layer is
/// filled with `fill` (ARGB, zero for transparent).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerCreateMessage {
    pub id: u16,
    pub source: u16,
    pub fill: u32,
    pub flags: u8,
    pub title: String,
}

impl LayerCreateMessage {
    pub const FLAGS_GROUP: u8 = 0x1;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("LayerCreate", 9, MAX_PAYLOAD_LEN)?;

        let id = r.read_u16()?;
        let source = r.read_u16()?;
        let fill = r.read_u32()?;
        let flags = r.read_u8()?;
        let title = r.read_remaining_str();

        Ok(Self { id, source, fill, flags, title })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id)
            .u16(self.source)
            .u32(self.fill)
            .u8(self.flags)
            .bytes(self.title.as_bytes());
    }

    pub(crate) fn payload_len(&self) -> usize {
        9 + self.title.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerAttributesMessage {
    pub id: u16,
    pub flags: u8,
    pub opacity: u8,
    pub blend: u8,
}

impl LayerAttributesMessage {
    pub const FLAGS_CENSOR: u8 = 0x1;
    pub const FLAGS_HIDDEN: u8 = 0x2;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("LayerAttributes", 5, 5)?;
        Ok(Self {
            id: r.read_u16()?,
            flags: r.read_u8()?,
            opacity: r.read_u8()?,
            blend: r.read_u8()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id).u8(self.flags).u8(self.opacity).u8(self.blend);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerRetitleMessage {
    pub id: u16,
    pub title: String,
}

impl LayerRetitleMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("LayerRetitle", 2, MAX_PAYLOAD_LEN)?;
        let id = r.read_u16()?;
        let title = r.read_remaining_str();
        Ok(Self { id, title })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id).bytes(self.title.as_bytes());
    }

    pub(crate) fn payload_len(&self) -> usize {
        2 + self.title.len()
    }
}

/// Delete a layer, optionally merging its content into the layer below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerDeleteMessage {
    pub id: u16,
    pub merge: bool,
}

impl LayerDeleteMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("LayerDelete", 3, 3)?;
        Ok(Self {
            id: r.read_u16()?,
            merge: r.read_bool()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id).bool(self.merge);
    }
}
