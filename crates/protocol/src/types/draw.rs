//! Pixel-modifying payloads.

use crate::error::{DecodeError, EncodeError};
use crate::reader::PayloadReader;
use crate::writer::PayloadWriter;
use crate::{MAX_PAYLOAD_LEN, TILE_BYTES};

/// Draw a block of raw RGBA pixels onto a layer.
///
/// `image` holds `w * h` straight-alpha RGBA pixels in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutImageMessage {
    pub layer: u16,
    pub mode: u8,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub image: Vec<u8>,
}

/// Byte length of a `w`x`h` RGBA image, `None` on overflow.
fn image_len(w: u32, h: u32) -> Option<usize> {
    (w as usize).checked_mul(h as usize)?.checked_mul(4)
}

impl PutImageMessage {
    const HEADER_LEN: usize = 19;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("PutImage", Self::HEADER_LEN, MAX_PAYLOAD_LEN)?;

        let layer = r.read_u16()?;
        let mode = r.read_u8()?;
        let x = r.read_u32()?;
        let y = r.read_u32()?;
        let w = r.read_u32()?;
        let h = r.read_u32()?;
        let image = r.read_remaining().to_vec();

        if image_len(w, h) != Some(image.len()) {
            return Err(DecodeError::InvalidField("PutImage::image size does not match w*h"));
        }

        Ok(Self { layer, mode, x, y, w, h, image })
    }

    pub(crate) fn check(&self) -> Result<(), EncodeError> {
        if image_len(self.w, self.h) != Some(self.image.len()) {
            return Err(EncodeError::InvalidField("PutImage::image size does not match w*h"));
        }
        Ok(())
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.layer)
            .u8(self.mode)
            .u32(self.x)
            .u32(self.y)
            .u32(self.w)
            .u32(self.h)
            .bytes(&self.image);
    }

    pub(crate) fn payload_len(&self) -> usize {
        Self::HEADER_LEN + self.image.len()
    }
}

/// Fill a rectangle with a solid ARGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillRectMessage {
    pub layer: u16,
    pub mode: u8,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub color: u32,
}

impl FillRectMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("FillRect", 23, 23)?;
        Ok(Self {
            layer: r.read_u16()?,
            mode: r.read_u8()?,
            x: r.read_u32()?,
            y: r.read_u32()?,
            w: r.read_u32()?,
            h: r.read_u32()?,
            color: r.read_u32()?,
        })
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.layer)
            .u8(self.mode)
            .u32(self.x)
            .u32(self.y)
            .u32(self.w)
            .u32(self.h)
            .u32(self.color);
    }
}

/// One round dab. Position is a delta from the previous dab in quarter pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassicDab {
    pub x: i8,
    pub y: i8,
    /// Diameter * 256.
    pub size: u16,
    pub hardness: u8,
    pub opacity: u8,
}

impl ClassicDab {
    pub const LEN: usize = 6;
}

/// A run of round brush dabs on a layer.
///
/// `x`/`y` are the absolute position of the first dab in quarter pixels;
/// each dab's `x`/`y` is relative to the previous one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawDabsMessage {
    pub layer: u16,
    pub x: i32,
    pub y: i32,
    pub color: u32,
    pub mode: u8,
    pub dabs: Vec<ClassicDab>,
}

impl DrawDabsMessage {
    const HEADER_LEN: usize = 15;
    pub const MAX_DABS: usize = (MAX_PAYLOAD_LEN - Self::HEADER_LEN) / ClassicDab::LEN;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate(
            "DrawDabs",
            Self::HEADER_LEN + ClassicDab::LEN,
            Self::HEADER_LEN + ClassicDab::LEN * Self::MAX_DABS,
        )?;

        let layer = r.read_u16()?;
        let x = r.read_i32()?;
        let y = r.read_i32()?;
        let color = r.read_u32()?;
        let mode = r.read_u8()?;
        if r.remaining() % ClassicDab::LEN != 0 {
            return Err(DecodeError::InvalidField("DrawDabs::dabs has a partial dab"));
        }

        let mut dabs = Vec::with_capacity(r.remaining() / ClassicDab::LEN);
        while r.remaining() > 0 {
            dabs.push(ClassicDab {
                x: r.read_i8()?,
                y: r.read_i8()?,
                size: r.read_u16()?,
                hardness: r.read_u8()?,
                opacity: r.read_u8()?,
            });
        }

        Ok(Self { layer, x, y, color, mode, dabs })
    }

    pub(crate) fn check(&self) -> Result<(), EncodeError> {
        if self.dabs.is_empty() || self.dabs.len() > Self::MAX_DABS {
            return Err(EncodeError::InvalidField("DrawDabs::dabs must hold 1..=MAX_DABS dabs"));
        }
        Ok(())
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.layer)
            .i32(self.x)
            .i32(self.y)
            .u32(self.color)
            .u8(self.mode);
        for dab in &self.dabs {
            w.i8(dab.x).i8(dab.y).u16(dab.size).u8(dab.hardness).u8(dab.opacity);
        }
    }

    pub(crate) fn payload_len(&self) -> usize {
        Self::HEADER_LEN + self.dabs.len() * ClassicDab::LEN
    }
}

/// Canvas background: a solid ARGB color or a full tile of RGBA pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanvasBackgroundMessage {
    Color(u32),
    Tile(Vec<u8>),
}

impl CanvasBackgroundMessage {
    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        match r.remaining() {
            4 => Ok(Self::Color(r.read_u32()?)),
            TILE_BYTES => Ok(Self::Tile(r.read_remaining().to_vec())),
            len => Err(DecodeError::InvalidLength {
                name: "CanvasBackground",
                len,
                min: 4,
                max: TILE_BYTES,
            }),
        }
    }

    pub(crate) fn check(&self) -> Result<(), EncodeError> {
        match self {
            Self::Tile(px) if px.len() != TILE_BYTES => {
                Err(EncodeError::InvalidField("CanvasBackground::Tile must hold one tile"))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        match self {
            Self::Color(color) => {
                w.u32(*color);
            }
            Self::Tile(px) => {
                w.bytes(px);
            }
        }
    }

    pub(crate) fn payload_len(&self) -> usize {
        match self {
            Self::Color(_) => 4,
            Self::Tile(px) => px.len(),
        }
    }
}
