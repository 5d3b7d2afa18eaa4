//! Applying canvas commands to a snapshot

use std::sync::Arc;

use tessera_protocol::{
    AnnotationEditMessage, AnnotationShapeMessage, CanvasBackgroundMessage, CanvasResizeMessage,
    LayerAttributesMessage, LayerCreateMessage, LayerDeleteMessage, Message, MessageBody,
    SetMetadataIntMessage, SetTimelineFrameMessage,
};
use tracing::debug;

use super::layer::Layer;
use super::{Annotation, CanvasState, TimelineFrame, MAX_CANVAS_SIZE};
use crate::tiles::{Tile, TileGrid};
use crate::types::{BlendMode, Pixel, Rect};

/// Why a command could not be applied.
///
/// The snapshot is left untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("Layer {0:#06x} does not exist")]
    LayerNotFound(u16),
    #[error("Layer {0:#06x} already exists")]
    LayerExists(u16),
    #[error("Layer id 0 is reserved")]
    InvalidLayerId,
    #[error("Layer {0:#06x} has no layer below to merge into")]
    NoMergeTarget(u16),
    #[error("Layer order lists unknown or duplicate layer {0:#06x}")]
    InvalidLayerOrder(u16),
    #[error("Unknown blend mode {0}")]
    InvalidBlendMode(u8),
    #[error("Canvas size {width}x{height} is out of range")]
    InvalidSize { width: i64, height: i64 },
    #[error("Resize offset ({left}, {top}) is out of range")]
    InvalidOffset { left: i32, top: i32 },
    #[error("Annotation {0:#06x} does not exist")]
    AnnotationNotFound(u16),
    #[error("Annotation {0:#06x} already exists")]
    AnnotationExists(u16),
    #[error("Annotation {0:#06x} is protected")]
    AnnotationProtected(u16),
    #[error("Unknown metadata field {0}")]
    InvalidMetadataField(u8),
    #[error("Timeline frame {0} is out of range")]
    FrameOutOfRange(u16),
    #[error("Background tile has the wrong size")]
    InvalidBackground,
    #[error("{0} is handled by the undo history, not the canvas")]
    NotACanvasCommand(&'static str),
}

fn blend_mode(mode: u8) -> Result<BlendMode, ApplyError> {
    BlendMode::from_u8(mode).ok_or(ApplyError::InvalidBlendMode(mode))
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

impl CanvasState {
    /// Apply one message.
    ///
    /// Meta messages and undo points leave the canvas unchanged. On error the
    /// snapshot is exactly as it was before the call.
    pub fn apply(&mut self, msg: &Message) -> Result<(), ApplyError> {
        let mut next = self.clone();
        next.apply_in_place(msg)?;
        *self = next;
        Ok(())
    }

    /// Apply a list of messages, stopping at the first failure.
    pub fn apply_all<'a>(&mut self, msgs: impl IntoIterator<Item = &'a Message>) -> Result<(), ApplyError> {
        for msg in msgs {
            self.apply(msg)?;
        }
        Ok(())
    }

    fn apply_in_place(&mut self, msg: &Message) -> Result<(), ApplyError> {
        let ctx = msg.context_id();
        match msg.body() {
            MessageBody::CanvasResize(m) => self.resize(m),
            MessageBody::LayerCreate(m) => self.create_layer(m, ctx),
            MessageBody::LayerAttributes(m) => self.set_layer_attributes(m),
            MessageBody::LayerRetitle(m) => {
                let layer = self.layer_mut(m.id).ok_or(ApplyError::LayerNotFound(m.id))?;
                layer.title = m.title.clone();
                Ok(())
            }
            MessageBody::LayerOrder(ids) => self.reorder_layers(ids),
            MessageBody::LayerDelete(m) => self.delete_layer(m),
            MessageBody::PutImage(m) => {
                let mode = blend_mode(m.mode)?;
                let layer = self.layer_mut(m.layer).ok_or(ApplyError::LayerNotFound(m.layer))?;
                let pixels: &[Pixel] = bytemuck::cast_slice(m.image.as_slice());
                layer
                    .tiles
                    .put_image(clamp_i32(m.x), clamp_i32(m.y), m.w, m.h, pixels, mode, ctx);
                Ok(())
            }
            MessageBody::FillRect(m) => {
                let mode = blend_mode(m.mode)?;
                let layer = self.layer_mut(m.layer).ok_or(ApplyError::LayerNotFound(m.layer))?;
                let rect = Rect::new(clamp_i32(m.x), clamp_i32(m.y), m.w, m.h);
                layer.tiles.fill_rect(&rect, Pixel::from_argb(m.color), mode, ctx);
                Ok(())
            }
            MessageBody::DrawDabs(m) => {
                let mode = blend_mode(m.mode)?;
                let layer = self.layer_mut(m.layer).ok_or(ApplyError::LayerNotFound(m.layer))?;
                layer.tiles.draw_dabs(m, mode, ctx);
                Ok(())
            }
            MessageBody::AnnotationCreate(m) => self.create_annotation(m),
            MessageBody::AnnotationReshape(m) => {
                let a = self.annotation_mut(m.id, ctx)?;
                a.rect = Rect::new(m.x, m.y, m.w as u32, m.h as u32);
                Ok(())
            }
            MessageBody::AnnotationEdit(m) => self.edit_annotation(m, ctx),
            MessageBody::AnnotationDelete(id) => {
                self.annotation_mut(*id, ctx)?;
                Arc::make_mut(&mut self.annotations).retain(|a| a.id != *id);
                Ok(())
            }
            MessageBody::SetMetadataInt(m) => self.set_metadata(m),
            MessageBody::SetTimelineFrame(m) => self.set_timeline_frame(m),
            MessageBody::RemoveTimelineFrame(frame) => {
                let idx = *frame as usize;
                if idx >= self.timeline.len() {
                    return Err(ApplyError::FrameOutOfRange(*frame));
                }
                Arc::make_mut(&mut self.timeline).remove(idx);
                Ok(())
            }
            MessageBody::CanvasBackground(m) => self.set_background(m, ctx),
            MessageBody::Undo(_) => Err(ApplyError::NotACanvasCommand("undo")),
            // Meta, ACL and undo point messages carry no pixels
            _ => Ok(()),
        }
    }

    fn resize(&mut self, m: &CanvasResizeMessage) -> Result<(), ApplyError> {
        let width = self.width as i64 + m.left as i64 + m.right as i64;
        let height = self.height as i64 + m.top as i64 + m.bottom as i64;
        let max = MAX_CANVAS_SIZE as i64;
        if width < 1 || height < 1 || width > max || height > max {
            return Err(ApplyError::InvalidSize { width, height });
        }
        if m.left.unsigned_abs() > MAX_CANVAS_SIZE || m.top.unsigned_abs() > MAX_CANVAS_SIZE {
            return Err(ApplyError::InvalidOffset { left: m.left, top: m.top });
        }
        let (width, height) = (width as u32, height as u32);

        debug!(
            "Resizing canvas {}x{} -> {}x{} (offset {}, {})",
            self.width, self.height, width, height, m.left, m.top
        );

        for layer in self.layers.iter_mut() {
            let layer = Arc::make_mut(layer);
            layer.tiles = layer.tiles.resized(width, height, m.left, m.top);
            for sub in layer.sublayers.iter_mut() {
                sub.tiles = sub.tiles.resized(width, height, m.left, m.top);
            }
        }
        if m.left != 0 || m.top != 0 {
            for a in Arc::make_mut(&mut self.annotations).iter_mut() {
                a.rect.x = a.rect.x.saturating_add(m.left);
                a.rect.y = a.rect.y.saturating_add(m.top);
            }
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn create_layer(&mut self, m: &LayerCreateMessage, ctx: u8) -> Result<(), ApplyError> {
        if m.id == 0 {
            return Err(ApplyError::InvalidLayerId);
        }
        if self.layer(m.id).is_some() {
            return Err(ApplyError::LayerExists(m.id));
        }

        let mut layer = if m.source != 0 {
            let source = self.layer(m.source).ok_or(ApplyError::LayerNotFound(m.source))?;
            let mut copy = Layer::new(m.id, m.title.clone(), source.tiles.clone());
            copy.opacity = source.opacity;
            copy.blend = source.blend;
            copy
        } else {
            let grid = TileGrid::filled(self.width, self.height, Pixel::from_argb(m.fill), ctx);
            Layer::new(m.id, m.title.clone(), grid)
        };
        layer.group = m.flags & LayerCreateMessage::FLAGS_GROUP != 0;

        self.layers.push(Arc::new(layer));
        Ok(())
    }

    fn set_layer_attributes(&mut self, m: &LayerAttributesMessage) -> Result<(), ApplyError> {
        let blend = blend_mode(m.blend)?;
        let layer = self.layer_mut(m.id).ok_or(ApplyError::LayerNotFound(m.id))?;
        layer.opacity = m.opacity;
        layer.blend = blend;
        layer.censored = m.flags & LayerAttributesMessage::FLAGS_CENSOR != 0;
        layer.hidden = m.flags & LayerAttributesMessage::FLAGS_HIDDEN != 0;
        Ok(())
    }

    /// Listed layers move to the bottom in the given order; unlisted layers
    /// keep their relative order above them.
    fn reorder_layers(&mut self, ids: &[u16]) -> Result<(), ApplyError> {
        let mut ordered = Vec::with_capacity(self.layers.len());
        for id in ids {
            let idx = self.layer_index(*id).ok_or(ApplyError::InvalidLayerOrder(*id))?;
            if ordered.iter().any(|l: &Arc<Layer>| l.id == *id) {
                return Err(ApplyError::InvalidLayerOrder(*id));
            }
            ordered.push(Arc::clone(&self.layers[idx]));
        }
        for layer in &self.layers {
            if !ids.contains(&layer.id) {
                ordered.push(Arc::clone(layer));
            }
        }
        self.layers = ordered;
        Ok(())
    }

    fn delete_layer(&mut self, m: &LayerDeleteMessage) -> Result<(), ApplyError> {
        let idx = self.layer_index(m.id).ok_or(ApplyError::LayerNotFound(m.id))?;
        if m.merge {
            if idx == 0 {
                return Err(ApplyError::NoMergeTarget(m.id));
            }
            let above = Arc::clone(&self.layers[idx]);
            let below = Arc::make_mut(&mut self.layers[idx - 1]);
            below.tiles.merge(&above.tiles, above.opacity, above.blend);
        }
        self.layers.remove(idx);
        if self.timeline.iter().any(|f| f.layers.contains(&m.id)) {
            for frame in Arc::make_mut(&mut self.timeline).iter_mut() {
                frame.layers.retain(|id| *id != m.id);
            }
        }
        Ok(())
    }

    fn create_annotation(&mut self, m: &AnnotationShapeMessage) -> Result<(), ApplyError> {
        if self.annotation(m.id).is_some() {
            return Err(ApplyError::AnnotationExists(m.id));
        }
        Arc::make_mut(&mut self.annotations).push(Annotation {
            id: m.id,
            rect: Rect::new(m.x, m.y, m.w as u32, m.h as u32),
            background: 0,
            protect: false,
            text: String::new(),
        });
        Ok(())
    }

    fn edit_annotation(&mut self, m: &AnnotationEditMessage, ctx: u8) -> Result<(), ApplyError> {
        let a = self.annotation_mut(m.id, ctx)?;
        a.background = m.background;
        a.protect = m.flags & AnnotationEditMessage::FLAGS_PROTECT != 0;
        a.text = m.text.clone();
        Ok(())
    }

    /// Writable annotation, honouring the protect flag for non-owners.
    fn annotation_mut(&mut self, id: u16, ctx: u8) -> Result<&mut Annotation, ApplyError> {
        let a = self.annotation(id).ok_or(ApplyError::AnnotationNotFound(id))?;
        if a.protect && ctx != 0 && a.owner() != ctx {
            return Err(ApplyError::AnnotationProtected(id));
        }
        Arc::make_mut(&mut self.annotations)
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(ApplyError::AnnotationNotFound(id))
    }

    fn set_metadata(&mut self, m: &SetMetadataIntMessage) -> Result<(), ApplyError> {
        match m.field {
            SetMetadataIntMessage::FIELD_DPIX => self.metadata.dpix = m.value,
            SetMetadataIntMessage::FIELD_DPIY => self.metadata.dpiy = m.value,
            SetMetadataIntMessage::FIELD_FRAMERATE => self.metadata.framerate = m.value,
            SetMetadataIntMessage::FIELD_FRAME_COUNT => self.metadata.frame_count = m.value,
            other => return Err(ApplyError::InvalidMetadataField(other)),
        }
        Ok(())
    }

    fn set_timeline_frame(&mut self, m: &SetTimelineFrameMessage) -> Result<(), ApplyError> {
        let idx = m.frame as usize;
        let len = self.timeline.len();
        let frame = TimelineFrame {
            layers: m.layers.clone(),
        };
        let timeline = Arc::make_mut(&mut self.timeline);
        if m.insert {
            if idx > len {
                return Err(ApplyError::FrameOutOfRange(m.frame));
            }
            timeline.insert(idx, frame);
        } else if idx < len {
            timeline[idx] = frame;
        } else if idx == len {
            timeline.push(frame);
        } else {
            return Err(ApplyError::FrameOutOfRange(m.frame));
        }
        Ok(())
    }

    fn set_background(&mut self, m: &CanvasBackgroundMessage, ctx: u8) -> Result<(), ApplyError> {
        let tile = match m {
            CanvasBackgroundMessage::Color(color) => Tile::filled(Pixel::from_argb(*color), ctx),
            CanvasBackgroundMessage::Tile(bytes) => {
                Tile::from_rgba(bytes, ctx).ok_or(ApplyError::InvalidBackground)?
            }
        };
        self.background = (!tile.is_blank()).then(|| Arc::new(tile));
        Ok(())
    }
}
