//! Local-only overlays for strokes, cuts and fills in progress
//!
//! Each preview lives in a sublayer of its target layer in the local view.
//! Previews never reach the committed canvas or the recording.

use tessera_protocol::DrawDabsMessage;
use tracing::debug;

use super::PaintEngine;
use crate::canvas::CanvasState;
use crate::fill::{Mask, PendingFill};
use crate::types::{BlendMode, Pixel, Rect};

/// Sublayer holding a brush stroke preview.
pub const PREVIEW_SUBLAYER_ID: i32 = -100;
/// Sublayer erasing the area of a pending cut.
pub const CUT_SUBLAYER_ID: i32 = -200;
/// Sublayer holding a pending flood fill.
pub const FILL_SUBLAYER_ID: i32 = -300;

#[derive(Debug, Clone)]
pub(super) enum Preview {
    Dabs {
        layer_id: u16,
        dabs: Vec<DrawDabsMessage>,
    },
    Cut {
        layer_id: u16,
        rect: Rect,
        mask: Option<Mask>,
    },
    Fill {
        fill: PendingFill,
        opacity: u8,
        blend: BlendMode,
    },
}

impl Preview {
    fn sublayer_id(&self) -> i32 {
        match self {
            Self::Dabs { .. } => PREVIEW_SUBLAYER_ID,
            Self::Cut { .. } => CUT_SUBLAYER_ID,
            Self::Fill { .. } => FILL_SUBLAYER_ID,
        }
    }

    fn layer_id(&self) -> u16 {
        match self {
            Self::Dabs { layer_id, .. } | Self::Cut { layer_id, .. } => *layer_id,
            Self::Fill { fill, .. } => fill.layer_id,
        }
    }

    /// Draw the preview into its sublayer on `canvas`.
    pub(super) fn render(&self, canvas: &mut CanvasState, context_id: u8) {
        let (blend, opacity) = match self {
            Self::Dabs { dabs, .. } => (
                dabs.first()
                    .and_then(|d| BlendMode::from_u8(d.mode))
                    .unwrap_or(BlendMode::Normal),
                255,
            ),
            Self::Cut { .. } => (BlendMode::Erase, 255),
            Self::Fill { opacity, blend, .. } => (*blend, *opacity),
        };
        let Some(sublayer) = canvas.sublayer_mut(self.layer_id(), self.sublayer_id(), blend, opacity) else {
            debug!("Preview target layer {:#06x} is gone", self.layer_id());
            return;
        };
        let tiles = sublayer.tiles_mut();
        match self {
            Self::Dabs { dabs, .. } => {
                for msg in dabs {
                    tiles.draw_dabs(msg, BlendMode::Normal, context_id);
                }
            }
            Self::Cut { rect, mask, .. } => {
                let pixels: Vec<Pixel> = (rect.y..rect.bottom() as i32)
                    .flat_map(|y| (rect.x..rect.right() as i32).map(move |x| (x, y)))
                    .map(|(x, y)| {
                        let a = mask.as_ref().map_or(255, |m| m.get(x, y));
                        Pixel::new(255, 255, 255, a)
                    })
                    .collect();
                tiles.put_image(rect.x, rect.y, rect.w, rect.h, &pixels, BlendMode::Replace, context_id);
            }
            Self::Fill { fill, .. } => {
                let b = fill.bounds();
                tiles.put_image(b.x, b.y, b.w, b.h, &fill.pixels(255), BlendMode::Replace, context_id);
            }
        }
    }
}

impl PaintEngine {
    /// Show brush dabs on `layer_id` without committing them.
    ///
    /// Replaces any previous stroke preview.
    pub fn preview_dabs(&mut self, layer_id: u16, dabs: Vec<DrawDabsMessage>) {
        self.set_preview(Preview::Dabs { layer_id, dabs });
    }

    /// Show `rect` of `layer_id` as cut away. `mask` limits the cut to its coverage.
    pub fn preview_cut(&mut self, layer_id: u16, rect: Rect, mask: Option<Mask>) {
        self.set_preview(Preview::Cut { layer_id, rect, mask });
    }

    /// Show a pending fill as it would look once committed.
    pub fn preview_fill(&mut self, fill: &PendingFill, opacity: u8, blend: BlendMode) {
        self.set_preview(Preview::Fill {
            fill: fill.clone(),
            opacity,
            blend,
        });
    }

    /// Drop every preview.
    pub fn clear_preview(&mut self) {
        if self.previews.is_empty() {
            return;
        }
        for preview in self.previews.drain(..) {
            self.view.remove_sublayer(preview.sublayer_id());
        }
    }

    pub fn has_preview(&self) -> bool {
        !self.previews.is_empty()
    }

    fn set_preview(&mut self, preview: Preview) {
        let id = preview.sublayer_id();
        self.previews.retain(|p| p.sublayer_id() != id);
        self.view.remove_sublayer(id);
        preview.render(&mut self.view, self.local_user);
        self.previews.push(preview);
    }
}

#[cfg(test)]
mod tests {
    use super::super::NoHooks;
    use super::*;
    use crate::fill::FillArea;
    use tessera_config::EngineConfig;
    use tessera_protocol::{CanvasResizeMessage, ClassicDab, FillRectMessage, LayerCreateMessage, Message, MessageBody};

    fn engine() -> PaintEngine {
        let mut e = PaintEngine::new(EngineConfig::default(), Box::new(NoHooks));
        e.reset(CanvasState::new(), 1);
        e.receive_message(&Message::new(
            0,
            MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 64, bottom: 64, left: 0 }),
        ));
        e.receive_message(&Message::new(
            1,
            MessageBody::LayerCreate(LayerCreateMessage { id: 0x0101, source: 0, fill: 0, flags: 0, title: "l".into() }),
        ));
        e
    }

    fn alpha_at(e: &PaintEngine, x: i32, y: i32) -> u8 {
        e.to_flat_image(Some(Rect::new(x, y, 1, 1))).get_pixel(0, 0)[3]
    }

    #[test]
    fn test_dab_preview_is_local_only() {
        let mut e = engine();
        let dabs = DrawDabsMessage {
            layer: 0x0101,
            x: 40,
            y: 40,
            color: 0xff0000ff,
            mode: 0,
            dabs: vec![ClassicDab { x: 0, y: 0, size: 8 * 256, hardness: 255, opacity: 255 }],
        };
        e.preview_dabs(0x0101, vec![dabs]);
        assert!(e.has_preview());
        assert_eq!(alpha_at(&e, 10, 10), 255);
        assert!(!e.history_canvas().has_sublayers());

        e.clear_preview();
        assert_eq!(alpha_at(&e, 10, 10), 0);
        assert_eq!(e.canvas(), e.history_canvas());
    }

    #[test]
    fn test_cut_preview_erases() {
        let mut e = engine();
        e.receive_message(&Message::new(
            1,
            MessageBody::FillRect(FillRectMessage { layer: 0x0101, mode: 0, x: 0, y: 0, w: 64, h: 64, color: 0xff00ff00 }),
        ));
        e.preview_cut(0x0101, Rect::new(0, 0, 8, 8), None);
        assert_eq!(alpha_at(&e, 2, 2), 0);
        assert_eq!(alpha_at(&e, 20, 20), 255);

        e.set_local_drawing_in_progress(true);
        e.set_local_drawing_in_progress(false);
        assert!(!e.has_preview());
        assert_eq!(alpha_at(&e, 2, 2), 255);
    }

    #[test]
    fn test_fill_preview() {
        let mut e = engine();
        let rect = Rect::new(4, 4, 2, 2);
        let fill = PendingFill {
            layer_id: 0x0101,
            color: 0xffff0000,
            origin: (4, 4),
            area: FillArea::Continuous,
            mask: Mask::from_alpha(rect, vec![255; 4]).unwrap(),
        };
        e.preview_fill(&fill, 255, BlendMode::Normal);
        assert_eq!(alpha_at(&e, 5, 5), 255);
        assert_eq!(alpha_at(&e, 6, 6), 0);

        // New committed messages keep the preview in place
        e.receive_message(&Message::new(0, MessageBody::UndoPoint));
        assert_eq!(alpha_at(&e, 5, 5), 255);
    }
}
