//! Flood fill
//!
//! The fill itself is a pure read of a [`CanvasState`]
//! ([`CanvasState::flood_fill`]) that produces a [`PendingFill`]: a coverage
//! mask plus the color and target layer. Nothing is drawn until the pending
//! fill is turned into ordinary messages with [`PendingFill::to_messages`],
//! so committed fills go through access control and undo like any other
//! edit. [`FloodFillTool`] runs fills in the background and restarts them
//! when the parameters change.

mod algorithm;
mod mask;
mod tool;

use tessera_config::{FillConfig, FillKernel};
use tessera_protocol::{Message, MessageBody, PutImageMessage};

use crate::canvas::CanvasState;
use crate::tiles::{TileGrid, TILE_SIZE};
use crate::types::{BlendMode, Pixel, Rect};

pub use algorithm::color_distance;
pub use mask::Mask;
pub use tool::{FillEvent, FloodFillTool};

/// Which pixels the fill compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillSource {
    /// All visible layers with the background.
    Merged,
    MergedWithoutBackground,
    #[default]
    CurrentLayer,
    /// A designated reference layer.
    FillSourceLayer(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillArea {
    /// Matching pixels connected to the seed.
    #[default]
    Continuous,
    /// Every matching pixel on the canvas.
    Similar,
    /// Matching pixels inside the selection.
    Selection,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FillError {
    #[error("Fill point {x},{y} is outside the canvas")]
    OutOfBounds { x: i32, y: i32 },
    #[error("Layer {0:#06x} does not exist")]
    UnknownLayer(u16),
    #[error("Nothing is selected")]
    NoSelection,
    #[error("Fill would cover more than {limit} pixels")]
    SizeLimitExceeded { limit: u64 },
    #[error("Fill cancelled")]
    Cancelled,
    #[error("Fill job stopped without a result")]
    Aborted,
}

/// Everything that determines a fill result.
#[derive(Debug, Clone, PartialEq)]
pub struct FillParams {
    pub x: i32,
    pub y: i32,
    /// ARGB fill color.
    pub color: u32,
    /// Largest accepted [`color_distance`] from the seed pixel.
    pub tolerance: f32,
    /// Layer that receives the fill.
    pub layer_id: u16,
    pub source: FillSource,
    pub area: FillArea,
    /// Abort when more pixels than this would be filled. Zero disables the limit.
    pub size_limit: u64,
    /// Openings up to this many pixels wide do not let a continuous fill through.
    pub gap: u32,
    /// Grow (positive) or shrink (negative) the result.
    pub expand: i32,
    pub kernel: FillKernel,
    pub feather: u32,
    /// Required for [`FillArea::Selection`].
    pub selection: Option<Mask>,
}

impl FillParams {
    /// Fill at a point with the configured defaults.
    pub fn new(config: &FillConfig, x: i32, y: i32, color: u32, layer_id: u16) -> Self {
        Self {
            x,
            y,
            color,
            tolerance: config.tolerance.clamp(0.0, 1.0),
            layer_id,
            source: FillSource::default(),
            area: FillArea::default(),
            size_limit: config.size_limit,
            gap: config.gap,
            expand: config.expand,
            kernel: config.kernel,
            feather: config.feather,
            selection: None,
        }
    }
}

/// A computed, uncommitted fill.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFill {
    pub layer_id: u16,
    pub color: u32,
    /// The seed point.
    pub origin: (i32, i32),
    pub area: FillArea,
    pub mask: Mask,
}

impl PendingFill {
    #[inline]
    pub fn bounds(&self) -> Rect {
        self.mask.bounds()
    }

    /// Pixels covered by the fill.
    pub fn pixel_count(&self) -> u64 {
        self.mask.count()
    }

    /// The fill as row-major pixels over [`PendingFill::bounds`].
    pub fn pixels(&self, opacity: u8) -> Vec<Pixel> {
        let color = Pixel::from_argb(self.color);
        self.mask
            .alpha()
            .iter()
            .map(|coverage| {
                let a = (color.a as u32 * *coverage as u32 * opacity as u32 + 255 * 255 / 2) / (255 * 255);
                if a == 0 {
                    Pixel::TRANSPARENT
                } else {
                    Pixel::new(color.r, color.g, color.b, a as u8)
                }
            })
            .collect()
    }

    /// Messages that commit the fill: an undo point, then one image per
    /// touched tile.
    ///
    /// Nothing is returned for an empty fill.
    pub fn to_messages(&self, context_id: u8, opacity: u8, blend: BlendMode) -> Vec<Message> {
        let bounds = self.bounds();
        if bounds.is_empty() || self.mask.is_empty() {
            return Vec::new();
        }
        let pixels = self.pixels(opacity);
        let at = |x: i32, y: i32| pixels[((y - bounds.y) as u32 * bounds.w + (x - bounds.x) as u32) as usize];

        let grid = TileGrid::new(
            (bounds.right() as u32).div_ceil(TILE_SIZE) * TILE_SIZE,
            (bounds.bottom() as u32).div_ceil(TILE_SIZE) * TILE_SIZE,
        );
        let mut msgs = vec![Message::new(context_id, MessageBody::UndoPoint)];
        for coord in grid.tiles_in_rect(&bounds) {
            let Some(part) = bounds.intersect(&grid.tile_bounds(coord)) else {
                continue;
            };
            let mut image = Vec::with_capacity((part.w * part.h * 4) as usize);
            let mut visible = false;
            for y in part.y..part.bottom() as i32 {
                for x in part.x..part.right() as i32 {
                    let px = at(x, y);
                    visible |= px.a > 0;
                    image.extend_from_slice(&px.to_array());
                }
            }
            if !visible {
                continue;
            }
            msgs.push(Message::new(
                context_id,
                MessageBody::PutImage(PutImageMessage {
                    layer: self.layer_id,
                    mode: blend.as_u8(),
                    x: part.x as u32,
                    y: part.y as u32,
                    w: part.w,
                    h: part.h,
                    image,
                }),
            ));
        }
        msgs
    }
}
