//! Immutable canvas snapshots
//!
//! A [`CanvasState`] is the full document at one point in the message
//! stream: size, background, layer stack, annotations, timeline and
//! metadata. Cloning is cheap. Every part is reference counted and messages
//! replace only the tiles they touch (see [`crate::tiles`]), so old and new
//! snapshots share all untouched pixel data and can be read from other
//! threads while the engine moves on.

mod apply;
mod document;
mod flatten;
mod layer;
mod pick;
mod reset;

use std::sync::Arc;

use crate::tiles::Tile;
use crate::types::Rect;

pub use apply::ApplyError;
pub use document::{DocumentFormat, LoadError, LoadReport, SaveError};
pub use flatten::FlattenOptions;
pub use layer::{Layer, Sublayer};

/// Largest canvas edge in pixels.
pub const MAX_CANVAS_SIZE: u32 = 32767;

/// A text box placed over the canvas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub id: u16,
    pub rect: Rect,
    /// ARGB background color.
    pub background: u32,
    /// Only the owner may change a protected annotation.
    pub protect: bool,
    pub text: String,
}

impl Annotation {
    #[inline]
    pub fn owner(&self) -> u8 {
        (self.id >> 8) as u8
    }
}

/// One animation frame: the layers it shows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimelineFrame {
    pub layers: Vec<u16>,
}

/// Integer document properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub dpix: i32,
    pub dpiy: i32,
    pub framerate: i32,
    pub frame_count: i32,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            dpix: 72,
            dpiy: 72,
            framerate: 24,
            frame_count: 24,
        }
    }
}

/// Snapshot of the whole document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanvasState {
    width: u32,
    height: u32,
    background: Option<Arc<Tile>>,
    /// Bottom to top.
    layers: Vec<Arc<Layer>>,
    annotations: Arc<Vec<Annotation>>,
    timeline: Arc<Vec<TimelineFrame>>,
    metadata: DocumentMetadata,
}

impl CanvasState {
    /// An empty, zero-sized canvas.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn background(&self) -> Option<&Arc<Tile>> {
        self.background.as_ref()
    }

    pub fn layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }

    pub fn layer(&self, id: u16) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id).map(|l| &**l)
    }

    pub fn layer_index(&self, id: u16) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub(crate) fn layer_mut(&mut self, id: u16) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id).map(Arc::make_mut)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, id: u16) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn timeline(&self) -> &[TimelineFrame] {
        &self.timeline
    }

    pub fn metadata(&self) -> DocumentMetadata {
        self.metadata
    }

    /// Number of animation frames.
    ///
    /// A document with an explicit timeline has one frame per entry;
    /// otherwise every layer is a frame and the metadata count applies.
    pub fn frame_count(&self) -> usize {
        if self.timeline.is_empty() {
            self.metadata.frame_count.max(0) as usize
        } else {
            self.timeline.len()
        }
    }

    /// Draw on (or create) a sublayer of `layer_id`. Used for previews.
    pub(crate) fn sublayer_mut(
        &mut self,
        layer_id: u16,
        sublayer_id: i32,
        blend: crate::types::BlendMode,
        opacity: u8,
    ) -> Option<&mut Sublayer> {
        let layer = self.layer_mut(layer_id)?;
        Some(layer.sublayer_mut(sublayer_id, blend, opacity))
    }

    /// Drop a sublayer from every layer that has it.
    pub(crate) fn remove_sublayer(&mut self, sublayer_id: i32) {
        for layer in self.layers.iter_mut() {
            if layer.sublayers.iter().any(|s| s.id == sublayer_id) {
                Arc::make_mut(layer).sublayers.retain(|s| s.id != sublayer_id);
            }
        }
    }

    /// Whether any layer currently carries a sublayer.
    pub fn has_sublayers(&self) -> bool {
        self.layers.iter().any(|l| !l.sublayers.is_empty())
    }

    /// Whether two snapshots hold the same layer allocation for `id`.
    pub fn shares_layer(&self, other: &CanvasState, id: u16) -> bool {
        match (
            self.layers.iter().find(|l| l.id == id),
            other.layers.iter().find(|l| l.id == id),
        ) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
