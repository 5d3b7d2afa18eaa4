//! Tessera canvas engine - message-sourced layered raster documents
//!
//! A document is the result of replaying an ordered log of protocol
//! messages. This crate provides:
//! - [`types`] - Pixels, blend modes and rectangles
//! - [`tiles`] - 64x64 copy-on-write tiles and tile grids
//! - [`canvas`] - Immutable canvas snapshots, compositing, reset images, documents
//! - [`acl`] - Session and layer access control
//! - [`history`] - Undo history with per-user undo points
//! - [`snapshots`] - Snapshot pacing for fast seeking
//! - [`task`] - Cancellable background jobs
//! - [`engine`] - The paint engine: live sessions, previews, recording and playback
//! - [`recording`] - Recording files and the playback index
//! - [`fill`] - Tile-partitioned flood fill

pub mod acl;
pub mod canvas;
pub mod engine;
pub mod fill;
pub mod history;
pub mod recording;
pub mod snapshots;
pub mod task;
pub mod tiles;
pub mod types;

pub use acl::{AclDenial, AclState, Tier};
pub use canvas::{CanvasState, FlattenOptions, Layer, LoadError, LoadReport, SaveError};
pub use engine::{EngineHooks, EngineState, NoHooks, Outcome, PaintEngine, PlaybackResult, PlaybackStep, ViewMode};
pub use fill::{FillArea, FillError, FillParams, FillSource, FloodFillTool, Mask, PendingFill};
pub use history::History;
pub use recording::{IndexBuildError, IndexLoadError, PlaybackError, PlaybackIndex, RecordStartError, Recorder};
pub use task::{CancelToken, TaskHandle};
pub use tiles::{Tile, TileCoord, TileGrid, TILE_SIZE};
pub use types::{BlendMode, Pixel, Rect};

pub use tessera_config::EngineConfig;
pub use tessera_protocol::Message;
