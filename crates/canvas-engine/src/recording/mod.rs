//! Session recordings and their seek index
//!
//! A recording is a short header followed by plain message records:
//!
//! ```text
//! "TESSREC\0" | version: u16 BE | record*
//! ```
//!
//! It starts with the reset image of the canvas (and the ACL tables) at the
//! moment recording began, so it replays from an empty canvas. The index
//! (see [`index`]) is a separate derived file and never modifies the
//! recording.

pub mod index;
mod reader;
mod recorder;

pub use index::{build_index, index_path_for, IndexBuildError, IndexLoadError, IndexSummary, PlaybackIndex};
pub use reader::{open_recording, PlaybackError, RecordingReader};
pub use recorder::{RecordStartError, Recorder};

/// Magic bytes at the start of a recording.
pub const RECORDING_MAGIC: &[u8; 8] = b"TESSREC\0";

/// Current recording format version.
pub const RECORDING_VERSION: u16 = 1;

/// File extension of recordings.
pub const RECORDING_EXTENSION: &str = "tsrec";

/// Byte offset of the first record.
pub const RECORDING_HEADER_LEN: u64 = 10;
