//! Seek index for recordings
//!
//! The index is a separate file next to the recording. It holds one entry
//! per record (byte offset after the record and the message count reached),
//! small PNG thumbnails at a fixed message cadence and full replay snapshots
//! every few entries. Playback jumps by restoring the nearest snapshot and
//! replaying forward from its offset.
//!
//! File layout: `TESSIDX\0`, schema version (`u16` BE), then a bincode body.
//! The body carries a fingerprint of the recording so an index built for
//! different bytes is never trusted.

use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tessera_config::{EngineConfig, IndexConfig};
use tracing::{debug, info, warn};

use super::reader::{open_recording, PlaybackError};
use crate::acl::AclState;
use crate::canvas::{CanvasState, FlattenOptions};
use crate::engine::Replay;
use crate::history::{HistoryData, HistoryDataError};
use crate::task::CancelToken;

pub const INDEX_MAGIC: &[u8; 8] = b"TESSIDX\0";

/// Bumped whenever the body layout changes. Older indexes are rebuilt.
pub const INDEX_SCHEMA: u16 = 1;

pub const INDEX_EXTENSION: &str = "tsidx";

const INDEX_HEADER_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum IndexBuildError {
    #[error("Index I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("Unable to encode index: {0}")]
    Encode(String),
    #[error("Index build cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexLoadError {
    #[error("No index at {0}")]
    Missing(PathBuf),
    #[error("Unable to read index: {0}")]
    Io(#[from] io::Error),
    #[error("Not an index file")]
    BadMagic,
    #[error("Index schema {found} does not match {expected}")]
    SchemaMismatch { found: u16, expected: u16 },
    #[error("Corrupt index: {0}")]
    Corrupt(String),
    #[error("Index was built for a different recording")]
    SourceMismatch,
    #[error("No recording is open")]
    NoRecording,
}

/// Where the index for `recording` lives: the same path with `.tsidx` appended.
pub fn index_path_for(recording: &Path) -> PathBuf {
    let mut name = recording.as_os_str().to_os_string();
    name.push(".");
    name.push(INDEX_EXTENSION);
    PathBuf::from(name)
}

fn partial_path_for(index: &Path) -> PathBuf {
    let mut name = index.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Byte offset just past this record.
    pub offset: u64,
    /// Messages read up to and including this record.
    pub message_count: u64,
    pub thumbnail: Option<u32>,
    pub snapshot: Option<u32>,
}

/// Replay state at an entry boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub message_count: u64,
    pub offset: u64,
    pub acl: AclState,
    pub history: HistoryData,
}

impl IndexSnapshot {
    /// Turn the snapshot back into a live replay.
    pub fn restore(&self, undo_depth: usize) -> Result<Replay, HistoryDataError> {
        Replay::from_data(self.acl.clone(), &self.history, undo_depth)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SourceFingerprint {
    len: u64,
    hash: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexBody {
    source: SourceFingerprint,
    message_count: u64,
    entries: Vec<IndexEntry>,
    /// PNG encoded.
    thumbnails: Vec<Vec<u8>>,
    snapshots: Vec<IndexSnapshot>,
}

/// Result of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub message_count: u64,
    pub entry_count: usize,
    pub thumbnail_count: usize,
    pub snapshot_count: usize,
}

/// FNV-1a over the whole file.
fn fingerprint(path: &Path) -> io::Result<SourceFingerprint> {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut file = File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut hash = OFFSET_BASIS;
    let mut len = 0u64;
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for byte in &buf[..n] {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
        len += n as u64;
    }
    Ok(SourceFingerprint { len, hash })
}

fn encode_thumbnail(canvas: &CanvasState, config: &IndexConfig) -> Result<Option<Vec<u8>>, IndexBuildError> {
    if canvas.is_empty() {
        return Ok(None);
    }
    let flat = canvas.to_flat_image(&FlattenOptions::default().with_sublayers(false));
    let size = config.thumbnail_size.max(1);
    let scale = (size as f32 / flat.width().max(flat.height()) as f32).min(1.0);
    let w = ((flat.width() as f32 * scale).round() as u32).max(1);
    let h = ((flat.height() as f32 * scale).round() as u32).max(1);
    let thumb = image::imageops::thumbnail(&flat, w, h);

    let mut png = Cursor::new(Vec::new());
    thumb
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| IndexBuildError::Encode(e.to_string()))?;
    Ok(Some(png.into_inner()))
}

/// Build the index for `recording` and write it to `index_path`.
///
/// `progress` receives the share of the recording read so far, in percent,
/// each time it changes. The body is written to a `.partial` file that is
/// renamed into place only after a complete build; a cancelled or failed
/// build removes it, so `index_path` is either a complete index or left as
/// it was.
pub fn build_index(
    recording: &Path,
    index_path: &Path,
    config: &EngineConfig,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(u8),
) -> Result<IndexSummary, IndexBuildError> {
    let partial = partial_path_for(index_path);
    let result = build_body(recording, config, cancel, progress).and_then(|body| {
        write_body(&partial, &body)?;
        fs::rename(&partial, index_path)?;
        Ok(IndexSummary {
            path: index_path.to_path_buf(),
            message_count: body.message_count,
            entry_count: body.entries.len(),
            thumbnail_count: body.thumbnails.len(),
            snapshot_count: body.snapshots.len(),
        })
    });

    match &result {
        Ok(summary) => info!(
            "Indexed {} messages of {} ({} thumbnails, {} snapshots)",
            summary.message_count,
            recording.display(),
            summary.thumbnail_count,
            summary.snapshot_count
        ),
        Err(err) => {
            if partial.exists() {
                if let Err(e) = fs::remove_file(&partial) {
                    warn!("Unable to remove {}: {}", partial.display(), e);
                }
            }
            match err {
                IndexBuildError::Cancelled => info!("Index build for {} cancelled", recording.display()),
                other => warn!("Index build for {} failed: {}", recording.display(), other),
            }
        }
    }
    result
}

fn build_body(
    recording: &Path,
    config: &EngineConfig,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(u8),
) -> Result<IndexBody, IndexBuildError> {
    let source = fingerprint(recording)?;
    let total_len = source.len.max(1);
    let mut reader = open_recording(recording)?;
    let mut replay = Replay::new(CanvasState::new(), config.undo_depth);

    let mut body = IndexBody {
        source,
        message_count: 0,
        entries: Vec::new(),
        thumbnails: Vec::new(),
        snapshots: Vec::new(),
    };
    let mut last_percent = None;

    loop {
        if cancel.is_cancelled() {
            return Err(IndexBuildError::Cancelled);
        }
        let Some(msg) = reader.read_next()? else {
            break;
        };
        replay.handle(&msg);

        let mut entry = IndexEntry {
            offset: reader.offset(),
            message_count: reader.position(),
            thumbnail: None,
            snapshot: None,
        };
        let interval = config.index.thumbnail_interval;
        if interval > 0 && entry.message_count % interval == 0 {
            if let Some(png) = encode_thumbnail(replay.canvas(), &config.index)? {
                entry.thumbnail = Some(body.thumbnails.len() as u32);
                body.thumbnails.push(png);
            }
        }
        let interval = config.index.snapshot_interval;
        if interval > 0 && (body.entries.len() as u64 + 1) % interval == 0 {
            entry.snapshot = Some(body.snapshots.len() as u32);
            body.snapshots.push(IndexSnapshot {
                message_count: entry.message_count,
                offset: entry.offset,
                acl: replay.acl().clone(),
                history: replay
                    .history()
                    .to_data()
                    .map_err(|e| IndexBuildError::Encode(e.to_string()))?,
            });
            debug!("Index snapshot at message {}", entry.message_count);
        }
        body.entries.push(entry);

        let percent = (entry.offset.saturating_mul(100) / total_len).min(100) as u8;
        if last_percent != Some(percent) {
            last_percent = Some(percent);
            progress(percent);
        }
    }

    // The final state always gets a thumbnail
    if let Some(last) = body.entries.last_mut() {
        if last.thumbnail.is_none() {
            if let Some(png) = encode_thumbnail(replay.canvas(), &config.index)? {
                last.thumbnail = Some(body.thumbnails.len() as u32);
                body.thumbnails.push(png);
            }
        }
    }
    body.message_count = reader.position();
    if last_percent != Some(100) {
        progress(100);
    }
    Ok(body)
}

fn write_body(path: &Path, body: &IndexBody) -> Result<(), IndexBuildError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(INDEX_MAGIC)?;
    writer.write_all(&INDEX_SCHEMA.to_be_bytes())?;
    bincode::serialize_into(&mut writer, body).map_err(|e| IndexBuildError::Encode(e.to_string()))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// A loaded, validated index.
#[derive(Debug, Clone)]
pub struct PlaybackIndex {
    body: IndexBody,
}

impl PlaybackIndex {
    /// Load `index_path` and check it against `recording`.
    pub fn load(index_path: &Path, recording: &Path) -> Result<Self, IndexLoadError> {
        let bytes = match fs::read(index_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IndexLoadError::Missing(index_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() < INDEX_HEADER_LEN || &bytes[..8] != INDEX_MAGIC {
            return Err(IndexLoadError::BadMagic);
        }
        let found = u16::from_be_bytes([bytes[8], bytes[9]]);
        if found != INDEX_SCHEMA {
            return Err(IndexLoadError::SchemaMismatch {
                found,
                expected: INDEX_SCHEMA,
            });
        }
        let body: IndexBody =
            bincode::deserialize(&bytes[INDEX_HEADER_LEN..]).map_err(|e| IndexLoadError::Corrupt(e.to_string()))?;
        if body.source != fingerprint(recording)? {
            return Err(IndexLoadError::SourceMismatch);
        }
        debug!(
            "Loaded index {} ({} entries)",
            index_path.display(),
            body.entries.len()
        );
        Ok(Self { body })
    }

    /// Messages in the indexed recording.
    #[inline]
    pub fn message_count(&self) -> u64 {
        self.body.message_count
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.body.entries.len()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.body.entries
    }

    pub fn snapshot_count(&self) -> usize {
        self.body.snapshots.len()
    }

    /// Thumbnail for entry `index`, or the closest earlier one.
    pub fn thumbnail_at(&self, index: usize) -> Option<RgbaImage> {
        let end = index.checked_add(1)?.min(self.body.entries.len());
        let slot = self.body.entries[..end].iter().rev().find_map(|e| e.thumbnail)?;
        let png = self.body.thumbnails.get(slot as usize)?;
        match image::load_from_memory_with_format(png, ImageFormat::Png) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                warn!("Unreadable thumbnail {}: {}", slot, e);
                None
            }
        }
    }

    /// Latest snapshot taken at or before message `position`.
    pub fn snapshot_before(&self, position: u64) -> Option<&IndexSnapshot> {
        let idx = self.body.snapshots.partition_point(|s| s.message_count <= position);
        idx.checked_sub(1).map(|i| &self.body.snapshots[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Recorder;
    use tessera_protocol::{CanvasResizeMessage, FillRectMessage, LayerCreateMessage, Message, MessageBody};

    fn write_recording(dir: &Path, fills: u32) -> PathBuf {
        let path = dir.join("session.tsrec");
        let mut recorder = Recorder::start(&path, &CanvasState::new(), &AclState::new()).unwrap();
        recorder
            .record(&Message::new(
                0,
                MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 64, bottom: 64, left: 0 }),
            ))
            .unwrap();
        recorder
            .record(&Message::new(
                1,
                MessageBody::LayerCreate(LayerCreateMessage { id: 0x0101, source: 0, fill: 0, flags: 0, title: "a".into() }),
            ))
            .unwrap();
        for i in 0..fills {
            recorder.record(&Message::new(1, MessageBody::UndoPoint)).unwrap();
            recorder
                .record(&Message::new(
                    1,
                    MessageBody::FillRect(FillRectMessage { layer: 0x0101, mode: 0, x: i % 64, y: 0, w: 1, h: 1, color: 0xff00ff00 }),
                ))
                .unwrap();
        }
        recorder.finish().unwrap();
        path
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.index.thumbnail_interval = 10;
        config.index.snapshot_interval = 8;
        config
    }

    #[test]
    fn test_build_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let rec = write_recording(dir.path(), 20);
        let idx = index_path_for(&rec);
        let mut seen = Vec::new();
        let summary = build_index(&rec, &idx, &config(), &CancelToken::new(), &mut |p| seen.push(p)).unwrap();

        assert_eq!(summary.message_count, 42);
        assert_eq!(summary.entry_count, 42);
        assert_eq!(summary.snapshot_count, 5);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let index = PlaybackIndex::load(&idx, &rec).unwrap();
        assert_eq!(index.message_count(), 42);
        assert_eq!(index.snapshot_before(7).map(|s| s.message_count), None);
        assert_eq!(index.snapshot_before(20).map(|s| s.message_count), Some(16));
        let thumb = index.thumbnail_at(41).unwrap();
        assert_eq!(thumb.dimensions(), (64, 64));
    }

    #[test]
    fn test_cancelled_build_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let rec = write_recording(dir.path(), 20);
        let idx = index_path_for(&rec);
        let result = build_index(&rec, &idx, &config(), &CancelToken::cancelled(), &mut |_| {});
        assert!(matches!(result, Err(IndexBuildError::Cancelled)));
        assert!(!idx.exists());
        assert!(!partial_path_for(&idx).exists());
        assert!(matches!(PlaybackIndex::load(&idx, &rec), Err(IndexLoadError::Missing(_))));
    }

    #[test]
    fn test_changed_recording_invalidates_index() {
        let dir = tempfile::tempdir().unwrap();
        let rec = write_recording(dir.path(), 4);
        let idx = index_path_for(&rec);
        build_index(&rec, &idx, &config(), &CancelToken::new(), &mut |_| {}).unwrap();

        write_recording(dir.path(), 5);
        assert!(matches!(PlaybackIndex::load(&idx, &rec), Err(IndexLoadError::SourceMismatch)));
    }

    #[test]
    fn test_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let rec = write_recording(dir.path(), 1);
        let idx = index_path_for(&rec);
        let mut bytes = INDEX_MAGIC.to_vec();
        bytes.extend_from_slice(&(INDEX_SCHEMA + 1).to_be_bytes());
        fs::write(&idx, bytes).unwrap();
        assert!(matches!(
            PlaybackIndex::load(&idx, &rec),
            Err(IndexLoadError::SchemaMismatch { found, .. }) if found == INDEX_SCHEMA + 1
        ));
    }

    #[test]
    fn test_index_path() {
        assert_eq!(index_path_for(Path::new("a/b.tsrec")), PathBuf::from("a/b.tsrec.tsidx"));
    }
}
