//! Subcommand implementations

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context};
use canvas_engine::recording::{index_path_for, open_recording};
use canvas_engine::{CancelToken, EngineHooks, PaintEngine, PlaybackIndex, PlaybackResult};
use tessera_config::EngineConfig;
use tessera_protocol::MessageType;
use tracing::{info, warn};

/// Logs index build progress in steps of ten percent.
#[derive(Debug, Default)]
struct ProgressLog {
    last: Option<u8>,
}

impl EngineHooks for ProgressLog {
    fn index_progress(&mut self, percent: u8) {
        let step = percent / 10;
        if self.last != Some(step) {
            self.last = Some(step);
            info!("Indexing: {}%", percent);
        }
    }
}

fn open(recording: &Path, config: &EngineConfig) -> anyhow::Result<PaintEngine> {
    let mut engine = PaintEngine::new(config.clone(), Box::new(ProgressLog::default()));
    engine
        .open_playback(recording)
        .with_context(|| format!("opening {}", recording.display()))?;
    Ok(engine)
}

pub fn index(recording: &Path, config: &EngineConfig) -> anyhow::Result<()> {
    let mut engine = open(recording, config)?;
    let summary = engine
        .build_playback_index(&CancelToken::new())
        .with_context(|| format!("indexing {}", recording.display()))?;
    println!(
        "{}: {} messages, {} thumbnails, {} snapshots",
        summary.path.display(),
        summary.message_count,
        summary.thumbnail_count,
        summary.snapshot_count
    );
    Ok(())
}

/// What a scan of a recording found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordingInfo {
    pub messages: u64,
    pub undo_points: u64,
    pub users: BTreeSet<u8>,
    pub by_type: BTreeMap<&'static str, u64>,
    /// Offset of the first unreadable record, if any.
    pub corrupt_at: Option<u64>,
}

pub fn scan(recording: &Path) -> anyhow::Result<RecordingInfo> {
    let mut reader = open_recording(recording).with_context(|| format!("opening {}", recording.display()))?;
    let mut info = RecordingInfo::default();
    loop {
        match reader.read_next() {
            Ok(Some(msg)) => {
                info.messages += 1;
                if msg.message_type() == MessageType::UndoPoint {
                    info.undo_points += 1;
                }
                if msg.context_id() != 0 {
                    info.users.insert(msg.context_id());
                }
                *info.by_type.entry(msg.message_type().name()).or_default() += 1;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("{}", e);
                info.corrupt_at = Some(reader.offset());
                break;
            }
        }
    }
    Ok(info)
}

pub fn info(recording: &Path) -> anyhow::Result<()> {
    let info = scan(recording)?;
    println!("{}", recording.display());
    println!("  messages:    {}", info.messages);
    println!("  undo points: {}", info.undo_points);
    println!("  users:       {}", info.users.len());
    for (name, count) in &info.by_type {
        println!("    {:<16} {}", name, count);
    }
    if let Some(offset) = info.corrupt_at {
        println!("  corrupt record at byte {}", offset);
    }

    let index_path = index_path_for(recording);
    match PlaybackIndex::load(&index_path, recording) {
        Ok(index) => println!(
            "  index:       {} entries, {} snapshots",
            index.entry_count(),
            index.snapshot_count()
        ),
        Err(e) => println!("  index:       unusable ({})", e),
    }
    Ok(())
}

pub fn render(
    recording: &Path,
    at: Option<u64>,
    output: &Path,
    build_index: bool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let mut engine = open(recording, config)?;
    if let Err(e) = engine.load_playback_index() {
        if build_index {
            info!("Index unusable ({}), rebuilding", e);
            engine.build_playback_index(&CancelToken::new())?;
            engine.load_playback_index()?;
        } else {
            warn!("Index unusable ({}), replaying from the start", e);
        }
    }

    let target = at.unwrap_or(u64::MAX);
    let step = engine.jump_playback_to(target);
    match step.result {
        PlaybackResult::Ok => {}
        PlaybackResult::Eof if at.is_none() => {}
        PlaybackResult::Eof => warn!("Recording ends at message {}", step.position),
        PlaybackResult::Error => bail!("playback of {} failed", recording.display()),
        PlaybackResult::CorruptRecord => {
            warn!("Corrupt record after message {}, rendering what was read", step.position)
        }
    }

    let canvas = engine.canvas();
    if canvas.is_empty() {
        bail!("canvas is empty at message {}", step.position);
    }
    engine
        .to_flat_image(None)
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{}: {}x{} at message {}",
        output.display(),
        canvas.width(),
        canvas.height(),
        step.position
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_engine::{AclState, CanvasState, Recorder};
    use tessera_protocol::{CanvasResizeMessage, FillRectMessage, LayerCreateMessage, Message, MessageBody};

    fn write_recording(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("s.tsrec");
        let mut recorder = Recorder::start(&path, &CanvasState::new(), &AclState::new()).unwrap();
        for msg in [
            Message::new(0, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 20, bottom: 10, left: 0 })),
            Message::new(
                3,
                MessageBody::LayerCreate(LayerCreateMessage { id: 0x0301, source: 0, fill: 0, flags: 0, title: "a".into() }),
            ),
            Message::new(3, MessageBody::UndoPoint),
            Message::new(
                3,
                MessageBody::FillRect(FillRectMessage { layer: 0x0301, mode: 0, x: 0, y: 0, w: 5, h: 5, color: 0xffff0000 }),
            ),
        ] {
            recorder.record(&msg).unwrap();
        }
        recorder.finish().unwrap();
        path
    }

    #[test]
    fn test_scan() {
        let dir = tempfile::tempdir().unwrap();
        let info = scan(&write_recording(dir.path())).unwrap();
        assert_eq!(info.messages, 4);
        assert_eq!(info.undo_points, 1);
        assert_eq!(info.users, BTreeSet::from([3]));
        assert_eq!(info.corrupt_at, None);
    }

    #[test]
    fn test_render_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let rec = write_recording(dir.path());
        let out = dir.path().join("out.png");
        render(&rec, None, &out, true, &EngineConfig::default()).unwrap();

        let img = image::open(&out).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(img.get_pixel(1, 1)[0], 0xff);
        assert!(index_path_for(&rec).exists());
    }

    #[test]
    fn test_render_empty_canvas_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rec = write_recording(dir.path());
        let out = dir.path().join("out.png");
        assert!(render(&rec, Some(0), &out, false, &EngineConfig::default()).is_err());
    }
}
