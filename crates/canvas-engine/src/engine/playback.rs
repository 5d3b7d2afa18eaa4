//! Playback of recorded sessions
//!
//! While a recording is open the engine ignores live input and takes its
//! messages from the file. Seeking backwards restarts from the nearest
//! snapshot, taken either from the recording index or from the engine's own
//! snapshot queue, and replays forward from there.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use tessera_protocol::{Message, MessageType};
use tracing::{debug, info, warn};

use super::{PaintEngine, Replay};
use crate::canvas::CanvasState;
use crate::recording::{
    build_index, index_path_for, open_recording, IndexBuildError, IndexLoadError, IndexSummary, PlaybackError,
    PlaybackIndex, RecordingReader,
};
use crate::task::{self, CancelToken, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackResult {
    Ok,
    /// The recording ended before the step was complete.
    Eof,
    /// No recording is open, or reading it failed.
    Error,
    /// A record could not be decoded. Playback stays at the last good record.
    CorruptRecord,
}

/// Result of one playback call.
#[derive(Debug, Clone)]
pub struct PlaybackStep {
    pub result: PlaybackResult,
    /// Messages played, in order.
    pub messages: Vec<Message>,
    /// Messages played since the start of the recording.
    pub position: u64,
}

pub(super) struct Playback {
    path: PathBuf,
    reader: RecordingReader<BufReader<File>>,
    index: Option<PlaybackIndex>,
}

impl PaintEngine {
    /// Open a recording for playback.
    ///
    /// Stops the recorder and starts over from an empty canvas.
    pub fn open_playback(&mut self, path: &Path) -> Result<(), PlaybackError> {
        let reader = open_recording(path)?;
        self.stop_recorder();
        self.reset(CanvasState::new(), self.local_user);
        self.playback = Some(Playback {
            path: path.to_path_buf(),
            reader,
            index: None,
        });
        info!("Opened {} for playback", path.display());
        Ok(())
    }

    /// Leave playback. Returns whether a recording was open.
    pub fn close_playback(&mut self) -> bool {
        let Some(playback) = self.playback.take() else {
            return false;
        };
        info!("Closed playback of {}", playback.path.display());
        self.snapshots.clear();
        true
    }

    #[inline]
    pub fn is_playing_back(&self) -> bool {
        self.playback.is_some()
    }

    /// Messages played so far, or `None` outside playback.
    pub fn playback_position(&self) -> Option<u64> {
        self.playback.as_ref().map(|p| p.reader.position())
    }

    /// Play the next `count` messages.
    pub fn step_playback(&mut self, count: u64) -> PlaybackStep {
        let mut messages = Vec::new();
        let result = self.play_messages(count, &mut messages);
        self.finish_step(result, messages)
    }

    /// Play forward until `count` undo points have been passed.
    ///
    /// Stops just before the next undo point, so each step covers whole
    /// strokes.
    pub fn skip_playback_by(&mut self, count: u64) -> PlaybackStep {
        let mut messages = Vec::new();
        let mut undo_points = 0;
        let result = loop {
            if count == 0 {
                break PlaybackResult::Ok;
            }
            let Some(playback) = self.playback.as_mut() else {
                break PlaybackResult::Error;
            };
            let (offset, position) = (playback.reader.offset(), playback.reader.position());
            let msg = match read_next(playback) {
                Ok(Some(msg)) => msg,
                Ok(None) => break PlaybackResult::Eof,
                Err(result) => break result,
            };
            if msg.message_type() == MessageType::UndoPoint {
                undo_points += 1;
                if undo_points > count {
                    if let Err(e) = playback.reader.seek_to(offset, position) {
                        warn!("Unable to seek back in {}: {}", playback.path.display(), e);
                        break PlaybackResult::Error;
                    }
                    break PlaybackResult::Ok;
                }
            }
            let (position, offset) = (playback.reader.position(), playback.reader.offset());
            self.process(&msg, position, offset);
            messages.push(msg);
        };
        self.finish_step(result, messages)
    }

    /// Move to absolute message `position`.
    ///
    /// Starts from the latest snapshot at or before `position`, preferring
    /// the recording index, then the snapshot queue, then the current state
    /// when moving forward. Without any of them the recording is replayed
    /// from the start.
    pub fn jump_playback_to(&mut self, position: u64) -> PlaybackStep {
        let Some(playback) = self.playback.as_ref() else {
            return self.finish_step(PlaybackResult::Error, Vec::new());
        };
        let current = playback.reader.position();
        if current == position {
            return self.finish_step(PlaybackResult::Ok, Vec::new());
        }

        let mut base: Option<(u64, u64, Replay)> = None;
        if let Some(snapshot) = playback.index.as_ref().and_then(|i| i.snapshot_before(position)) {
            match snapshot.restore(self.config.undo_depth) {
                Ok(replay) => base = Some((snapshot.message_count, snapshot.offset, replay)),
                Err(e) => warn!("Unusable index snapshot at {}: {}", snapshot.message_count, e),
            }
        }
        if let Some(snapshot) = self.snapshots.nearest_before(position) {
            if base.as_ref().is_none_or(|(p, _, _)| snapshot.position > *p) {
                base = Some((snapshot.position, snapshot.state.offset, snapshot.state.replay.clone()));
            }
        }
        let from_current = current < position && base.as_ref().is_none_or(|(p, _, _)| current >= *p);

        if !from_current {
            let (start, offset, replay) =
                base.unwrap_or_else(|| (0, 0, Replay::new(CanvasState::new(), self.config.undo_depth)));
            debug!("Jumping to {} from snapshot at {}", position, start);
            let Some(playback) = self.playback.as_mut() else {
                return self.finish_step(PlaybackResult::Error, Vec::new());
            };
            let seeked = if start == 0 {
                playback.reader.rewind()
            } else {
                playback.reader.seek_to(offset, start)
            };
            if let Err(e) = seeked {
                warn!("Unable to seek in {}: {}", playback.path.display(), e);
                return self.finish_step(PlaybackResult::Error, Vec::new());
            }
            self.replay = replay;
        }

        let remaining = position - self.playback_position().unwrap_or(position).min(position);
        let mut messages = Vec::new();
        let result = self.play_messages(remaining, &mut messages);
        self.finish_step(result, messages)
    }

    fn play_messages(&mut self, count: u64, out: &mut Vec<Message>) -> PlaybackResult {
        for _ in 0..count {
            let Some(playback) = self.playback.as_mut() else {
                return PlaybackResult::Error;
            };
            let msg = match read_next(playback) {
                Ok(Some(msg)) => msg,
                Ok(None) => return PlaybackResult::Eof,
                Err(result) => return result,
            };
            let (position, offset) = (playback.reader.position(), playback.reader.offset());
            self.process(&msg, position, offset);
            out.push(msg);
        }
        PlaybackResult::Ok
    }

    fn finish_step(&mut self, result: PlaybackResult, messages: Vec<Message>) -> PlaybackStep {
        self.refresh_view();
        PlaybackStep {
            result,
            messages,
            position: self.playback_position().unwrap_or(0),
        }
    }

    // Index

    /// Build the index for the open recording, reporting progress to the hooks.
    ///
    /// Blocks until done. See [`spawn_playback_index_build`](Self::spawn_playback_index_build)
    /// for a background build.
    pub fn build_playback_index(&mut self, cancel: &CancelToken) -> Result<IndexSummary, IndexBuildError> {
        let path = match self.playback.as_ref() {
            Some(playback) => playback.path.clone(),
            None => return Err(IndexBuildError::Playback(PlaybackError::NotOpen)),
        };
        let hooks = &mut self.hooks;
        build_index(&path, &index_path_for(&path), &self.config, cancel, &mut |p| hooks.index_progress(p))
    }

    /// Build the index for the open recording on the worker pool.
    ///
    /// The build only reads the recording, so the engine may be dropped
    /// while it runs.
    pub fn spawn_playback_index_build<F>(
        &self,
        cancel: CancelToken,
        mut progress: F,
    ) -> Result<TaskHandle<Result<IndexSummary, IndexBuildError>>, PlaybackError>
    where
        F: FnMut(u8) + Send + 'static,
    {
        let playback = self.playback.as_ref().ok_or(PlaybackError::NotOpen)?;
        let path = playback.path.clone();
        let config = self.config.clone();
        Ok(task::spawn(cancel, move |token| {
            build_index(&path, &index_path_for(&path), &config, token, &mut progress)
        }))
    }

    /// Load the index next to the open recording.
    ///
    /// Any error means the index has to be built again.
    pub fn load_playback_index(&mut self) -> Result<(), IndexLoadError> {
        let playback = self.playback.as_mut().ok_or(IndexLoadError::NoRecording)?;
        let index = PlaybackIndex::load(&index_path_for(&playback.path), &playback.path)?;
        info!(
            "Loaded playback index: {} messages, {} snapshots",
            index.message_count(),
            index.snapshot_count()
        );
        playback.index = Some(index);
        Ok(())
    }

    pub fn has_playback_index(&self) -> bool {
        self.playback.as_ref().is_some_and(|p| p.index.is_some())
    }

    /// Total messages in the indexed recording, 0 without an index.
    pub fn playback_index_message_count(&self) -> u64 {
        self.loaded_index().map_or(0, |i| i.message_count())
    }

    pub fn playback_index_entry_count(&self) -> usize {
        self.loaded_index().map_or(0, |i| i.entry_count())
    }

    /// Thumbnail for index entry `entry`, or the closest earlier one.
    pub fn playback_index_thumbnail_at(&self, entry: usize) -> Option<RgbaImage> {
        self.loaded_index()?.thumbnail_at(entry)
    }

    fn loaded_index(&self) -> Option<&PlaybackIndex> {
        self.playback.as_ref()?.index.as_ref()
    }
}

fn read_next(playback: &mut Playback) -> Result<Option<Message>, PlaybackResult> {
    match playback.reader.read_next() {
        Ok(msg) => Ok(msg),
        Err(PlaybackError::Corrupt { offset, source }) => {
            warn!("Corrupt record at {} in {}: {}", offset, playback.path.display(), source);
            Err(PlaybackResult::CorruptRecord)
        }
        Err(e) => {
            warn!("Playback of {} failed: {}", playback.path.display(), e);
            Err(PlaybackResult::Error)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::super::NoHooks;
    use super::*;
    use crate::acl::AclState;
    use crate::recording::Recorder;
    use std::io::Write;
    use tessera_config::EngineConfig;
    use tessera_protocol::{CanvasResizeMessage, FillRectMessage, LayerCreateMessage, MessageBody};

    /// Resize, layer, then `strokes` pairs of undo point and fill: `2 + 2 * strokes` messages.
    fn write_recording(dir: &Path, strokes: u32) -> PathBuf {
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
        for i in 0..strokes {
            recorder.record(&Message::new(1, MessageBody::UndoPoint)).unwrap();
            recorder
                .record(&Message::new(
                    1,
                    MessageBody::FillRect(FillRectMessage { layer: 0x0101, mode: 0, x: i, y: i, w: 2, h: 2, color: 0xff0000ff }),
                ))
                .unwrap();
        }
        recorder.finish().unwrap();
        path
    }

    fn engine() -> PaintEngine {
        PaintEngine::new(EngineConfig::default(), Box::new(NoHooks))
    }

    #[test]
    fn test_step_until_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 3);
        let mut e = engine();
        e.open_playback(&path).unwrap();
        assert!(e.is_playing_back());

        let step = e.step_playback(5);
        assert_eq!(step.result, PlaybackResult::Ok);
        assert_eq!(step.messages.len(), 5);
        assert_eq!(step.position, 5);

        let step = e.step_playback(10);
        assert_eq!(step.result, PlaybackResult::Eof);
        assert_eq!(step.messages.len(), 3);
        assert_eq!(e.playback_position(), Some(8));
        assert_eq!(e.history_canvas().width(), 64);
    }

    #[test]
    fn test_live_input_ignored_during_playback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 1);
        let mut e = engine();
        e.open_playback(&path).unwrap();
        let outcome = e.receive_message(&Message::new(0, MessageBody::UndoPoint));
        assert_eq!(outcome, super::super::Outcome::Ignored);
        assert!(e.close_playback());
        assert!(!e.close_playback());
    }

    #[test]
    fn test_skip_stops_before_next_undo_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 4);
        let mut e = engine();
        e.open_playback(&path).unwrap();

        let step = e.skip_playback_by(1);
        assert_eq!(step.result, PlaybackResult::Ok);
        assert_eq!(step.position, 4);
        assert_eq!(step.messages.last().map(|m| m.message_type()), Some(MessageType::FillRect));

        let step = e.skip_playback_by(2);
        assert_eq!(step.position, 8);
        let next = e.step_playback(1);
        assert_eq!(next.messages[0].message_type(), MessageType::UndoPoint);
    }

    #[test]
    fn test_jump_matches_linear_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 10);
        let mut jumping = engine();
        jumping.open_playback(&path).unwrap();

        for target in [22, 7, 15, 3, 22] {
            let step = jumping.jump_playback_to(target);
            assert_eq!(step.result, PlaybackResult::Ok);
            assert_eq!(step.position, target);

            let mut linear = engine();
            linear.open_playback(&path).unwrap();
            linear.step_playback(target);
            assert_eq!(jumping.to_flat_image(None), linear.to_flat_image(None));
            assert_eq!(jumping.history_canvas(), linear.history_canvas());
        }
    }

    #[test]
    fn test_jump_uses_index_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 10);
        let mut config = EngineConfig::default();
        config.index.snapshot_interval = 4;
        let mut e = PaintEngine::new(config, Box::new(NoHooks));
        e.open_playback(&path).unwrap();
        assert!(matches!(e.load_playback_index(), Err(IndexLoadError::Missing(_))));

        let summary = e.build_playback_index(&CancelToken::new()).unwrap();
        assert_eq!(summary.message_count, 22);
        e.load_playback_index().unwrap();
        assert!(e.has_playback_index());
        assert_eq!(e.playback_index_message_count(), 22);
        assert_eq!(e.playback_index_entry_count(), 22);

        e.jump_playback_to(22);
        let end = e.to_flat_image(None);
        let step = e.jump_playback_to(18);
        // Restarted from the index snapshot at 16
        assert_eq!(step.messages.len(), 2);
        e.jump_playback_to(22);
        assert_eq!(e.to_flat_image(None), end);
    }

    #[test]
    fn test_corrupt_record_stops_playback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 2);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        // Unknown message type 7
        file.write_all(&[0, 0, 7, 1]).unwrap();
        drop(file);

        let mut e = engine();
        e.open_playback(&path).unwrap();
        let step = e.step_playback(100);
        assert_eq!(step.result, PlaybackResult::CorruptRecord);
        assert_eq!(step.position, 6);
        assert_eq!(e.step_playback(1).result, PlaybackResult::CorruptRecord);
    }

    #[test]
    fn test_no_playback_is_an_error() {
        let mut e = engine();
        assert_eq!(e.step_playback(1).result, PlaybackResult::Error);
        assert_eq!(e.jump_playback_to(3).result, PlaybackResult::Error);
        assert!(matches!(e.load_playback_index(), Err(IndexLoadError::NoRecording)));
        assert!(matches!(
            e.build_playback_index(&CancelToken::new()),
            Err(IndexBuildError::Playback(PlaybackError::NotOpen))
        ));
    }
}
