//! Paint engine
//!
//! The engine owns the session: it applies incoming messages in order
//! through access control and undo history, keeps locally drawn messages on
//! top of the committed canvas until the server echoes them back, renders
//! preview overlays, mirrors everything to a recorder, and drives playback
//! of recorded sessions.
//!
//! Two canvases are exposed:
//!
//! - [`PaintEngine::history_canvas`] is the committed state, exactly what
//!   every participant has.
//! - [`PaintEngine::canvas`] is what the local user sees: the committed
//!   state plus unconfirmed local messages plus previews.
//!
//! All mutation happens on the caller's thread. Canvas snapshots handed out
//! are immutable and may be sent to render threads freely.

mod playback;
mod preview;
mod replay;

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use tessera_config::EngineConfig;
use tessera_protocol::Message;
use tracing::{debug, info, warn};

use crate::acl::AclState;
use crate::canvas::{CanvasState, FlattenOptions, LoadError, LoadReport};
use crate::history::History;
use crate::recording::{RecordStartError, Recorder};
use crate::snapshots::SnapshotQueue;
use crate::tiles::Tile;
use crate::types::Rect;

use playback::Playback;
use preview::Preview;

pub use playback::{PlaybackResult, PlaybackStep};
pub use preview::{CUT_SUBLAYER_ID, FILL_SUBLAYER_ID, PREVIEW_SUBLAYER_ID};
pub use replay::{Outcome, Replay};

/// Callbacks from the engine to whoever owns it.
pub trait EngineHooks {
    /// A message went through the engine (applied or failed, never denied).
    fn push_message(&mut self, _msg: &Message, _outcome: &Outcome) {}

    /// Asked before a due snapshot is taken. Return `false` to skip it.
    fn should_snapshot(&mut self) -> bool {
        true
    }

    /// Milliseconds used to pace snapshots.
    fn time_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Index build progress in percent.
    fn index_progress(&mut self, _percent: u8) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl EngineHooks for NoHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    LocalDrawingInProgress,
    Recording,
    Playback,
}

/// Which layers the local view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Normal,
    /// Only the active layer.
    Layer,
    /// Only the layers of the active timeline frame.
    Frame,
}

#[derive(Debug, Clone)]
struct EngineSnapshot {
    replay: Replay,
    /// Recording offset matching the snapshot, during playback.
    offset: u64,
}

pub struct PaintEngine {
    config: EngineConfig,
    hooks: Box<dyn EngineHooks>,
    replay: Replay,
    local_user: u8,
    /// Local commands not yet echoed back.
    local_fork: VecDeque<Message>,
    view: CanvasState,
    previews: Vec<Preview>,
    local_drawing: bool,
    hidden_layers: HashSet<u16>,
    local_background: Option<Arc<Tile>>,
    reveal_censored: bool,
    view_mode: ViewMode,
    active_layer: u16,
    active_frame: usize,
    recorder: Option<Recorder>,
    playback: Option<Playback>,
    snapshots: SnapshotQueue<EngineSnapshot>,
    /// Messages received in live mode.
    position: u64,
}

impl PaintEngine {
    /// Engine with an empty canvas.
    pub fn new(config: EngineConfig, hooks: Box<dyn EngineHooks>) -> Self {
        let replay = Replay::new(CanvasState::new(), config.undo_depth);
        let snapshots = SnapshotQueue::new(config.snapshots.clone());
        Self {
            config,
            hooks,
            view: replay.canvas().clone(),
            replay,
            local_user: 0,
            local_fork: VecDeque::new(),
            previews: Vec::new(),
            local_drawing: false,
            hidden_layers: HashSet::new(),
            local_background: None,
            reveal_censored: false,
            view_mode: ViewMode::Normal,
            active_layer: 0,
            active_frame: 0,
            recorder: None,
            playback: None,
            snapshots,
            position: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn local_user(&self) -> u8 {
        self.local_user
    }

    pub fn state(&self) -> EngineState {
        if self.playback.is_some() {
            EngineState::Playback
        } else if self.local_drawing {
            EngineState::LocalDrawingInProgress
        } else if self.recorder.is_some() {
            EngineState::Recording
        } else {
            EngineState::Idle
        }
    }

    /// What the local user sees.
    #[inline]
    pub fn canvas(&self) -> &CanvasState {
        &self.view
    }

    /// The committed canvas.
    #[inline]
    pub fn history_canvas(&self) -> &CanvasState {
        self.replay.canvas()
    }

    pub fn acl(&self) -> &AclState {
        self.replay.acl()
    }

    pub fn history(&self) -> &History {
        self.replay.history()
    }

    /// Messages received since the last reset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of in-memory snapshots currently kept.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Local messages still waiting for their echo.
    pub fn local_fork_len(&self) -> usize {
        self.local_fork.len()
    }

    /// Start over from `canvas`, dropping history, previews and snapshots.
    ///
    /// A running playback is closed. The recorder keeps running.
    pub fn reset(&mut self, canvas: CanvasState, local_user: u8) {
        self.playback = None;
        self.local_user = local_user;
        self.replay = Replay::new(canvas, self.config.undo_depth);
        self.local_fork.clear();
        self.previews.clear();
        self.snapshots.clear();
        self.position = 0;
        self.refresh_view();
    }

    /// Replace the session with a document from disk.
    pub fn load_document(&mut self, path: &Path) -> Result<LoadReport, LoadError> {
        let (canvas, report) = CanvasState::load(path)?;
        if report.is_partial() {
            warn!("Document {} loaded partially", path.display());
        }
        self.reset(canvas, self.local_user);
        info!("Loaded {} ({}x{})", path.display(), self.view.width(), self.view.height());
        Ok(report)
    }

    /// Apply a message from the session.
    ///
    /// Ignored during playback.
    pub fn receive_message(&mut self, msg: &Message) -> Outcome {
        if self.playback.is_some() {
            debug!("Ignoring {} during playback", msg);
            return Outcome::Ignored;
        }
        self.position += 1;
        let outcome = self.process(msg, self.position, 0);
        if !matches!(outcome, Outcome::Denied(_)) {
            self.record(msg);
        }
        self.reconcile_fork(msg);
        self.refresh_view();
        outcome
    }

    /// Apply each message in order.
    pub fn receive_messages<'a>(&mut self, msgs: impl IntoIterator<Item = &'a Message>) -> Vec<Outcome> {
        msgs.into_iter().map(|m| self.receive_message(m)).collect()
    }

    /// Show a locally made message right away.
    ///
    /// Canvas commands go on the local fork and stay visible until the
    /// session echoes them back through [`receive_message`](Self::receive_message).
    /// Nothing committed changes here.
    pub fn local_message(&mut self, msg: Message) -> Outcome {
        if self.playback.is_some() {
            return Outcome::Ignored;
        }
        if let Err(denial) = self.replay.check(&msg) {
            debug!("Local message dropped: {}", denial);
            return Outcome::Denied(denial);
        }
        if !msg.is_command() {
            return Outcome::Applied;
        }
        if msg.is_undoable() {
            if let Err(err) = self.view.apply(&msg) {
                return Outcome::Failed(err);
            }
        }
        self.local_fork.push_back(msg);
        Outcome::Applied
    }

    /// Run one message through replay, hooks and the snapshot queue.
    fn process(&mut self, msg: &Message, position: u64, offset: u64) -> Outcome {
        let outcome = self.replay.handle(msg);
        if matches!(outcome, Outcome::Denied(_)) {
            return outcome;
        }
        self.hooks.push_message(msg, &outcome);
        if outcome.is_applied() {
            self.snapshots.message_applied();
            let now = self.hooks.time_ms();
            if self.snapshots.is_due(now) && self.hooks.should_snapshot() {
                let snapshot = EngineSnapshot {
                    replay: self.replay.clone(),
                    offset,
                };
                self.snapshots.push(position, now, snapshot);
            }
        }
        outcome
    }

    fn record(&mut self, msg: &Message) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(e) = recorder.record(msg) {
            warn!("Recording to {} failed, stopping: {}", recorder.path().display(), e);
            self.recorder = None;
        }
    }

    fn reconcile_fork(&mut self, msg: &Message) {
        if msg.context_id() != self.local_user || !msg.is_command() || self.local_fork.is_empty() {
            return;
        }
        if self.local_fork.front() == Some(msg) {
            self.local_fork.pop_front();
        } else {
            warn!("Local fork out of sync at {}, dropping {} messages", msg, self.local_fork.len());
            self.local_fork.clear();
        }
    }

    /// Rebuild the local view from the committed canvas.
    fn refresh_view(&mut self) {
        let mut view = self.replay.canvas().clone();
        for msg in self.local_fork.iter().filter(|m| m.is_undoable()) {
            if let Err(e) = view.apply(msg) {
                debug!("Local message {} no longer applies: {}", msg, e);
            }
        }
        for preview in &self.previews {
            preview.render(&mut view, self.local_user);
        }
        self.view = view;
    }

    /// Mark a local stroke as started or finished. Finishing drops previews.
    pub fn set_local_drawing_in_progress(&mut self, in_progress: bool) {
        if self.local_drawing == in_progress {
            return;
        }
        self.local_drawing = in_progress;
        if !in_progress {
            self.clear_preview();
        }
    }

    pub fn is_local_drawing_in_progress(&self) -> bool {
        self.local_drawing
    }

    // View settings

    /// Hide or show a layer in the local view only.
    pub fn set_layer_visibility(&mut self, layer_id: u16, hidden: bool) {
        if hidden {
            self.hidden_layers.insert(layer_id);
        } else {
            self.hidden_layers.remove(&layer_id);
        }
    }

    /// Local replacement for the document background. `None` restores it.
    pub fn set_local_background(&mut self, tile: Option<Tile>) {
        self.local_background = tile.map(Arc::new);
    }

    pub fn set_reveal_censored(&mut self, reveal: bool) {
        self.reveal_censored = reveal;
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    pub fn set_active_layer(&mut self, layer_id: u16) {
        self.active_layer = layer_id;
    }

    pub fn set_active_frame(&mut self, frame: usize) {
        self.active_frame = frame;
    }

    /// Flatten options reflecting the local view settings.
    pub fn flatten_options(&self) -> FlattenOptions {
        let mut hidden = self.hidden_layers.clone();
        match self.view_mode {
            ViewMode::Normal => {}
            ViewMode::Layer => {
                hidden.extend(self.view.layers().iter().map(|l| l.id()).filter(|id| *id != self.active_layer));
            }
            ViewMode::Frame => {
                let shown = self
                    .view
                    .timeline()
                    .get(self.active_frame)
                    .map(|f| f.layers.clone())
                    .unwrap_or_default();
                hidden.extend(self.view.layers().iter().map(|l| l.id()).filter(|id| !shown.contains(id)));
            }
        }
        FlattenOptions {
            reveal_censored: self.reveal_censored,
            hidden_layers: hidden,
            background_override: self.local_background.clone(),
            ..FlattenOptions::default()
        }
    }

    /// Composite the local view, optionally limited to `rect`.
    pub fn to_flat_image(&self, rect: Option<Rect>) -> RgbaImage {
        let opts = FlattenOptions {
            rect,
            ..self.flatten_options()
        };
        self.view.to_flat_image(&opts)
    }

    /// Topmost layer at `(x, y)` the local user may draw on, or 0.
    pub fn pick_layer(&self, x: i32, y: i32) -> u16 {
        let acl = self.replay.acl();
        self.view.pick_layer_where(x, y, |l| {
            !self.hidden_layers.contains(&l.id()) && acl.can_draw(self.local_user, l.id())
        })
    }

    pub fn pick_context_id(&self, x: i32, y: i32) -> u8 {
        self.view.pick_context_id(x, y)
    }

    // Recording

    /// Start mirroring committed messages to `path`.
    ///
    /// A recorder that is already running is finished first. On failure
    /// nothing changes.
    pub fn start_recorder(&mut self, path: &Path) -> Result<(), RecordStartError> {
        let recorder = Recorder::start(path, self.replay.canvas(), self.replay.acl())?;
        self.stop_recorder();
        info!("Recording to {}", path.display());
        self.recorder = Some(recorder);
        Ok(())
    }

    /// Stop recording. Returns whether a recorder was running.
    pub fn stop_recorder(&mut self) -> bool {
        let Some(recorder) = self.recorder.take() else {
            return false;
        };
        let path = recorder.path().to_path_buf();
        let count = recorder.message_count();
        match recorder.finish() {
            Ok(()) => info!("Stopped recording {} after {} messages", path.display(), count),
            Err(e) => warn!("Closing recording {} failed: {}", path.display(), e),
        }
        true
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tessera_protocol::{
        CanvasResizeMessage, FillRectMessage, LayerAclMessage, LayerCreateMessage, MessageBody,
    };

    fn resize(w: i32, h: i32) -> Message {
        Message::new(0, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: w, bottom: h, left: 0 }))
    }

    fn create(ctx: u8, id: u16) -> Message {
        Message::new(ctx, MessageBody::LayerCreate(LayerCreateMessage { id, source: 0, fill: 0, flags: 0, title: "l".into() }))
    }

    fn fill(ctx: u8, layer: u16, color: u32) -> Message {
        Message::new(ctx, MessageBody::FillRect(FillRectMessage { layer, mode: 0, x: 0, y: 0, w: 10, h: 10, color }))
    }

    fn engine() -> PaintEngine {
        let mut e = PaintEngine::new(EngineConfig::default(), Box::new(NoHooks));
        e.reset(CanvasState::new(), 1);
        e.receive_message(&resize(64, 64));
        e.receive_message(&create(1, 0x0101));
        e
    }

    #[test]
    fn test_states() {
        let mut e = engine();
        assert_eq!(e.state(), EngineState::Idle);
        e.set_local_drawing_in_progress(true);
        assert_eq!(e.state(), EngineState::LocalDrawingInProgress);
        e.set_local_drawing_in_progress(false);
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[test]
    fn test_local_fork_shows_until_echo() {
        let mut e = engine();
        let msg = fill(1, 0x0101, 0xffff0000);
        assert_eq!(e.local_message(msg.clone()), Outcome::Applied);
        assert_eq!(e.canvas().layer(0x0101).map(|l| l.tiles().pixel(0, 0).a), Some(255));
        assert_eq!(e.history_canvas().layer(0x0101).map(|l| l.tiles().pixel(0, 0).a), Some(0));
        assert_eq!(e.local_fork_len(), 1);

        e.receive_message(&msg);
        assert_eq!(e.local_fork_len(), 0);
        assert_eq!(e.canvas(), e.history_canvas());
    }

    #[test]
    fn test_mismatched_echo_drops_fork() {
        let mut e = engine();
        e.local_message(fill(1, 0x0101, 0xffff0000));
        e.receive_message(&fill(1, 0x0101, 0xff00ff00));
        assert_eq!(e.local_fork_len(), 0);
        assert_eq!(e.canvas().layer(0x0101).map(|l| l.tiles().pixel(0, 0).g), Some(255));
    }

    #[test]
    fn test_denied_message_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.tsrec");
        let mut e = engine();
        e.receive_message(&Message::new(
            1,
            MessageBody::LayerAcl(LayerAclMessage { id: 0x0101, flags: LayerAclMessage::FLAGS_LOCKED, exclusive: vec![] }),
        ));
        e.start_recorder(&path).unwrap();
        let before = e.history_canvas().clone();
        assert!(matches!(e.receive_message(&fill(7, 0x0101, 0xff000000)), Outcome::Denied(_)));
        assert_eq!(e.history_canvas(), &before);
        assert!(e.stop_recorder());
        assert!(!e.stop_recorder());

        let mut reader = crate::recording::open_recording(&path).unwrap();
        let mut count = 0;
        while let Some(msg) = reader.read_next().unwrap() {
            assert_ne!(msg.context_id(), 7);
            count += 1;
        }
        assert!(count > 0);
    }

    #[test]
    fn test_start_recorder_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = engine();
        let err = e.start_recorder(&dir.path().join("s.txt")).unwrap_err();
        assert!(matches!(err, RecordStartError::UnknownFormat(_)));
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[derive(Default)]
    struct Counter(Arc<Mutex<Vec<u8>>>);

    impl EngineHooks for Counter {
        fn push_message(&mut self, msg: &Message, _outcome: &Outcome) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(msg.context_id());
            }
        }

        fn time_ms(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_hooks_see_applied_messages_and_snapshots_are_taken() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut config = EngineConfig::default();
        config.snapshots.message_interval = 2;
        config.snapshots.min_delay_ms = 0;
        let mut e = PaintEngine::new(config, Box::new(Counter(seen.clone())));
        e.receive_message(&resize(64, 64));
        e.receive_message(&create(1, 0x0101));
        e.receive_message(&fill(1, 0x0101, 0xff000000));
        e.receive_message(&fill(1, 0x0101, 0xff000000));
        assert_eq!(seen.lock().unwrap().len(), 4);
        assert_eq!(e.snapshot_count(), 2);
    }

    #[test]
    fn test_view_mode_layer_hides_others() {
        let mut e = engine();
        e.receive_message(&create(1, 0x0102));
        e.receive_message(&fill(1, 0x0101, 0xff0000ff));
        e.set_active_layer(0x0102);
        e.set_view_mode(ViewMode::Layer);
        assert!(e.flatten_options().hidden_layers.contains(&0x0101));
        assert_eq!(e.to_flat_image(Some(Rect::new(0, 0, 1, 1))).get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_pick_layer_respects_acl_and_visibility() {
        let mut e = engine();
        e.receive_message(&fill(1, 0x0101, 0xff0000ff));
        assert_eq!(e.pick_layer(1, 1), 0x0101);
        e.set_layer_visibility(0x0101, true);
        assert_eq!(e.pick_layer(1, 1), 0);
    }
}
