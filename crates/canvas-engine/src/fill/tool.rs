use tessera_protocol::Message;
use tracing::debug;

use super::{FillError, FillParams, PendingFill};
use crate::canvas::CanvasState;
use crate::task::{self, CancelToken, TaskHandle};
use crate::types::BlendMode;

/// What a poll of the tool found.
#[derive(Debug, Clone, PartialEq)]
pub enum FillEvent {
    /// Nothing running.
    Idle,
    Running,
    /// A new pending fill is available.
    Ready,
    Failed(FillError),
}

/// Runs flood fills in the background, one at a time.
///
/// Asking for a new fill while one is computing cancels the running one and
/// restarts with the latest parameters once it has stopped, so at most one
/// fill per tool is ever in flight.
#[derive(Debug, Default)]
pub struct FloodFillTool {
    running: Option<TaskHandle<Result<PendingFill, FillError>>>,
    /// Parameters to restart with once the running fill stops.
    repeat: Option<FillParams>,
    last: Option<FillParams>,
    pending: Option<PendingFill>,
}

impl FloodFillTool {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn pending(&self) -> Option<&PendingFill> {
        self.pending.as_ref()
    }

    /// Parameters of the most recent fill request.
    pub fn last_params(&self) -> Option<&FillParams> {
        self.last.as_ref()
    }

    /// Start a fill on a snapshot of `canvas`. Any pending fill is dropped.
    pub fn fill_at(&mut self, canvas: &CanvasState, params: FillParams) {
        self.pending = None;
        match &self.running {
            Some(handle) => {
                debug!("Fill still running, restarting at {},{}", params.x, params.y);
                handle.cancel();
                self.last = Some(params.clone());
                self.repeat = Some(params);
            }
            None => self.start(canvas, params),
        }
    }

    /// Change the parameters of the current fill and compute it again.
    ///
    /// Does nothing when there is neither a pending nor a running fill.
    pub fn set_parameters(&mut self, canvas: &CanvasState, update: impl FnOnce(&mut FillParams)) {
        if self.pending.is_none() && self.running.is_none() {
            return;
        }
        let Some(mut params) = self.last.clone() else {
            return;
        };
        update(&mut params);
        if self.last.as_ref() != Some(&params) {
            self.fill_at(canvas, params);
        }
    }

    fn start(&mut self, canvas: &CanvasState, params: FillParams) {
        let snapshot = canvas.clone();
        let job_params = params.clone();
        self.last = Some(params);
        self.running = Some(task::spawn(CancelToken::new(), move |token| {
            snapshot.flood_fill(&job_params, token)
        }));
    }

    /// Check on the running fill without blocking.
    pub fn poll(&mut self, canvas: &CanvasState) -> FillEvent {
        let Some(handle) = self.running.as_mut() else {
            return FillEvent::Idle;
        };
        match handle.try_take() {
            Some(result) => {
                self.running = None;
                self.finished(canvas, Some(result))
            }
            None => FillEvent::Running,
        }
    }

    /// Block until no fill is running.
    pub fn wait(&mut self, canvas: &CanvasState) -> FillEvent {
        loop {
            let Some(handle) = self.running.take() else {
                return FillEvent::Idle;
            };
            match self.finished(canvas, handle.wait()) {
                FillEvent::Running => continue,
                event => return event,
            }
        }
    }

    fn finished(&mut self, canvas: &CanvasState, result: Option<Result<PendingFill, FillError>>) -> FillEvent {
        if let Some(params) = self.repeat.take() {
            self.start(canvas, params);
            return FillEvent::Running;
        }
        match result {
            Some(Ok(fill)) => {
                debug!("Fill ready: {} pixels", fill.pixel_count());
                self.pending = Some(fill);
                FillEvent::Ready
            }
            Some(Err(FillError::Cancelled)) => FillEvent::Idle,
            Some(Err(err)) => FillEvent::Failed(err),
            // The job panicked
            None => FillEvent::Failed(FillError::Aborted),
        }
    }

    /// Turn the pending fill into messages and forget it.
    pub fn flush(&mut self, context_id: u8, opacity: u8, blend: BlendMode) -> Vec<Message> {
        self.pending
            .take()
            .map(|fill| fill.to_messages(context_id, opacity, blend))
            .unwrap_or_default()
    }

    /// Stop any running fill and drop the pending one.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.running.take() {
            handle.cancel();
        }
        self.repeat = None;
        self.pending = None;
    }
}
