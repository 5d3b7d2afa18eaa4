//! Undo history
//!
//! Every applied canvas command is kept in order. An `UndoPoint` from a user
//! opens an undoable sequence made of that undo point and the user's
//! following commands. Undoing marks the sequence undone and replays the
//! history from the canvas checkpoint stored at the undo point, skipping
//! everything undone. Other users' work after that point is replayed, so
//! undo never rolls back someone else.
//!
//! Only the latest `undo_depth` undo points are kept. Anything older is
//! folded into the base canvas.

use serde::{Deserialize, Serialize};
use tessera_protocol::{DecodeError, EncodeError, Message, MessageBody, MessageType};
use tracing::debug;

use crate::canvas::{ApplyError, CanvasState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Done,
    Undone,
    /// Undone and then abandoned by a new undo point; can no longer be redone.
    Gone,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    message: Message,
    status: EntryStatus,
    /// Canvas before this entry, kept on undo points only.
    checkpoint: Option<CanvasState>,
}

impl HistoryEntry {
    #[inline]
    fn is_undo_point(&self) -> bool {
        self.message.message_type() == MessageType::UndoPoint
    }

    #[inline]
    fn user(&self) -> u8 {
        self.message.context_id()
    }
}

/// Serializable form of a [`History`], used by recording index snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryData {
    /// Reset image records of the base canvas.
    pub base: Vec<u8>,
    /// Record bytes and status of each entry.
    pub entries: Vec<(Vec<u8>, EntryStatus)>,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryDataError {
    #[error("Malformed history record: {0}")]
    Decode(#[from] DecodeError),
    #[error("History base does not apply: {0}")]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Clone)]
pub struct History {
    base: CanvasState,
    entries: Vec<HistoryEntry>,
    current: CanvasState,
    undo_depth: usize,
}

impl History {
    pub fn new(state: CanvasState, undo_depth: usize) -> Self {
        Self {
            base: state.clone(),
            entries: Vec::new(),
            current: state,
            undo_depth,
        }
    }

    /// Canvas with every done entry applied.
    #[inline]
    pub fn current(&self) -> &CanvasState {
        &self.current
    }

    /// Canvas before the oldest kept entry.
    pub fn base(&self) -> &CanvasState {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_depth
    }

    /// Drop all history and start over from `state`.
    pub fn reset(&mut self, state: CanvasState) {
        self.base = state.clone();
        self.current = state;
        self.entries.clear();
    }

    pub fn can_undo(&self, user: u8) -> bool {
        self.last_done_undo_point(user).is_some()
    }

    pub fn can_redo(&self, user: u8) -> bool {
        self.first_undone_undo_point(user).is_some()
    }

    /// Apply a message.
    ///
    /// Non-command messages are ignored. A command that fails to apply is
    /// not recorded and leaves the history unchanged.
    pub fn apply(&mut self, msg: &Message) -> Result<(), ApplyError> {
        match msg.body() {
            MessageBody::Undo(m) => {
                let user = if m.override_user != 0 { m.override_user } else { msg.context_id() };
                let done = if m.redo { self.redo(user) } else { self.undo(user) };
                if !done {
                    debug!("Nothing to {} for user {}", if m.redo { "redo" } else { "undo" }, user);
                }
                Ok(())
            }
            MessageBody::UndoPoint => {
                let user = msg.context_id();
                for e in self.entries.iter_mut() {
                    if e.user() == user && e.status == EntryStatus::Undone {
                        e.status = EntryStatus::Gone;
                    }
                }
                self.entries.push(HistoryEntry {
                    message: msg.clone(),
                    status: EntryStatus::Done,
                    checkpoint: Some(self.current.clone()),
                });
                self.trim();
                Ok(())
            }
            _ if msg.is_command() => {
                self.current.apply(msg)?;
                self.entries.push(HistoryEntry {
                    message: msg.clone(),
                    status: EntryStatus::Done,
                    checkpoint: None,
                });
                if self.undo_depth == 0 || !self.entries.iter().any(HistoryEntry::is_undo_point) {
                    self.trim();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn last_done_undo_point(&self, user: u8) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| e.user() == user && e.is_undo_point() && e.status == EntryStatus::Done)
    }

    fn first_undone_undo_point(&self, user: u8) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.user() == user && e.is_undo_point() && e.status == EntryStatus::Undone)
    }

    fn undo(&mut self, user: u8) -> bool {
        let Some(start) = self.last_done_undo_point(user) else {
            return false;
        };
        for e in self.entries[start..].iter_mut() {
            if e.user() == user && e.status == EntryStatus::Done {
                e.status = EntryStatus::Undone;
            }
        }
        debug!("Undo for user {} from entry {}", user, start);
        self.replay_from(start);
        true
    }

    fn redo(&mut self, user: u8) -> bool {
        let Some(start) = self.first_undone_undo_point(user) else {
            return false;
        };
        let end = self.entries[start + 1..]
            .iter()
            .position(|e| e.user() == user && e.is_undo_point())
            .map_or(self.entries.len(), |p| start + 1 + p);
        for e in self.entries[start..end].iter_mut() {
            if e.user() == user && e.status == EntryStatus::Undone {
                e.status = EntryStatus::Done;
            }
        }
        debug!("Redo for user {} from entry {}", user, start);
        self.replay_from(start);
        true
    }

    /// Rebuild the current canvas from the checkpoint before `start`.
    fn replay_from(&mut self, start: usize) {
        let mut state = self
            .entries
            .get(start)
            .and_then(|e| e.checkpoint.clone())
            .unwrap_or_else(|| self.base.clone());
        for e in self.entries[start..].iter_mut() {
            if e.is_undo_point() {
                e.checkpoint = Some(state.clone());
            }
            if e.status == EntryStatus::Done {
                if let Err(err) = state.apply(&e.message) {
                    debug!("Replayed {} had no effect: {}", e.message, err);
                }
            }
        }
        self.current = state;
    }

    /// Fold entries that can no longer be undone into the base canvas.
    ///
    /// Replay always starts at an undo point, so everything before the
    /// oldest kept undo point is already part of that point's checkpoint.
    fn trim(&mut self) {
        let undo_points: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_undo_point())
            .map(|(i, _)| i)
            .collect();
        let keep = undo_points.len().min(self.undo_depth);
        if keep == 0 {
            self.base = self.current.clone();
            self.entries.clear();
            return;
        }
        let cut = undo_points[undo_points.len() - keep];
        if cut > 0 {
            if let Some(checkpoint) = self.entries[cut].checkpoint.clone() {
                self.base = checkpoint;
            }
            self.entries.drain(..cut);
        }
    }

    /// Serializable copy of the history.
    pub fn to_data(&self) -> Result<HistoryData, EncodeError> {
        let base = Message::encode_all(&self.base.to_reset_image(0))?;
        let entries = self
            .entries
            .iter()
            .map(|e| Ok((e.message.to_record()?, e.status)))
            .collect::<Result<Vec<_>, EncodeError>>()?;
        Ok(HistoryData { base, entries })
    }

    /// Rebuild a history from [`History::to_data`] output.
    pub fn from_data(data: &HistoryData, undo_depth: usize) -> Result<Self, HistoryDataError> {
        let mut base = CanvasState::new();
        for msg in Message::decode_all(&data.base)? {
            base.apply(&msg)?;
        }
        let mut entries = Vec::with_capacity(data.entries.len());
        for (record, status) in &data.entries {
            let (message, _) = Message::decode_record(record)?;
            entries.push(HistoryEntry {
                message,
                status: *status,
                checkpoint: None,
            });
        }
        let mut history = Self {
            current: base.clone(),
            base,
            entries,
            undo_depth,
        };
        history.replay_from(0);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pixel;
    use tessera_protocol::{CanvasResizeMessage, FillRectMessage, LayerCreateMessage, UndoMessage};

    fn setup() -> History {
        let mut c = CanvasState::new();
        c.apply_all(&[
            Message::new(0, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 64, bottom: 64, left: 0 })),
            Message::new(
                0,
                MessageBody::LayerCreate(LayerCreateMessage { id: 1, source: 0, fill: 0, flags: 0, title: "bg".into() }),
            ),
        ])
        .unwrap();
        History::new(c, 30)
    }

    fn fill(ctx: u8, x: u32, color: u32) -> Message {
        Message::new(
            ctx,
            MessageBody::FillRect(FillRectMessage { layer: 1, mode: 0, x, y: 0, w: 1, h: 1, color }),
        )
    }

    fn undo(ctx: u8, redo: bool) -> Message {
        Message::new(ctx, MessageBody::Undo(UndoMessage { override_user: 0, redo }))
    }

    fn px(h: &History, x: u32) -> Pixel {
        h.current().layer(1).unwrap().tiles().pixel(x, 0)
    }

    const RED: u32 = 0xffff0000;
    const BLUE: u32 = 0xff0000ff;

    #[test]
    fn test_undo_only_affects_own_sequence() {
        let mut h = setup();
        h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
        h.apply(&fill(1, 0, RED)).unwrap();
        h.apply(&Message::new(2, MessageBody::UndoPoint)).unwrap();
        h.apply(&fill(2, 1, BLUE)).unwrap();

        h.apply(&undo(1, false)).unwrap();
        assert_eq!(px(&h, 0), Pixel::TRANSPARENT);
        assert_eq!(px(&h, 1), Pixel::from_argb(BLUE));

        h.apply(&undo(1, true)).unwrap();
        assert_eq!(px(&h, 0), Pixel::from_argb(RED));
        assert_eq!(px(&h, 1), Pixel::from_argb(BLUE));
    }

    #[test]
    fn test_new_undo_point_discards_redo() {
        let mut h = setup();
        h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
        h.apply(&fill(1, 0, RED)).unwrap();
        h.apply(&undo(1, false)).unwrap();
        assert!(h.can_redo(1));
        h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
        assert!(!h.can_redo(1));
        h.apply(&undo(1, true)).unwrap();
        assert_eq!(px(&h, 0), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_undo_order_is_latest_first() {
        let mut h = setup();
        for (i, color) in [RED, BLUE].into_iter().enumerate() {
            h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
            h.apply(&fill(1, i as u32, color)).unwrap();
        }
        h.apply(&undo(1, false)).unwrap();
        assert_eq!(px(&h, 0), Pixel::from_argb(RED));
        assert_eq!(px(&h, 1), Pixel::TRANSPARENT);
        h.apply(&undo(1, false)).unwrap();
        assert_eq!(px(&h, 0), Pixel::TRANSPARENT);
        h.apply(&undo(1, true)).unwrap();
        assert_eq!(px(&h, 0), Pixel::from_argb(RED));
        assert_eq!(px(&h, 1), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_depth_limits_undo() {
        let mut h = setup();
        h.undo_depth = 2;
        for x in 0..4 {
            h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
            h.apply(&fill(1, x, RED)).unwrap();
        }
        for _ in 0..4 {
            h.apply(&undo(1, false)).unwrap();
        }
        assert_eq!(px(&h, 0), Pixel::from_argb(RED));
        assert_eq!(px(&h, 1), Pixel::from_argb(RED));
        assert_eq!(px(&h, 2), Pixel::TRANSPARENT);
        assert_eq!(px(&h, 3), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_failed_command_is_not_recorded() {
        let mut h = setup();
        let before = h.len();
        let bad = Message::new(
            1,
            MessageBody::FillRect(FillRectMessage { layer: 9, mode: 0, x: 0, y: 0, w: 1, h: 1, color: RED }),
        );
        assert!(h.apply(&bad).is_err());
        assert_eq!(h.len(), before);
    }

    #[test]
    fn test_data_roundtrip_restores_undo() {
        let mut h = setup();
        h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
        h.apply(&fill(1, 0, RED)).unwrap();
        h.apply(&Message::new(1, MessageBody::UndoPoint)).unwrap();
        h.apply(&fill(1, 1, BLUE)).unwrap();
        h.apply(&undo(1, false)).unwrap();

        let mut restored = History::from_data(&h.to_data().unwrap(), 30).unwrap();
        assert_eq!(restored.current(), h.current());
        restored.apply(&undo(1, true)).unwrap();
        assert_eq!(px(&restored, 1), Pixel::from_argb(BLUE));
    }
}
