//! Ordered message application shared by live sessions, playback and the
//! index builder.

use tessera_protocol::Message;
use tracing::{debug, warn};

use crate::acl::{AclDenial, AclState};
use crate::canvas::{ApplyError, CanvasState};
use crate::history::{History, HistoryData, HistoryDataError};

/// What happened to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Dropped by access control. Nothing changed.
    Denied(AclDenial),
    /// Allowed, but invalid for the current canvas. Nothing changed.
    Failed(ApplyError),
    /// Not handled at all, e.g. live input during playback.
    Ignored,
}

impl Outcome {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// ACL tables plus undo history: everything needed to continue a replay.
#[derive(Debug, Clone)]
pub struct Replay {
    acl: AclState,
    history: History,
}

impl Replay {
    pub fn new(canvas: CanvasState, undo_depth: usize) -> Self {
        Self {
            acl: AclState::new(),
            history: History::new(canvas, undo_depth),
        }
    }

    pub fn from_parts(acl: AclState, history: History) -> Self {
        Self { acl, history }
    }

    /// Rebuild from serialized parts (see [`History::to_data`]).
    pub fn from_data(acl: AclState, history: &HistoryData, undo_depth: usize) -> Result<Self, HistoryDataError> {
        Ok(Self {
            acl,
            history: History::from_data(history, undo_depth)?,
        })
    }

    #[inline]
    pub fn canvas(&self) -> &CanvasState {
        self.history.current()
    }

    pub fn acl(&self) -> &AclState {
        &self.acl
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Check a message against the ACL tables and the current canvas.
    pub fn check(&self, msg: &Message) -> Result<(), AclDenial> {
        self.acl.check_on(msg, self.canvas())
    }

    /// Check, then apply one message.
    ///
    /// ACL tables only change once the message has been applied, so a
    /// denied or failed message leaves every part untouched.
    pub fn handle(&mut self, msg: &Message) -> Outcome {
        if let Err(denial) = self.check(msg) {
            debug!("Dropped {}", denial);
            return Outcome::Denied(denial);
        }
        if let Err(err) = self.history.apply(msg) {
            warn!("Message {} failed: {}", msg, err);
            return Outcome::Failed(err);
        }
        self.acl.update(msg);
        Outcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::{
        CanvasResizeMessage, FillRectMessage, LayerAclMessage, LayerCreateMessage, MessageBody,
    };

    fn replay() -> Replay {
        let mut r = Replay::new(CanvasState::new(), 30);
        for msg in [
            Message::new(0, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 64, bottom: 64, left: 0 })),
            Message::new(
                2,
                MessageBody::LayerCreate(LayerCreateMessage { id: 0x0201, source: 0, fill: 0, flags: 0, title: "x".into() }),
            ),
            Message::new(
                2,
                MessageBody::LayerAcl(LayerAclMessage { id: 0x0201, flags: LayerAclMessage::FLAGS_LOCKED, exclusive: vec![] }),
            ),
        ] {
            assert_eq!(r.handle(&msg), Outcome::Applied);
        }
        r
    }

    #[test]
    fn test_denied_message_changes_nothing() {
        let mut r = replay();
        let canvas = r.canvas().clone();
        let acl = r.acl().clone();
        let history_len = r.history().len();

        let draw = Message::new(
            5,
            MessageBody::FillRect(FillRectMessage { layer: 0x0201, mode: 0, x: 0, y: 0, w: 8, h: 8, color: 0xff000000 }),
        );
        assert!(matches!(r.handle(&draw), Outcome::Denied(_)));
        assert_eq!(r.canvas(), &canvas);
        assert_eq!(r.acl(), &acl);
        assert_eq!(r.history().len(), history_len);
    }

    #[test]
    fn test_failed_layer_delete_keeps_acl() {
        let mut r = replay();
        let acl = r.acl().clone();
        let delete = Message::new(
            0,
            MessageBody::LayerDelete(tessera_protocol::LayerDeleteMessage { id: 0x0999, merge: false }),
        );
        assert!(matches!(r.handle(&delete), Outcome::Failed(_)));
        assert_eq!(r.acl(), &acl);
    }
}
