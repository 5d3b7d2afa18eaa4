//! Session and layer access control
//!
//! [`AclState`] is consulted before every message reaches the canvas. A
//! denied message is dropped whole: it changes neither the ACL tables, the
//! canvas, nor the undo history.
//!
//! Context id 0 is the server itself and is never denied.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_protocol::{JoinMessage, LayerAclMessage, Message, MessageBody, MessageType};
use tracing::debug;

use crate::canvas::CanvasState;

/// Access tiers, most privileged first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Tier {
    Operator = 0,
    Trusted = 1,
    Authenticated = 2,
    #[default]
    Guest = 3,
}

impl Tier {
    /// Tier from the low bits of a layer ACL message. Out of range values mean `Guest`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Operator,
            1 => Self::Trusted,
            2 => Self::Authenticated,
            _ => Self::Guest,
        }
    }
}

/// A set of context ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserBits([u64; 4]);

impl UserBits {
    pub fn from_users(users: &[u8]) -> Self {
        let mut bits = Self::default();
        for u in users {
            bits.insert(*u);
        }
        bits
    }

    #[inline]
    pub fn contains(&self, user: u8) -> bool {
        self.0[(user / 64) as usize] & (1 << (user % 64)) != 0
    }

    #[inline]
    pub fn insert(&mut self, user: u8) {
        self.0[(user / 64) as usize] |= 1 << (user % 64);
    }

    #[inline]
    pub fn remove(&mut self, user: u8) {
        self.0[(user / 64) as usize] &= !(1 << (user % 64));
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|u| self.contains(*u))
    }
}

/// Restrictions on one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerAcl {
    pub locked: bool,
    /// Least privileged tier still allowed to draw.
    pub tier: Tier,
    /// When non-empty, only these users may draw.
    pub exclusive: UserBits,
}

impl LayerAcl {
    fn is_default(&self) -> bool {
        !self.locked && self.tier == Tier::Guest && self.exclusive.is_empty()
    }
}

/// A dropped message.
///
/// Denials are part of normal operation and are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclDenial {
    pub context_id: u8,
    pub message_type: MessageType,
    pub reason: &'static str,
}

impl fmt::Display for AclDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from user {} denied: {}", self.message_type.name(), self.context_id, self.reason)
    }
}

/// Permission tables for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclState {
    operators: UserBits,
    trusted: UserBits,
    authenticated: UserBits,
    locked_users: UserBits,
    session_locked: bool,
    layers: BTreeMap<u16, LayerAcl>,
}

impl AclState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_operator(&self, user: u8) -> bool {
        user == 0 || self.operators.contains(user)
    }

    pub fn is_trusted(&self, user: u8) -> bool {
        self.trusted.contains(user)
    }

    pub fn is_user_locked(&self, user: u8) -> bool {
        self.locked_users.contains(user)
    }

    pub fn is_session_locked(&self) -> bool {
        self.session_locked
    }

    pub fn operators(&self) -> UserBits {
        self.operators
    }

    pub fn tier_of(&self, user: u8) -> Tier {
        if self.is_operator(user) {
            Tier::Operator
        } else if self.trusted.contains(user) {
            Tier::Trusted
        } else if self.authenticated.contains(user) {
            Tier::Authenticated
        } else {
            Tier::Guest
        }
    }

    pub fn layer(&self, layer_id: u16) -> Option<&LayerAcl> {
        self.layers.get(&layer_id)
    }

    /// Whether `user` may change pixels on `layer_id`.
    pub fn can_draw(&self, user: u8, layer_id: u16) -> bool {
        self.layer_denial(user, layer_id).is_none()
    }

    fn layer_denial(&self, user: u8, layer_id: u16) -> Option<&'static str> {
        if self.is_operator(user) {
            return None;
        }
        let acl = self.layers.get(&layer_id)?;
        if acl.locked {
            Some("layer is locked")
        } else if !acl.exclusive.is_empty() && !acl.exclusive.contains(user) {
            Some("layer is reserved for other users")
        } else if self.tier_of(user) > acl.tier {
            Some("access tier too low for layer")
        } else {
            None
        }
    }

    /// Check a message without changing anything.
    pub fn check(&self, msg: &Message) -> Result<(), AclDenial> {
        let ctx = msg.context_id();
        if ctx == 0 {
            return Ok(());
        }
        let deny = |reason| {
            Err(AclDenial {
                context_id: ctx,
                message_type: msg.message_type(),
                reason,
            })
        };
        let op = self.is_operator(ctx);

        if msg.is_command() {
            if self.locked_users.contains(ctx) {
                return deny("user is locked");
            }
            if self.session_locked && !op {
                return deny("session is locked");
            }
        }

        let owns = |id: u16| (id >> 8) as u8 == ctx;
        match msg.body() {
            MessageBody::SessionOwner(_)
            | MessageBody::TrustedUsers(_)
            | MessageBody::UserAcl(_)
            | MessageBody::SessionLock(_)
            | MessageBody::CanvasResize(_)
            | MessageBody::CanvasBackground(_)
            | MessageBody::LayerOrder(_)
            | MessageBody::SetMetadataInt(_)
            | MessageBody::SetTimelineFrame(_)
            | MessageBody::RemoveTimelineFrame(_)
                if !op =>
            {
                deny("operator only")
            }
            MessageBody::LayerAcl(m) if !op && !owns(m.id) => deny("not the layer owner"),
            MessageBody::LayerCreate(m) if !op && !owns(m.id) => deny("layer id belongs to another user"),
            MessageBody::LayerAttributes(m) if !op && !owns(m.id) => deny("not the layer owner"),
            MessageBody::LayerRetitle(m) if !op && !owns(m.id) => deny("not the layer owner"),
            MessageBody::LayerDelete(m) if !op && !owns(m.id) => deny("not the layer owner"),
            MessageBody::LayerDelete(m) => self.layer_denial(ctx, m.id).map_or(Ok(()), deny),
            MessageBody::PutImage(m) => self.layer_denial(ctx, m.layer).map_or(Ok(()), deny),
            MessageBody::FillRect(m) => self.layer_denial(ctx, m.layer).map_or(Ok(()), deny),
            MessageBody::DrawDabs(m) => self.layer_denial(ctx, m.layer).map_or(Ok(()), deny),
            MessageBody::AnnotationCreate(m) if !op && !owns(m.id) => deny("annotation id belongs to another user"),
            MessageBody::Undo(m) if m.override_user != 0 && m.override_user != ctx && !op => {
                deny("only operators may undo for others")
            }
            _ => Ok(()),
        }
        .inspect_err(|denial| debug!("{}", denial))
    }

    /// [`check`](Self::check) plus the parts that depend on the canvas: a
    /// merging delete also writes to the layer below.
    pub fn check_on(&self, msg: &Message, canvas: &CanvasState) -> Result<(), AclDenial> {
        self.check(msg)?;
        let ctx = msg.context_id();
        let MessageBody::LayerDelete(m) = msg.body() else {
            return Ok(());
        };
        if ctx == 0 || !m.merge {
            return Ok(());
        }
        let target = canvas
            .layer_index(m.id)
            .and_then(|idx| idx.checked_sub(1))
            .map(|idx| canvas.layers()[idx].id());
        match target.and_then(|id| self.layer_denial(ctx, id)) {
            Some(reason) => {
                let denial = AclDenial {
                    context_id: ctx,
                    message_type: msg.message_type(),
                    reason,
                };
                debug!("{} (merge target)", denial);
                Err(denial)
            }
            None => Ok(()),
        }
    }

    /// Check a message and, when allowed, apply its effect on the tables.
    pub fn handle(&mut self, msg: &Message) -> Result<(), AclDenial> {
        self.check(msg)?;
        self.update(msg);
        Ok(())
    }

    /// Apply the effect of an already checked message.
    pub(crate) fn update(&mut self, msg: &Message) {
        let ctx = msg.context_id();
        match msg.body() {
            MessageBody::Join(m) => {
                self.forget_user(ctx);
                if m.flags & JoinMessage::FLAGS_AUTH != 0 {
                    self.authenticated.insert(ctx);
                }
                if m.flags & JoinMessage::FLAGS_MOD != 0 {
                    self.operators.insert(ctx);
                }
            }
            MessageBody::Leave => self.forget_user(ctx),
            MessageBody::SessionOwner(users) => self.operators = UserBits::from_users(users),
            MessageBody::TrustedUsers(users) => self.trusted = UserBits::from_users(users),
            MessageBody::UserAcl(users) => self.locked_users = UserBits::from_users(users),
            MessageBody::SessionLock(locked) => self.session_locked = *locked,
            MessageBody::LayerAcl(m) => self.set_layer_acl(m),
            MessageBody::LayerDelete(m) => {
                self.layers.remove(&m.id);
            }
            _ => {}
        }
    }

    /// Server messages that rebuild these tables on a fresh session.
    ///
    /// Authenticated status comes from join messages and is not included.
    pub fn to_reset_messages(&self) -> Vec<Message> {
        let users = |bits: &UserBits| bits.iter().filter(|u| *u != 0).collect::<Vec<u8>>();
        let mut msgs = Vec::new();
        if !self.operators.is_empty() {
            msgs.push(Message::new(0, MessageBody::SessionOwner(users(&self.operators))));
        }
        if !self.trusted.is_empty() {
            msgs.push(Message::new(0, MessageBody::TrustedUsers(users(&self.trusted))));
        }
        if !self.locked_users.is_empty() {
            msgs.push(Message::new(0, MessageBody::UserAcl(users(&self.locked_users))));
        }
        if self.session_locked {
            msgs.push(Message::new(0, MessageBody::SessionLock(true)));
        }
        for (id, acl) in &self.layers {
            let locked = if acl.locked { LayerAclMessage::FLAGS_LOCKED } else { 0 };
            msgs.push(Message::new(
                0,
                MessageBody::LayerAcl(LayerAclMessage {
                    id: *id,
                    flags: locked | acl.tier as u8,
                    exclusive: users(&acl.exclusive),
                }),
            ));
        }
        msgs
    }

    fn set_layer_acl(&mut self, m: &LayerAclMessage) {
        let acl = LayerAcl {
            locked: m.locked(),
            tier: Tier::from_u8(m.tier()),
            exclusive: UserBits::from_users(&m.exclusive),
        };
        if acl.is_default() {
            self.layers.remove(&m.id);
        } else {
            self.layers.insert(m.id, acl);
        }
    }

    fn forget_user(&mut self, user: u8) {
        self.operators.remove(user);
        self.trusted.remove(user);
        self.authenticated.remove(user);
        self.locked_users.remove(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::{
        CanvasResizeMessage, ChatMessage, FillRectMessage, LayerCreateMessage, LayerDeleteMessage, UndoMessage,
    };

    fn join(ctx: u8, flags: u8) -> Message {
        Message::new(
            ctx,
            MessageBody::Join(JoinMessage {
                flags,
                name: format!("user{ctx}"),
                hash: Vec::new(),
            }),
        )
    }

    fn fill(ctx: u8, layer: u16) -> Message {
        Message::new(
            ctx,
            MessageBody::FillRect(FillRectMessage { layer, mode: 0, x: 0, y: 0, w: 1, h: 1, color: 0xff000000 }),
        )
    }

    fn layer_acl(ctx: u8, id: u16, flags: u8, exclusive: Vec<u8>) -> Message {
        Message::new(ctx, MessageBody::LayerAcl(LayerAclMessage { id, flags, exclusive }))
    }

    #[test]
    fn test_user_bits() {
        let mut bits = UserBits::from_users(&[0, 63, 64, 255]);
        assert!(bits.contains(255) && bits.contains(64) && !bits.contains(1));
        bits.remove(64);
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![0, 63, 255]);
    }

    #[test]
    fn test_join_flags_set_tier() {
        let mut acl = AclState::new();
        acl.handle(&join(2, JoinMessage::FLAGS_MOD)).unwrap();
        acl.handle(&join(3, JoinMessage::FLAGS_AUTH)).unwrap();
        assert_eq!(acl.tier_of(2), Tier::Operator);
        assert_eq!(acl.tier_of(3), Tier::Authenticated);
        assert_eq!(acl.tier_of(4), Tier::Guest);
        acl.handle(&Message::new(2, MessageBody::Leave)).unwrap();
        assert_eq!(acl.tier_of(2), Tier::Guest);
    }

    #[test]
    fn test_locked_layer_denies_non_operators() {
        let mut acl = AclState::new();
        acl.handle(&join(1, JoinMessage::FLAGS_MOD)).unwrap();
        acl.handle(&layer_acl(1, 0x0101, LayerAclMessage::FLAGS_LOCKED | 3, vec![])).unwrap();

        let before = acl.clone();
        let denial = acl.handle(&fill(5, 0x0101)).unwrap_err();
        assert_eq!(denial.context_id, 5);
        assert_eq!(acl, before);
        assert!(acl.handle(&fill(1, 0x0101)).is_ok());
        assert!(!acl.can_draw(5, 0x0101));
    }

    #[test]
    fn test_exclusive_and_tier() {
        let mut acl = AclState::new();
        acl.handle(&layer_acl(0, 0x0201, 3, vec![7])).unwrap();
        assert!(acl.can_draw(7, 0x0201));
        assert!(!acl.can_draw(8, 0x0201));

        acl.handle(&layer_acl(0, 0x0202, 1, vec![])).unwrap();
        assert!(!acl.can_draw(8, 0x0202));
        acl.handle(&Message::new(0, MessageBody::TrustedUsers(vec![8]))).unwrap();
        assert!(acl.can_draw(8, 0x0202));

        // Back to defaults drops the entry
        acl.handle(&layer_acl(0, 0x0202, 3, vec![])).unwrap();
        assert!(acl.layer(0x0202).is_none());
    }

    #[test]
    fn test_layer_create_needs_own_id() {
        let acl = AclState::new();
        let create = |ctx, id| {
            Message::new(
                ctx,
                MessageBody::LayerCreate(LayerCreateMessage { id, source: 0, fill: 0, flags: 0, title: String::new() }),
            )
        };
        assert!(acl.check(&create(3, 0x0301)).is_ok());
        assert!(acl.check(&create(3, 0x0401)).is_err());
    }

    #[test]
    fn test_session_lock_and_user_lock() {
        let mut acl = AclState::new();
        acl.handle(&Message::new(0, MessageBody::SessionLock(true))).unwrap();
        assert!(acl.check(&fill(4, 0x0401)).is_err());
        assert!(acl.check(&Message::new(4, MessageBody::Chat(ChatMessage { flags: 0, text: "hi".into() }))).is_ok());

        acl.handle(&Message::new(0, MessageBody::SessionLock(false))).unwrap();
        acl.handle(&Message::new(0, MessageBody::UserAcl(vec![4]))).unwrap();
        assert!(acl.check(&fill(4, 0x0401)).is_err());
        assert!(acl.check(&fill(5, 0x0401)).is_ok());
    }

    #[test]
    fn test_undo_override_needs_operator() {
        let acl = AclState::new();
        let undo = Message::new(3, MessageBody::Undo(UndoMessage { override_user: 4, redo: false }));
        assert!(acl.check(&undo).is_err());
        let own = Message::new(3, MessageBody::Undo(UndoMessage { override_user: 3, redo: false }));
        assert!(acl.check(&own).is_ok());
    }

    #[test]
    fn test_reset_messages_rebuild_tables() {
        let mut acl = AclState::new();
        acl.handle(&Message::new(0, MessageBody::SessionOwner(vec![1, 2]))).unwrap();
        acl.handle(&Message::new(0, MessageBody::UserAcl(vec![9]))).unwrap();
        acl.handle(&layer_acl(1, 0x0101, LayerAclMessage::FLAGS_LOCKED | 1, vec![3, 4])).unwrap();

        let mut rebuilt = AclState::new();
        for msg in acl.to_reset_messages() {
            rebuilt.handle(&msg).unwrap();
        }
        assert_eq!(rebuilt, acl);
    }

    #[test]
    fn test_merge_into_locked_layer_is_denied() {
        let create = |id| {
            Message::new(
                0,
                MessageBody::LayerCreate(LayerCreateMessage { id, source: 0, fill: 0, flags: 0, title: String::new() }),
            )
        };
        let mut canvas = CanvasState::new();
        canvas
            .apply_all(&[
                Message::new(0, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 8, bottom: 8, left: 0 })),
                create(0x0101),
                create(0x0401),
            ])
            .unwrap();
        let mut acl = AclState::new();
        acl.handle(&layer_acl(0, 0x0101, LayerAclMessage::FLAGS_LOCKED, vec![])).unwrap();

        let delete = |merge| Message::new(4, MessageBody::LayerDelete(LayerDeleteMessage { id: 0x0401, merge }));
        assert!(acl.check(&delete(true)).is_ok());
        let denial = acl.check_on(&delete(true), &canvas).unwrap_err();
        assert_eq!(denial.reason, "layer is locked");
        assert!(acl.check_on(&delete(false), &canvas).is_ok());
        assert!(acl.check_on(&Message::new(0, delete(true).body().clone()), &canvas).is_ok());
    }

    #[test]
    fn test_server_context_is_never_denied() {
        let mut acl = AclState::new();
        acl.handle(&layer_acl(0, 0x0101, LayerAclMessage::FLAGS_LOCKED, vec![])).unwrap();
        acl.handle(&Message::new(0, MessageBody::SessionLock(true))).unwrap();
        assert!(acl.check(&fill(0, 0x0101)).is_ok());
    }
}
