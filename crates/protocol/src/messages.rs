//! Message envelope, type tags and record framing.

use std::fmt;
use std::sync::Arc;

use crate::error::{DecodeError, EncodeError};
use crate::reader::PayloadReader;
use crate::types::*;
use crate::writer::PayloadWriter;
use crate::{HEADER_LEN, MAX_PAYLOAD_LEN};

/// Type tag of a message on the wire.
///
/// Tags below 128 are meta and access-control messages; tags from 128 up are
/// canvas commands that go into the undo history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Join = 32,
    Leave = 33,
    SessionOwner = 34,
    Chat = 35,
    TrustedUsers = 36,
    UserAcl = 65,
    LayerAcl = 66,
    SessionLock = 67,
    UndoPoint = 128,
    CanvasResize = 129,
    LayerCreate = 130,
    LayerAttributes = 131,
    LayerRetitle = 132,
    LayerOrder = 133,
    LayerDelete = 134,
    PutImage = 135,
    FillRect = 136,
    DrawDabs = 137,
    AnnotationCreate = 138,
    AnnotationReshape = 139,
    AnnotationEdit = 140,
    AnnotationDelete = 141,
    SetMetadataInt = 142,
    SetTimelineFrame = 143,
    RemoveTimelineFrame = 144,
    CanvasBackground = 145,
    Undo = 146,
}

impl MessageType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::SessionOwner => "sessionowner",
            Self::Chat => "chat",
            Self::TrustedUsers => "trusted",
            Self::UserAcl => "useracl",
            Self::LayerAcl => "layeracl",
            Self::SessionLock => "sessionlock",
            Self::UndoPoint => "undopoint",
            Self::CanvasResize => "resize",
            Self::LayerCreate => "newlayer",
            Self::LayerAttributes => "layerattr",
            Self::LayerRetitle => "retitlelayer",
            Self::LayerOrder => "layerorder",
            Self::LayerDelete => "deletelayer",
            Self::PutImage => "putimage",
            Self::FillRect => "fillrect",
            Self::DrawDabs => "classicdabs",
            Self::AnnotationCreate => "newannotation",
            Self::AnnotationReshape => "reshapeannotation",
            Self::AnnotationEdit => "editannotation",
            Self::AnnotationDelete => "deleteannotation",
            Self::SetMetadataInt => "setmetadataint",
            Self::SetTimelineFrame => "settimelineframe",
            Self::RemoveTimelineFrame => "removetimelineframe",
            Self::CanvasBackground => "background",
            Self::Undo => "undo",
        }
    }

    /// Canvas commands are the only messages that can change pixels or layers.
    #[inline]
    pub fn is_command(self) -> bool {
        self as u8 >= 128
    }
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            32 => Join,
            33 => Leave,
            34 => SessionOwner,
            35 => Chat,
            36 => TrustedUsers,
            65 => UserAcl,
            66 => LayerAcl,
            67 => SessionLock,
            128 => UndoPoint,
            129 => CanvasResize,
            130 => LayerCreate,
            131 => LayerAttributes,
            132 => LayerRetitle,
            133 => LayerOrder,
            134 => LayerDelete,
            135 => PutImage,
            136 => FillRect,
            137 => DrawDabs,
            138 => AnnotationCreate,
            139 => AnnotationReshape,
            140 => AnnotationEdit,
            141 => AnnotationDelete,
            142 => SetMetadataInt,
            143 => SetTimelineFrame,
            144 => RemoveTimelineFrame,
            145 => CanvasBackground,
            146 => Undo,
            other => return Err(DecodeError::UnknownType(other)),
        })
    }
}

/// The decoded payload of a message, one variant per message type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    Join(JoinMessage),
    Leave,
    /// Context ids of the session operators.
    SessionOwner(Vec<u8>),
    Chat(ChatMessage),
    /// Context ids of trusted users.
    TrustedUsers(Vec<u8>),
    /// Context ids of users locked out of drawing.
    UserAcl(Vec<u8>),
    LayerAcl(LayerAclMessage),
    SessionLock(bool),
    UndoPoint,
    CanvasResize(CanvasResizeMessage),
    LayerCreate(LayerCreateMessage),
    LayerAttributes(LayerAttributesMessage),
    LayerRetitle(LayerRetitleMessage),
    /// Layer ids from bottom to top.
    LayerOrder(Vec<u16>),
    LayerDelete(LayerDeleteMessage),
    PutImage(PutImageMessage),
    FillRect(FillRectMessage),
    DrawDabs(DrawDabsMessage),
    AnnotationCreate(AnnotationShapeMessage),
    AnnotationReshape(AnnotationShapeMessage),
    AnnotationEdit(AnnotationEditMessage),
    AnnotationDelete(u16),
    SetMetadataInt(SetMetadataIntMessage),
    SetTimelineFrame(SetTimelineFrameMessage),
    RemoveTimelineFrame(u16),
    CanvasBackground(CanvasBackgroundMessage),
    Undo(UndoMessage),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        use MessageBody as B;
        use MessageType as T;
        match self {
            B::Join(_) => T::Join,
            B::Leave => T::Leave,
            B::SessionOwner(_) => T::SessionOwner,
            B::Chat(_) => T::Chat,
            B::TrustedUsers(_) => T::TrustedUsers,
            B::UserAcl(_) => T::UserAcl,
            B::LayerAcl(_) => T::LayerAcl,
            B::SessionLock(_) => T::SessionLock,
            B::UndoPoint => T::UndoPoint,
            B::CanvasResize(_) => T::CanvasResize,
            B::LayerCreate(_) => T::LayerCreate,
            B::LayerAttributes(_) => T::LayerAttributes,
            B::LayerRetitle(_) => T::LayerRetitle,
            B::LayerOrder(_) => T::LayerOrder,
            B::LayerDelete(_) => T::LayerDelete,
            B::PutImage(_) => T::PutImage,
            B::FillRect(_) => T::FillRect,
            B::DrawDabs(_) => T::DrawDabs,
            B::AnnotationCreate(_) => T::AnnotationCreate,
            B::AnnotationReshape(_) => T::AnnotationReshape,
            B::AnnotationEdit(_) => T::AnnotationEdit,
            B::AnnotationDelete(_) => T::AnnotationDelete,
            B::SetMetadataInt(_) => T::SetMetadataInt,
            B::SetTimelineFrame(_) => T::SetTimelineFrame,
            B::RemoveTimelineFrame(_) => T::RemoveTimelineFrame,
            B::CanvasBackground(_) => T::CanvasBackground,
            B::Undo(_) => T::Undo,
        }
    }

    fn deserialize(message_type: MessageType, r: &mut PayloadReader) -> Result<Self, DecodeError> {
        use MessageBody as B;
        use MessageType as T;
        Ok(match message_type {
            T::Join => B::Join(JoinMessage::deserialize(r)?),
            T::Leave => {
                r.validate("Leave", 0, 0)?;
                B::Leave
            }
            T::SessionOwner => B::SessionOwner(read_user_list("SessionOwner", r)?),
            T::Chat => B::Chat(ChatMessage::deserialize(r)?),
            T::TrustedUsers => B::TrustedUsers(read_user_list("TrustedUsers", r)?),
            T::UserAcl => B::UserAcl(read_user_list("UserAcl", r)?),
            T::LayerAcl => B::LayerAcl(LayerAclMessage::deserialize(r)?),
            T::SessionLock => {
                r.validate("SessionLock", 1, 1)?;
                B::SessionLock(r.read_bool()?)
            }
            T::UndoPoint => {
                r.validate("UndoPoint", 0, 0)?;
                B::UndoPoint
            }
            T::CanvasResize => B::CanvasResize(CanvasResizeMessage::deserialize(r)?),
            T::LayerCreate => B::LayerCreate(LayerCreateMessage::deserialize(r)?),
            T::LayerAttributes => B::LayerAttributes(LayerAttributesMessage::deserialize(r)?),
            T::LayerRetitle => B::LayerRetitle(LayerRetitleMessage::deserialize(r)?),
            T::LayerOrder => {
                r.validate("LayerOrder", 0, MAX_PAYLOAD_LEN)?;
                B::LayerOrder(r.read_remaining_u16s()?)
            }
            T::LayerDelete => B::LayerDelete(LayerDeleteMessage::deserialize(r)?),
            T::PutImage => B::PutImage(PutImageMessage::deserialize(r)?),
            T::FillRect => B::FillRect(FillRectMessage::deserialize(r)?),
            T::DrawDabs => B::DrawDabs(DrawDabsMessage::deserialize(r)?),
            T::AnnotationCreate => B::AnnotationCreate(AnnotationShapeMessage::deserialize(r)?),
            T::AnnotationReshape => B::AnnotationReshape(AnnotationShapeMessage::deserialize(r)?),
            T::AnnotationEdit => B::AnnotationEdit(AnnotationEditMessage::deserialize(r)?),
            T::AnnotationDelete => {
                r.validate("AnnotationDelete", 2, 2)?;
                B::AnnotationDelete(r.read_u16()?)
            }
            T::SetMetadataInt => B::SetMetadataInt(SetMetadataIntMessage::deserialize(r)?),
            T::SetTimelineFrame => B::SetTimelineFrame(SetTimelineFrameMessage::deserialize(r)?),
            T::RemoveTimelineFrame => {
                r.validate("RemoveTimelineFrame", 2, 2)?;
                B::RemoveTimelineFrame(r.read_u16()?)
            }
            T::CanvasBackground => B::CanvasBackground(CanvasBackgroundMessage::deserialize(r)?),
            T::Undo => B::Undo(UndoMessage::deserialize(r)?),
        })
    }

    fn check(&self) -> Result<(), EncodeError> {
        use MessageBody as B;
        match self {
            B::Join(m) => m.check(),
            B::SessionOwner(ids) | B::TrustedUsers(ids) | B::UserAcl(ids) => {
                if ids.len() > u8::MAX as usize {
                    Err(EncodeError::InvalidField("user list exceeds 255 entries"))
                } else {
                    Ok(())
                }
            }
            B::LayerAcl(m) => m.check(),
            B::PutImage(m) => m.check(),
            B::DrawDabs(m) => m.check(),
            B::CanvasBackground(m) => m.check(),
            _ => Ok(()),
        }
    }

    fn payload_len(&self) -> usize {
        use MessageBody as B;
        match self {
            B::Join(m) => m.payload_len(),
            B::Leave | B::UndoPoint => 0,
            B::SessionOwner(ids) | B::TrustedUsers(ids) | B::UserAcl(ids) => ids.len(),
            B::Chat(m) => m.payload_len(),
            B::LayerAcl(m) => m.payload_len(),
            B::SessionLock(_) => 1,
            B::CanvasResize(_) => 16,
            B::LayerCreate(m) => m.payload_len(),
            B::LayerAttributes(_) => 5,
            B::LayerRetitle(m) => m.payload_len(),
            B::LayerOrder(ids) => ids.len() * 2,
            B::LayerDelete(_) => 3,
            B::PutImage(m) => m.payload_len(),
            B::FillRect(_) => 23,
            B::DrawDabs(m) => m.payload_len(),
            B::AnnotationCreate(_) | B::AnnotationReshape(_) => 14,
            B::AnnotationEdit(m) => m.payload_len(),
            B::AnnotationDelete(_) | B::RemoveTimelineFrame(_) => 2,
            B::SetMetadataInt(_) => 5,
            B::SetTimelineFrame(m) => m.payload_len(),
            B::CanvasBackground(m) => m.payload_len(),
            B::Undo(_) => 2,
        }
    }

    fn serialize(&self, w: &mut PayloadWriter) {
        use MessageBody as B;
        match self {
            B::Join(m) => m.serialize(w),
            B::Leave | B::UndoPoint => {}
            B::SessionOwner(ids) | B::TrustedUsers(ids) | B::UserAcl(ids) => {
                w.bytes(ids);
            }
            B::Chat(m) => m.serialize(w),
            B::LayerAcl(m) => m.serialize(w),
            B::SessionLock(locked) => {
                w.bool(*locked);
            }
            B::CanvasResize(m) => m.serialize(w),
            B::LayerCreate(m) => m.serialize(w),
            B::LayerAttributes(m) => m.serialize(w),
            B::LayerRetitle(m) => m.serialize(w),
            B::LayerOrder(ids) => {
                w.u16s(ids);
            }
            B::LayerDelete(m) => m.serialize(w),
            B::PutImage(m) => m.serialize(w),
            B::FillRect(m) => m.serialize(w),
            B::DrawDabs(m) => m.serialize(w),
            B::AnnotationCreate(m) | B::AnnotationReshape(m) => m.serialize(w),
            B::AnnotationEdit(m) => m.serialize(w),
            B::AnnotationDelete(id) | B::RemoveTimelineFrame(id) => {
                w.u16(*id);
            }
            B::SetMetadataInt(m) => m.serialize(w),
            B::SetTimelineFrame(m) => m.serialize(w),
            B::CanvasBackground(m) => m.serialize(w),
            B::Undo(m) => m.serialize(w),
        }
    }
}

/// A list of context ids whose payload length is also its element count.
fn read_user_list(name: &'static str, r: &mut PayloadReader) -> Result<Vec<u8>, DecodeError> {
    r.validate(name, 0, u8::MAX as usize)?;
    Ok(r.read_remaining().to_vec())
}

/// The fixed-size frame in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub payload_len: usize,
    pub message_type: u8,
    pub context_id: u8,
}

impl RecordHeader {
    /// Parse a header from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }
        Ok(Self {
            payload_len: u16::from_be_bytes([buf[0], buf[1]]) as usize,
            message_type: buf[2],
            context_id: buf[3],
        })
    }

    /// Header plus payload length.
    #[inline]
    pub fn record_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }
}

/// An immutable, author-tagged protocol message.
///
/// Cloning is cheap: the body is shared behind an [`Arc`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    context_id: u8,
    body: Arc<MessageBody>,
}

impl Message {
    pub fn new(context_id: u8, body: MessageBody) -> Self {
        Self {
            context_id,
            body: Arc::new(body),
        }
    }

    /// Id of the user (context) that authored the message. Zero is the server.
    #[inline]
    pub fn context_id(&self) -> u8 {
        self.context_id
    }

    #[inline]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    #[inline]
    pub fn is_command(&self) -> bool {
        self.message_type().is_command()
    }

    /// Commands other than `Undo` are recorded in the undo history.
    #[inline]
    pub fn is_undoable(&self) -> bool {
        self.is_command() && !matches!(*self.body, MessageBody::Undo(_))
    }

    /// Exact number of bytes [`Message::serialize_payload`] writes.
    pub fn payload_len(&self) -> usize {
        self.body.payload_len()
    }

    /// Append the payload (without header) to `buf`; returns bytes written.
    pub fn serialize_payload(&self, buf: &mut Vec<u8>) -> usize {
        let mut w = PayloadWriter::new(buf);
        self.body.serialize(&mut w);
        w.written()
    }

    /// Decode a payload of the given type.
    pub fn deserialize(message_type: u8, context_id: u8, payload: &[u8]) -> Result<Self, DecodeError> {
        let message_type = MessageType::try_from(message_type)?;
        let mut r = PayloadReader::new(payload);
        let body = MessageBody::deserialize(message_type, &mut r)?;
        Ok(Self::new(context_id, body))
    }

    /// Append a full record (header and payload) to `out`.
    pub fn encode_record(&self, out: &mut Vec<u8>) -> Result<usize, EncodeError> {
        self.body.check()?;
        let len = self.payload_len();
        if len > MAX_PAYLOAD_LEN {
            return Err(EncodeError::PayloadTooLong {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        out.reserve(HEADER_LEN + len);
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.push(self.message_type() as u8);
        out.push(self.context_id);
        let written = self.serialize_payload(out);
        debug_assert_eq!(written, len);
        Ok(HEADER_LEN + len)
    }

    pub fn to_record(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload_len());
        self.encode_record(&mut out)?;
        Ok(out)
    }

    /// Decode one record from the start of `buf`.
    ///
    /// Returns the message and the number of bytes consumed. A header that
    /// declares more payload than `buf` holds is rejected as truncated.
    pub fn decode_record(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let header = RecordHeader::parse(buf)?;
        let end = header.record_len();
        if buf.len() < end {
            return Err(DecodeError::Truncated {
                needed: end,
                available: buf.len(),
            });
        }
        let msg = Self::deserialize(header.message_type, header.context_id, &buf[HEADER_LEN..end])?;
        Ok((msg, end))
    }

    /// Encode a list of messages back to back.
    pub fn encode_all<'a>(msgs: impl IntoIterator<Item = &'a Message>) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        for msg in msgs {
            msg.encode_record(&mut out)?;
        }
        Ok(out)
    }

    /// Decode a buffer of back-to-back records. Fails on the first bad record.
    pub fn decode_all(mut buf: &[u8]) -> Result<Vec<Message>, DecodeError> {
        let mut msgs = Vec::new();
        while !buf.is_empty() {
            let (msg, used) = Self::decode_record(buf)?;
            msgs.push(msg);
            buf = &buf[used..];
        }
        Ok(msgs)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.context_id, self.message_type().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{argb, unpack_argb};

    fn roundtrip(msg: Message) {
        let mut payload = Vec::new();
        let written = msg.serialize_payload(&mut payload);
        assert_eq!(written, msg.payload_len(), "{msg}");
        let back = Message::deserialize(msg.message_type() as u8, msg.context_id(), &payload).unwrap();
        assert_eq!(back, msg);
    }

    fn samples() -> Vec<Message> {
        vec![
            Message::new(
                1,
                MessageBody::Join(JoinMessage {
                    flags: JoinMessage::FLAGS_AUTH,
                    name: "alice".into(),
                    hash: vec![1, 2, 3],
                }),
            ),
            Message::new(1, MessageBody::Leave),
            Message::new(0, MessageBody::SessionOwner(vec![1, 2])),
            Message::new(2, MessageBody::Chat(ChatMessage { flags: 0, text: "hi".into() })),
            Message::new(0, MessageBody::TrustedUsers(vec![4, 250])),
            Message::new(0, MessageBody::UserAcl(vec![9])),
            Message::new(
                1,
                MessageBody::LayerAcl(LayerAclMessage {
                    id: 0x0101,
                    flags: LayerAclMessage::FLAGS_LOCKED | 1,
                    exclusive: vec![3],
                }),
            ),
            Message::new(1, MessageBody::SessionLock(true)),
            Message::new(1, MessageBody::UndoPoint),
            Message::new(
                1,
                MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 100, bottom: 80, left: -4 }),
            ),
            Message::new(
                1,
                MessageBody::LayerCreate(LayerCreateMessage {
                    id: 0x0101,
                    source: 0,
                    fill: argb(255, 0, 0, 255),
                    flags: 0,
                    title: "Layer 1".into(),
                }),
            ),
            Message::new(
                1,
                MessageBody::LayerAttributes(LayerAttributesMessage {
                    id: 0x0101,
                    flags: LayerAttributesMessage::FLAGS_HIDDEN,
                    opacity: 128,
                    blend: 2,
                }),
            ),
            Message::new(1, MessageBody::LayerRetitle(LayerRetitleMessage { id: 0x0101, title: "Sketch".into() })),
            Message::new(1, MessageBody::LayerOrder(vec![0x0102, 0x0101])),
            Message::new(1, MessageBody::LayerDelete(LayerDeleteMessage { id: 0x0102, merge: true })),
            Message::new(
                1,
                MessageBody::PutImage(PutImageMessage {
                    layer: 0x0101,
                    mode: 0,
                    x: 3,
                    y: 4,
                    w: 2,
                    h: 1,
                    image: vec![1, 2, 3, 4, 5, 6, 7, 8],
                }),
            ),
            Message::new(
                1,
                MessageBody::FillRect(FillRectMessage {
                    layer: 0x0101,
                    mode: 1,
                    x: 0,
                    y: 10,
                    w: 64,
                    h: 3,
                    color: 0x80102030,
                }),
            ),
            Message::new(
                1,
                MessageBody::DrawDabs(DrawDabsMessage {
                    layer: 0x0101,
                    x: 40,
                    y: -8,
                    color: 0xff00ff00,
                    mode: 0,
                    dabs: vec![
                        ClassicDab { x: 0, y: 0, size: 512, hardness: 255, opacity: 255 },
                        ClassicDab { x: -4, y: 127, size: 256, hardness: 10, opacity: 128 },
                    ],
                }),
            ),
            Message::new(1, MessageBody::AnnotationCreate(AnnotationShapeMessage { id: 7, x: -5, y: 6, w: 100, h: 40 })),
            Message::new(1, MessageBody::AnnotationReshape(AnnotationShapeMessage { id: 7, x: 0, y: 0, w: 1, h: 2 })),
            Message::new(
                1,
                MessageBody::AnnotationEdit(AnnotationEditMessage {
                    id: 7,
                    background: 0x80ffffff,
                    flags: 0,
                    text: "<b>note</b>".into(),
                }),
            ),
            Message::new(1, MessageBody::AnnotationDelete(7)),
            Message::new(
                1,
                MessageBody::SetMetadataInt(SetMetadataIntMessage {
                    field: SetMetadataIntMessage::FIELD_FRAMERATE,
                    value: -24,
                }),
            ),
            Message::new(
                1,
                MessageBody::SetTimelineFrame(SetTimelineFrameMessage {
                    frame: 2,
                    insert: true,
                    layers: vec![0x0101],
                }),
            ),
            Message::new(1, MessageBody::RemoveTimelineFrame(2)),
            Message::new(1, MessageBody::CanvasBackground(CanvasBackgroundMessage::Color(0xffffffff))),
            Message::new(
                1,
                MessageBody::CanvasBackground(CanvasBackgroundMessage::Tile(
                    (0..crate::TILE_BYTES).map(|i| i as u8).collect(),
                )),
            ),
            Message::new(1, MessageBody::Undo(UndoMessage { override_user: 0, redo: true })),
        ]
    }

    #[test]
    fn test_roundtrip_samples() {
        for msg in samples() {
            roundtrip(msg);
        }
    }

    #[test]
    fn test_samples_cover_every_message_type() {
        let covered: std::collections::BTreeSet<u8> = samples().iter().map(|m| m.message_type() as u8).collect();
        for tag in 0..=u8::MAX {
            if MessageType::try_from(tag).is_ok() {
                assert!(covered.contains(&tag), "no sample for type {tag}");
            }
        }
    }

    #[test]
    fn test_put_image_with_overflowing_size_is_rejected() {
        let msg = Message::new(
            1,
            MessageBody::PutImage(PutImageMessage {
                layer: 1,
                mode: 0,
                x: 0,
                y: 0,
                w: u32::MAX,
                h: u32::MAX,
                image: vec![0; 4],
            }),
        );
        assert_eq!(
            msg.to_record(),
            Err(EncodeError::InvalidField("PutImage::image size does not match w*h"))
        );
    }

    #[test]
    fn test_record_roundtrip_and_offsets() {
        let msgs = samples();
        let buf = Message::encode_all(&msgs).unwrap();
        assert_eq!(Message::decode_all(&buf).unwrap(), msgs);
    }

    #[test]
    fn test_every_record_prefix_is_rejected() {
        for msg in samples() {
            let record = msg.to_record().unwrap();
            for cut in 0..record.len() {
                assert!(
                    Message::decode_record(&record[..cut]).is_err(),
                    "{msg} accepted a {cut} byte prefix"
                );
            }
        }
    }

    #[test]
    fn test_join_with_empty_name_rejected() {
        let result = Message::deserialize(MessageType::Join as u8, 1, &[0x01, 0x00]);
        assert_eq!(result, Err(DecodeError::InvalidField("Join::name is empty")));
    }

    #[test]
    fn test_join_name_longer_than_payload_rejected() {
        let result = Message::deserialize(MessageType::Join as u8, 1, &[0x00, 0x05, b'a', b'b']);
        assert!(result.is_err());
    }

    #[test]
    fn test_user_list_over_255_rejected() {
        let payload = vec![1u8; 256];
        let result = Message::deserialize(MessageType::SessionOwner as u8, 0, &payload);
        assert!(matches!(result, Err(DecodeError::InvalidLength { len: 256, max: 255, .. })));

        let ok = Message::deserialize(MessageType::SessionOwner as u8, 0, &payload[..255]).unwrap();
        assert_eq!(ok.payload_len(), 255);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(Message::deserialize(200, 1, &[]), Err(DecodeError::UnknownType(200)));
    }

    #[test]
    fn test_put_image_size_mismatch_rejected() {
        let mut payload = Vec::new();
        Message::new(
            1,
            MessageBody::PutImage(PutImageMessage {
                layer: 1,
                mode: 0,
                x: 0,
                y: 0,
                w: 1,
                h: 1,
                image: vec![0; 4],
            }),
        )
        .serialize_payload(&mut payload);
        payload.pop();
        assert!(Message::deserialize(MessageType::PutImage as u8, 1, &payload).is_err());
    }

    #[test]
    fn test_oversized_encode_rejected() {
        let msg = Message::new(1, MessageBody::SessionOwner(vec![0; 300]));
        assert!(msg.to_record().is_err());
    }

    #[test]
    fn test_argb_packing() {
        let c = argb(1, 2, 3, 4);
        assert_eq!(c, 0x04010203);
        assert_eq!(unpack_argb(c), [1, 2, 3, 4]);
    }
}
