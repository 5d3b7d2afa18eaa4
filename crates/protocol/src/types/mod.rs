//! Payload structs for the message variants that carry more than one field.

mod acl;
mod annotation;
mod document;
mod draw;
mod layer;
mod meta;

pub use acl::LayerAclMessage;
pub use annotation::{AnnotationEditMessage, AnnotationShapeMessage};
pub use document::{SetMetadataIntMessage, SetTimelineFrameMessage, UndoMessage};
pub use draw::{CanvasBackgroundMessage, ClassicDab, DrawDabsMessage, FillRectMessage, PutImageMessage};
pub use layer::{
    CanvasResizeMessage, LayerAttributesMessage, LayerCreateMessage, LayerDeleteMessage,
    LayerRetitleMessage,
};
pub use meta::{ChatMessage, JoinMessage};
