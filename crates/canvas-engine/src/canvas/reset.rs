//! Reset images: the message sequence that rebuilds a snapshot

use tessera_protocol::{
    AnnotationEditMessage, AnnotationShapeMessage, CanvasBackgroundMessage, CanvasResizeMessage,
    LayerAttributesMessage, LayerCreateMessage, Message, MessageBody, PutImageMessage, SetMetadataIntMessage,
    SetTimelineFrameMessage,
};

use super::CanvasState;
use crate::types::BlendMode;

impl CanvasState {
    /// Messages that, applied to an empty canvas, rebuild this one.
    ///
    /// Structural messages carry `context_id`. Pixel data is sent per tile
    /// with the context of the user who last touched that tile, so
    /// authorship survives the round trip. Sublayers are not included.
    pub fn to_reset_image(&self, context_id: u8) -> Vec<Message> {
        let mut msgs = Vec::new();
        let push = |msgs: &mut Vec<Message>, ctx: u8, body: MessageBody| msgs.push(Message::new(ctx, body));

        if !self.is_empty() {
            push(
                &mut msgs,
                context_id,
                MessageBody::CanvasResize(CanvasResizeMessage {
                    top: 0,
                    right: self.width as i32,
                    bottom: self.height as i32,
                    left: 0,
                }),
            );
        }

        if let Some(bg) = &self.background {
            let first = bg.pixels()[0];
            let body = if bg.pixels().iter().all(|p| *p == first) {
                CanvasBackgroundMessage::Color(first.to_argb())
            } else {
                CanvasBackgroundMessage::Tile(bg.as_bytes().to_vec())
            };
            push(&mut msgs, bg.context_id(), MessageBody::CanvasBackground(body));
        }

        for layer in &self.layers {
            push(
                &mut msgs,
                context_id,
                MessageBody::LayerCreate(LayerCreateMessage {
                    id: layer.id,
                    source: 0,
                    fill: 0,
                    flags: if layer.group { LayerCreateMessage::FLAGS_GROUP } else { 0 },
                    title: layer.title.clone(),
                }),
            );

            let mut flags = 0;
            if layer.censored {
                flags |= LayerAttributesMessage::FLAGS_CENSOR;
            }
            if layer.hidden {
                flags |= LayerAttributesMessage::FLAGS_HIDDEN;
            }
            if flags != 0 || layer.opacity != 255 || layer.blend != BlendMode::Normal {
                push(
                    &mut msgs,
                    context_id,
                    MessageBody::LayerAttributes(LayerAttributesMessage {
                        id: layer.id,
                        flags,
                        opacity: layer.opacity,
                        blend: layer.blend.as_u8(),
                    }),
                );
            }

            for (coord, tile) in layer.tiles.occupied() {
                let rect = layer.tiles.tile_bounds(coord);
                let image = layer.tiles.read_region(&rect);
                push(
                    &mut msgs,
                    tile.context_id(),
                    MessageBody::PutImage(PutImageMessage {
                        layer: layer.id,
                        mode: BlendMode::Replace.as_u8(),
                        x: rect.x as u32,
                        y: rect.y as u32,
                        w: rect.w,
                        h: rect.h,
                        image: bytemuck::cast_slice(image.as_slice()).to_vec(),
                    }),
                );
            }
        }

        for a in self.annotations.iter() {
            push(
                &mut msgs,
                context_id,
                MessageBody::AnnotationCreate(AnnotationShapeMessage {
                    id: a.id,
                    x: a.rect.x,
                    y: a.rect.y,
                    w: a.rect.w.min(u16::MAX as u32) as u16,
                    h: a.rect.h.min(u16::MAX as u32) as u16,
                }),
            );
            if a.background != 0 || a.protect || !a.text.is_empty() {
                push(
                    &mut msgs,
                    context_id,
                    MessageBody::AnnotationEdit(AnnotationEditMessage {
                        id: a.id,
                        background: a.background,
                        flags: if a.protect { AnnotationEditMessage::FLAGS_PROTECT } else { 0 },
                        text: a.text.clone(),
                    }),
                );
            }
        }

        let defaults = super::DocumentMetadata::default();
        let fields = [
            (SetMetadataIntMessage::FIELD_DPIX, self.metadata.dpix, defaults.dpix),
            (SetMetadataIntMessage::FIELD_DPIY, self.metadata.dpiy, defaults.dpiy),
            (SetMetadataIntMessage::FIELD_FRAMERATE, self.metadata.framerate, defaults.framerate),
            (SetMetadataIntMessage::FIELD_FRAME_COUNT, self.metadata.frame_count, defaults.frame_count),
        ];
        for (field, value, default) in fields {
            if value != default {
                push(
                    &mut msgs,
                    context_id,
                    MessageBody::SetMetadataInt(SetMetadataIntMessage { field, value }),
                );
            }
        }

        for (i, frame) in self.timeline.iter().enumerate() {
            push(
                &mut msgs,
                context_id,
                MessageBody::SetTimelineFrame(SetTimelineFrameMessage {
                    frame: i as u16,
                    insert: false,
                    layers: frame.layers.clone(),
                }),
            );
        }

        msgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pixel;
    use tessera_protocol::{ClassicDab, DrawDabsMessage, FillRectMessage};

    fn build() -> CanvasState {
        let mut c = CanvasState::new();
        let msgs = vec![
            Message::new(1, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 150, bottom: 90, left: 0 })),
            Message::new(1, MessageBody::CanvasBackground(CanvasBackgroundMessage::Color(0xffeeeeee))),
            Message::new(
                1,
                MessageBody::LayerCreate(LayerCreateMessage {
                    id: 0x0101,
                    source: 0,
                    fill: 0,
                    flags: 0,
                    title: "ink".into(),
                }),
            ),
            Message::new(
                2,
                MessageBody::LayerCreate(LayerCreateMessage {
                    id: 0x0201,
                    source: 0,
                    fill: 0x40000080,
                    flags: 0,
                    title: "wash".into(),
                }),
            ),
            Message::new(
                2,
                MessageBody::LayerAttributes(LayerAttributesMessage {
                    id: 0x0201,
                    flags: LayerAttributesMessage::FLAGS_HIDDEN,
                    opacity: 100,
                    blend: BlendMode::Multiply.as_u8(),
                }),
            ),
            Message::new(
                1,
                MessageBody::FillRect(FillRectMessage {
                    layer: 0x0101,
                    mode: 0,
                    x: 10,
                    y: 10,
                    w: 100,
                    h: 20,
                    color: 0xff102030,
                }),
            ),
            Message::new(
                3,
                MessageBody::DrawDabs(DrawDabsMessage {
                    layer: 0x0101,
                    x: 280,
                    y: 200,
                    color: 0xff00ff00,
                    mode: 0,
                    dabs: vec![ClassicDab { x: 0, y: 0, size: 10 * 256, hardness: 255, opacity: 255 }],
                }),
            ),
            Message::new(
                1,
                MessageBody::AnnotationCreate(AnnotationShapeMessage { id: 0x0101, x: 5, y: 6, w: 40, h: 20 }),
            ),
            Message::new(
                1,
                MessageBody::AnnotationEdit(AnnotationEditMessage {
                    id: 0x0101,
                    background: 0xffffff00,
                    flags: AnnotationEditMessage::FLAGS_PROTECT,
                    text: "note".into(),
                }),
            ),
            Message::new(1, MessageBody::SetMetadataInt(SetMetadataIntMessage { field: 2, value: 12 })),
            Message::new(
                1,
                MessageBody::SetTimelineFrame(SetTimelineFrameMessage { frame: 0, insert: false, layers: vec![0x0101] }),
            ),
        ];
        c.apply_all(&msgs).unwrap();
        c
    }

    #[test]
    fn test_reset_image_rebuilds_identical_state() {
        let original = build();
        let mut rebuilt = CanvasState::new();
        rebuilt.apply_all(&original.to_reset_image(0)).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_reset_image_keeps_tile_authorship() {
        let original = build();
        let mut rebuilt = CanvasState::new();
        rebuilt.apply_all(&original.to_reset_image(0)).unwrap();
        let grid = rebuilt.layer(0x0101).unwrap().tiles();
        let coord = grid.tiles_in_rect(&crate::types::Rect::new(70, 50, 1, 1))[0];
        assert_eq!(grid.tile(coord).unwrap().context_id(), 3);
        assert_eq!(grid.pixel(70, 50), Pixel::new(0, 255, 0, 255));
    }

    #[test]
    fn test_empty_canvas_has_empty_reset_image() {
        assert!(CanvasState::new().to_reset_image(1).is_empty());
    }
}
