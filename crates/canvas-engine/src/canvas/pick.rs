//! Point queries for inspect tooling

use super::layer::Layer;
use super::CanvasState;
use crate::tiles::{TileCoord, TILE_SIZE};

impl CanvasState {
    /// Topmost visible layer with a non-transparent pixel at `(x, y)`, or 0.
    pub fn pick_layer(&self, x: i32, y: i32) -> u16 {
        self.pick_layer_where(x, y, |_| true)
    }

    /// Like [`pick_layer`](Self::pick_layer), skipping layers rejected by `accept`.
    pub fn pick_layer_where(&self, x: i32, y: i32, accept: impl Fn(&Layer) -> bool) -> u16 {
        self.topmost_at(x, y, accept).map_or(0, |(layer, _)| layer.id)
    }

    /// Context id of whoever last drew the pixel at `(x, y)`, or 0.
    pub fn pick_context_id(&self, x: i32, y: i32) -> u8 {
        self.topmost_at(x, y, |_| true).map_or(0, |(_, ctx)| ctx)
    }

    fn topmost_at(&self, x: i32, y: i32, accept: impl Fn(&Layer) -> bool) -> Option<(&Layer, u8)> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        self.layers
            .iter()
            .rev()
            .filter(|l| !l.hidden && l.opacity > 0 && accept(l))
            .find_map(|l| {
                let tile = l.tiles.tile(TileCoord { x: x / TILE_SIZE, y: y / TILE_SIZE })?;
                (l.tiles.pixel(x, y).a > 0).then(|| (&**l, tile.context_id()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::{CanvasResizeMessage, FillRectMessage, LayerCreateMessage, Message, MessageBody};

    fn canvas() -> CanvasState {
        let mut c = CanvasState::new();
        let create = |id: u16| {
            Message::new(
                1,
                MessageBody::LayerCreate(LayerCreateMessage { id, source: 0, fill: 0, flags: 0, title: String::new() }),
            )
        };
        c.apply_all(&[
            Message::new(1, MessageBody::CanvasResize(CanvasResizeMessage { top: 0, right: 100, bottom: 100, left: 0 })),
            create(0x0101),
            create(0x0102),
            Message::new(
                4,
                MessageBody::FillRect(FillRectMessage { layer: 0x0101, mode: 0, x: 0, y: 0, w: 50, h: 50, color: 0xff000000 }),
            ),
            Message::new(
                7,
                MessageBody::FillRect(FillRectMessage { layer: 0x0102, mode: 0, x: 10, y: 10, w: 5, h: 5, color: 0xffffffff }),
            ),
        ])
        .unwrap();
        c
    }

    #[test]
    fn test_pick_topmost_layer() {
        let c = canvas();
        assert_eq!(c.pick_layer(12, 12), 0x0102);
        assert_eq!(c.pick_layer(30, 30), 0x0101);
        assert_eq!(c.pick_layer(80, 80), 0);
        assert_eq!(c.pick_layer(-1, 5), 0);
    }

    #[test]
    fn test_pick_skips_rejected_layers() {
        let c = canvas();
        assert_eq!(c.pick_layer_where(12, 12, |l| l.id() != 0x0102), 0x0101);
    }

    #[test]
    fn test_pick_context_id() {
        let c = canvas();
        assert_eq!(c.pick_context_id(12, 12), 7);
        assert_eq!(c.pick_context_id(40, 40), 4);
        assert_eq!(c.pick_context_id(99, 99), 0);
    }
}
