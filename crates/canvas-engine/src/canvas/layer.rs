//! Layers and their transient sublayers

use crate::tiles::{TileCoord, TileGrid, Tile};
use crate::types::{BlendMode, Pixel};

/// A raster layer.
///
/// Identity (`id`) survives reordering. Pixel content lives in a
/// copy-on-write [`TileGrid`].
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub(crate) id: u16,
    pub(crate) title: String,
    pub(crate) opacity: u8,
    pub(crate) blend: BlendMode,
    pub(crate) hidden: bool,
    pub(crate) censored: bool,
    pub(crate) group: bool,
    pub(crate) tiles: TileGrid,
    pub(crate) sublayers: Vec<Sublayer>,
}

impl Layer {
    pub(crate) fn new(id: u16, title: String, tiles: TileGrid) -> Self {
        Self {
            id,
            title,
            opacity: 255,
            blend: BlendMode::Normal,
            hidden: false,
            censored: false,
            group: false,
            tiles,
            sublayers: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Context id of the user that created the layer.
    #[inline]
    pub fn owner(&self) -> u8 {
        (self.id >> 8) as u8
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    #[inline]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[inline]
    pub fn is_censored(&self) -> bool {
        self.censored
    }

    #[inline]
    pub fn is_group(&self) -> bool {
        self.group
    }

    #[inline]
    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn sublayers(&self) -> &[Sublayer] {
        &self.sublayers
    }

    pub fn sublayer(&self, id: i32) -> Option<&Sublayer> {
        self.sublayers.iter().find(|s| s.id == id)
    }

    /// Sublayer with `id`, created empty if missing.
    pub(crate) fn sublayer_mut(&mut self, id: i32, blend: BlendMode, opacity: u8) -> &mut Sublayer {
        let idx = match self.sublayers.iter().position(|s| s.id == id) {
            Some(idx) => idx,
            None => {
                self.sublayers.push(Sublayer {
                    id,
                    blend,
                    opacity,
                    tiles: TileGrid::new(self.tiles.width(), self.tiles.height()),
                });
                self.sublayers.len() - 1
            }
        };
        let sub = &mut self.sublayers[idx];
        sub.blend = blend;
        sub.opacity = opacity;
        sub
    }

    /// Layer pixels at `coord`, with sublayers merged in when requested.
    pub(crate) fn composed_tile(&self, coord: TileCoord, include_sublayers: bool) -> Option<Tile> {
        let base = self.tiles.tile(coord);
        if !include_sublayers || self.sublayers.iter().all(|s| s.tiles.tile(coord).is_none()) {
            return base.map(|t| (**t).clone());
        }
        let mut tile = base.map(|t| (**t).clone()).unwrap_or_else(Tile::blank);
        for sub in &self.sublayers {
            if let Some(src) = sub.tiles.tile(coord) {
                tile.blend_from(src.pixels(), sub.opacity, sub.blend);
            }
        }
        (!tile.is_blank()).then_some(tile)
    }
}

/// A transient overlay on a layer, used for previews.
///
/// Sublayers are never part of a reset image or a saved document.
#[derive(Clone, Debug, PartialEq)]
pub struct Sublayer {
    pub(crate) id: i32,
    pub(crate) blend: BlendMode,
    pub(crate) opacity: u8,
    pub(crate) tiles: TileGrid,
}

impl Sublayer {
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub(crate) fn tiles_mut(&mut self) -> &mut TileGrid {
        &mut self.tiles
    }
}

/// Gray used for censored layer content.
pub(crate) const CENSOR_COLOR: Pixel = Pixel::new(0x80, 0x80, 0x80, 0xff);

/// Replace every visible pixel with the censor color, keeping alpha.
pub(crate) fn censor(tile: &mut Tile) {
    for px in tile.pixels_mut() {
        if px.a > 0 {
            *px = Pixel { a: px.a, ..CENSOR_COLOR };
        }
    }
}
