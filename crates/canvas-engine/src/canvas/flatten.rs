//! Compositing layers into flat images

use std::collections::HashSet;
use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use super::layer::censor;
use super::CanvasState;
use crate::tiles::{Tile, TileCoord, TileGrid, TILE_SIZE};
use crate::types::Rect;

/// What to include when compositing.
#[derive(Clone, Debug)]
pub struct FlattenOptions {
    /// Limit output to this area. `None` means the whole canvas.
    pub rect: Option<Rect>,
    pub include_background: bool,
    pub include_sublayers: bool,
    /// Show censored layers as they are instead of as flat gray.
    pub reveal_censored: bool,
    /// Layers hidden by a local view override.
    pub hidden_layers: HashSet<u16>,
    /// Local replacement for the document background.
    pub background_override: Option<Arc<Tile>>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            rect: None,
            include_background: true,
            include_sublayers: true,
            reveal_censored: false,
            hidden_layers: HashSet::new(),
            background_override: None,
        }
    }
}

impl FlattenOptions {
    pub fn area(rect: Rect) -> Self {
        Self {
            rect: Some(rect),
            ..Self::default()
        }
    }

    pub fn with_background(mut self, include: bool) -> Self {
        self.include_background = include;
        self
    }

    pub fn with_sublayers(mut self, include: bool) -> Self {
        self.include_sublayers = include;
        self
    }
}

impl CanvasState {
    /// Composite every visible layer of one tile, bottom to top.
    pub fn flatten_tile(&self, coord: TileCoord, opts: &FlattenOptions) -> Tile {
        let background = opts.background_override.as_ref().or(self.background());
        let mut acc = match background {
            Some(bg) if opts.include_background => (**bg).clone(),
            _ => Tile::blank(),
        };

        for layer in self.layers() {
            if layer.is_hidden() || opts.hidden_layers.contains(&layer.id()) || layer.opacity() == 0 {
                continue;
            }
            let Some(mut tile) = layer.composed_tile(coord, opts.include_sublayers) else {
                continue;
            };
            if layer.is_censored() && !opts.reveal_censored {
                censor(&mut tile);
            }
            acc.blend_from(tile.pixels(), layer.opacity(), layer.blend());
        }
        acc
    }

    /// Flatten the tiles at `coords` in parallel.
    pub(crate) fn flatten_tiles(&self, coords: &[TileCoord], opts: &FlattenOptions) -> Vec<(TileCoord, Tile)> {
        coords
            .par_iter()
            .map(|coord| (*coord, self.flatten_tile(*coord, opts)))
            .collect()
    }

    /// Whole-canvas composite as a tile grid.
    pub fn flatten_grid(&self, opts: &FlattenOptions) -> TileGrid {
        let mut grid = TileGrid::new(self.width(), self.height());
        let coords: Vec<TileCoord> = (0..grid.tile_count()).map(|i| grid.coord_of(i)).collect();
        for (coord, tile) in self.flatten_tiles(&coords, opts) {
            grid.set_tile(coord, Some(Arc::new(tile)));
        }
        grid
    }

    /// Composite visible layers into an image.
    ///
    /// With `opts.rect` set only the tiles intersecting that area are
    /// composited and the image has the size of the area (clipped to the
    /// canvas).
    pub fn to_flat_image(&self, opts: &FlattenOptions) -> RgbaImage {
        let area = match opts.rect {
            Some(rect) => rect.intersect(&self.bounds()),
            None => (!self.is_empty()).then(|| self.bounds()),
        };
        let Some(area) = area else {
            return RgbaImage::new(0, 0);
        };

        let grid = TileGrid::new(self.width(), self.height());
        let coords = grid.tiles_in_rect(&area);
        let mut img = RgbaImage::new(area.w, area.h);
        for (coord, tile) in self.flatten_tiles(&coords, opts) {
            blit(&mut img, &area, &grid.tile_bounds(coord), &tile);
        }
        img
    }

    /// Composite only the tiles intersecting `rect`.
    pub fn to_flat_image_area(&self, rect: Rect, include_background: bool, include_sublayers: bool) -> RgbaImage {
        let opts = FlattenOptions::area(rect)
            .with_background(include_background)
            .with_sublayers(include_sublayers);
        self.to_flat_image(&opts)
    }

    /// Pixels of a single layer, without opacity or blending applied.
    pub fn layer_to_flat_image(&self, layer_id: u16, rect: Option<Rect>) -> Option<RgbaImage> {
        let layer = self.layer(layer_id)?;
        let area = match rect {
            Some(r) => r.intersect(&self.bounds())?,
            None => self.bounds(),
        };
        let grid = layer.tiles();
        let mut img = RgbaImage::new(area.w, area.h);
        for coord in grid.tiles_in_rect(&area) {
            if let Some(tile) = grid.tile(coord) {
                blit(&mut img, &area, &grid.tile_bounds(coord), tile);
            }
        }
        Some(img)
    }
}

/// Copy the part of `tile` (placed at `tile_rect`) that falls inside `area`.
fn blit(img: &mut RgbaImage, area: &Rect, tile_rect: &Rect, tile: &Tile) {
    let Some(part) = area.intersect(tile_rect) else {
        return;
    };
    for y in part.y..part.bottom() as i32 {
        for x in part.x..part.right() as i32 {
            let px = tile.pixel((x - tile_rect.x) as u32 % TILE_SIZE, (y - tile_rect.y) as u32 % TILE_SIZE);
            img.put_pixel((x - area.x) as u32, (y - area.y) as u32, image::Rgba(px.to_array()));
        }
    }
}
