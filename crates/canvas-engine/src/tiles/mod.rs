//! Copy-on-write tile storage for layer pixels
//!
//! A [`TileGrid`] covers a canvas with fixed-size [`Tile`]s held behind
//! [`Arc`]. Cloning a grid only clones the pointers; writing to a tile goes
//! through [`Arc::make_mut`], so a grid shares every tile it has not touched
//! with the snapshots it was cloned from.

mod blend;
mod dab_application;
mod data_access;

use std::fmt;
use std::sync::Arc;

use crate::types::{Pixel, Rect};

pub use blend::blend_pixel;
pub use dab_application::calculate_hardness_falloff;
pub(crate) use dab_application::union;
pub use tessera_protocol::TILE_SIZE;

/// Pixels in one tile.
pub const TILE_PIXELS: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Tile coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

/// One square block of pixels plus the context id of its last author.
#[derive(Clone, PartialEq, Eq)]
pub struct Tile {
    pixels: Box<[Pixel]>,
    context_id: u8,
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("context_id", &self.context_id)
            .field("blank", &self.is_blank())
            .finish()
    }
}

impl Tile {
    pub fn blank() -> Self {
        Self::filled(Pixel::TRANSPARENT, 0)
    }

    pub fn filled(color: Pixel, context_id: u8) -> Self {
        Self {
            pixels: vec![color; TILE_PIXELS].into_boxed_slice(),
            context_id,
        }
    }

    /// Build a tile from `TILE_SIZE * TILE_SIZE` RGBA bytes.
    pub fn from_rgba(bytes: &[u8], context_id: u8) -> Option<Self> {
        if bytes.len() != TILE_PIXELS * 4 {
            return None;
        }
        let pixels: &[Pixel] = bytemuck::cast_slice(bytes);
        Some(Self {
            pixels: pixels.into(),
            context_id,
        })
    }

    #[inline]
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    /// Pixel at tile-local coordinates.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        self.pixels[(y * TILE_SIZE + x) as usize]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    #[inline]
    pub fn context_id(&self) -> u8 {
        self.context_id
    }

    #[inline]
    pub fn set_context_id(&mut self, context_id: u8) {
        self.context_id = context_id;
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| p.a == 0)
    }
}

/// Manages the tiles covering one layer (or the flattened canvas)
///
/// Tiles are stored row-major. `None` stands for a fully transparent tile.
#[derive(Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles_x: u32,
    tiles_y: u32,
    tiles: Vec<Option<Arc<Tile>>>,
}

impl fmt::Debug for TileGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileGrid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("occupied", &self.tiles.iter().filter(|t| t.is_some()).count())
            .finish()
    }
}

impl TileGrid {
    /// Create a transparent grid covering `width` x `height` pixels
    pub fn new(width: u32, height: u32) -> Self {
        let tiles_x = width.div_ceil(TILE_SIZE);
        let tiles_y = height.div_ceil(TILE_SIZE);
        Self {
            width,
            height,
            tiles_x,
            tiles_y,
            tiles: vec![None; (tiles_x * tiles_y) as usize],
        }
    }

    /// Create a grid where every tile shares one solid-color tile
    pub fn filled(width: u32, height: u32, color: Pixel, context_id: u8) -> Self {
        let mut grid = Self::new(width, height);
        if color.a > 0 {
            let tile = Arc::new(Tile::filled(color, context_id));
            grid.tiles.iter_mut().for_each(|t| *t = Some(Arc::clone(&tile)));
            grid.clear_outside();
        }
        grid
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    #[inline]
    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    #[inline]
    fn index(&self, coord: TileCoord) -> usize {
        (coord.y * self.tiles_x + coord.x) as usize
    }

    #[inline]
    pub fn coord_of(&self, index: usize) -> TileCoord {
        TileCoord {
            x: index as u32 % self.tiles_x,
            y: index as u32 / self.tiles_x,
        }
    }

    /// Tile at `coord`, or `None` if it is transparent or out of range
    pub fn tile(&self, coord: TileCoord) -> Option<&Arc<Tile>> {
        if coord.x >= self.tiles_x || coord.y >= self.tiles_y {
            return None;
        }
        self.tiles[self.index(coord)].as_ref()
    }

    /// Replace a tile. Blank tiles are stored as `None`.
    pub fn set_tile(&mut self, coord: TileCoord, tile: Option<Arc<Tile>>) {
        if coord.x >= self.tiles_x || coord.y >= self.tiles_y {
            return;
        }
        let idx = self.index(coord);
        self.tiles[idx] = tile.filter(|t| !t.is_blank());
        self.clip_tile(coord);
    }

    /// Writable access to a tile, allocating a blank one if needed.
    ///
    /// Only this tile is unshared; other grids keep the old copy.
    pub(crate) fn tile_mut(&mut self, coord: TileCoord) -> &mut Tile {
        let idx = self.index(coord);
        let slot = self.tiles[idx].get_or_insert_with(|| Arc::new(Tile::blank()));
        Arc::make_mut(slot)
    }

    /// Drop a tile that became fully transparent.
    pub(crate) fn prune(&mut self, coord: TileCoord) {
        let idx = self.index(coord);
        if self.tiles[idx].as_ref().is_some_and(|t| t.is_blank()) {
            self.tiles[idx] = None;
        }
    }

    /// Pixel at canvas coordinates. Outside the grid is transparent.
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        if x >= self.width || y >= self.height {
            return Pixel::TRANSPARENT;
        }
        let coord = TileCoord {
            x: x / TILE_SIZE,
            y: y / TILE_SIZE,
        };
        match self.tile(coord) {
            Some(tile) => tile.pixel(x % TILE_SIZE, y % TILE_SIZE),
            None => Pixel::TRANSPARENT,
        }
    }

    /// Get tile bounds in pixel coordinates, clipped to the grid
    pub fn tile_bounds(&self, coord: TileCoord) -> Rect {
        let x = coord.x * TILE_SIZE;
        let y = coord.y * TILE_SIZE;
        let w = TILE_SIZE.min(self.width.saturating_sub(x));
        let h = TILE_SIZE.min(self.height.saturating_sub(y));
        Rect::new(x as i32, y as i32, w, h)
    }

    /// Coordinates of all tiles intersecting `rect`
    pub fn tiles_in_rect(&self, rect: &Rect) -> Vec<TileCoord> {
        let Some(area) = rect.intersect(&self.bounds()) else {
            return Vec::new();
        };
        let tx0 = area.x as u32 / TILE_SIZE;
        let ty0 = area.y as u32 / TILE_SIZE;
        let tx1 = (area.right() as u32 - 1) / TILE_SIZE;
        let ty1 = (area.bottom() as u32 - 1) / TILE_SIZE;
        let mut coords = Vec::with_capacity(((tx1 - tx0 + 1) * (ty1 - ty0 + 1)) as usize);
        for y in ty0..=ty1 {
            for x in tx0..=tx1 {
                coords.push(TileCoord { x, y });
            }
        }
        coords
    }

    /// All non-transparent tiles.
    pub fn occupied(&self) -> impl Iterator<Item = (TileCoord, &Arc<Tile>)> {
        self.tiles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (self.coord_of(i), t)))
    }

    pub fn is_blank(&self) -> bool {
        self.tiles.iter().all(Option::is_none)
    }

    /// Whether both grids hold the very same tile allocation at `coord`.
    pub fn shares_tile(&self, other: &TileGrid, coord: TileCoord) -> bool {
        match (self.tile(coord), other.tile(coord)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Copy into a grid of a new size, shifting content by `(dx, dy)` pixels.
    pub fn resized(&self, width: u32, height: u32, dx: i32, dy: i32) -> TileGrid {
        let mut out = TileGrid::new(width, height);
        if dx % TILE_SIZE as i32 == 0 && dy % TILE_SIZE as i32 == 0 {
            // Tile-aligned shift keeps sharing whole tiles
            let sx = dx / TILE_SIZE as i32;
            let sy = dy / TILE_SIZE as i32;
            for (coord, tile) in self.occupied() {
                let nx = coord.x as i32 + sx;
                let ny = coord.y as i32 + sy;
                if nx < 0 || ny < 0 || nx as u32 >= out.tiles_x || ny as u32 >= out.tiles_y {
                    continue;
                }
                let target = TileCoord { x: nx as u32, y: ny as u32 };
                let idx = out.index(target);
                out.tiles[idx] = Some(Arc::clone(tile));
            }
            out.clear_outside();
            return out;
        }

        for (coord, tile) in self.occupied() {
            let src = self.tile_bounds(coord);
            for ly in 0..src.h {
                for lx in 0..src.w {
                    let px = tile.pixel(lx, ly);
                    if px.a == 0 {
                        continue;
                    }
                    let x = src.x as i64 + lx as i64 + dx as i64;
                    let y = src.y as i64 + ly as i64 + dy as i64;
                    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                        continue;
                    }
                    let (x, y) = (x as u32, y as u32);
                    let t = out.tile_mut(TileCoord { x: x / TILE_SIZE, y: y / TILE_SIZE });
                    t.set_context_id(tile.context_id());
                    t.pixels_mut()[((y % TILE_SIZE) * TILE_SIZE + x % TILE_SIZE) as usize] = px;
                }
            }
        }
        out
    }

    /// Clear the parts of edge tiles that hang past the grid size.
    fn clear_outside(&mut self) {
        if self.width % TILE_SIZE == 0 && self.height % TILE_SIZE == 0 {
            return;
        }
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                self.clip_tile(TileCoord { x: tx, y: ty });
            }
        }
    }

    fn clip_tile(&mut self, coord: TileCoord) {
        let b = self.tile_bounds(coord);
        if (b.w == TILE_SIZE && b.h == TILE_SIZE) || self.tile(coord).is_none() {
            return;
        }
        let tile = self.tile_mut(coord);
        for ly in 0..TILE_SIZE {
            for lx in 0..TILE_SIZE {
                if lx >= b.w || ly >= b.h {
                    tile.pixels_mut()[(ly * TILE_SIZE + lx) as usize] = Pixel::TRANSPARENT;
                }
            }
        }
        self.prune(coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlendMode;

    #[test]
    fn test_tile_grid_creation() {
        let grid = TileGrid::new(256, 256);
        assert_eq!(grid.tiles_x(), 4);
        assert_eq!(grid.tiles_y(), 4);
        assert!(grid.is_blank());
    }

    #[test]
    fn test_tile_grid_non_aligned() {
        // 100x150 needs a partial second column and third row
        let grid = TileGrid::new(100, 150);
        assert_eq!(grid.tiles_x(), 2);
        assert_eq!(grid.tiles_y(), 3);
        assert_eq!(grid.tile_bounds(TileCoord { x: 1, y: 2 }), Rect::new(64, 128, 36, 22));
    }

    #[test]
    fn test_tiles_in_rect() {
        let grid = TileGrid::new(256, 256);
        let tiles = grid.tiles_in_rect(&Rect::new(60, 60, 10, 10));
        assert_eq!(tiles.len(), 4);
        assert!(grid.tiles_in_rect(&Rect::new(300, 0, 10, 10)).is_empty());
    }

    #[test]
    fn test_clone_shares_untouched_tiles() {
        let mut a = TileGrid::filled(128, 128, Pixel::new(255, 0, 0, 255), 1);
        let before = a.clone();
        a.fill_rect(&Rect::new(0, 0, 4, 4), Pixel::new(0, 0, 255, 255), BlendMode::Normal, 2);

        let touched = TileCoord { x: 0, y: 0 };
        let untouched = TileCoord { x: 1, y: 1 };
        assert!(!a.shares_tile(&before, touched));
        assert!(a.shares_tile(&before, untouched));
        assert_eq!(before.pixel(0, 0), Pixel::new(255, 0, 0, 255));
        assert_eq!(a.pixel(0, 0), Pixel::new(0, 0, 255, 255));
        assert_eq!(a.tile(touched).map(|t| t.context_id()), Some(2));
    }

    #[test]
    fn test_resize_aligned_and_unaligned() {
        let mut grid = TileGrid::new(64, 64);
        grid.fill_rect(&Rect::new(0, 0, 1, 1), Pixel::new(1, 2, 3, 255), BlendMode::Normal, 1);

        let aligned = grid.resized(128, 128, 64, 64);
        assert_eq!(aligned.pixel(64, 64), Pixel::new(1, 2, 3, 255));

        let shifted = grid.resized(70, 70, 5, 3);
        assert_eq!(shifted.pixel(5, 3), Pixel::new(1, 2, 3, 255));
        assert_eq!(shifted.pixel(0, 0), Pixel::TRANSPARENT);

        let cropped = grid.resized(32, 32, -1, 0);
        assert!(cropped.is_blank());
    }

    #[test]
    fn test_resize_with_extreme_shift_drops_content() {
        let grid = TileGrid::filled(70, 70, Pixel::new(1, 2, 3, 255), 1);
        assert!(grid.resized(70, 70, i32::MAX - 3, 1).is_blank());
        assert!(grid.resized(70, 70, 1, i32::MIN + 3).is_blank());
    }

    #[test]
    fn test_out_of_range_pixel_is_transparent() {
        let grid = TileGrid::filled(10, 10, Pixel::new(9, 9, 9, 255), 0);
        assert_eq!(grid.pixel(9, 9).a, 255);
        assert_eq!(grid.pixel(10, 0), Pixel::TRANSPARENT);
    }
}
