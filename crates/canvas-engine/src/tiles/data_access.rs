//! Region reads and writes on a tile grid

use std::sync::Arc;

use super::dab_application::paints_on_empty;
use super::{blend_pixel, Tile, TileCoord, TileGrid, TILE_SIZE};
use crate::types::{BlendMode, Pixel, Rect};

impl TileGrid {
    /// Blend a block of row-major pixels with its top-left corner at `(x, y)`.
    ///
    /// The block is clipped to the grid. Returns the affected area.
    pub fn put_image(
        &mut self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        pixels: &[Pixel],
        mode: BlendMode,
        context_id: u8,
    ) -> Option<Rect> {
        debug_assert_eq!(pixels.len(), (w * h) as usize);
        let area = Rect::new(x, y, w, h).intersect(&self.bounds())?;
        self.write_area(&area, mode, context_id, |px, py| {
            pixels[((py as i64 - y as i64) as u32 * w + (px as i64 - x as i64) as u32) as usize]
        });
        Some(area)
    }

    /// Blend a solid color over a rectangle.
    pub fn fill_rect(&mut self, rect: &Rect, color: Pixel, mode: BlendMode, context_id: u8) -> Option<Rect> {
        let area = rect.intersect(&self.bounds())?;
        self.write_area(&area, mode, context_id, |_, _| color);
        Some(area)
    }

    fn write_area(
        &mut self,
        area: &Rect,
        mode: BlendMode,
        context_id: u8,
        source: impl Fn(u32, u32) -> Pixel,
    ) {
        for coord in self.tiles_in_rect(area) {
            if self.tile(coord).is_none() && !paints_on_empty(mode) {
                continue;
            }
            let Some(part) = area.intersect(&self.tile_bounds(coord)) else {
                continue;
            };
            let tile = self.tile_mut(coord);
            let mut changed = false;
            for py in part.y as u32..part.bottom() as u32 {
                for px in part.x as u32..part.right() as u32 {
                    let idx = ((py % TILE_SIZE) * TILE_SIZE + px % TILE_SIZE) as usize;
                    let dst = tile.pixels()[idx];
                    let out = blend_pixel(dst, source(px, py), 255, mode);
                    if out != dst {
                        tile.pixels_mut()[idx] = out;
                        changed = true;
                    }
                }
            }
            if changed {
                tile.set_context_id(context_id);
            }
            self.prune(coord);
        }
    }

    /// Copy out a rectangle as row-major pixels. Outside the grid is transparent.
    pub fn read_region(&self, rect: &Rect) -> Vec<Pixel> {
        let mut out = Vec::with_capacity((rect.w * rect.h) as usize);
        for row in 0..rect.h as i64 {
            for col in 0..rect.w as i64 {
                let x = rect.x as i64 + col;
                let y = rect.y as i64 + row;
                if x < 0 || y < 0 || x > u32::MAX as i64 || y > u32::MAX as i64 {
                    out.push(Pixel::TRANSPARENT);
                } else {
                    out.push(self.pixel(x as u32, y as u32));
                }
            }
        }
        out
    }

    /// Blend every tile of `other` onto this grid.
    ///
    /// Both grids must have the same size. Tiles this grid does not have yet
    /// are shared with `other` when that gives the same result.
    pub fn merge(&mut self, other: &TileGrid, opacity: u8, mode: BlendMode) {
        debug_assert_eq!((self.width(), self.height()), (other.width(), other.height()));
        for (coord, src) in other.occupied() {
            if self.tile(coord).is_none() {
                if !paints_on_empty(mode) {
                    continue;
                }
                if opacity == 255 {
                    self.set_tile(coord, Some(Arc::clone(src)));
                    continue;
                }
            }
            self.merge_tile(coord, src.pixels(), opacity, mode, src.context_id());
        }
    }

    /// Blend one tile's pixels onto the tile at `coord`.
    pub(crate) fn merge_tile(&mut self, coord: TileCoord, src: &[Pixel], opacity: u8, mode: BlendMode, context_id: u8) {
        let tile = self.tile_mut(coord);
        if tile.blend_from(src, opacity, mode) {
            tile.set_context_id(context_id);
        }
        self.prune(coord);
    }
}

impl Tile {
    /// Blend a whole tile of pixels onto this one. Returns whether anything changed.
    pub(crate) fn blend_from(&mut self, src: &[Pixel], opacity: u8, mode: BlendMode) -> bool {
        let mut changed = false;
        for (dst, s) in self.pixels_mut().iter_mut().zip(src) {
            let out = blend_pixel(*dst, *s, opacity, mode);
            if out != *dst {
                *dst = out;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_image_clips_to_grid() {
        let mut grid = TileGrid::new(70, 70);
        let px = vec![Pixel::new(1, 2, 3, 255); 4 * 4];
        let area = grid.put_image(68, -2, 4, 4, &px, BlendMode::Replace, 5).unwrap();
        assert_eq!(area, Rect::new(68, 0, 2, 2));
        assert_eq!(grid.pixel(69, 1), Pixel::new(1, 2, 3, 255));
        assert_eq!(grid.pixel(69, 2), Pixel::TRANSPARENT);
    }

    #[test]
    fn test_read_region_roundtrip() {
        let mut grid = TileGrid::new(128, 128);
        let px: Vec<Pixel> = (0..(10 * 3)).map(|i| Pixel::new(i as u8, 0, 0, 255)).collect();
        grid.put_image(60, 60, 10, 3, &px, BlendMode::Replace, 1);
        assert_eq!(grid.read_region(&Rect::new(60, 60, 10, 3)), px);
    }

    #[test]
    fn test_fill_rect_erase_prunes_tiles() {
        let mut grid = TileGrid::filled(64, 64, Pixel::new(0, 0, 0, 255), 1);
        grid.fill_rect(&grid.bounds(), Pixel::new(0, 0, 0, 255), BlendMode::Erase, 1);
        assert!(grid.is_blank());
    }

    #[test]
    fn test_merge_shares_opaque_tiles() {
        let mut below = TileGrid::new(64, 64);
        let above = TileGrid::filled(64, 64, Pixel::new(9, 9, 9, 255), 4);
        below.merge(&above, 255, BlendMode::Normal);
        assert!(below.shares_tile(&above, TileCoord { x: 0, y: 0 }));
    }
}
