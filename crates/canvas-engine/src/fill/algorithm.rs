//! Region growing over a sampled canvas

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use super::mask::Mask;
use super::{FillArea, FillError, FillParams, FillSource, PendingFill};
use crate::canvas::{CanvasState, FlattenOptions};
use crate::task::CancelToken;
use crate::tiles::{union, Tile, TileCoord, TileGrid, TILE_PIXELS, TILE_SIZE};
use crate::types::{Pixel, Rect};

/// Color distance in `0.0..=1.0`: the largest channel difference.
///
/// Two fully transparent pixels are identical whatever their color bytes.
#[inline]
pub fn color_distance(a: Pixel, b: Pixel) -> f32 {
    if a.a == 0 && b.a == 0 {
        return 0.0;
    }
    let d = |x: u8, y: u8| x.abs_diff(y);
    d(a.r, b.r).max(d(a.g, b.g)).max(d(a.b, b.b)).max(d(a.a, b.a)) as f32 / 255.0
}

/// Reads the pixels a fill is computed against.
struct Sampler<'a> {
    source: Sampled<'a>,
    width: u32,
    height: u32,
}

enum Sampled<'a> {
    Layer(&'a TileGrid),
    Merged(&'a CanvasState, FlattenOptions),
}

impl<'a> Sampler<'a> {
    fn new(canvas: &'a CanvasState, params: &FillParams) -> Result<Self, FillError> {
        let source = match params.source {
            FillSource::Merged => Sampled::Merged(canvas, FlattenOptions::default().with_sublayers(false)),
            FillSource::MergedWithoutBackground => Sampled::Merged(
                canvas,
                FlattenOptions::default().with_sublayers(false).with_background(false),
            ),
            FillSource::CurrentLayer => Sampled::Layer(layer_tiles(canvas, params.layer_id)?),
            FillSource::FillSourceLayer(id) => Sampled::Layer(layer_tiles(canvas, id)?),
        };
        Ok(Self {
            source,
            width: canvas.width(),
            height: canvas.height(),
        })
    }

    fn grid(&self) -> TileGrid {
        TileGrid::new(self.width, self.height)
    }

    fn tile(&self, coord: TileCoord) -> Option<Arc<Tile>> {
        match &self.source {
            Sampled::Layer(grid) => grid.tile(coord).cloned(),
            Sampled::Merged(canvas, opts) => {
                let tile = canvas.flatten_tile(coord, opts);
                (!tile.is_blank()).then(|| Arc::new(tile))
            }
        }
    }

    fn pixel(&self, x: u32, y: u32) -> Pixel {
        let coord = TileCoord {
            x: x / TILE_SIZE,
            y: y / TILE_SIZE,
        };
        self.tile(coord)
            .map_or(Pixel::TRANSPARENT, |t| t.pixel(x % TILE_SIZE, y % TILE_SIZE))
    }
}

fn layer_tiles(canvas: &CanvasState, id: u16) -> Result<&TileGrid, FillError> {
    canvas.layer(id).map(|l| l.tiles()).ok_or(FillError::UnknownLayer(id))
}

#[inline]
fn tile_pixel(tile: Option<&Arc<Tile>>, lx: u32, ly: u32) -> Pixel {
    tile.map_or(Pixel::TRANSPARENT, |t| t.pixel(lx, ly))
}

/// Filled pixels collected per tile, 0 or 255 each.
type TileMasks = HashMap<TileCoord, Box<[u8]>>;

impl CanvasState {
    /// Compute a flood fill without changing the canvas.
    ///
    /// `cancel` is polled once per tile.
    pub fn flood_fill(&self, params: &FillParams, cancel: &CancelToken) -> Result<PendingFill, FillError> {
        if self.layer(params.layer_id).is_none() {
            return Err(FillError::UnknownLayer(params.layer_id));
        }
        if !self.bounds().contains(params.x, params.y) {
            return Err(FillError::OutOfBounds {
                x: params.x,
                y: params.y,
            });
        }
        let sampler = Sampler::new(self, params)?;
        let seed = sampler.pixel(params.x as u32, params.y as u32);

        let raw = match params.area {
            FillArea::Continuous if params.gap > 0 => fill_with_gap(&sampler, params, seed, cancel)?,
            FillArea::Continuous => {
                let tiles = fill_continuous(&sampler, params, seed, cancel)?;
                masks_to_mask(&sampler.grid(), &tiles)
            }
            FillArea::Similar => fill_similar(&sampler, params, seed, None, cancel)?,
            FillArea::Selection => {
                let selection = params.selection.as_ref().ok_or(FillError::NoSelection)?;
                fill_similar(&sampler, params, seed, Some(selection), cancel)?
            }
        };
        debug!(
            "Flood fill at {},{} covered {} pixels in {:?}",
            params.x,
            params.y,
            raw.count(),
            raw.bounds()
        );

        let clip = self.bounds();
        let mask = raw
            .expanded(params.expand, params.kernel, &clip)
            .feathered(params.feather, &clip)
            .cropped();

        Ok(PendingFill {
            layer_id: params.layer_id,
            color: params.color,
            origin: (params.x, params.y),
            area: params.area,
            mask,
        })
    }
}

fn check_limit(filled: u64, params: &FillParams) -> Result<(), FillError> {
    if params.size_limit > 0 && filled > params.size_limit {
        return Err(FillError::SizeLimitExceeded {
            limit: params.size_limit,
        });
    }
    Ok(())
}

/// 4-connected fill processed one tile at a time.
///
/// Each tile runs a stack fill over its own pixels; steps across a tile
/// edge are queued as seeds for the neighbouring tile.
fn fill_continuous(
    sampler: &Sampler,
    params: &FillParams,
    seed: Pixel,
    cancel: &CancelToken,
) -> Result<TileMasks, FillError> {
    let grid = sampler.grid();
    let mut masks: TileMasks = HashMap::new();
    let mut seeds: HashMap<TileCoord, Vec<(u32, u32)>> = HashMap::new();
    let mut queue: VecDeque<TileCoord> = VecDeque::new();
    let mut sampled: HashMap<TileCoord, Option<Arc<Tile>>> = HashMap::new();
    let mut filled = 0u64;

    let start = TileCoord {
        x: params.x as u32 / TILE_SIZE,
        y: params.y as u32 / TILE_SIZE,
    };
    seeds.insert(start, vec![(params.x as u32 % TILE_SIZE, params.y as u32 % TILE_SIZE)]);
    queue.push_back(start);

    while let Some(coord) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(FillError::Cancelled);
        }
        let Some(mut stack) = seeds.remove(&coord) else {
            continue;
        };
        let tile = sampled.entry(coord).or_insert_with(|| sampler.tile(coord)).clone();
        let bounds = grid.tile_bounds(coord);
        let mask = masks
            .entry(coord)
            .or_insert_with(|| vec![0u8; TILE_PIXELS].into_boxed_slice());
        let matches = |lx: u32, ly: u32| color_distance(tile_pixel(tile.as_ref(), lx, ly), seed) <= params.tolerance;

        let mut crossings: Vec<(TileCoord, u32, u32)> = Vec::new();
        while let Some((lx, ly)) = stack.pop() {
            let idx = (ly * TILE_SIZE + lx) as usize;
            if mask[idx] != 0 || !matches(lx, ly) {
                continue;
            }
            mask[idx] = 255;
            filled += 1;
            check_limit(filled, params)?;

            if lx > 0 {
                stack.push((lx - 1, ly));
            } else if coord.x > 0 {
                crossings.push((TileCoord { x: coord.x - 1, y: coord.y }, TILE_SIZE - 1, ly));
            }
            if lx + 1 < bounds.w {
                stack.push((lx + 1, ly));
            } else if coord.x + 1 < grid.tiles_x() {
                crossings.push((TileCoord { x: coord.x + 1, y: coord.y }, 0, ly));
            }
            if ly > 0 {
                stack.push((lx, ly - 1));
            } else if coord.y > 0 {
                crossings.push((TileCoord { x: coord.x, y: coord.y - 1 }, lx, TILE_SIZE - 1));
            }
            if ly + 1 < bounds.h {
                stack.push((lx, ly + 1));
            } else if coord.y + 1 < grid.tiles_y() {
                crossings.push((TileCoord { x: coord.x, y: coord.y + 1 }, lx, 0));
            }
        }

        for (next, lx, ly) in crossings {
            let already = masks
                .get(&next)
                .is_some_and(|m| m[(ly * TILE_SIZE + lx) as usize] != 0);
            if already {
                continue;
            }
            let pending = seeds.entry(next).or_default();
            if pending.is_empty() {
                queue.push_back(next);
            }
            pending.push((lx, ly));
        }
    }
    Ok(masks)
}

fn masks_to_mask(grid: &TileGrid, masks: &TileMasks) -> Mask {
    let mut rect: Option<Rect> = None;
    for coord in masks.keys() {
        let b = grid.tile_bounds(*coord);
        rect = Some(rect.map_or(b, |r| union(&r, &b)));
    }
    let Some(rect) = rect else {
        return Mask::new(Rect::new(0, 0, 0, 0));
    };
    let mut out = Mask::new(rect);
    for (coord, tile_mask) in masks {
        let b = grid.tile_bounds(*coord);
        for ly in 0..b.h {
            for lx in 0..b.w {
                let v = tile_mask[(ly * TILE_SIZE + lx) as usize];
                if v != 0 {
                    out.set(b.x + lx as i32, b.y + ly as i32, v);
                }
            }
        }
    }
    out.cropped()
}

/// Every matching pixel, regardless of connectivity. Tiles run in parallel.
///
/// With a selection only selected pixels are considered and they keep the
/// selection's coverage.
fn fill_similar(
    sampler: &Sampler,
    params: &FillParams,
    seed: Pixel,
    selection: Option<&Mask>,
    cancel: &CancelToken,
) -> Result<Mask, FillError> {
    let grid = sampler.grid();
    let coords = match selection {
        Some(sel) => grid.tiles_in_rect(&sel.bounds()),
        None => (0..grid.tile_count()).map(|i| grid.coord_of(i)).collect(),
    };

    let results: Vec<Option<(TileCoord, Box<[u8]>, u64)>> = coords
        .par_iter()
        .map(|coord| {
            if cancel.is_cancelled() {
                return None;
            }
            let tile = sampler.tile(*coord);
            let b = grid.tile_bounds(*coord);
            let mut mask = vec![0u8; TILE_PIXELS].into_boxed_slice();
            let mut count = 0;
            for ly in 0..b.h {
                for lx in 0..b.w {
                    let coverage = match selection {
                        Some(sel) => sel.get(b.x + lx as i32, b.y + ly as i32),
                        None => 255,
                    };
                    if coverage == 0 {
                        continue;
                    }
                    if color_distance(tile_pixel(tile.as_ref(), lx, ly), seed) <= params.tolerance {
                        mask[(ly * TILE_SIZE + lx) as usize] = coverage;
                        count += 1;
                    }
                }
            }
            Some((*coord, mask, count))
        })
        .collect();

    if cancel.is_cancelled() {
        return Err(FillError::Cancelled);
    }
    let mut masks = TileMasks::new();
    let mut filled = 0;
    for (coord, mask, count) in results.into_iter().flatten() {
        if count > 0 {
            filled += count;
            masks.insert(coord, mask);
        }
    }
    check_limit(filled, params)?;
    Ok(masks_to_mask(&grid, &masks))
}

/// Continuous fill that does not leak through openings up to `gap` pixels.
///
/// Fillable pixels closer than `gap` to a non-matching pixel are set aside,
/// the fill runs over the rest and then grows back by `gap` into fillable
/// pixels. Falls back to a plain fill when the seed itself sits in a gap.
fn fill_with_gap(
    sampler: &Sampler,
    params: &FillParams,
    seed: Pixel,
    cancel: &CancelToken,
) -> Result<Mask, FillError> {
    let (w, h) = (sampler.width as usize, sampler.height as usize);
    let grid = sampler.grid();
    let mut fillable = vec![false; w * h];
    for i in 0..grid.tile_count() {
        if cancel.is_cancelled() {
            return Err(FillError::Cancelled);
        }
        let coord = grid.coord_of(i);
        let tile = sampler.tile(coord);
        let b = grid.tile_bounds(coord);
        for ly in 0..b.h {
            for lx in 0..b.w {
                let idx = (b.y as usize + ly as usize) * w + b.x as usize + lx as usize;
                fillable[idx] = color_distance(tile_pixel(tile.as_ref(), lx, ly), seed) <= params.tolerance;
            }
        }
    }

    let gap = params.gap as usize;
    let core = erode_square(&fillable, w, h, gap);
    let seed_idx = params.y as usize * w + params.x as usize;
    if !core[seed_idx] {
        let tiles = fill_continuous(sampler, &FillParams { gap: 0, ..params.clone() }, seed, cancel)?;
        return Ok(masks_to_mask(&grid, &tiles));
    }

    let mut region = vec![false; w * h];
    let mut stack = vec![seed_idx];
    region[seed_idx] = true;
    while let Some(idx) = stack.pop() {
        let (x, y) = (idx % w, idx / w);
        let mut visit = |n: usize| {
            if core[n] && !region[n] {
                region[n] = true;
                stack.push(n);
            }
        };
        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < w {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - w);
        }
        if y + 1 < h {
            visit(idx + w);
        }
    }
    if cancel.is_cancelled() {
        return Err(FillError::Cancelled);
    }

    let grown = dilate_square(&region, w, h, gap);
    let mut mask = Mask::new(Rect::new(0, 0, w as u32, h as u32));
    let mut filled = 0;
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if grown[idx] && fillable[idx] {
                mask.set(x as i32, y as i32, 255);
                filled += 1;
            }
        }
    }
    check_limit(filled, params)?;
    Ok(mask.cropped())
}

/// Separable square min filter. Outside the image counts as set.
fn erode_square(src: &[bool], w: usize, h: usize, r: usize) -> Vec<bool> {
    morph_square(src, w, h, r, true)
}

/// Separable square max filter.
fn dilate_square(src: &[bool], w: usize, h: usize, r: usize) -> Vec<bool> {
    morph_square(src, w, h, r, false)
}

fn morph_square(src: &[bool], w: usize, h: usize, r: usize, erode: bool) -> Vec<bool> {
    let pass = |input: &[bool], horizontal: bool| -> Vec<bool> {
        let mut out = vec![false; w * h];
        out.par_chunks_mut(w).enumerate().for_each(|(y, line)| {
            for (x, px) in line.iter_mut().enumerate() {
                let (lo, hi) = if horizontal {
                    (x.saturating_sub(r), (x + r).min(w - 1))
                } else {
                    (y.saturating_sub(r), (y + r).min(h - 1))
                };
                let mut window = (lo..=hi).map(|i| if horizontal { input[y * w + i] } else { input[i * w + x] });
                *px = if erode { window.all(|b| b) } else { window.any(|b| b) };
            }
        });
        out
    };
    let horizontal = pass(src, true);
    pass(&horizontal, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_distance() {
        assert_eq!(color_distance(Pixel::new(1, 2, 3, 0), Pixel::TRANSPARENT), 0.0);
        assert_eq!(color_distance(Pixel::new(0, 0, 0, 255), Pixel::new(255, 0, 0, 255)), 1.0);
        let d = color_distance(Pixel::new(10, 10, 10, 255), Pixel::new(13, 10, 8, 255));
        assert!((d - 3.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_morph_square() {
        let (w, h) = (5, 5);
        let mut src = vec![false; w * h];
        src[2 * w + 2] = true;
        let grown = dilate_square(&src, w, h, 1);
        assert_eq!(grown.iter().filter(|b| **b).count(), 9);
        let back = erode_square(&grown, w, h, 1);
        assert_eq!(back.iter().filter(|b| **b).count(), 1);
    }
}
