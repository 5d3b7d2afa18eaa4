//! Dab application for brush strokes

use tessera_protocol::DrawDabsMessage;
use tracing::debug;

use super::{TileCoord, TileGrid, TILE_SIZE};
use crate::types::{BlendMode, Pixel, Rect};

/// Coordinate scale of dab positions (1/4 pixel precision).
pub const COORD_SCALE: f32 = 4.0;

/// Size scale of dab diameters (diameter * 256).
pub const SIZE_SCALE: f32 = 256.0;

impl TileGrid {
    /// Draw a run of classic round dabs.
    ///
    /// Returns the union of the touched areas, or `None` if every dab fell
    /// outside the grid.
    pub fn draw_dabs(&mut self, msg: &DrawDabsMessage, mode: BlendMode, context_id: u8) -> Option<Rect> {
        let color = Pixel::from_argb(msg.color | 0xff00_0000);
        let mut last_x = msg.x;
        let mut last_y = msg.y;
        let mut bounds: Option<Rect> = None;

        for dab in &msg.dabs {
            last_x = last_x.saturating_add(dab.x as i32);
            last_y = last_y.saturating_add(dab.y as i32);
            let radius = dab.size as f32 / SIZE_SCALE / 2.0;
            let touched = self.apply_dab(
                last_x as f32 / COORD_SCALE,
                last_y as f32 / COORD_SCALE,
                radius,
                color,
                dab.opacity as f32 / 255.0,
                dab.hardness as f32 / 255.0,
                mode,
                context_id,
            );
            if let Some(r) = touched {
                bounds = Some(match bounds {
                    Some(b) => union(&b, &r),
                    None => r,
                });
            }
        }

        debug!(
            "TileGrid::draw_dabs: layer={:#06x} dabs={} mode={:?} bounds={:?}",
            msg.layer,
            msg.dabs.len(),
            mode,
            bounds
        );
        bounds
    }

    /// Apply a dab to the grid (basic circle stamp)
    /// Returns bounding box of affected region
    /// Returns None if the dab is completely outside the grid
    #[allow(clippy::too_many_arguments)]
    pub fn apply_dab(
        &mut self,
        center_x: f32,
        center_y: f32,
        radius: f32,
        color: Pixel,
        opacity: f32,
        hardness: f32,
        mode: BlendMode,
        context_id: u8,
    ) -> Option<Rect> {
        if radius <= 0.0 || opacity <= 0.0 {
            return None;
        }

        // Clamp to grid bounds
        let x_min = ((center_x - radius).floor().max(0.0) as u32).min(self.width());
        let y_min = ((center_y - radius).floor().max(0.0) as u32).min(self.height());
        let x_max = ((center_x + radius).ceil().max(0.0) as u32).min(self.width());
        let y_max = ((center_y + radius).ceil().max(0.0) as u32).min(self.height());

        if x_min >= x_max || y_min >= y_max {
            return None;
        }

        let area = Rect::new(x_min as i32, y_min as i32, x_max - x_min, y_max - y_min);
        for coord in self.tiles_in_rect(&area) {
            if self.tile(coord).is_none() && !paints_on_empty(mode) {
                continue;
            }
            let tb = self.tile_bounds(coord);
            let Some(part) = area.intersect(&tb) else {
                continue;
            };
            let tile = self.tile_mut(coord);
            let mut changed = false;
            for py in part.y as u32..part.bottom() as u32 {
                for px in part.x as u32..part.right() as u32 {
                    // Calculate distance from center (use pixel center)
                    let dx = (px as f32 + 0.5) - center_x;
                    let dy = (py as f32 + 0.5) - center_y;
                    let dist = (dx * dx + dy * dy).sqrt() / radius;
                    if dist > 1.0 {
                        continue;
                    }

                    let falloff = calculate_hardness_falloff(dist, hardness);
                    let alpha = (opacity * falloff * 255.0).round() as u8;
                    if alpha == 0 {
                        continue;
                    }
                    let idx = ((py % TILE_SIZE) * TILE_SIZE + px % TILE_SIZE) as usize;
                    let dst = tile.pixels()[idx];
                    let out = super::blend_pixel(dst, color, alpha, mode);
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

        Some(area)
    }
}

/// Whether a blend mode can put pixels onto a fully transparent tile.
#[inline]
pub(crate) fn paints_on_empty(mode: BlendMode) -> bool {
    matches!(mode, BlendMode::Normal | BlendMode::Behind | BlendMode::Replace)
}

pub(crate) fn union(a: &Rect, b: &Rect) -> Rect {
    let x0 = a.x.min(b.x);
    let y0 = a.y.min(b.y);
    let x1 = a.right().max(b.right());
    let y1 = a.bottom().max(b.bottom());
    Rect::new(x0, y0, (x1 - x0 as i64) as u32, (y1 - y0 as i64) as u32)
}

/// Calculate falloff based on hardness
/// distance_normalized is 0 at center, 1 at edge
/// hardness is 0.0 (soft) to 1.0 (hard)
#[inline]
pub fn calculate_hardness_falloff(distance_normalized: f32, hardness: f32) -> f32 {
    if hardness >= 1.0 {
        // Pure hard edge
        if distance_normalized <= 1.0 { 1.0 } else { 0.0 }
    } else {
        let t = distance_normalized.clamp(0.0, 1.0);
        let soft = 1.0 - t; // Linear falloff for soft brush
        soft * (1.0 - hardness) + hardness
    }
}
