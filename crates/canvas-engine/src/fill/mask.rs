use rayon::prelude::*;
use tessera_config::FillKernel;

use crate::types::Rect;

/// An 8-bit coverage mask placed on the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl Mask {
    /// Empty mask covering `rect`.
    pub fn new(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.w,
            height: rect.h,
            alpha: vec![0; (rect.w as usize) * (rect.h as usize)],
        }
    }

    /// Mask with the given row-major coverage. `None` if the length is off.
    pub fn from_alpha(rect: Rect, alpha: Vec<u8>) -> Option<Self> {
        (alpha.len() == (rect.w as usize) * (rect.h as usize)).then_some(Self {
            x: rect.x,
            y: rect.y,
            width: rect.w,
            height: rect.h,
            alpha,
        })
    }

    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    #[inline]
    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Coverage at canvas coordinates. Zero outside the mask.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        let (cx, cy) = (x as i64 - self.x as i64, y as i64 - self.y as i64);
        if cx < 0 || cy < 0 || cx >= self.width as i64 || cy >= self.height as i64 {
            return 0;
        }
        self.alpha[(cy as usize) * self.width as usize + cx as usize]
    }

    pub(crate) fn set(&mut self, x: i32, y: i32, value: u8) {
        let (cx, cy) = (x as i64 - self.x as i64, y as i64 - self.y as i64);
        if cx >= 0 && cy >= 0 && cx < self.width as i64 && cy < self.height as i64 {
            self.alpha[(cy as usize) * self.width as usize + cx as usize] = value;
        }
    }

    /// Number of covered pixels.
    pub fn count(&self) -> u64 {
        self.alpha.iter().filter(|a| **a > 0).count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.iter().all(|a| *a == 0)
    }

    /// Shrink to the smallest rectangle holding every covered pixel.
    pub fn cropped(&self) -> Mask {
        let w = self.width as usize;
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for (i, a) in self.alpha.iter().enumerate() {
            if *a == 0 {
                continue;
            }
            let (x, y) = (i % w, i / w);
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        let Some((x0, y0, x1, y1)) = bounds else {
            return Mask::new(Rect::new(self.x, self.y, 0, 0));
        };
        let rect = Rect::new(
            self.x + x0 as i32,
            self.y + y0 as i32,
            (x1 - x0 + 1) as u32,
            (y1 - y0 + 1) as u32,
        );
        self.resampled(rect)
    }

    /// Copy of this mask over another rectangle.
    fn resampled(&self, rect: Rect) -> Mask {
        let mut out = Mask::new(rect);
        for row in 0..rect.h as i32 {
            for col in 0..rect.w as i32 {
                let v = self.get(rect.x + col, rect.y + row);
                out.alpha[row as usize * rect.w as usize + col as usize] = v;
            }
        }
        out
    }

    /// Grow (`radius > 0`) or shrink (`radius < 0`) the covered area.
    ///
    /// Growth never leaves `clip`.
    pub fn expanded(&self, radius: i32, kernel: FillKernel, clip: &Rect) -> Mask {
        if radius == 0 || self.width == 0 || self.height == 0 {
            return self.clone();
        }
        let r = radius.unsigned_abs() as i32;
        let dilate = radius > 0;
        let rect = if dilate {
            let grown = Rect::new(self.x - r, self.y - r, self.width + 2 * r as u32, self.height + 2 * r as u32);
            match grown.intersect(clip) {
                Some(rect) => rect,
                None => return Mask::new(Rect::new(self.x, self.y, 0, 0)),
            }
        } else {
            self.bounds()
        };

        let spans: Vec<(i32, i32)> = (-r..=r)
            .map(|dy| {
                let half = match kernel {
                    FillKernel::Square => r,
                    FillKernel::Round => (((r * r - dy * dy) as f32).sqrt()).floor() as i32,
                };
                (dy, half)
            })
            .collect();

        let mut out = Mask::new(rect);
        out.alpha
            .par_chunks_mut(rect.w as usize)
            .enumerate()
            .for_each(|(row, line)| {
                let y = rect.y + row as i32;
                for (col, px) in line.iter_mut().enumerate() {
                    let x = rect.x + col as i32;
                    let mut v = if dilate { 0u8 } else { 255u8 };
                    'kernel: for &(dy, half) in &spans {
                        for dx in -half..=half {
                            let s = self.get(x + dx, y + dy);
                            if dilate {
                                v = v.max(s);
                                if v == 255 {
                                    break 'kernel;
                                }
                            } else {
                                v = v.min(s);
                                if v == 0 {
                                    break 'kernel;
                                }
                            }
                        }
                    }
                    *px = v;
                }
            });
        out
    }

    /// Soften the edge with a box blur of `radius`, staying inside `clip`.
    pub fn feathered(&self, radius: u32, clip: &Rect) -> Mask {
        if radius == 0 || self.width == 0 || self.height == 0 {
            return self.clone();
        }
        let r = radius as i32;
        let grown = Rect::new(self.x - r, self.y - r, self.width + 2 * radius, self.height + 2 * radius);
        let Some(rect) = grown.intersect(clip) else {
            return self.clone();
        };
        let (w, h) = (rect.w as usize, rect.h as usize);
        let window = (2 * r + 1) as u32;

        // Horizontal pass over source coverage
        let mut horizontal = vec![0u32; w * h];
        horizontal.par_chunks_mut(w).enumerate().for_each(|(row, line)| {
            let y = rect.y + row as i32;
            let mut sum: u32 = (-r..=r).map(|dx| self.get(rect.x + dx, y) as u32).sum();
            for (col, out) in line.iter_mut().enumerate() {
                *out = sum;
                let x = rect.x + col as i32;
                sum += self.get(x + r + 1, y) as u32;
                sum -= self.get(x - r, y) as u32;
            }
        });

        // Vertical pass; rows outside `rect` contribute nothing
        let mut out = Mask::new(rect);
        for col in 0..w {
            let at = |row: i32| -> u32 {
                if row < 0 || row >= h as i32 {
                    0
                } else {
                    horizontal[row as usize * w + col]
                }
            };
            let mut sum: u32 = (-r..=r).map(at).sum();
            for row in 0..h as i32 {
                out.alpha[row as usize * w + col] = ((sum + window * window / 2) / (window * window)).min(255) as u8;
                sum += at(row + r + 1);
                sum -= at(row - r);
            }
        }
        out
    }
}
