//! Per-pixel blending of straight-alpha colors

use crate::types::{BlendMode, Pixel};

#[inline]
fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline]
fn byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Combine `src` onto `dst` with the given mode at `opacity` (0..=255).
///
/// Multiply, Screen and Add only recolor existing pixels and keep the
/// destination alpha. A result with zero alpha is always fully transparent,
/// so blank tiles can be detected by alpha alone.
pub fn blend_pixel(dst: Pixel, src: Pixel, opacity: u8, mode: BlendMode) -> Pixel {
    if opacity == 0 {
        return dst;
    }

    if mode == BlendMode::Replace {
        if opacity == 255 {
            return if src.a == 0 { Pixel::TRANSPARENT } else { src };
        }
        let t = unit(opacity);
        let lerp = |d: u8, s: u8| byte(unit(d) + (unit(s) - unit(d)) * t);
        return normalize(Pixel::new(
            lerp(dst.r, src.r),
            lerp(dst.g, src.g),
            lerp(dst.b, src.b),
            lerp(dst.a, src.a),
        ));
    }

    let sa = unit(src.a) * unit(opacity);
    if sa <= 0.0 {
        return dst;
    }
    let da = unit(dst.a);
    let s = [unit(src.r), unit(src.g), unit(src.b)];
    let d = [unit(dst.r), unit(dst.g), unit(dst.b)];

    let (color, alpha) = match mode {
        BlendMode::Normal => {
            let oa = sa + da * (1.0 - sa);
            let c = std::array::from_fn(|i| (s[i] * sa + d[i] * da * (1.0 - sa)) / oa);
            (c, oa)
        }
        BlendMode::Behind => {
            let oa = da + sa * (1.0 - da);
            let c = std::array::from_fn(|i| (d[i] * da + s[i] * sa * (1.0 - da)) / oa);
            (c, oa)
        }
        BlendMode::Erase => (d, da * (1.0 - sa)),
        BlendMode::Multiply | BlendMode::Screen | BlendMode::Add => {
            if dst.a == 0 {
                return dst;
            }
            let c = std::array::from_fn(|i| {
                let b = match mode {
                    BlendMode::Multiply => s[i] * d[i],
                    BlendMode::Screen => s[i] + d[i] - s[i] * d[i],
                    _ => (s[i] + d[i]).min(1.0),
                };
                d[i] + (b - d[i]) * sa
            });
            (c, da)
        }
        BlendMode::Replace => unreachable!("handled above"),
    };

    normalize(Pixel::new(byte(color[0]), byte(color[1]), byte(color[2]), byte(alpha)))
}

#[inline]
fn normalize(px: Pixel) -> Pixel {
    if px.a == 0 { Pixel::TRANSPARENT } else { px }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Pixel = Pixel::new(255, 0, 0, 255);
    const BLUE: Pixel = Pixel::new(0, 0, 255, 255);

    #[test]
    fn test_opaque_normal_copies_source() {
        assert_eq!(blend_pixel(RED, BLUE, 255, BlendMode::Normal), BLUE);
        assert_eq!(blend_pixel(Pixel::TRANSPARENT, BLUE, 255, BlendMode::Normal), BLUE);
    }

    #[test]
    fn test_half_opacity_normal() {
        let px = blend_pixel(RED, BLUE, 128, BlendMode::Normal);
        assert_eq!(px.a, 255);
        assert!(px.r > 100 && px.r < 155);
        assert!(px.b > 100 && px.b < 155);
    }

    #[test]
    fn test_erase_clears_alpha() {
        assert_eq!(blend_pixel(RED, BLUE, 255, BlendMode::Erase), Pixel::TRANSPARENT);
        let half = blend_pixel(RED, BLUE, 128, BlendMode::Erase);
        assert_eq!(half.r, 255);
        assert!(half.a > 100 && half.a < 155);
    }

    #[test]
    fn test_behind_keeps_opaque_destination() {
        assert_eq!(blend_pixel(RED, BLUE, 255, BlendMode::Behind), RED);
        assert_eq!(blend_pixel(Pixel::TRANSPARENT, BLUE, 255, BlendMode::Behind), BLUE);
    }

    #[test]
    fn test_multiply_keeps_alpha_and_skips_empty() {
        let white = Pixel::new(255, 255, 255, 200);
        let px = blend_pixel(white, Pixel::new(255, 0, 0, 255), 255, BlendMode::Multiply);
        assert_eq!(px, Pixel::new(255, 0, 0, 200));
        assert_eq!(
            blend_pixel(Pixel::TRANSPARENT, RED, 255, BlendMode::Multiply),
            Pixel::TRANSPARENT
        );
    }

    #[test]
    fn test_replace_is_exact() {
        let src = Pixel::new(10, 20, 30, 40);
        assert_eq!(blend_pixel(RED, src, 255, BlendMode::Replace), src);
        assert_eq!(
            blend_pixel(RED, Pixel::new(1, 2, 3, 0), 255, BlendMode::Replace),
            Pixel::TRANSPARENT
        );
    }
}
