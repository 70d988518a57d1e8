//! Colour-space conversions shared by segmentation and calibration.
//!
//! HSV values use the 8-bit convention common in vision tooling: hue in
//! half-degrees (0-180), saturation and value scaled to 0-255.

use crate::config::{HsvRange, YcrcbRange};
use image::{GrayImage, Luma, RgbImage};
use palette::{white_point::D65, FromColor, Hsv, Lab, Srgb};

pub const MASK_ON: u8 = 255;

/// Convert RGB [0-255] to 8-bit HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let hsv: Hsv = Hsv::from_color(to_srgb(rgb));
    let hue = hsv.hue.into_positive_degrees();
    [
        (hue / 2.0).round().clamp(0.0, 180.0) as u8,
        (hsv.saturation * 255.0).round().clamp(0.0, 255.0) as u8,
        (hsv.value * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Convert RGB [0-255] to (Y, Cr, Cb) with BT.601 weights.
pub fn rgb_to_ycrcb(rgb: [u8; 3]) -> [u8; 3] {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    [
        y.round().clamp(0.0, 255.0) as u8,
        cr.round().clamp(0.0, 255.0) as u8,
        cb.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Convert RGB [0-255] to LAB color space
pub fn rgb_to_lab(rgb: [u8; 3]) -> Lab<D65, f32> {
    Lab::from_color(to_srgb(rgb))
}

pub fn lab_to_rgb(lab: Lab<D65, f32>) -> [u8; 3] {
    let srgb = Srgb::from_color(lab);
    [
        (srgb.red.clamp(0.0, 1.0) * 255.0).round() as u8,
        (srgb.green.clamp(0.0, 1.0) * 255.0).round() as u8,
        (srgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
    ]
}

fn to_srgb(rgb: [u8; 3]) -> Srgb<f32> {
    Srgb::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    )
}

/// HSV triple for every pixel, row-major.
pub fn hsv_pixels(image: &RgbImage) -> Vec<[u8; 3]> {
    image.pixels().map(|p| rgb_to_hsv(p.0)).collect()
}

/// Binary mask of pixels falling inside any of `ranges`.
pub fn hsv_range_mask(hsv: &[[u8; 3]], width: u32, height: u32, ranges: &[HsvRange]) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let hit = hsv
            .get(idx)
            .map(|px| ranges.iter().any(|r| r.contains(*px)))
            .unwrap_or(false);
        Luma([if hit { MASK_ON } else { 0 }])
    })
}

/// Binary mask of pixels whose YCrCb value lies inside `range`.
pub fn ycrcb_range_mask(image: &RgbImage, range: &YcrcbRange) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hit = range.contains(rgb_to_ycrcb(image.get_pixel(x, y).0));
        Luma([if hit { MASK_ON } else { 0 }])
    })
}

/// Pixel-wise union of two equally sized masks.
pub fn union_masks(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let on = a.get_pixel(x, y)[0] > 0 || b.get_pixel_checked(x, y).is_some_and(|p| p[0] > 0);
        Luma([if on { MASK_ON } else { 0 }])
    })
}

/// Count of pixels inside `range` within the half-open rectangle
/// `[x0, x1) x [y0, y1)`.
pub fn count_in_range(
    hsv: &[[u8; 3]],
    width: u32,
    range: &HsvRange,
    (x0, y0, x1, y1): (u32, u32, u32, u32),
) -> u32 {
    let mut count = 0u32;
    for y in y0..y1 {
        let row = (y * width) as usize;
        for x in x0..x1 {
            if hsv.get(row + x as usize).is_some_and(|px| range.contains(*px)) {
                count += 1;
            }
        }
    }
    count
}
