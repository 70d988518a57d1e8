use crate::color::{lab_to_rgb, rgb_to_lab};
use crate::config::{ContrastEnhancement, PreprocessConfig};
use crate::error::{AnalysisError, AnalysisResult};
use image::imageops::FilterType;
use image::{GrayImage, Luma, Rgb, RgbImage};
use palette::{white_point::D65, Lab};

/// Decoded, size-bounded image ready for segmentation.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub image: RgbImage,
    pub original_width: u32,
    pub original_height: u32,
    /// Factor applied to the original dimensions (1.0 when not resized).
    pub scale: f64,
}

impl PreparedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub fn prepare_image(image_bytes: &[u8], config: &PreprocessConfig) -> AnalysisResult<PreparedImage> {
    let decoded = image::load_from_memory(image_bytes)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width < 2 || height < 2 {
        return Err(AnalysisError::decode("image too small, minimum size is 2x2"));
    }

    // Alpha blend with white background
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = p[3] as f32 / 255.0;
        let r = (p[0] as f32 * a + 255.0 * (1.0 - a)) as u8;
        let g = (p[1] as f32 * a + 255.0 * (1.0 - a)) as u8;
        let b = (p[2] as f32 * a + 255.0 * (1.0 - a)) as u8;
        Rgb([r, g, b])
    });

    let (target_w, target_h) = bounded_dimensions(width, height, config.max_dimension);
    let (resized, scale) = if (target_w, target_h) == (width, height) {
        (rgb, 1.0)
    } else {
        log::debug!(
            "Downscaling {}x{} -> {}x{}",
            width,
            height,
            target_w,
            target_h
        );
        let scale = target_w as f64 / width as f64;
        (
            image::imageops::resize(&rgb, target_w, target_h, FilterType::CatmullRom),
            scale,
        )
    };

    let image = match config.contrast {
        ContrastEnhancement::None => resized,
        ContrastEnhancement::Clahe { clip_limit, tiles } => {
            enhance_luminance(&resized, clip_limit, tiles)
        }
    };

    Ok(PreparedImage {
        image,
        original_width: width,
        original_height: height,
        scale,
    })
}

/// Dimensions after fitting the longer side into `max_dimension`. Never
/// upscales.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let w = ((width as f64 * scale) as u32).clamp(1, max_dimension);
    let h = ((height as f64 * scale) as u32).clamp(1, max_dimension);
    (w, h)
}

/// Local contrast enhancement on the L* channel; chroma is left untouched.
pub fn enhance_luminance(image: &RgbImage, clip_limit: f32, tiles: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let labs: Vec<Lab<D65, f32>> = image.pixels().map(|p| rgb_to_lab(p.0)).collect();

    let l_plane = GrayImage::from_fn(width, height, |x, y| {
        let l = labs[(y * width + x) as usize].l;
        Luma([(l * 2.55).round().clamp(0.0, 255.0) as u8])
    });
    let equalized = clahe(&l_plane, clip_limit, tiles);

    RgbImage::from_fn(width, height, |x, y| {
        let lab = labs[(y * width + x) as usize];
        let l = equalized.get_pixel(x, y)[0] as f32 / 2.55;
        Rgb(lab_to_rgb(Lab::new(l, lab.a, lab.b)))
    })
}

/// Contrast-limited adaptive histogram equalization with bilinear blending
/// between tile lookup tables.
pub fn clahe(plane: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = plane.dimensions();
    if width == 0 || height == 0 {
        return plane.clone();
    }
    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts[(ty * tiles_x + tx) as usize] = tile_lut(plane, (x0, y0, x1, y1), clip_limit);
        }
    }

    let tile_coord = |pos: u32, size: u32, count: u32| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / size as f32 - 0.5;
        let lo = f.floor().clamp(0.0, (count - 1) as f32) as u32;
        let hi = (lo + 1).min(count - 1);
        let w = (f - lo as f32).clamp(0.0, 1.0);
        (lo as usize, hi as usize, w)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let v = plane.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, wx) = tile_coord(x, tile_w, tiles_x);
        let (ty0, ty1, wy) = tile_coord(y, tile_h, tiles_y);
        let at = |ty: usize, tx: usize| luts[ty * tiles_x as usize + tx][v] as f32;
        let top = at(ty0, tx0) * (1.0 - wx) + at(ty0, tx1) * wx;
        let bottom = at(ty1, tx0) * (1.0 - wx) + at(ty1, tx1) * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(plane: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[plane.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let total = ((x1 - x0) * (y1 - y0)).max(1);

    let limit = ((clip_limit * total as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let mut remainder = excess % 256;
    for bin in hist.iter_mut() {
        *bin += bonus;
        if remainder > 0 {
            *bin += 1;
            remainder -= 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (v, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[v] = ((cdf as f64 * 255.0) / total as f64).round().min(255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    fn encode_png(image: RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn config(max_dimension: u32) -> PreprocessConfig {
        PreprocessConfig {
            max_dimension,
            contrast: ContrastEnhancement::None,
        }
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let err = prepare_image(b"definitely not an image", &config(1000)).unwrap_err();
        assert_eq!(err.kind(), "decode_error");
    }

    #[test]
    fn test_rejects_single_pixel() {
        let bytes = encode_png(RgbImage::new(1, 1));
        let err = prepare_image(&bytes, &config(1000)).unwrap_err();
        assert_eq!(err.kind(), "decode_error");
    }

    #[test]
    fn test_oversized_image_is_downscaled() {
        let bytes = encode_png(RgbImage::from_pixel(4000, 3000, Rgb([90, 90, 90])));
        let prepared = prepare_image(&bytes, &config(1000)).unwrap();
        assert_eq!((prepared.width(), prepared.height()), (1000, 750));
        assert_eq!(
            (prepared.original_width, prepared.original_height),
            (4000, 3000)
        );
        assert!((prepared.scale - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_small_image_is_left_alone() {
        let bytes = encode_png(RgbImage::from_pixel(200, 200, Rgb([90, 90, 90])));
        let prepared = prepare_image(&bytes, &config(1000)).unwrap();
        assert_eq!((prepared.width(), prepared.height()), (200, 200));
        assert_eq!(prepared.scale, 1.0);
    }

    #[test]
    fn test_bounded_dimensions() {
        assert_eq!(bounded_dimensions(3000, 4000, 1200), (900, 1200));
        assert_eq!(bounded_dimensions(5000, 3, 1000), (1000, 1));
        assert_eq!(bounded_dimensions(640, 480, 1000), (640, 480));
    }

    #[test]
    fn test_clahe_stretches_low_contrast_plane() {
        let plane = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let out = clahe(&plane, 4.0, 4);
        let (min, max) = out
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        assert!(max - min > 7, "range {}..{} should widen", min, max);
    }

    #[test]
    fn test_clahe_keeps_dimensions() {
        let plane = GrayImage::from_pixel(37, 23, Luma([80]));
        let out = clahe(&plane, 2.0, 8);
        assert_eq!(out.dimensions(), (37, 23));
    }

    #[test]
    fn test_enhancement_preserves_hue_family() {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([200, 150 + ((x + y) % 10) as u8, 120]));
        let out = enhance_luminance(&image, 2.0, 4);
        for p in out.pixels() {
            assert!(p[0] >= p[2], "red should stay above blue");
        }
    }
}
