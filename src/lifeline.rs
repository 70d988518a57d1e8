//! Life-line candidate detection inside the palm.
//!
//! Edge evidence is gathered on a padded crop around the palm bounding box
//! and then restricted to the search window. The palm mask is eroded by the
//! boundary margin first, so the hand's own outline never counts.

use crate::color::{count_in_range, MASK_ON};
use crate::config::{DetectionConfig, LineAggregation, SearchWindow};
use crate::error::{AnalysisError, AnalysisResult};
use crate::line_segments::{extract_segments, SegmentParams};
use crate::segment::{BoundingBox, PalmRegion, SkinMask};
use image::imageops::crop_imm;
use image::{GrayImage, Luma, Pixel, RgbImage};
use imageproc::contours::{find_contours, Contour};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::median_filter;
use imageproc::geometry::arc_length;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::{close, erode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifeLineCandidate {
    pub detected: bool,
    /// Edge (or trace) pixels inside the search window.
    pub pixel_count: u32,
    pub estimated_length: f64,
    pub arc_length: f64,
    pub segment_count: usize,
    /// 0-100.
    pub confidence: f64,
    /// Search window in processed-image coordinates.
    pub search_region: BoundingBox,
}

pub fn detect_life_line(
    image: &RgbImage,
    hsv: &[[u8; 3]],
    mask: &SkinMask,
    region: &PalmRegion,
    config: &DetectionConfig,
) -> AnalysisResult<LifeLineCandidate> {
    let (width, height) = image.dimensions();
    if mask.width() != width || mask.height() != height {
        return Err(AnalysisError::internal(format!(
            "skin mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            width,
            height
        )));
    }
    if hsv.len() != (width as usize) * (height as usize) {
        return Err(AnalysisError::internal(format!(
            "hsv buffer holds {} pixels, expected {}",
            hsv.len(),
            width as usize * height as usize
        )));
    }

    let window = search_rect(&region.bbox, &config.window, width, height);
    let window_area = window.area().max(1) as f64;

    let (pixel_count, estimated_length, arc, segment_count) = match &config.aggregation {
        LineAggregation::ColorTrace { trace } => {
            let count = count_in_range(
                hsv,
                width,
                trace,
                (window.x, window.y, window.x + window.width, window.y + window.height),
            );
            (count, count as f64, count as f64, usize::from(count > 0))
        }
        LineAggregation::LongestContour => {
            let edges = window_edges(image, mask, &region.bbox, &window, config);
            let count = count_on(&edges);
            let contours = find_contours::<i32>(&edges);
            let (length, arc, contour_count) = longest_contour_measure(&contours, count);
            (count, length, arc, contour_count)
        }
        LineAggregation::LineSegments {
            vote_threshold,
            min_length,
            max_gap,
            length_factor,
            fallback_pixel_factor,
        } => {
            let edges = window_edges(image, mask, &region.bbox, &window, config);
            let count = count_on(&edges);
            let segments = extract_segments(
                &edges,
                &SegmentParams {
                    vote_threshold: *vote_threshold,
                    min_length: *min_length,
                    max_gap: *max_gap,
                },
            );
            let total: f64 = segments.iter().map(|s| s.length()).sum();
            if segments.is_empty() {
                (count, count as f64 * fallback_pixel_factor, 0.0, 0)
            } else {
                (count, total * length_factor, total, segments.len())
            }
        }
    };

    let confidence = (pixel_count as f64 / window_area * config.confidence_gain).clamp(0.0, 100.0);
    let detected = pixel_count > config.min_edge_pixels;

    log::debug!(
        "Life line window {}x{} at ({}, {}): {} pixels, length {:.1}, confidence {:.1}, detected {}",
        window.width,
        window.height,
        window.x,
        window.y,
        pixel_count,
        estimated_length,
        confidence,
        detected
    );

    Ok(LifeLineCandidate {
        detected,
        pixel_count,
        estimated_length: estimated_length.max(0.0),
        arc_length: arc.max(0.0),
        segment_count,
        confidence,
        search_region: window,
    })
}

/// Window fractions applied to the palm bbox, clamped to the image and never
/// smaller than one pixel.
pub fn search_rect(bbox: &BoundingBox, window: &SearchWindow, width: u32, height: u32) -> BoundingBox {
    let at = |origin: u32, extent: u32, fraction: f64, limit: u32| -> u32 {
        let offset = (extent as f64 * fraction).floor().max(0.0) as u32;
        (origin + offset).min(limit)
    };
    let x0 = at(bbox.x, bbox.width, window.x0, width.saturating_sub(1));
    let y0 = at(bbox.y, bbox.height, window.y0, height.saturating_sub(1));
    let x1 = at(bbox.x, bbox.width, window.x1, width).max(x0 + 1);
    let y1 = at(bbox.y, bbox.height, window.y1, height).max(y0 + 1);
    BoundingBox {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    }
}

/// Bbox diagonal and arc length of the longest open contour, plus the
/// contour count. Without contours both lengths fall back to the pixel count.
fn longest_contour_measure(contours: &[Contour<i32>], pixel_count: u32) -> (f64, f64, usize) {
    let longest = contours
        .iter()
        .filter(|c| !c.points.is_empty())
        .map(|c| (arc_length(&c.points, false), c))
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    match longest {
        Some((arc, contour)) => {
            let diagonal = BoundingBox::of_points(&contour.points)
                .map(|b| (b.width as f64).hypot(b.height as f64))
                .unwrap_or(0.0);
            (diagonal, arc, contours.len())
        }
        None => (pixel_count as f64, pixel_count as f64, 0),
    }
}

fn count_on(edges: &GrayImage) -> u32 {
    edges.pixels().filter(|p| p[0] > 0).count() as u32
}

/// Binary edge map of the search window, restricted to the eroded palm.
fn window_edges(
    image: &RgbImage,
    mask: &SkinMask,
    bbox: &BoundingBox,
    window: &BoundingBox,
    config: &DetectionConfig,
) -> GrayImage {
    let (width, height) = image.dimensions();
    // Erosion only shrinks from pixels it can see, so keep some background
    // around the box.
    let pad = config.boundary_margin as u32 + 4;
    let cx = bbox.x.saturating_sub(pad);
    let cy = bbox.y.saturating_sub(pad);
    let cx1 = (bbox.x + bbox.width + pad).min(width);
    let cy1 = (bbox.y + bbox.height + pad).min(height);
    let (cw, ch) = (cx1 - cx, cy1 - cy);

    let palm = crop_imm(mask.as_image(), cx, cy, cw, ch).to_image();
    let gray = GrayImage::from_fn(cw, ch, |x, y| {
        if palm.get_pixel(x, y)[0] > 0 {
            image.get_pixel(cx + x, cy + y).to_luma()
        } else {
            Luma([0])
        }
    });
    let gray = if config.denoise_radius > 0 {
        median_filter(&gray, config.denoise_radius, config.denoise_radius)
    } else {
        gray
    };

    let canny_edges = canny(&gray, config.canny_low, config.canny_high);
    let gx = horizontal_sobel(&gray);
    let gy = vertical_sobel(&gray);
    let threshold = config.sobel_threshold;
    let mut edges = GrayImage::from_fn(cw, ch, |x, y| {
        let dx = gx.get_pixel(x, y)[0] as f32;
        let dy = gy.get_pixel(x, y)[0] as f32;
        let strong = (dx * dx + dy * dy).sqrt() >= threshold;
        Luma([if strong || canny_edges.get_pixel(x, y)[0] > 0 { MASK_ON } else { 0 }])
    });
    let close_radius = config.close_kernel / 2;
    if close_radius > 0 {
        edges = close(&edges, Norm::LInf, close_radius);
    }

    let interior = if config.boundary_margin > 0 {
        erode(&palm, Norm::LInf, config.boundary_margin)
    } else {
        palm
    };
    for (edge, inside) in edges.pixels_mut().zip(interior.pixels()) {
        if inside[0] == 0 {
            edge[0] = 0;
        }
    }

    crop_imm(&edges, window.x - cx, window.y - cy, window.width, window.height).to_image()
}
