//! Skin-colour segmentation and palm contour selection.

use crate::color::{hsv_range_mask, union_masks, ycrcb_range_mask};
use crate::config::{SegmentationConfig, SegmentationMethod};
use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::geometry::{contour_area, convex_hull};
use imageproc::morphology::{close, open};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Binary skin membership grid (0 or 255), same size as its source image.
#[derive(Debug, Clone)]
pub struct SkinMask(GrayImage);

impl SkinMask {
    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Fraction of pixels marked as skin.
    pub fn coverage(&self) -> f64 {
        let total = self.0.width() as f64 * self.0.height() as f64;
        if total == 0.0 {
            return 0.0;
        }
        self.0.pixels().filter(|p| p[0] > 0).count() as f64 / total
    }
}

impl From<GrayImage> for SkinMask {
    fn from(mask: GrayImage) -> Self {
        Self(mask)
    }
}

/// Axis-aligned bounds with inclusive pixel extents.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn of_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let mut min_x = first.x;
        let mut min_y = first.y;
        let mut max_x = first.x;
        let mut max_y = first.y;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: (max_x - min_x + 1).max(0) as u32,
            height: (max_y - min_y + 1).max(0) as u32,
        })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// The accepted hand region.
#[derive(Debug, Clone)]
pub struct PalmRegion {
    pub contour: Vec<Point<i32>>,
    pub bbox: BoundingBox,
    pub area: f64,
    pub hull_smoothed: bool,
}

/// Threshold the image into a cleaned skin mask.
pub fn segment_skin(
    image: &RgbImage,
    hsv: &[[u8; 3]],
    config: &SegmentationConfig,
) -> SkinMask {
    let (width, height) = image.dimensions();
    let mut mask = hsv_range_mask(hsv, width, height, &config.hsv_ranges);
    if config.method == SegmentationMethod::HsvYcrcb {
        let chroma = ycrcb_range_mask(image, &config.ycrcb_range);
        mask = union_masks(&mask, &chroma);
    }

    let open_radius = config.open_kernel / 2;
    if open_radius > 0 {
        mask = open(&mask, Norm::LInf, open_radius);
    }
    let close_radius = config.close_kernel / 2;
    if close_radius > 0 {
        mask = close(&mask, Norm::LInf, close_radius);
    }
    SkinMask(mask)
}

/// Largest external skin contour, or `None` when it is smaller than the
/// configured minimum area.
pub fn largest_palm_region(
    mask: &SkinMask,
    config: &SegmentationConfig,
    smooth_with_hull: bool,
) -> Option<PalmRegion> {
    // Border tracing mislabels regions touching column 0, so trace on a copy
    // framed by one pixel of background and shift back.
    let framed = framed_mask(mask.as_image());
    let contours = find_contours::<i32>(&framed);
    let (points, area) = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let points: Vec<Point<i32>> = c
                .points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            let area = contour_area(&points).abs();
            (points, area)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    let min_area = config.min_area(mask.width(), mask.height());
    if area < min_area || points.len() < 3 {
        log::warn!(
            "Largest skin contour rejected: area {:.0} < required {:.0}",
            area,
            min_area
        );
        return None;
    }

    let (contour, area) = if smooth_with_hull {
        let hull = convex_hull(points.as_slice());
        let hull_area = contour_area(&hull).abs().max(area);
        (hull, hull_area)
    } else {
        (points, area)
    };

    let bbox = BoundingBox::of_points(&contour)?;
    Some(PalmRegion {
        contour,
        bbox,
        area,
        hull_smoothed: smooth_with_hull,
    })
}

fn framed_mask(mask: &GrayImage) -> GrayImage {
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    for (x, y, p) in mask.enumerate_pixels() {
        framed.put_pixel(x + 1, y + 1, *p);
    }
    framed
}
