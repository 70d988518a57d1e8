use crate::color::count_in_range;
use crate::config::CalibrationPolicy;
use crate::segment::{BoundingBox, PalmRegion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    GeometricProxy,
    HullSmoothedProxy,
    ColorMarker,
}

/// Geometric reference measurements of the accepted palm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PalmMetrics {
    pub width: u32,
    pub height: u32,
    pub area: f64,
    pub bbox: BoundingBox,
    /// Scale proxy the life-line length is normalized by. May be 0 for a
    /// degenerate box or a missing marker; the scorer floors it at 1.
    pub reference_width: u32,
    pub reference_source: ReferenceSource,
    /// True when the reference is inferred from geometry rather than a
    /// physical marker.
    pub reference_estimated: bool,
}

pub fn measure_palm(
    region: &PalmRegion,
    policy: &CalibrationPolicy,
    hsv: &[[u8; 3]],
    image_width: u32,
    image_height: u32,
) -> PalmMetrics {
    let bbox = region.bbox;
    let (reference_width, reference_source) = match policy {
        CalibrationPolicy::GeometricProxy { width_fraction } => (
            proxy_reference_width(bbox.width, *width_fraction),
            ReferenceSource::GeometricProxy,
        ),
        CalibrationPolicy::HullSmoothedProxy { width_fraction } => (
            proxy_reference_width(bbox.width, *width_fraction),
            ReferenceSource::HullSmoothedProxy,
        ),
        CalibrationPolicy::ColorMarker { marker } => (
            count_in_range(hsv, image_width, marker, (0, 0, image_width, image_height)),
            ReferenceSource::ColorMarker,
        ),
    };

    log::debug!(
        "Palm bbox {}x{} at ({}, {}), reference width {} ({:?})",
        bbox.width,
        bbox.height,
        bbox.x,
        bbox.y,
        reference_width,
        reference_source
    );

    PalmMetrics {
        width: bbox.width,
        height: bbox.height,
        area: region.area,
        bbox,
        reference_width,
        reference_source,
        reference_estimated: reference_source != ReferenceSource::ColorMarker,
    }
}

/// Index-finger joint width stands in for a physical unit: roughly a ninth
/// to a tenth of the palm width.
pub fn proxy_reference_width(bbox_width: u32, width_fraction: f64) -> u32 {
    // Nudge so exact multiples survive 1/9 not being representable.
    (bbox_width as f64 * width_fraction + 1e-9).floor().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BLUE_MARKER_HSV;
    use imageproc::point::Point;

    fn region(width: u32, height: u32) -> PalmRegion {
        PalmRegion {
            contour: vec![
                Point::new(10, 10),
                Point::new(10 + width as i32 - 1, 10),
                Point::new(10 + width as i32 - 1, 10 + height as i32 - 1),
                Point::new(10, 10 + height as i32 - 1),
            ],
            bbox: BoundingBox {
                x: 10,
                y: 10,
                width,
                height,
            },
            area: ((width - 1) * (height - 1)) as f64,
            hull_smoothed: false,
        }
    }

    #[test]
    fn test_geometric_proxy_fraction() {
        let metrics = measure_palm(
            &region(270, 300),
            &CalibrationPolicy::GeometricProxy {
                width_fraction: 1.0 / 9.0,
            },
            &[],
            400,
            400,
        );
        assert_eq!(metrics.reference_width, 30);
        assert!(metrics.reference_estimated);
        assert_eq!(metrics.reference_source, ReferenceSource::GeometricProxy);
    }

    #[test]
    fn test_hull_proxy_fraction() {
        let metrics = measure_palm(
            &region(300, 300),
            &CalibrationPolicy::HullSmoothedProxy {
                width_fraction: 0.11,
            },
            &[],
            400,
            400,
        );
        assert_eq!(metrics.reference_width, 33);
        assert_eq!(metrics.reference_source, ReferenceSource::HullSmoothedProxy);
    }

    #[test]
    fn test_degenerate_box_gives_zero_reference() {
        assert_eq!(proxy_reference_width(5, 1.0 / 9.0), 0);
    }

    #[test]
    fn test_marker_reference_counts_pixels() {
        let width = 20;
        let height = 10;
        let mut hsv = vec![[10u8, 80, 200]; (width * height) as usize];
        for px in hsv.iter_mut().take(12) {
            *px = [110, 200, 200];
        }
        let metrics = measure_palm(
            &region(8, 8),
            &CalibrationPolicy::ColorMarker {
                marker: BLUE_MARKER_HSV,
            },
            &hsv,
            width,
            height,
        );
        assert_eq!(metrics.reference_width, 12);
        assert!(!metrics.reference_estimated);
    }
}
