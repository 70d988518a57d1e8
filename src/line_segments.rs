//! Gap-tolerant line segments on top of the Hough transform.
//!
//! `imageproc` only reports infinite polar lines. Each line is walked across
//! the edge image and split into runs of edge pixels, bridging gaps up to
//! `max_gap`; runs shorter than `min_length` are dropped. Pixels claimed by a
//! segment are not reused by later lines.

use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use serde::{Deserialize, Serialize};

const SUPPRESSION_RADIUS: u32 = 8;

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineSegment {
    pub start: [f32; 2],
    pub end: [f32; 2],
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        let dx = (self.end[0] - self.start[0]) as f64;
        let dy = (self.end[1] - self.start[1]) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Copy, Clone)]
pub struct SegmentParams {
    pub vote_threshold: u32,
    pub min_length: f64,
    pub max_gap: f64,
}

pub fn extract_segments(edges: &GrayImage, params: &SegmentParams) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    if width == 0 || height == 0 || !edges.pixels().any(|p| p[0] > 0) {
        return Vec::new();
    }

    let lines = detect_lines(
        edges,
        LineDetectionOptions {
            vote_threshold: params.vote_threshold,
            suppression_radius: SUPPRESSION_RADIUS,
        },
    );
    log::debug!("Hough transform produced {} candidate lines", lines.len());

    let mut consumed = vec![false; (width * height) as usize];
    let mut segments = Vec::new();
    for line in &lines {
        walk_line(edges, line, params, &mut consumed, &mut segments);
    }
    segments
}

struct Run {
    start_t: f32,
    last_t: f32,
    pixels: Vec<usize>,
}

fn walk_line(
    edges: &GrayImage,
    line: &PolarLine,
    params: &SegmentParams,
    consumed: &mut [bool],
    segments: &mut Vec<LineSegment>,
) {
    let (width, height) = edges.dimensions();
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();
    // Foot of the perpendicular from the origin, and the line direction.
    let base = [line.r * cos, line.r * sin];
    let dir = [-sin, cos];
    let normal = [cos, sin];
    let extent = ((width * width + height * height) as f32).sqrt().ceil() as i32;

    let point_at = |t: f32| [base[0] + dir[0] * t, base[1] + dir[1] * t];
    let flush = |run: Run, consumed: &mut [bool], segments: &mut Vec<LineSegment>| {
        let length = (run.last_t - run.start_t) as f64;
        if length >= params.min_length {
            for idx in run.pixels {
                consumed[idx] = true;
            }
            segments.push(LineSegment {
                start: point_at(run.start_t),
                end: point_at(run.last_t),
            });
        }
    };

    let mut run: Option<Run> = None;
    for step in -extent..=extent {
        let t = step as f32;
        let p = point_at(t);
        let hit = [0.0f32, 1.0, -1.0].iter().find_map(|&offset| {
            let x = (p[0] + normal[0] * offset).round();
            let y = (p[1] + normal[1] * offset).round();
            if x < 0.0 || y < 0.0 || x >= width as f32 || y >= height as f32 {
                return None;
            }
            let idx = (y as u32 * width + x as u32) as usize;
            (edges.get_pixel(x as u32, y as u32)[0] > 0 && !consumed[idx]).then_some(idx)
        });

        match hit {
            Some(idx) => {
                if let Some(active) = run.as_mut() {
                    active.last_t = t;
                    active.pixels.push(idx);
                } else {
                    run = Some(Run {
                        start_t: t,
                        last_t: t,
                        pixels: vec![idx],
                    });
                }
            }
            None => {
                let gap_exceeded = run
                    .as_ref()
                    .is_some_and(|active| (t - active.last_t) as f64 > params.max_gap);
                if gap_exceeded {
                    if let Some(done) = run.take() {
                        flush(done, consumed, segments);
                    }
                }
            }
        }
    }
    if let Some(done) = run.take() {
        flush(done, consumed, segments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_line_segment_mut;

    fn params(max_gap: f64) -> SegmentParams {
        SegmentParams {
            vote_threshold: 30,
            min_length: 20.0,
            max_gap,
        }
    }

    #[test]
    fn test_empty_edges_yield_no_segments() {
        let edges = GrayImage::new(64, 64);
        assert!(extract_segments(&edges, &params(10.0)).is_empty());
    }

    #[test]
    fn test_single_horizontal_line() {
        let mut edges = GrayImage::new(160, 80);
        draw_line_segment_mut(&mut edges, (30.0, 40.0), (129.0, 40.0), Luma([255]));
        let segments = extract_segments(&edges, &params(10.0));
        assert_eq!(segments.len(), 1);
        let length = segments[0].length();
        assert!((95.0..=100.0).contains(&length), "length {}", length);
    }

    #[test]
    fn test_gap_bridging_depends_on_max_gap() {
        let mut edges = GrayImage::new(160, 80);
        draw_line_segment_mut(&mut edges, (20.0, 30.0), (59.0, 30.0), Luma([255]));
        draw_line_segment_mut(&mut edges, (66.0, 30.0), (105.0, 30.0), Luma([255]));

        let bridged = extract_segments(&edges, &params(10.0));
        assert_eq!(bridged.len(), 1);
        assert!(bridged[0].length() > 80.0);

        let split = extract_segments(&edges, &params(2.0));
        assert_eq!(split.len(), 2);
        assert!(split.iter().all(|s| s.length() >= 20.0));
    }

    #[test]
    fn test_short_runs_are_dropped() {
        let mut edges = GrayImage::new(100, 100);
        draw_line_segment_mut(&mut edges, (10.0, 10.0), (10.0, 45.0), Luma([255]));
        let strict = SegmentParams {
            vote_threshold: 20,
            min_length: 50.0,
            max_gap: 3.0,
        };
        assert!(extract_segments(&edges, &strict).is_empty());
    }
}
