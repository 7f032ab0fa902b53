// THEORY:
// The `quality` module defines what a detection looks like to the tuner and the two
// interchangeable ways of turning a detection into a single "how good was it" scalar.
//
// 1.  **Overlap**: rasterize the detected quadrilateral and a hand-placed reference
//     quadrilateral onto masks and measure intersection over union, as a percentage.
//     Higher is better.
// 2.  **Jitter**: keep the last few accepted quadrilaterals and measure how far their
//     corners wander around the mean. Lower is better, so scorers report its negation.
//
// Both are computed per frame by the scorer. The aggregator downstream only ever sees
// the resulting scalar.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use std::collections::VecDeque;

pub const JITTER_HISTORY_LENGTH: usize = 30;

/// A corner position in pixel coordinates.
pub type Vertex = (f64, f64);

/// An ordered quadrilateral, e.g. the region between two detected lane lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [Vertex; 4]);

impl Quad {
    pub fn new(vertices: [Vertex; 4]) -> Self {
        Self(vertices)
    }

    pub fn vertices(&self) -> &[Vertex; 4] {
        &self.0
    }

    /// A quad whose corners all coincide, like the zeroed "nothing found" quad
    /// some detectors emit, carries no detection.
    pub fn is_degenerate(&self) -> bool {
        let first = self.0[0];
        self.0.iter().all(|v| *v == first)
    }
}

/// A successful detection: the shape found plus its quality, oriented so that
/// higher is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub shape: Quad,
    pub quality: f64,
}

/// What the scorer returns for one frame. `None` means nothing was detected.
pub type DetectionResult = Option<Detection>;

/// Intersection over union of two quads as a percentage, measured on a
/// `width` x `height` pixel raster.
///
/// Returns `100 * overlap / (overlap + excess)`, where excess is the area covered by
/// exactly one of the two shapes. Returns 0 when neither shape covers any pixel.
pub fn overlap_percentage(candidate: &Quad, reference: &Quad, width: u32, height: u32) -> f64 {
    let candidate_mask = rasterize(candidate, width, height);
    let reference_mask = rasterize(reference, width, height);

    let mut overlap = 0u64;
    let mut excess = 0u64;
    for (c, r) in candidate_mask.pixels().zip(reference_mask.pixels()) {
        match (c[0] > 0, r[0] > 0) {
            (true, true) => overlap += 1,
            (true, false) | (false, true) => excess += 1,
            (false, false) => {}
        }
    }

    if overlap + excess == 0 {
        return 0.0;
    }
    100.0 * overlap as f64 / (overlap + excess) as f64
}

/// Fills `quad` onto an empty mask. Shapes with fewer than three distinct corners
/// have no area and leave the mask empty.
pub fn rasterize(quad: &Quad, width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    let mut points: Vec<Point<i32>> = Vec::with_capacity(4);
    for &(x, y) in quad.vertices() {
        let point = Point::new(x.round() as i32, y.round() as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    // The polygon is closed implicitly; a repeated first corner is not allowed.
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return mask;
    }

    draw_polygon_mut(&mut mask, &points, Luma([255u8]));
    mask
}

/// A sliding window of recently accepted quads used to measure positional jitter.
#[derive(Debug, Clone)]
pub struct JitterWindow {
    history: VecDeque<Quad>,
    capacity: usize,
}

impl JitterWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Adds a quad and returns the jitter of the window including it.
    pub fn push(&mut self, quad: Quad) -> f64 {
        self.history.push_back(quad);
        if self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.deviation()
    }

    /// Sum over all corner coordinates of the mean squared deviation from the
    /// window's mean quad. Zero for an empty or single-entry window.
    pub fn deviation(&self) -> f64 {
        let n = self.history.len();
        if n == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let mut sum = 0.0;
        for quad in &self.history {
            for (v, m) in quad.vertices().iter().zip(mean.vertices()) {
                sum += (v.0 - m.0).powi(2) + (v.1 - m.1).powi(2);
            }
        }
        sum / n as f64
    }

    /// The corner-wise mean of the window.
    pub fn mean(&self) -> Quad {
        let n = self.history.len();
        let mut acc = [(0.0, 0.0); 4];
        if n == 0 {
            return Quad(acc);
        }
        for quad in &self.history {
            for (a, v) in acc.iter_mut().zip(quad.vertices()) {
                a.0 += v.0;
                a.1 += v.1;
            }
        }
        for a in acc.iter_mut() {
            a.0 /= n as f64;
            a.1 /= n as f64;
        }
        Quad(acc)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for JitterWindow {
    fn default() -> Self {
        Self::new(JITTER_HISTORY_LENGTH)
    }
}
