// THEORY:
// The tuner never looks inside the detection pipeline it tunes. It only needs, for
// every frame, "was something found, and how good was it". This module draws that
// line:
//
// - A `Detector` is the external pipeline: frame plus live configuration in, an
//   optional quadrilateral out.
// - A `Scorer` is what the tuner calls per frame. The two scorers here wrap a
//   detector and attach a quality value using one of the metrics from `quality`.
//
// Any closure with the right shape is a `Detector` or a `Scorer`, which keeps tests
// and ad-hoc experiments short.

use crate::core_modules::frame_pipeline::Frame;
use crate::core_modules::live_config::LiveConfig;
use crate::core_modules::quality::{Detection, DetectionResult, JitterWindow, Quad, overlap_percentage};

/// Produces one `DetectionResult` per frame.
pub trait Scorer {
    /// Called before the first frame of every source. Scorers that compare
    /// neighbouring frames must forget the previous source here.
    fn begin_source(&mut self) {}

    fn score(&mut self, frame: &Frame, config: &LiveConfig) -> DetectionResult;
}

impl<F> Scorer for F
where
    F: FnMut(&Frame, &LiveConfig) -> DetectionResult,
{
    fn score(&mut self, frame: &Frame, config: &LiveConfig) -> DetectionResult {
        self(frame, config)
    }
}

/// The external detection pipeline being tuned.
pub trait Detector {
    fn detect(&mut self, frame: &Frame, config: &LiveConfig) -> Option<Quad>;
}

impl<F> Detector for F
where
    F: FnMut(&Frame, &LiveConfig) -> Option<Quad>,
{
    fn detect(&mut self, frame: &Frame, config: &LiveConfig) -> Option<Quad> {
        self(frame, config)
    }
}

/// Scores detections by how well they cover a fixed reference quad.
pub struct OverlapScorer<D> {
    detector: D,
    reference: Quad,
}

impl<D: Detector> OverlapScorer<D> {
    pub fn new(detector: D, reference: Quad) -> Self {
        Self { detector, reference }
    }
}

impl<D: Detector> Scorer for OverlapScorer<D> {
    fn score(&mut self, frame: &Frame, config: &LiveConfig) -> DetectionResult {
        let shape = self.detector.detect(frame, config)?;
        if shape.is_degenerate() {
            return None;
        }
        let quality = overlap_percentage(&shape, &self.reference, frame.width(), frame.height());
        Some(Detection { shape, quality })
    }
}

/// Scores detections by their frame-to-frame stability. Quality is the negated
/// jitter of the recent detections, so steadier output scores higher.
pub struct JitterScorer<D> {
    detector: D,
    window: JitterWindow,
}

impl<D: Detector> JitterScorer<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            window: JitterWindow::default(),
        }
    }

    pub fn with_history(detector: D, history: usize) -> Self {
        Self {
            detector,
            window: JitterWindow::new(history),
        }
    }
}

impl<D: Detector> Scorer for JitterScorer<D> {
    fn begin_source(&mut self) {
        self.window.clear();
    }

    fn score(&mut self, frame: &Frame, config: &LiveConfig) -> DetectionResult {
        let shape = self.detector.detect(frame, config)?;
        if shape.is_degenerate() {
            return None;
        }
        let quality = -self.window.push(shape);
        Some(Detection { shape, quality })
    }
}
