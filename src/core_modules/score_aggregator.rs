// THEORY:
// The `ScoreAggregator` turns a stream of per-frame detection results into one
// number per trial, and then decides what that number means for the parameter
// being tuned.
//
// Key architectural principles:
// 1.  **Two Signals, One Score**: A trial is judged on how often something was
//     detected (detection rate over the whole run's frame count) and on how good the
//     recent detections were (average of a bounded quality window). The two are
//     mixed with a blend weight that is fixed on the first trial and never moves, so
//     scores from different trials stay comparable.
// 2.  **Verdicts, Not Mutation**: The aggregator never touches a `Parameter`. It reads
//     the parameter's state, compares the fresh score with the previous one and
//     returns a `Verdict`. The controller applies it through the parameter's own
//     operations.
// 3.  **Guaranteed Termination**: Only one direction reversal per parameter is ever
//     granted on regression. A second regression, or any unproductive step at a
//     bound after that, commits the parameter to its best value.

use crate::core_modules::parameter::Parameter;
use crate::core_modules::quality::DetectionResult;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const QUALITY_WINDOW_SIZE: usize = 30;
pub const DEFAULT_BLEND_WEIGHT: f64 = 0.33;

/// What the controller should do with the active parameter after a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the value, take another step in the same direction.
    Continue,
    /// Undo the last step, flip direction and step again.
    Reverse,
    /// Return to the best value seen and stop tuning this parameter.
    RollbackFinished,
    /// Keep the current value and stop tuning this parameter.
    AcceptFinished,
}

impl Verdict {
    pub fn is_finished(self) -> bool {
        matches!(self, Verdict::RollbackFinished | Verdict::AcceptFinished)
    }
}

/// Accumulates per-frame results over one trial and scores it.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    /// Expected frame count of the whole run. Denominator of the detection rate.
    total_frames: u64,
    /// Frames in the current trial where something was detected.
    detected_frames: u64,
    /// The most recent quality samples of the current trial.
    quality_window: VecDeque<f64>,
    window_capacity: usize,
    score: f64,
    previous_score: f64,
    /// The score the last trial measured, before any restore.
    trial_score: f64,
    /// The configured weight, copied into `blend_weight` on the first update.
    configured_weight: f64,
    blend_weight: Option<f64>,
    /// Number of trials scored so far in this run.
    trials: u64,
}

impl ScoreAggregator {
    pub fn new(total_frames: u64, blend_weight: f64, window_capacity: usize) -> Self {
        Self {
            total_frames,
            detected_frames: 0,
            quality_window: VecDeque::with_capacity(window_capacity),
            window_capacity: window_capacity.max(1),
            score: 0.0,
            previous_score: 0.0,
            trial_score: 0.0,
            configured_weight: blend_weight.clamp(0.0, 1.0),
            blend_weight: None,
            trials: 0,
        }
    }

    /// Called when the controller moves on to a new parameter.
    pub fn new_variable(&mut self) {
        self.new_iteration();
    }

    /// Called before every trial. Resets trial-scoped counters only.
    pub fn new_iteration(&mut self) {
        self.detected_frames = 0;
        self.quality_window.clear();
    }

    /// Adds the result of one processed frame.
    pub fn push(&mut self, result: DetectionResult) {
        let Some(detection) = result else {
            return;
        };
        if detection.shape.is_degenerate() {
            return;
        }
        if !detection.quality.is_finite() {
            warn!(quality = detection.quality, "dropping non-finite quality sample");
            return;
        }
        if self.detected_frames >= self.total_frames {
            debug!(total_frames = self.total_frames, "source yielded more frames than announced");
            return;
        }

        self.detected_frames += 1;
        self.quality_window.push_back(detection.quality);
        if self.quality_window.len() > self.window_capacity {
            self.quality_window.pop_front();
        }
    }

    /// Finalizes the current trial and decides what happens to `parameter`.
    ///
    /// On `Reverse` the score is restored to the previous trial's score, on
    /// `RollbackFinished` it becomes the parameter's best score, so that after this
    /// call `score()` always describes the configuration the parameter is about to
    /// return to. The resulting score becomes the next trial's `previous_score`.
    pub fn update(&mut self, parameter: &Parameter) -> Verdict {
        let weight = *self.blend_weight.get_or_insert(self.configured_weight);
        self.score = weight * self.detection_rate() + (1.0 - weight) * self.average_quality();
        self.trial_score = self.score;
        self.trials += 1;

        let verdict = decide(self.score, self.previous_score, parameter);
        debug!(
            parameter = parameter.name(),
            value = parameter.value(),
            score = self.score,
            previous_score = self.previous_score,
            ?verdict,
            "trial scored"
        );

        match verdict {
            Verdict::Reverse => self.set_previous_score(),
            Verdict::RollbackFinished => self.score = parameter.best_score(),
            Verdict::Continue | Verdict::AcceptFinished => {}
        }
        self.previous_score = self.score;
        verdict
    }

    /// Discards the current trial's score in favour of the previous one.
    pub fn set_previous_score(&mut self) {
        self.score = self.previous_score;
    }

    /// Forces the current score, e.g. when a parameter is abandoned at its best value.
    pub fn restore_score(&mut self, score: f64) {
        self.score = score;
        self.previous_score = score;
    }

    /// Detected frames as a percentage of the run's frame count. Zero when the run
    /// has no frames.
    pub fn detection_rate(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        100.0 * self.detected_frames as f64 / self.total_frames as f64
    }

    /// Mean of the quality window. Zero when nothing was detected.
    pub fn average_quality(&self) -> f64 {
        if self.quality_window.is_empty() {
            return 0.0;
        }
        self.quality_window.iter().sum::<f64>() / self.quality_window.len() as f64
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn previous_score(&self) -> f64 {
        self.previous_score
    }

    /// The score measured by the last trial, unaffected by verdict restores.
    pub fn trial_score(&self) -> f64 {
        self.trial_score
    }

    pub fn detected_frames(&self) -> u64 {
        self.detected_frames
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn quality_samples(&self) -> usize {
        self.quality_window.len()
    }

    /// The frozen blend weight, or `None` before the first trial was scored.
    pub fn blend_weight(&self) -> Option<f64> {
        self.blend_weight
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// True once at least one trial has been scored, i.e. `score()` describes a
    /// measured configuration.
    pub fn has_baseline(&self) -> bool {
        self.trials > 0
    }
}

/// The per-trial decision table.
pub fn decide(score: f64, previous_score: f64, parameter: &Parameter) -> Verdict {
    // The very first trial only establishes a baseline.
    if parameter.is_first_pass() {
        return Verdict::Continue;
    }

    if parameter.hit_limit() {
        if score > previous_score {
            Verdict::AcceptFinished
        } else if parameter.reversed_count() == 0 {
            // Clamped without improvement and the other direction is untried: turn around.
            Verdict::Reverse
        } else {
            Verdict::RollbackFinished
        }
    } else if score < previous_score {
        if parameter.reversed_count() > 0 {
            Verdict::RollbackFinished
        } else {
            Verdict::Reverse
        }
    } else {
        // Improvement, or no change away from a bound: keep stepping.
        Verdict::Continue
    }
}
