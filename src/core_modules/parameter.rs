// THEORY:
// The `Parameter` is the smallest unit of the tuning engine: one scalar knob of the
// external detection pipeline, together with everything needed to walk it along a
// line and to take a step back.
//
// Key architectural principles:
// 1.  **Bounded Walk**: The value moves in fixed increments of `range * step_fraction`
//     and is clamped into `[min, max]`. A clamped step raises `hit_limit`, which the
//     decision layer treats specially because a clamped value can look "stuck".
// 2.  **One Step of Memory**: `previous_value` remembers the value before the last
//     step so a bad step can be undone (`set_previous`) or undone while turning
//     around (`reverse`).
// 3.  **Best-Known Anchor**: `best_value` / `best_score` remember the best point seen
//     so far. They only move when a strictly better score is recorded, and they are
//     where the parameter returns to when its search gives up.
// 4.  **Frozen When Finished**: once `finished` is set the value never changes again.

use crate::error::{Result, TuneError};
use tracing::debug;

/// Sign of the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Increasing => 1.0,
            Direction::Decreasing => -1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Increasing => Direction::Decreasing,
            Direction::Decreasing => Direction::Increasing,
        }
    }
}

/// A single tunable scalar with bounds, step size, direction and rollback memory.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Name used for reporting and as the key in the live configuration.
    name: String,
    /// The current setting. Always within `[min, max]`.
    value: f64,
    /// The value before the last `modify`, restored on rollback.
    previous_value: f64,
    /// The best value seen so far and the score it produced.
    best_value: f64,
    best_score: f64,
    min: f64,
    max: f64,
    /// `max - min`, cached.
    range: f64,
    /// Step size relative to `range`.
    step_fraction: f64,
    direction: Direction,
    /// Number of direction flips since this parameter was created.
    reversed_count: u32,
    /// True iff the last `modify` was clamped to a bound (until the caller clears it).
    hit_limit: bool,
    finished: bool,
    /// True until the first score for this parameter has been recorded.
    first_pass: bool,
}

impl Parameter {
    /// Creates a new parameter, rejecting malformed bounds and steps.
    ///
    /// If `initial` already sits on the bound the first step would push against, the
    /// parameter reverses immediately so that its first step moves inward.
    pub fn new(name: impl Into<String>, initial: f64, min: f64, max: f64, step_fraction: f64) -> Result<Self> {
        let name = name.into();
        // Written so that NaN bounds fail too.
        if !(max > min) || !min.is_finite() || !max.is_finite() {
            return Err(TuneError::InvalidBounds { name, min, max });
        }
        if !(step_fraction > 0.0 && step_fraction <= 1.0) {
            return Err(TuneError::InvalidStep { name, step: step_fraction });
        }
        if !(initial >= min && initial <= max) {
            return Err(TuneError::InitialOutOfBounds { name, initial, min, max });
        }

        let mut parameter = Self {
            name,
            value: initial,
            previous_value: initial,
            best_value: initial,
            best_score: f64::NEG_INFINITY,
            min,
            max,
            range: max - min,
            step_fraction,
            direction: Direction::Increasing,
            reversed_count: 0,
            hit_limit: false,
            finished: false,
            first_pass: true,
        };

        let at_leading_bound = match parameter.direction {
            Direction::Increasing => parameter.value >= parameter.max,
            Direction::Decreasing => parameter.value <= parameter.min,
        };
        if at_leading_bound {
            debug!(parameter = %parameter.name, "initial value sits on the leading bound, reversing");
            parameter.reverse();
        }

        Ok(parameter)
    }

    /// Takes one step in the current direction, clamping into `[min, max]`.
    ///
    /// A clamped step sets `hit_limit`. An unclamped step leaves it untouched; the
    /// caller clears it when appropriate. Does nothing once the parameter is finished.
    pub fn modify(&mut self) {
        if self.finished {
            return;
        }
        self.previous_value = self.value;
        let next = self.value + self.direction.sign() * self.range * self.step_fraction;
        if next < self.min {
            self.value = self.min;
            self.hit_limit = true;
        } else if next > self.max {
            self.value = self.max;
            self.hit_limit = true;
        } else {
            self.value = next;
        }
    }

    /// Flips the direction and undoes the last step.
    pub fn reverse(&mut self) {
        self.reversed_count += 1;
        self.direction = self.direction.flipped();
        self.set_previous();
    }

    /// Restores the value from before the last step.
    pub fn set_previous(&mut self) {
        if self.finished {
            return;
        }
        self.value = self.previous_value;
    }

    /// Records the score measured at the current value.
    ///
    /// The first score seeds the best-known point. Afterwards the best point moves
    /// only on strict improvement. Returns true when the best point moved.
    pub fn record_score(&mut self, score: f64) -> bool {
        if self.first_pass {
            self.first_pass = false;
            self.best_score = score;
            self.best_value = self.value;
            return true;
        }
        if score > self.best_score {
            self.best_score = score;
            self.best_value = self.value;
            return true;
        }
        false
    }

    /// Seeds the best-known point from a score measured before this parameter
    /// started tuning, at its current value. Ends the first pass.
    pub fn seed_baseline(&mut self, score: f64) {
        self.first_pass = false;
        self.best_score = score;
        self.best_value = self.value;
    }

    /// Returns the value to the best point seen and freezes it.
    pub fn rollback_to_best(&mut self) {
        self.value = self.best_value;
        self.finish();
    }

    /// Freezes the current value.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn clear_hit_limit(&mut self) {
        self.hit_limit = false;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn previous_value(&self) -> f64 {
        self.previous_value
    }

    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn step_fraction(&self) -> f64 {
        self.step_fraction
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn reversed_count(&self) -> u32 {
        self.reversed_count
    }

    pub fn hit_limit(&self) -> bool {
        self.hit_limit
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {b}, got {a}");
    }

    #[test]
    fn rejects_inverted_and_empty_bounds() {
        assert!(matches!(
            Parameter::new("k", 1.0, 5.0, 5.0, 0.1),
            Err(TuneError::InvalidBounds { .. })
        ));
        assert!(matches!(
            Parameter::new("k", 1.0, 5.0, 0.0, 0.1),
            Err(TuneError::InvalidBounds { .. })
        ));
        assert!(matches!(
            Parameter::new("k", 1.0, 0.0, 5.0, 0.0),
            Err(TuneError::InvalidStep { .. })
        ));
        assert!(matches!(
            Parameter::new("k", 6.0, 0.0, 5.0, 0.1),
            Err(TuneError::InitialOutOfBounds { .. })
        ));
    }

    #[test]
    fn modify_steps_by_fraction_of_range() {
        let mut p = Parameter::new("k", 5.0, 0.0, 10.0, 0.1).unwrap();
        p.modify();
        assert_close(p.value(), 6.0);
        assert_close(p.previous_value(), 5.0);
        assert!(!p.hit_limit());
    }

    #[test]
    fn value_stays_in_bounds_under_any_sequence() {
        let mut p = Parameter::new("k", 1.0, -2.0, 3.0, 0.35).unwrap();
        for i in 0..200 {
            if i % 7 == 0 {
                p.reverse();
            } else {
                p.modify();
            }
            assert!(p.value() >= p.min() && p.value() <= p.max(), "escaped at {}", p.value());
        }
    }

    #[test]
    fn clamped_step_sets_hit_limit() {
        let mut p = Parameter::new("k", 9.5, 0.0, 10.0, 0.1).unwrap();
        p.modify();
        assert_close(p.value(), 10.0);
        assert!(p.hit_limit());

        let mut p = Parameter::new("k", 0.5, 0.0, 10.0, 0.1).unwrap();
        p.reverse();
        p.modify();
        assert_close(p.value(), 0.0);
        assert!(p.hit_limit());
    }

    #[test]
    fn reverse_flips_and_restores() {
        let mut p = Parameter::new("k", 5.0, 0.0, 10.0, 0.1).unwrap();
        p.modify();
        p.reverse();
        assert_eq!(p.direction(), Direction::Decreasing);
        assert_close(p.value(), 5.0);
        assert_eq!(p.reversed_count(), 1);

        p.reverse();
        assert_eq!(p.direction(), Direction::Increasing);
        assert_eq!(p.reversed_count(), 2);
    }

    #[test]
    fn starting_on_max_steps_inward_first() {
        let mut p = Parameter::new("k", 10.0, 0.0, 10.0, 0.1).unwrap();
        assert_eq!(p.direction(), Direction::Decreasing);
        assert_eq!(p.reversed_count(), 1);
        p.modify();
        assert_close(p.value(), 9.0);
        assert!(!p.hit_limit());
    }

    #[test]
    fn best_point_moves_only_on_strict_improvement() {
        let mut p = Parameter::new("k", 5.0, 0.0, 10.0, 0.1).unwrap();
        assert!(p.is_first_pass());
        assert!(p.record_score(10.0));
        assert!(!p.is_first_pass());

        p.modify();
        assert!(!p.record_score(10.0));
        assert_close(p.best_value(), 5.0);

        assert!(p.record_score(12.0));
        assert_close(p.best_value(), 6.0);
        assert_close(p.best_score(), 12.0);
    }

    #[test]
    fn finished_parameter_is_frozen() {
        let mut p = Parameter::new("k", 5.0, 0.0, 10.0, 0.1).unwrap();
        p.record_score(1.0);
        p.modify();
        p.rollback_to_best();
        assert!(p.is_finished());
        assert_close(p.value(), 5.0);

        p.modify();
        p.set_previous();
        assert_close(p.value(), 5.0);
    }
}
