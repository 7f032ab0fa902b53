// THEORY:
// The `pipeline` module is the top-level API of the tuner. It wires the leaf
// components together into the full search:
//
//   TuningController picks the next parameter
//     -> writes every parameter's value into the LiveConfig
//     -> FramePipeline streams every source, the Scorer rates each frame and the
//        ScoreAggregator collects the results
//     -> the aggregator scores the trial and returns a Verdict
//     -> the controller applies the Verdict to the Parameter and reports the trial
//     -> repeat until the parameter is finished, then move to the next one.
//
// Key architectural principles:
// 1.  **Strictly Sequential**: One parameter at a time, in the order given, one trial
//     at a time. Once a parameter is finished its value is frozen for the rest of
//     the run. The only concurrency is the decode thread inside `FramePipeline`.
// 2.  **Carry the Baseline Forward**: A finished parameter leaves the aggregator's
//     score describing the configuration it settled on. The next parameter adopts
//     that score as its starting point and steps right away, so no trial is spent
//     re-measuring a configuration that was already measured.
// 3.  **Fail Early, Then Never**: Every configuration problem is found when the
//     controller is built. Once trials run, bad frames and bad sources only lower a
//     score. The only errors left are failures to record results.

use crate::core_modules::frame_pipeline::{DEFAULT_QUEUE_CAPACITY, FramePipeline, FrameSource};
use crate::core_modules::live_config::LiveConfig;
use crate::core_modules::parameter::Parameter;
use crate::core_modules::quality::{JITTER_HISTORY_LENGTH, Quad};
use crate::core_modules::score_aggregator::{DEFAULT_BLEND_WEIGHT, QUALITY_WINDOW_SIZE, ScoreAggregator, Verdict};
use crate::error::{Result, TuneError};
use crate::report::{ReportSink, TrialReport};
use crate::scoring::Scorer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Declares one tunable quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// The key the detection pipeline reads this value under.
    pub name: String,
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    /// Step size as a fraction of `max - min`.
    pub step: f64,
}

/// Configuration for a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Weight of the detection-rate term in the trial score; the quality term gets
    /// the rest. Frozen on the first trial.
    pub blend_weight: f64,
    /// How many recent quality samples a trial's quality term averages.
    pub quality_window: usize,
    /// How many recent shapes the jitter metric compares each detection against.
    pub jitter_history: usize,
    /// Maximum number of decoded frames held between the decode thread and the scorer.
    pub queue_capacity: usize,
    /// Longest single wait of a producer blocked on a full queue, in milliseconds.
    pub producer_backoff_ms: u64,
    /// Safety cap on trials for one parameter. Reaching it returns the parameter to
    /// its best value.
    pub max_trials_per_parameter: u32,
    /// Reference shape for overlap scoring. Jitter scoring is used when absent.
    pub reference_quad: Option<[[f64; 2]; 4]>,
    /// The parameters to tune, in tuning order.
    pub parameters: Vec<ParameterSpec>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            blend_weight: DEFAULT_BLEND_WEIGHT,
            quality_window: QUALITY_WINDOW_SIZE,
            jitter_history: JITTER_HISTORY_LENGTH,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            producer_backoff_ms: 500,
            max_trials_per_parameter: 1000,
            reference_quad: None,
            parameters: Vec::new(),
        }
    }
}

impl TuningConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Builds every parameter, rejecting the first misconfiguration found.
    pub fn build_parameters(&self) -> Result<Vec<Parameter>> {
        if self.parameters.is_empty() {
            return Err(TuneError::NoParameters);
        }
        let mut seen = HashSet::new();
        let mut parameters = Vec::with_capacity(self.parameters.len());
        for spec in &self.parameters {
            if !seen.insert(spec.name.as_str()) {
                return Err(TuneError::DuplicateParameter { name: spec.name.clone() });
            }
            parameters.push(Parameter::new(spec.name.clone(), spec.initial, spec.min, spec.max, spec.step)?);
        }
        Ok(parameters)
    }

    pub fn validate(&self) -> Result<()> {
        self.build_parameters().map(|_| ())
    }

    pub fn reference(&self) -> Option<Quad> {
        self.reference_quad
            .map(|q| Quad::new([(q[0][0], q[0][1]), (q[1][0], q[1][1]), (q[2][0], q[2][1]), (q[3][0], q[3][1])]))
    }

    pub fn frame_pipeline(&self) -> FramePipeline {
        FramePipeline::new(self.queue_capacity, Duration::from_millis(self.producer_backoff_ms))
    }
}

/// Final state of a tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOutcome {
    /// Every parameter's final value, in tuning order.
    pub values: Vec<(String, f64)>,
    /// Score of the final configuration.
    pub score: f64,
    pub trials: u64,
    /// True if the run was stopped before every parameter finished.
    pub stopped: bool,
}

/// Applies a verdict to the parameter it was issued for. `measured` is the score the
/// trial produced. Does not take the next step.
pub fn apply_verdict(parameter: &mut Parameter, verdict: Verdict, measured: f64) {
    match verdict {
        Verdict::Continue => {
            parameter.record_score(measured);
        }
        Verdict::Reverse => {
            parameter.reverse();
            parameter.clear_hit_limit();
        }
        Verdict::RollbackFinished => parameter.rollback_to_best(),
        Verdict::AcceptFinished => {
            parameter.record_score(measured);
            parameter.finish();
        }
    }
}

/// Runs the one-parameter-at-a-time search.
pub struct TuningController<S, R> {
    parameters: Vec<Parameter>,
    aggregator: ScoreAggregator,
    pipeline: FramePipeline,
    live_config: LiveConfig,
    sources: Vec<Box<dyn FrameSource>>,
    scorer: S,
    report: R,
    max_trials_per_parameter: u32,
    iteration: u64,
    stop: Option<Arc<AtomicBool>>,
}

impl<S: Scorer, R: ReportSink> TuningController<S, R> {
    /// Validates the configuration and sizes the run from the sources' frame counts.
    pub fn new(config: &TuningConfig, sources: Vec<Box<dyn FrameSource>>, scorer: S, report: R) -> Result<Self> {
        let parameters = config.build_parameters()?;
        let total_frames: u64 = sources.iter().map(|s| s.frame_count()).sum();
        if total_frames == 0 {
            return Err(TuneError::EmptySourceSet);
        }
        info!(
            sources = sources.len(),
            total_frames,
            parameters = parameters.len(),
            "tuning run configured"
        );

        let live_config: LiveConfig = parameters.iter().map(|p| (p.name(), p.value())).collect();
        Ok(Self {
            parameters,
            aggregator: ScoreAggregator::new(total_frames, config.blend_weight, config.quality_window),
            pipeline: config.frame_pipeline(),
            live_config,
            sources,
            scorer,
            report,
            max_trials_per_parameter: config.max_trials_per_parameter.max(1),
            iteration: 0,
            stop: None,
        })
    }

    /// Checks `stop` between trials and ends the run early once it is set. The trial
    /// in progress always completes.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Tunes every parameter in order.
    pub fn run(&mut self) -> Result<TuningOutcome> {
        let mut stopped = false;
        for index in 0..self.parameters.len() {
            if !self.tune_parameter(index)? {
                stopped = true;
                break;
            }
        }
        Ok(self.outcome(stopped))
    }

    /// Tunes one parameter to completion. Returns false if the run was stopped.
    fn tune_parameter(&mut self, index: usize) -> Result<bool> {
        self.aggregator.new_variable();
        if self.aggregator.has_baseline() {
            let baseline = self.aggregator.score();
            let parameter = &mut self.parameters[index];
            parameter.seed_baseline(baseline);
            parameter.modify();
        }

        let mut trials = 0u32;
        loop {
            if self.stop_requested() {
                self.abandon(index);
                return Ok(false);
            }

            let verdict = self.run_trial(index)?;
            trials += 1;

            let measured = self.aggregator.trial_score();
            let parameter = &mut self.parameters[index];
            apply_verdict(parameter, verdict, measured);

            if parameter.is_finished() {
                info!(
                    parameter = parameter.name(),
                    value = parameter.value(),
                    score = self.aggregator.score(),
                    trials,
                    "parameter finished"
                );
                return Ok(true);
            }
            if trials >= self.max_trials_per_parameter {
                warn!(parameter = parameter.name(), trials, "trial cap reached, keeping best value");
                self.abandon(index);
                return Ok(true);
            }

            self.parameters[index].modify();
        }
    }

    /// Returns a parameter that is being left mid-search to its best value.
    fn abandon(&mut self, index: usize) {
        let parameter = &mut self.parameters[index];
        if parameter.is_first_pass() {
            parameter.finish();
            return;
        }
        parameter.rollback_to_best();
        self.aggregator.restore_score(parameter.best_score());
    }

    /// Runs one full pass over every source at the current configuration.
    fn run_trial(&mut self, index: usize) -> Result<Verdict> {
        self.aggregator.new_iteration();
        for parameter in &self.parameters {
            self.live_config.set(parameter.name(), parameter.value());
        }
        self.iteration += 1;
        let iteration = self.iteration;
        let started = Instant::now();

        let total = self.aggregator.total_frames();
        let progress_every = (total / 100).max(1);
        let mut processed = 0u64;

        let pipeline = self.pipeline;
        let scorer = &mut self.scorer;
        let aggregator = &mut self.aggregator;
        let live_config = &self.live_config;
        for source in self.sources.iter_mut() {
            scorer.begin_source();
            let run = pipeline.run(source.as_mut(), |frame| {
                aggregator.push(scorer.score(&frame, live_config));
                processed += 1;
                if processed % progress_every == 0 {
                    debug!(iteration, percent = 100 * processed / total, "trial progress");
                }
            });
            trace!(iteration, source = source.name(), high_water = run.high_water, "source done");
            if run.error.is_some() || run.frames < source.frame_count() {
                warn!(
                    iteration,
                    source = source.name(),
                    scored = run.frames,
                    announced = source.frame_count(),
                    "source came up short, missing frames count as misses"
                );
            }
        }

        let verdict = self.aggregator.update(&self.parameters[index]);
        let report = TrialReport {
            iteration,
            parameter: self.parameters[index].name().to_owned(),
            values: self.current_values(),
            quality: self.aggregator.average_quality(),
            detected_frames: self.aggregator.detected_frames(),
            total_frames: total,
            scored_frames: processed,
            score: self.aggregator.trial_score(),
            elapsed: started.elapsed(),
        };
        self.report.record(&report)?;
        info!(
            iteration,
            parameter = %report.parameter,
            value = self.parameters[index].value(),
            score = report.score,
            detected = report.detected_frames,
            ?verdict,
            "trial complete"
        );
        Ok(verdict)
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|s| s.load(Ordering::Relaxed))
    }

    fn current_values(&self) -> Vec<(String, f64)> {
        self.parameters.iter().map(|p| (p.name().to_owned(), p.value())).collect()
    }

    fn outcome(&self, stopped: bool) -> TuningOutcome {
        TuningOutcome {
            values: self.current_values(),
            score: self.aggregator.score(),
            trials: self.iteration,
            stopped,
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn live_config(&self) -> &LiveConfig {
        &self.live_config
    }

    pub fn report(&self) -> &R {
        &self.report
    }

    pub fn into_report(self) -> R {
        self.report
    }
}
