// THEORY:
// This file is the entry point for the `lane_tuner` library crate. It exposes the
// tuning engine as a small public API:
//
// - `pipeline`: `TuningConfig` and the `TuningController` that runs the search.
// - `scoring`: the `Detector` / `Scorer` seam to the external detection pipeline.
// - `sources`: frame sources (image sequences, in-memory frames).
// - `report`: per-trial result rows and the CSV writer.
// - `detector`: a simple reference detector used by the runner binary.
//
// The leaf components (`Parameter`, `ScoreAggregator`, `FramePipeline`, the quality
// metrics and the live configuration) live in `core_modules`.

pub mod core_modules;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod sources;

pub use crate::core_modules::frame_pipeline::{Frame, FramePipeline, FrameSource};
pub use crate::core_modules::live_config::LiveConfig;
pub use crate::core_modules::parameter::{Direction, Parameter};
pub use crate::core_modules::quality::{Detection, DetectionResult, Quad};
pub use crate::core_modules::score_aggregator::{ScoreAggregator, Verdict};
pub use crate::error::{Result, TuneError};
pub use crate::pipeline::{ParameterSpec, TuningConfig, TuningController, TuningOutcome};
