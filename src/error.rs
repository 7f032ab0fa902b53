// THEORY:
// Every failure the tuner can report lives in one enum. Only misconfiguration found
// before the first trial is escalated this way; anything that goes wrong while a trial
// is running (a bad frame, a source that dies half way, a scorer that returns garbage)
// is absorbed into a poor score by the decision layer instead of aborting the run.

use std::path::PathBuf;

/// Unified error type for the tuning engine.
#[derive(Debug, thiserror::Error)]
pub enum TuneError {
    /// A parameter was declared with `max <= min`.
    #[error("parameter {name}: invalid bounds, max ({max}) must be greater than min ({min})")]
    InvalidBounds { name: String, min: f64, max: f64 },

    /// A parameter was declared with a step fraction outside (0, 1].
    #[error("parameter {name}: step fraction {step} must be in (0, 1]")]
    InvalidStep { name: String, step: f64 },

    /// The starting value does not lie within the declared bounds.
    #[error("parameter {name}: initial value {initial} is outside [{min}, {max}]")]
    InitialOutOfBounds {
        name: String,
        initial: f64,
        min: f64,
        max: f64,
    },

    /// Two parameters share a name, so the live configuration would be ambiguous.
    #[error("parameter {name} is declared more than once")]
    DuplicateParameter { name: String },

    /// Nothing to tune.
    #[error("no parameters to tune")]
    NoParameters,

    /// The input sources hold no frames at all, so the detection rate is undefined.
    #[error("input sources contain no frames")]
    EmptySourceSet,

    /// A frame source could not be opened or read.
    #[error("frame source {source_name}: {message}")]
    Source { source_name: String, message: String },

    /// A directory given as an image sequence holds no decodable frames.
    #[error("no image frames found in {0}")]
    EmptyImageSequence(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid tuning configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TuneError>;
