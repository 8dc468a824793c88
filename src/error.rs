//! Error types for ferrite-seg.
//!
//! Collaborators (model, loss, optimizer, data) report [`StepError`]; the
//! orchestrator wraps those into [`TrainError`] together with the phase and
//! iteration at which they happened.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Problems with the TOML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Failures while producing samples or batches.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("sample index {index} out of range for dataset of {len}")]
    Index { index: usize, len: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("data loader workers exited before batch {batch} was produced")]
    WorkerDisconnected { batch: usize },

    #[error("training data source produced no batches")]
    EmptyEpoch,

    #[error("data I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("ground truth has {ground_truth} labels but prediction has {predicted}")]
    LengthMismatch { ground_truth: usize, predicted: usize },
}

/// Failure of one forward/loss/backward/update computation.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("non-finite {quantity}: {value}")]
    NonFinite { quantity: &'static str, value: f64 },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("optimizer error: {0}")]
    Optimizer(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("validation data source produced no batches")]
    EmptyValidation,
}

/// Checkpoint persistence failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint found at {0}")]
    NotFound(PathBuf),

    #[error("checkpoint {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint {path} has incompatible {component} state: {reason}")]
    Incompatible {
        path: PathBuf,
        component: &'static str,
        reason: String,
    },

    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A metrics sink refused a report. Never fatal.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Phase of the orchestrator a fatal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedPhase {
    Resume,
    Training,
    Validation,
    Checkpoint,
}

impl fmt::Display for FailedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailedPhase::Resume => "resume",
            FailedPhase::Training => "training step",
            FailedPhase::Validation => "validation",
            FailedPhase::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

/// Fatal errors that abort a training run.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("resume failed: {0}")]
    Resume(#[source] CheckpointError),

    #[error("training step failed at iteration {iteration}: {source}")]
    Training {
        iteration: u64,
        #[source]
        source: StepError,
    },

    #[error("validation failed at iteration {iteration}: {source}")]
    Validation {
        iteration: u64,
        #[source]
        source: StepError,
    },

    #[error("writing checkpoint failed at iteration {iteration}: {source}")]
    Checkpoint {
        iteration: u64,
        #[source]
        source: CheckpointError,
    },
}

impl TrainError {
    pub fn phase(&self) -> FailedPhase {
        match self {
            TrainError::Resume(_) => FailedPhase::Resume,
            TrainError::Training { .. } => FailedPhase::Training,
            TrainError::Validation { .. } => FailedPhase::Validation,
            TrainError::Checkpoint { .. } => FailedPhase::Checkpoint,
        }
    }
}
