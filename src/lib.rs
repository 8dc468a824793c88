pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod run_dir;
pub mod schedule;
pub mod setup;
pub mod sink;
pub mod train;

// Convenience re-exports
pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use config::Config;
pub use error::{CheckpointError, ConfigError, DataError, FailedPhase, StepError, TrainError};
pub use metrics::{AverageMeter, RunningScore, ScoreSnapshot};
pub use run_dir::RunDir;
pub use train::{Collaborators, Phase, RunSummary, TrainingOrchestrator};
