pub mod orchestrator;
pub mod report;
pub mod train_step;
pub mod validation;

pub use orchestrator::{Collaborators, Phase, TrainingOrchestrator, INITIAL_BEST_SCORE};
pub use report::{RunSummary, ValidationReport};
pub use train_step::train_step;
pub use validation::{run_validation, ValidationOutcome};
