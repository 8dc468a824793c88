pub mod lr_scheduler;
pub mod step_lr;

pub use lr_scheduler::LrScheduler;
pub use step_lr::{ConstantLr, StepLr};
