use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;
use crate::schedule::lr_scheduler::LrScheduler;

/// Keeps the learning rate fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantLr {
    pub base_lr: f64,
    pub last_epoch: u64,
}

impl ConstantLr {
    pub fn new(base_lr: f64) -> ConstantLr {
        ConstantLr { base_lr, last_epoch: 0 }
    }
}

impl LrScheduler for ConstantLr {
    fn step(&mut self) {
        self.last_epoch += 1;
    }

    fn learning_rate(&self) -> f64 {
        self.base_lr
    }

    fn state(&self) -> Result<Value, StepError> {
        serde_json::to_value(self).map_err(|e| StepError::Scheduler(e.to_string()))
    }

    fn load_state(&mut self, state: &Value) -> Result<(), StepError> {
        *self = ConstantLr::deserialize(state).map_err(|e| StepError::Scheduler(e.to_string()))?;
        Ok(())
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLr {
    pub base_lr: f64,
    pub step_size: u64,
    pub gamma: f64,
    pub last_epoch: u64,
}

impl StepLr {
    /// # Panics
    /// Panics if `step_size == 0`.
    pub fn new(base_lr: f64, step_size: u64, gamma: f64) -> StepLr {
        assert!(step_size > 0, "step_size must be at least 1");
        StepLr { base_lr, step_size, gamma, last_epoch: 0 }
    }
}

impl LrScheduler for StepLr {
    fn step(&mut self) {
        self.last_epoch += 1;
    }

    fn learning_rate(&self) -> f64 {
        let decays = (self.last_epoch / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }

    fn state(&self) -> Result<Value, StepError> {
        serde_json::to_value(self).map_err(|e| StepError::Scheduler(e.to_string()))
    }

    fn load_state(&mut self, state: &Value) -> Result<(), StepError> {
        let loaded = StepLr::deserialize(state).map_err(|e| StepError::Scheduler(e.to_string()))?;
        if loaded.step_size == 0 {
            return Err(StepError::Scheduler("step_size must be at least 1".into()));
        }
        *self = loaded;
        Ok(())
    }
}
