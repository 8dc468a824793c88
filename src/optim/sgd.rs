use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepError;
use crate::optim::optimizer::Optimizer;

/// Stochastic gradient descent with optional momentum and L2 weight decay.
///
/// With momentum `m`, the velocity is `v = m·v + (g + wd·p)` (the first step
/// starts from `v = g + wd·p`) and the update is `p -= lr·v`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    velocity: Option<Vec<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            velocity: None,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Sgd {
        self.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Sgd {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [f64], grads: &[f64]) -> Result<(), StepError> {
        if params.len() != grads.len() {
            return Err(StepError::Optimizer(format!(
                "{} gradients for {} parameters",
                grads.len(),
                params.len()
            )));
        }

        let decayed: Vec<f64> = params
            .iter()
            .zip(grads)
            .map(|(p, g)| g + self.weight_decay * p)
            .collect();

        let direction = if self.momentum > 0.0 {
            let velocity = match self.velocity.take() {
                Some(mut v) if v.len() == decayed.len() => {
                    for (vi, di) in v.iter_mut().zip(&decayed) {
                        *vi = self.momentum * *vi + di;
                    }
                    v
                }
                Some(v) => {
                    return Err(StepError::Optimizer(format!(
                        "momentum buffer has {} entries for {} parameters",
                        v.len(),
                        decayed.len()
                    )))
                }
                None => decayed,
            };
            self.velocity.insert(velocity).clone()
        } else {
            decayed
        };

        for (p, d) in params.iter_mut().zip(&direction) {
            *p -= self.learning_rate * d;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn state(&self) -> Result<Value, StepError> {
        serde_json::to_value(self).map_err(|e| StepError::Optimizer(e.to_string()))
    }

    fn load_state(&mut self, state: &Value) -> Result<(), StepError> {
        *self = Sgd::deserialize(state).map_err(|e| StepError::Optimizer(e.to_string()))?;
        Ok(())
    }
}
