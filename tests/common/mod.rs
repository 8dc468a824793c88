//! Scripted collaborators for driving `TrainingOrchestrator` in tests.
//!
//! The model predicts, for every pixel, the class stored in the pixel's
//! first channel. Validation batches therefore carry their own predictions,
//! which lets a test pick the mean IoU of each validation pass.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::{json, Value};

use ferrite_seg::config::Config;
use ferrite_seg::data::{Batch, BatchSource, Image, LabelMap};
use ferrite_seg::error::{DataError, SinkError, StepError};
use ferrite_seg::loss::{CrossEntropy2d, LossFunction, LossOutput};
use ferrite_seg::model::{ClassScores, Mode, SegmentationModel};
use ferrite_seg::optim::Sgd;
use ferrite_seg::schedule::LrScheduler;
use ferrite_seg::sink::MetricsSink;
use ferrite_seg::train::Collaborators;

pub const N_CLASSES: usize = 2;
pub const BASE_LR: f64 = 0.1;

/// Ground truth of every validation batch.
const VAL_TRUTH: [i64; 4] = [0, 0, 1, 1];

/// Validation quality, i.e. the mean IoU a pass reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quality {
    /// Every pixel right: mean IoU 1.0.
    Perfect,
    /// One class-1 pixel predicted as 0: mean IoU (2/3 + 1/2) / 2.
    Good,
    /// Everything predicted as 0: mean IoU (1/2 + 0) / 2.
    Poor,
    /// Every pixel wrong: mean IoU 0.
    Worst,
}

impl Quality {
    pub fn mean_iou(self) -> f64 {
        match self {
            Quality::Perfect => 1.0,
            Quality::Good => (2.0 / 3.0 + 0.5) / 2.0,
            Quality::Poor => 0.25,
            Quality::Worst => 0.0,
        }
    }

    fn predictions(self) -> [i64; 4] {
        match self {
            Quality::Perfect => [0, 0, 1, 1],
            Quality::Good => [0, 0, 0, 1],
            Quality::Poor => [0, 0, 0, 0],
            Quality::Worst => [1, 1, 0, 0],
        }
    }
}

/// One single-channel image whose pixels hold the predicted classes.
pub fn batch(predictions: &[i64], truth: &[i64]) -> Batch {
    let n = truth.len();
    let pixels = predictions.iter().map(|&p| p as f64).collect();
    Batch {
        images: vec![Image::from_pixels(n, 1, 1, pixels).unwrap()],
        labels: vec![LabelMap { width: n, height: 1, labels: truth.to_vec() }],
    }
}

/// Shared counters observed by the tests.
#[derive(Clone, Default)]
pub struct Probe {
    pub train_steps: Rc<Cell<u64>>,
    pub loss_calls: Rc<Cell<u64>>,
    pub scheduler_steps: Rc<Cell<u64>>,
    pub val_passes: Rc<Cell<usize>>,
    pub train_epochs: Rc<Cell<u64>>,
    pub scalars: Rc<RefCell<Vec<(String, f64, u64)>>>,
    pub texts: Rc<RefCell<Vec<(String, String, u64)>>>,
}

impl Probe {
    pub fn scalars_tagged(&self, tag: &str) -> Vec<(f64, u64)> {
        self.scalars
            .borrow()
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, v, s)| (*v, *s))
            .collect()
    }
}

/// How the collaborators of a test run behave.
#[derive(Clone)]
pub struct Script {
    pub train_batches: usize,
    /// Quality of each validation pass; the last entry repeats.
    pub val: Vec<Quality>,
    /// 1-based loss call (training and validation) that returns NaN.
    pub nan_on_loss_call: Option<u64>,
    pub failing_sink: bool,
    pub empty_val: bool,
}

impl Default for Script {
    fn default() -> Script {
        Script {
            train_batches: 3,
            val: vec![Quality::Good],
            nan_on_loss_call: None,
            failing_sink: false,
            empty_val: false,
        }
    }
}

pub fn collaborators(script: &Script) -> (Collaborators, Probe) {
    let probe = Probe::default();
    let train = (0..script.train_batches)
        .map(|i| {
            let truth = [(i % N_CLASSES) as i64, 1, 0];
            batch(&truth, &truth)
        })
        .collect();

    let sink: Box<dyn MetricsSink> = if script.failing_sink {
        Box::new(FailingSink)
    } else {
        Box::new(RecordingSink {
            scalars: probe.scalars.clone(),
            texts: probe.texts.clone(),
        })
    };

    let parts = Collaborators {
        model: Box::new(ScriptedModel::new(probe.train_steps.clone())),
        optimizer: Box::new(Sgd::new(BASE_LR)),
        scheduler: Box::new(HalvingScheduler::new(probe.scheduler_steps.clone())),
        loss_fn: Box::new(ScriptedLoss {
            calls: probe.loss_calls.clone(),
            nan_on_call: script.nan_on_loss_call,
        }),
        train_data: Box::new(FixedSource { batches: train, epochs: probe.train_epochs.clone() }),
        val_data: Box::new(ScriptedValidation {
            script: if script.empty_val { Vec::new() } else { script.val.clone() },
            passes: probe.val_passes.clone(),
        }),
        sink,
    };
    (parts, probe)
}

pub fn config(train_iters: u64, print_interval: u64, val_interval: u64) -> Config {
    let mut config = Config::from_toml_str(
        r#"
        [model]
        arch = "pixel_softmax"
        [data]
        dataset = "synthetic"
        img_rows = 1
        img_cols = 4
        n_classes = 2
        [training]
        train_iters = 1
        batch_size = 1
        n_workers = 0
        save_last = false
        [training.optimizer]
        name = "sgd"
        lr = 0.1
        "#,
    )
    .unwrap();
    config.training.train_iters = train_iters;
    config.training.print_interval = print_interval;
    config.training.val_interval = val_interval;
    config
}

pub fn with_resume(mut config: Config, path: &Path) -> Config {
    config.training.resume = Some(PathBuf::from(path));
    config
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

pub struct ScriptedModel {
    mode: Mode,
    params: Vec<f64>,
    steps: Rc<Cell<u64>>,
}

impl ScriptedModel {
    pub fn new(steps: Rc<Cell<u64>>) -> ScriptedModel {
        ScriptedModel { mode: Mode::Train, params: vec![0.5], steps }
    }

    /// State blob in the format `load_state` accepts.
    pub fn state_with(param: f64) -> Value {
        json!({ "params": [param] })
    }
}

impl SegmentationModel for ScriptedModel {
    fn n_classes(&self) -> usize {
        N_CLASSES
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&mut self, images: &[Image]) -> Result<ClassScores, StepError> {
        let n_pixels = images.iter().map(Image::n_pixels).sum();
        let mut scores = ClassScores::zeros(n_pixels, N_CLASSES);
        let mut p = 0;
        for image in images {
            for q in 0..image.n_pixels() {
                let class = (image.pixel(q)[0] as usize).min(N_CLASSES - 1);
                scores.pixel_mut(p)[class] = 1.0;
                p += 1;
            }
        }
        Ok(scores)
    }

    fn backward(&mut self, _grad_output: &ClassScores) -> Result<Vec<f64>, StepError> {
        if self.mode != Mode::Train {
            return Err(StepError::Model("backward in eval mode".into()));
        }
        self.steps.set(self.steps.get() + 1);
        Ok(vec![0.01])
    }

    fn parameters_mut(&mut self) -> &mut [f64] {
        &mut self.params
    }

    fn state(&self) -> Result<Value, StepError> {
        Ok(json!({ "params": self.params }))
    }

    fn load_state(&mut self, state: &Value) -> Result<(), StepError> {
        let params: Vec<f64> = state
            .get("params")
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .ok_or_else(|| StepError::Model("missing params".into()))?;
        if params.len() != self.params.len() {
            return Err(StepError::Model(format!("expected 1 parameter, got {}", params.len())));
        }
        self.params = params;
        Ok(())
    }
}

pub struct ScriptedLoss {
    calls: Rc<Cell<u64>>,
    nan_on_call: Option<u64>,
}

impl LossFunction for ScriptedLoss {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn compute(&self, scores: &ClassScores, targets: &[i64]) -> Result<LossOutput, StepError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        let mut out = CrossEntropy2d.compute(scores, targets)?;
        if self.nan_on_call == Some(call) {
            out.value = f64::NAN;
        }
        Ok(out)
    }
}

/// Halves the learning rate every epoch.
pub struct HalvingScheduler {
    steps: Rc<Cell<u64>>,
}

impl HalvingScheduler {
    pub fn new(steps: Rc<Cell<u64>>) -> HalvingScheduler {
        HalvingScheduler { steps }
    }

    pub fn state_with(epochs: u64) -> Value {
        json!({ "epochs": epochs })
    }
}

impl LrScheduler for HalvingScheduler {
    fn step(&mut self) {
        self.steps.set(self.steps.get() + 1);
    }

    fn learning_rate(&self) -> f64 {
        BASE_LR / 2f64.powi(self.steps.get() as i32)
    }

    fn state(&self) -> Result<Value, StepError> {
        Ok(HalvingScheduler::state_with(self.steps.get()))
    }

    fn load_state(&mut self, state: &Value) -> Result<(), StepError> {
        let epochs = state
            .get("epochs")
            .and_then(Value::as_u64)
            .ok_or_else(|| StepError::Scheduler("missing epochs".into()))?;
        self.steps.set(epochs);
        Ok(())
    }
}

pub struct FixedSource {
    batches: Vec<Batch>,
    epochs: Rc<Cell<u64>>,
}

impl BatchSource for FixedSource {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch, DataError>> + '_> {
        self.epochs.set(self.epochs.get() + 1);
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}

pub struct ScriptedValidation {
    script: Vec<Quality>,
    passes: Rc<Cell<usize>>,
}

impl BatchSource for ScriptedValidation {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch, DataError>> + '_> {
        let pass = self.passes.get();
        self.passes.set(pass + 1);
        let Some(last) = self.script.len().checked_sub(1) else {
            return Box::new(std::iter::empty());
        };
        let quality = self.script[pass.min(last)];
        Box::new(std::iter::once(Ok(batch(&quality.predictions(), &VAL_TRUTH))))
    }
}

pub struct RecordingSink {
    scalars: Rc<RefCell<Vec<(String, f64, u64)>>>,
    texts: Rc<RefCell<Vec<(String, String, u64)>>>,
}

impl MetricsSink for RecordingSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError> {
        self.scalars.borrow_mut().push((tag.to_string(), value, step));
        Ok(())
    }

    fn add_text(&mut self, tag: &str, text: &str, step: u64) -> Result<(), SinkError> {
        self.texts.borrow_mut().push((tag.to_string(), text.to_string(), step));
        Ok(())
    }
}

pub struct FailingSink;

impl MetricsSink for FailingSink {
    fn add_scalar(&mut self, _tag: &str, _value: f64, _step: u64) -> Result<(), SinkError> {
        Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "sink down")))
    }

    fn add_text(&mut self, _tag: &str, _text: &str, _step: u64) -> Result<(), SinkError> {
        Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "sink down")))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "sink down")))
    }
}
