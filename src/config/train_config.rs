use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::loss::loss_type::LossType;

/// Full run configuration, loaded once from TOML.
///
/// ```toml
/// [model]
/// arch = "pixel_softmax"
///
/// [data]
/// dataset = "synthetic"
/// img_rows = 32
/// img_cols = 32
/// n_classes = 4
///
/// [training]
/// train_iters = 400
/// batch_size = 8
///
/// [training.optimizer]
/// name = "sgd"
/// lr = 0.1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,
    pub data: DataConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelArch {
    PixelSoftmax,
}

impl ModelArch {
    pub fn name(self) -> &'static str {
        match self {
            ModelArch::PixelSoftmax => "pixel_softmax",
        }
    }
}

impl fmt::Display for ModelArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub arch: ModelArch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Synthetic,
}

impl DatasetKind {
    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dataset selection and geometry.
///
/// - `path`: root of an on-disk dataset (unused by `synthetic`)
/// - `train_samples` / `val_samples`: split sizes for generated datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub dataset: DatasetKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub img_rows: usize,
    pub img_cols: usize,
    pub n_classes: usize,
    #[serde(default = "defaults::train_split")]
    pub train_split: String,
    #[serde(default = "defaults::val_split")]
    pub val_split: String,
    #[serde(default = "defaults::train_samples")]
    pub train_samples: usize,
    #[serde(default = "defaults::val_samples")]
    pub val_samples: usize,
}

/// Loop hyperparameters.
///
/// # Fields
/// - `train_iters`: total optimisation steps, counted across resumes
/// - `batch_size`: samples per batch for both splits
/// - `n_workers`: data loader threads (0 loads inline), default 2
/// - `print_interval`: iterations between training reports, default 50
/// - `val_interval`: iterations between validations, default 500;
///   the last iteration always validates
/// - `seed`: drives init, shuffling and generated data, default 1337
/// - `resume`: checkpoint to restore before training
/// - `save_last`: write a `_last_model` checkpoint on normal termination, default true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub train_iters: u64,
    pub batch_size: usize,
    #[serde(default = "defaults::n_workers")]
    pub n_workers: usize,
    #[serde(default = "defaults::print_interval")]
    pub print_interval: u64,
    #[serde(default = "defaults::val_interval")]
    pub val_interval: u64,
    #[serde(default = "defaults::seed")]
    pub seed: u64,
    #[serde(default)]
    pub resume: Option<PathBuf>,
    #[serde(default = "defaults::save_last")]
    pub save_last: bool,
    #[serde(default)]
    pub loss: LossType,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub lr_schedule: ScheduleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case", deny_unknown_fields)]
pub enum OptimizerConfig {
    Sgd {
        lr: f64,
        #[serde(default)]
        momentum: f64,
        #[serde(default)]
        weight_decay: f64,
    },
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerConfig::Sgd { lr, .. } => *lr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case", deny_unknown_fields)]
pub enum ScheduleConfig {
    #[default]
    Constant,
    StepLr {
        step_size: u64,
        #[serde(default = "defaults::gamma")]
        gamma: f64,
    },
}

impl ScheduleConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ScheduleConfig::Constant => "constant",
            ScheduleConfig::StepLr { .. } => "step_lr",
        }
    }
}

mod defaults {
    pub fn train_split() -> String {
        "train".into()
    }
    pub fn val_split() -> String {
        "val".into()
    }
    pub fn train_samples() -> usize {
        256
    }
    pub fn val_samples() -> usize {
        64
    }
    pub fn n_workers() -> usize {
        2
    }
    pub fn print_interval() -> u64 {
        50
    }
    pub fn val_interval() -> u64 {
        500
    }
    pub fn seed() -> u64 {
        1337
    }
    pub fn save_last() -> bool {
        true
    }
    pub fn gamma() -> f64 {
        0.1
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&text)
    }

    /// Checks the ranges serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        at_least_one("training.train_iters", t.train_iters)?;
        at_least_one("training.batch_size", t.batch_size as u64)?;
        at_least_one("training.print_interval", t.print_interval)?;
        at_least_one("training.val_interval", t.val_interval)?;
        at_least_one("data.n_classes", self.data.n_classes as u64)?;
        at_least_one("data.img_rows", self.data.img_rows as u64)?;
        at_least_one("data.img_cols", self.data.img_cols as u64)?;
        at_least_one("data.train_samples", self.data.train_samples as u64)?;
        at_least_one("data.val_samples", self.data.val_samples as u64)?;

        match t.optimizer {
            OptimizerConfig::Sgd { lr, momentum, weight_decay } => {
                if !(lr.is_finite() && lr > 0.0) {
                    return Err(ConfigError::invalid("training.optimizer.lr", format!("must be > 0, got {lr}")));
                }
                if !(0.0..1.0).contains(&momentum) {
                    return Err(ConfigError::invalid(
                        "training.optimizer.momentum",
                        format!("must be in [0, 1), got {momentum}"),
                    ));
                }
                if !(weight_decay.is_finite() && weight_decay >= 0.0) {
                    return Err(ConfigError::invalid(
                        "training.optimizer.weight_decay",
                        format!("must be >= 0, got {weight_decay}"),
                    ));
                }
            }
        }

        if let ScheduleConfig::StepLr { step_size, gamma } = t.lr_schedule {
            at_least_one("training.lr_schedule.step_size", step_size)?;
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(ConfigError::invalid(
                    "training.lr_schedule.gamma",
                    format!("must be > 0, got {gamma}"),
                ));
            }
        }
        Ok(())
    }
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::invalid(field, "must be at least 1"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [model]
        arch = "pixel_softmax"

        [data]
        dataset = "synthetic"
        img_rows = 16
        img_cols = 24
        n_classes = 3

        [training]
        train_iters = 100
        batch_size = 4

        [training.optimizer]
        name = "sgd"
        lr = 0.05
    "#;

    #[test]
    fn minimal_config_gets_documented_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let t = &config.training;
        assert_eq!(t.n_workers, 2);
        assert_eq!(t.print_interval, 50);
        assert_eq!(t.val_interval, 500);
        assert_eq!(t.seed, 1337);
        assert_eq!(t.resume, None);
        assert!(t.save_last);
        assert_eq!(t.loss, LossType::CrossEntropy);
        assert_eq!(t.lr_schedule, ScheduleConfig::Constant);
        assert_eq!(
            t.optimizer,
            OptimizerConfig::Sgd { lr: 0.05, momentum: 0.0, weight_decay: 0.0 }
        );
        assert_eq!(config.data.train_split, "train");
        assert_eq!(config.model.arch.name(), "pixel_softmax");
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
            [model]
            arch = "pixel_softmax"

            [data]
            dataset = "synthetic"
            path = "/data/none"
            img_rows = 8
            img_cols = 8
            n_classes = 5
            train_samples = 10
            val_samples = 4

            [training]
            train_iters = 30
            batch_size = 2
            n_workers = 0
            print_interval = 5
            val_interval = 10
            seed = 7
            resume = "runs/x/best.json"
            save_last = false
            loss = "cross_entropy"

            [training.optimizer]
            name = "sgd"
            lr = 0.1
            momentum = 0.9
            weight_decay = 0.0005

            [training.lr_schedule]
            name = "step_lr"
            step_size = 3
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.training.resume, Some(PathBuf::from("runs/x/best.json")));
        assert_eq!(
            config.training.lr_schedule,
            ScheduleConfig::StepLr { step_size: 3, gamma: 0.1 }
        );
        assert_eq!(config.data.n_classes, 5);
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let text = MINIMAL.replace("batch_size = 4", "");
        assert!(matches!(Config::from_toml_str(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_names_fail_to_parse() {
        let text = MINIMAL.replace("\"pixel_softmax\"", "\"unet\"");
        assert!(matches!(Config::from_toml_str(&text), Err(ConfigError::Parse(_))));
        let text = MINIMAL.replace("name = \"sgd\"", "name = \"adam\"");
        assert!(matches!(Config::from_toml_str(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_budget_is_invalid() {
        let text = MINIMAL.replace("train_iters = 100", "train_iters = 0");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "training.train_iters", .. }));
    }

    #[test]
    fn zero_classes_is_invalid() {
        let text = MINIMAL.replace("n_classes = 3", "n_classes = 0");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "data.n_classes", .. }));
    }

    #[test]
    fn bad_learning_rate_is_invalid() {
        let text = MINIMAL.replace("lr = 0.05", "lr = -1.0");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "training.optimizer.lr", .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
