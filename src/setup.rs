//! Builds the concrete collaborators a [`Config`] asks for.

use std::sync::Arc;

use crate::config::{Config, DatasetKind, ModelArch, OptimizerConfig, ScheduleConfig};
use crate::data::dataset::Dataset;
use crate::data::loader::DataLoader;
use crate::data::synthetic::{self, SyntheticScenes};
use crate::model::pixel_softmax::PixelSoftmax;
use crate::model::segmentation_model::SegmentationModel;
use crate::optim::optimizer::Optimizer;
use crate::optim::sgd::Sgd;
use crate::schedule::lr_scheduler::LrScheduler;
use crate::schedule::step_lr::{ConstantLr, StepLr};
use crate::sink::metrics_sink::MetricsSink;
use crate::train::orchestrator::Collaborators;

// Keeps validation scenes disjoint from training scenes for the same seed.
const VAL_SEED_OFFSET: u64 = 0xA5A5_5A5A_0F0F_F0F0;

pub fn input_channels(dataset: DatasetKind) -> usize {
    match dataset {
        DatasetKind::Synthetic => synthetic::CHANNELS,
    }
}

pub fn build_model(config: &Config) -> Box<dyn SegmentationModel> {
    let in_channels = input_channels(config.data.dataset);
    match config.model.arch {
        ModelArch::PixelSoftmax => Box::new(PixelSoftmax::new(
            in_channels,
            config.data.n_classes,
            config.training.seed,
        )),
    }
}

pub fn build_optimizer(config: &OptimizerConfig) -> Box<dyn Optimizer> {
    match *config {
        OptimizerConfig::Sgd { lr, momentum, weight_decay } => Box::new(
            Sgd::new(lr).with_momentum(momentum).with_weight_decay(weight_decay),
        ),
    }
}

pub fn build_scheduler(schedule: &ScheduleConfig, base_lr: f64) -> Box<dyn LrScheduler> {
    match *schedule {
        ScheduleConfig::Constant => Box::new(ConstantLr::new(base_lr)),
        ScheduleConfig::StepLr { step_size, gamma } => Box::new(StepLr::new(base_lr, step_size, gamma)),
    }
}

/// Training and validation datasets.
pub fn build_datasets(config: &Config) -> (Arc<dyn Dataset>, Arc<dyn Dataset>) {
    let d = &config.data;
    let seed = config.training.seed;
    match d.dataset {
        DatasetKind::Synthetic => (
            Arc::new(SyntheticScenes::new(d.train_samples, d.img_cols, d.img_rows, d.n_classes, seed)),
            Arc::new(SyntheticScenes::new(
                d.val_samples,
                d.img_cols,
                d.img_rows,
                d.n_classes,
                seed ^ VAL_SEED_OFFSET,
            )),
        ),
    }
}

/// Training loader reshuffles every epoch; validation order is fixed.
pub fn build_loaders(config: &Config) -> (DataLoader, DataLoader) {
    let t = &config.training;
    let (train, val) = build_datasets(config);
    (
        DataLoader::new(train, t.batch_size)
            .with_workers(t.n_workers)
            .shuffled(t.seed),
        DataLoader::new(val, t.batch_size).with_workers(t.n_workers),
    )
}

/// Everything `TrainingOrchestrator::new` needs, built from a validated config.
pub fn collaborators(config: &Config, sink: Box<dyn MetricsSink>) -> Collaborators {
    let t = &config.training;
    let (train_data, val_data) = build_loaders(config);
    Collaborators {
        model: build_model(config),
        optimizer: build_optimizer(&t.optimizer),
        scheduler: build_scheduler(&t.lr_schedule, t.optimizer.learning_rate()),
        loss_fn: t.loss.build(),
        train_data: Box::new(train_data),
        val_data: Box::new(val_data),
        sink,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_toml_str(
            r#"
            [model]
            arch = "pixel_softmax"
            [data]
            dataset = "synthetic"
            img_rows = 6
            img_cols = 10
            n_classes = 4
            train_samples = 9
            val_samples = 5
            [training]
            train_iters = 10
            batch_size = 4
            [training.optimizer]
            name = "sgd"
            lr = 0.2
            [training.lr_schedule]
            name = "step_lr"
            step_size = 2
            gamma = 0.5
            "#,
        )
        .unwrap()
    }

    #[test]
    fn model_matches_dataset_geometry() {
        let config = config();
        let model = build_model(&config);
        assert_eq!(model.n_classes(), 4);
        let (train, _) = build_datasets(&config);
        let sample = train.get(0).unwrap();
        assert_eq!(sample.image.channels, input_channels(DatasetKind::Synthetic));
        assert_eq!((sample.image.width, sample.image.height), (10, 6));
    }

    #[test]
    fn splits_have_configured_sizes_and_differ() {
        let config = config();
        let (train, val) = build_datasets(&config);
        assert_eq!(train.len(), 9);
        assert_eq!(val.len(), 5);
        assert_ne!(train.get(0).unwrap(), val.get(0).unwrap());

        let (train_loader, val_loader) = build_loaders(&config);
        assert_eq!(train_loader.n_batches(), 3);
        assert_eq!(val_loader.n_batches(), 2);
    }

    #[test]
    fn scheduler_starts_at_optimizer_rate() {
        let config = config();
        let t = &config.training;
        let optimizer = build_optimizer(&t.optimizer);
        let mut scheduler = build_scheduler(&t.lr_schedule, t.optimizer.learning_rate());
        assert_eq!(optimizer.learning_rate(), scheduler.learning_rate());
        scheduler.step();
        scheduler.step();
        assert!((scheduler.learning_rate() - 0.1).abs() < 1e-12);
    }
}
