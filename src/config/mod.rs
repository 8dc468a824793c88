pub mod train_config;

pub use train_config::{
    Config, DataConfig, DatasetKind, ModelArch, ModelConfig, OptimizerConfig, ScheduleConfig,
    TrainingConfig,
};
