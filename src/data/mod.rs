pub mod batch;
pub mod dataset;
pub mod loader;
pub mod synthetic;

pub use batch::{Batch, Image, LabelMap, Sample, IGNORE_LABEL};
pub use dataset::{BatchSource, Dataset};
pub use loader::DataLoader;
pub use synthetic::SyntheticScenes;
