pub mod pixel_softmax;
pub mod segmentation_model;

pub use pixel_softmax::PixelSoftmax;
pub use segmentation_model::{ClassScores, Mode, SegmentationModel};
