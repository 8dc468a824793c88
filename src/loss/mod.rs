pub mod cross_entropy;
pub mod loss_function;
pub mod loss_type;

pub use cross_entropy::CrossEntropy2d;
pub use loss_function::{LossFunction, LossOutput};
pub use loss_type::LossType;
