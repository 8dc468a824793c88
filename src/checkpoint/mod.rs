pub mod record;
pub mod store;

pub use record::CheckpointRecord;
pub use store::CheckpointStore;
