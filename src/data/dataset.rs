use crate::data::batch::{Batch, Sample};
use crate::error::DataError;

/// Random-access collection of labelled samples.
///
/// Shared across loader worker threads, hence `Send + Sync`.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<Sample, DataError>;

    fn n_classes(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A restartable stream of batches. Every call to `batches` starts a new epoch.
pub trait BatchSource {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch, DataError>> + '_>;
}
