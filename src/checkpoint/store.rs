use std::path::{Path, PathBuf};

use crate::checkpoint::record::CheckpointRecord;
use crate::error::CheckpointError;

/// Names and writes the checkpoint artifacts of one run.
///
/// A run keeps a single best artifact, `<arch>_<dataset>_best_model.json`,
/// replaced in full on every improvement, plus an optional
/// `<arch>_<dataset>_last_model.json` written at shutdown.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    stem: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, arch: &str, dataset: &str) -> CheckpointStore {
        CheckpointStore {
            dir: dir.into(),
            stem: format!("{arch}_{dataset}"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(format!("{}_best_model.json", self.stem))
    }

    pub fn last_path(&self) -> PathBuf {
        self.dir.join(format!("{}_last_model.json", self.stem))
    }

    pub fn save(&self, record: &CheckpointRecord, destination: &Path) -> Result<(), CheckpointError> {
        record.save_json(destination)
    }

    pub fn load(&self, source: &Path) -> Result<CheckpointRecord, CheckpointError> {
        CheckpointRecord::load_json(source)
    }

    pub fn save_best(&self, record: &CheckpointRecord) -> Result<PathBuf, CheckpointError> {
        let path = self.best_path();
        self.save(record, &path)?;
        Ok(path)
    }

    pub fn save_last(&self, record: &CheckpointRecord) -> Result<PathBuf, CheckpointError> {
        let path = self.last_path();
        self.save(record, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn artifact_names_follow_arch_and_dataset() {
        let store = CheckpointStore::new("runs/demo/7", "pixel_softmax", "synthetic");
        assert_eq!(
            store.best_path(),
            PathBuf::from("runs/demo/7/pixel_softmax_synthetic_best_model.json")
        );
        assert_eq!(
            store.last_path(),
            PathBuf::from("runs/demo/7/pixel_softmax_synthetic_last_model.json")
        );
    }

    #[test]
    fn best_and_last_are_separate_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "m", "d");
        let best = CheckpointRecord {
            iteration: 50,
            model_state: json!([1]),
            optimizer_state: json!(null),
            scheduler_state: json!(null),
            best_score: 0.7,
        };
        let last = CheckpointRecord { iteration: 80, ..best.clone() };

        store.save_best(&best).unwrap();
        store.save_last(&last).unwrap();

        assert_eq!(store.load(&store.best_path()).unwrap().iteration, 50);
        assert_eq!(store.load(&store.last_path()).unwrap().iteration, 80);
    }
}
