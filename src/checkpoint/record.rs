use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CheckpointError;

/// Everything needed to resume (or deploy) a run.
///
/// The three state blobs are opaque to this crate: each collaborator produces
/// and consumes its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Number of completed training iterations.
    pub iteration: u64,
    pub model_state: Value,
    pub optimizer_state: Value,
    pub scheduler_state: Value,
    /// Best validation mean IoU seen so far.
    pub best_score: f64,
}

impl CheckpointRecord {
    /// Writes the record as pretty-printed JSON.
    ///
    /// The JSON goes to a sibling temp file that is synced and then renamed
    /// over `path`, so readers see either the old artifact or the new one.
    pub fn save_json(&self, path: &Path) -> Result<(), CheckpointError> {
        let io_err = |source| CheckpointError::Io { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = temp_path(path);
        let result = (|| -> std::io::Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&tmp, path)
        })();

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(source));
        }
        Ok(())
    }

    /// Reads a record previously written by [`save_json`](Self::save_json).
    pub fn load_json(path: &Path) -> Result<CheckpointRecord, CheckpointError> {
        let file = File::open(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => CheckpointError::NotFound(path.to_path_buf()),
            _ => CheckpointError::Io { path: path.to_path_buf(), source },
        })?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|source| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
