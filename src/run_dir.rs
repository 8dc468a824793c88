use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;

/// Per-run output directory: `<root>/<config stem>/<run id>`.
///
/// Holds the config snapshot, `run.log`, `metrics.jsonl` and the checkpoints.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
    run_id: u32,
}

impl RunDir {
    /// Creates a fresh run directory under `root` with a random id in
    /// `1..=100000` and copies `config_path` into it.
    pub fn create(root: &Path, config_path: &Path) -> io::Result<RunDir> {
        let stem = config_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        let parent = root.join(stem);

        let mut rng = rand::thread_rng();
        let (path, run_id) = loop {
            let run_id = rng.gen_range(1..=100_000u32);
            let candidate = parent.join(run_id.to_string());
            if !candidate.exists() {
                break (candidate, run_id);
            }
        };
        fs::create_dir_all(&path)?;

        if let Some(name) = config_path.file_name() {
            fs::copy(config_path, path.join(name))?;
        }
        Ok(RunDir { path, run_id })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    /// File name of the JSON log written next to the checkpoints.
    pub fn log_file_name(&self) -> &'static str {
        "run.log"
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.path.join("metrics.jsonl")
    }
}
