use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SinkError;
use crate::sink::metrics_sink::MetricsSink;

#[derive(Serialize)]
#[serde(untagged)]
enum Payload<'a> {
    Scalar { value: f64 },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct Line<'a> {
    step: u64,
    tag: &'a str,
    #[serde(flatten)]
    payload: Payload<'a>,
}

/// Appends one JSON object per report to a file, e.g.
/// `{"step":500,"tag":"val_metrics/mean_iou","value":0.61}`.
///
/// Non-finite scalars are written as `null`.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> Result<JsonlSink, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(JsonlSink {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &Line<'_>) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl MetricsSink for JsonlSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError> {
        self.write_line(&Line { step, tag, payload: Payload::Scalar { value } })
    }

    fn add_text(&mut self, tag: &str, text: &str, step: u64) -> Result<(), SinkError> {
        self.write_line(&Line { step, tag, payload: Payload::Text { text } })
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
