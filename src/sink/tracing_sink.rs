use tracing::debug;

use crate::error::SinkError;
use crate::sink::metrics_sink::MetricsSink;

/// Forwards reports to `tracing` at debug level under `ferrite_seg::metrics`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError> {
        debug!(target: "ferrite_seg::metrics", tag, value, step);
        Ok(())
    }

    fn add_text(&mut self, tag: &str, text: &str, step: u64) -> Result<(), SinkError> {
        debug!(target: "ferrite_seg::metrics", tag, text, step);
        Ok(())
    }
}
