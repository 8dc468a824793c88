use crate::error::SinkError;

/// Destination for scalar and text reports keyed by tag and iteration.
///
/// Reports are best-effort: the training loop logs a failed report and
/// carries on.
pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError>;

    fn add_text(&mut self, tag: &str, text: &str, step: u64) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sends every report to each inner sink; the first failure is returned
/// after all sinks have been tried.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> FanoutSink {
        FanoutSink::default()
    }

    pub fn with(mut self, sink: Box<dyn MetricsSink>) -> FanoutSink {
        self.sinks.push(sink);
        self
    }

    fn each(
        &mut self,
        mut report: impl FnMut(&mut dyn MetricsSink) -> Result<(), SinkError>,
    ) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = report(sink.as_mut()) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl MetricsSink for FanoutSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), SinkError> {
        self.each(|s| s.add_scalar(tag, value, step))
    }

    fn add_text(&mut self, tag: &str, text: &str, step: u64) -> Result<(), SinkError> {
        self.each(|s| s.add_text(tag, text, step))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.each(|s| s.flush())
    }
}
