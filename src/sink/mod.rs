pub mod jsonl_sink;
pub mod metrics_sink;
pub mod tracing_sink;

pub use jsonl_sink::JsonlSink;
pub use metrics_sink::{FanoutSink, MetricsSink};
pub use tracing_sink::TracingSink;
