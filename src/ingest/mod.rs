pub mod pull;
pub mod push;

use std::sync::Arc;

use crate::error::SinkError;
use crate::types::{Labels, Metric};

/// Destination for metrics emitted during a collection pass.
///
/// One implementation exists per backend. The sink is chosen once at
/// startup and shared with every collector through a [`Recorder`].
pub trait MetricSink: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &str;

    /// Record a metric whose raw value has already been parsed as `value`.
    fn record(&self, metric: &Metric, value: f64) -> Result<(), SinkError>;
}

/// Handle collectors use to emit metrics.
///
/// Values that do not parse as a float are logged and dropped without
/// failing the caller. Sink errors are returned and are fatal to the pass.
#[derive(Clone)]
pub struct Recorder {
    sink: Arc<dyn MetricSink>,
}

impl Recorder {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }

    pub fn backend(&self) -> &str {
        self.sink.name()
    }

    /// Emit a single reading.
    pub fn add(&self, name: &str, value: &str, labels: Labels, description: &str) -> Result<(), SinkError> {
        self.record(Metric::new(name, value, labels, description))
    }

    pub fn record(&self, metric: Metric) -> Result<(), SinkError> {
        let Some(value) = parse_value(&metric.value) else {
            tracing::warn!(metric = %metric.name, value = %metric.value, "Could not parse value for metric, dropping");
            return Ok(());
        };

        tracing::debug!(
            backend = self.sink.name(),
            metric = %metric.name,
            labels = ?metric.labels,
            value,
            "Adding metric"
        );
        self.sink.record(&metric, value)
    }
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        seen: Mutex<Vec<(String, f64)>>,
    }

    impl MetricSink for CapturingSink {
        fn name(&self) -> &str { "capture" }

        fn record(&self, metric: &Metric, value: f64) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push((metric.name.clone(), value));
            Ok(())
        }
    }

    #[test]
    fn unparseable_values_never_reach_the_sink() {
        let sink = Arc::new(CapturingSink::default());
        let recorder = Recorder::new(sink.clone());

        recorder.add("fan", "n/a", Labels::new(), "").unwrap();
        recorder.add("fan", "", Labels::new(), "").unwrap();
        recorder.add("fan", " 3600 ", Labels::new(), "").unwrap();

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("fan".to_string(), 3600.0)]);
    }

    #[test]
    fn parse_accepts_floats_and_exponents() {
        assert_eq!(parse_value("123.5"), Some(123.5));
        assert_eq!(parse_value("-4"), Some(-4.0));
        assert_eq!(parse_value("1e3"), Some(1000.0));
        assert_eq!(parse_value("42 C"), None);
    }
}
