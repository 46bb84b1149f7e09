use std::collections::HashMap;

use prometheus::{Gauge, Opts, Registry};

use super::MetricSink;
use crate::error::SinkError;
use crate::types::Metric;

pub const NAMESPACE: &str = "dell";
pub const SUBSYSTEM: &str = "hw";

/// Registers every metric as a constant-labelled gauge in a Prometheus
/// registry.
///
/// The registry has no update-in-place path for constant label sets, so a
/// second registration of the same name and labels is an error. This sink
/// therefore only supports a single collection pass per process.
pub struct RegistrySink {
    registry: Registry,
}

impl RegistrySink {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl MetricSink for RegistrySink {
    fn name(&self) -> &str { "prometheus" }

    fn record(&self, metric: &Metric, value: f64) -> Result<(), SinkError> {
        let help = if metric.description.is_empty() {
            metric.name.clone()
        } else {
            metric.description.clone()
        };
        let const_labels: HashMap<String, String> = metric
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let opts = Opts::new(metric.name.clone(), help)
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM)
            .const_labels(const_labels);

        let gauge = Gauge::with_opts(opts).map_err(|e| rejected(metric, e))?;
        gauge.set(value);

        self.registry.register(Box::new(gauge)).map_err(|e| match e {
            prometheus::Error::AlreadyReg => SinkError::DuplicateRegistration {
                name: metric.name.clone(),
                labels: metric.labels.clone(),
            },
            other => rejected(metric, other),
        })
    }
}

fn rejected(metric: &Metric, err: prometheus::Error) -> SinkError {
    SinkError::Rejected {
        name: metric.name.clone(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::labels;
    use prometheus::{Encoder, TextEncoder};

    fn exposition(registry: &Registry) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn registers_namespaced_gauge() {
        let sink = RegistrySink::new(Registry::new());
        let metric = Metric::new("chassis_temps_reading", "41", labels([("name", "CPU1")]), "System temperature readings.");
        sink.record(&metric, 41.0).unwrap();

        let text = exposition(sink.registry());
        assert!(text.contains("# HELP dell_hw_chassis_temps_reading System temperature readings."));
        assert!(text.contains("# TYPE dell_hw_chassis_temps_reading gauge"));
        assert!(text.contains(r#"dell_hw_chassis_temps_reading{name="CPU1"} 41"#));
    }

    #[test]
    fn second_registration_is_a_duplicate() {
        let sink = RegistrySink::new(Registry::new());
        let metric = Metric::new("ps", "0", labels([("id", "0")]), "Overall status of power supplies.");

        assert!(sink.record(&metric, 0.0).is_ok());
        match sink.record(&metric, 1.0) {
            Err(SinkError::DuplicateRegistration { name, .. }) => assert_eq!(name, "ps"),
            other => panic!("expected duplicate registration, got {:?}", other),
        }
    }

    #[test]
    fn same_name_with_other_labels_is_allowed() {
        let sink = RegistrySink::new(Registry::new());
        let desc = "Overall status of power supplies.";
        sink.record(&Metric::new("ps", "0", labels([("id", "0")]), desc), 0.0).unwrap();
        sink.record(&Metric::new("ps", "1", labels([("id", "1")]), desc), 1.0).unwrap();

        let text = exposition(sink.registry());
        assert!(text.contains(r#"dell_hw_ps{id="0"} 0"#));
        assert!(text.contains(r#"dell_hw_ps{id="1"} 1"#));
    }

    #[test]
    fn invalid_label_name_is_rejected() {
        let sink = RegistrySink::new(Registry::new());
        let metric = Metric::new("ps", "0", labels([("bad-label", "x")]), "d");
        assert!(matches!(sink.record(&metric, 0.0), Err(SinkError::Rejected { .. })));
    }
}
