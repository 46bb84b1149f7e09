use super::MetricSink;
use crate::cache::AccumulationCache;
use crate::error::SinkError;
use crate::types::{KeyScheme, Metric};

/// Prefix for every derived Zabbix item key
pub const KEY_PREFIX: &str = "hw";

/// Buffers metrics in the accumulation cache until dispatch.
pub struct CacheSink {
    cache: AccumulationCache,
    scheme: KeyScheme,
}

impl CacheSink {
    pub fn new(cache: AccumulationCache, scheme: KeyScheme) -> Self {
        Self { cache, scheme }
    }

    pub fn cache(&self) -> &AccumulationCache {
        &self.cache
    }
}

impl MetricSink for CacheSink {
    fn name(&self) -> &str { "zabbix" }

    fn record(&self, metric: &Metric, _value: f64) -> Result<(), SinkError> {
        let key = derive_key(self.scheme, metric);
        self.cache.insert(key, metric.value.trim().to_string());
        Ok(())
    }
}

/// Build the cache key for `metric`.
///
/// Labels are visited in sorted key order. With [`KeyScheme::Values`] only
/// label values are appended, so two metrics whose label values coincide
/// share a key.
pub fn derive_key(scheme: KeyScheme, metric: &Metric) -> String {
    let mut key = format!("{}.{}", KEY_PREFIX, metric.name.replace('_', "."));

    match scheme {
        KeyScheme::Values => {
            for value in metric.labels.values() {
                key.push('.');
                key.push_str(value);
            }
        }
        KeyScheme::Labeled => {
            if !metric.labels.is_empty() {
                let params: Vec<String> = metric
                    .labels
                    .iter()
                    .map(|(k, v)| quote_param(&format!("{}={}", k, v)))
                    .collect();
                key.push('[');
                key.push_str(&params.join(","));
                key.push(']');
            }
        }
    }

    key
}

// Item key parameters containing separators must be quoted.
fn quote_param(param: &str) -> String {
    if param.contains([',', ']', '"']) || param.starts_with(' ') {
        format!("\"{}\"", param.replace('"', "\\\""))
    } else {
        param.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{labels, Labels};

    #[test]
    fn values_scheme_matches_legacy_keys() {
        let m = Metric::new("temp_cpu", "42", labels([("sensor", "0")]), "");
        assert_eq!(derive_key(KeyScheme::Values, &m), "hw.temp.cpu.0");

        let bare = Metric::new("chassis_power_reading", "180", Labels::new(), "");
        assert_eq!(derive_key(KeyScheme::Values, &bare), "hw.chassis.power.reading");
    }

    #[test]
    fn values_scheme_is_ordered_by_label_key() {
        let m = Metric::new("storage_pdisk", "0", labels([("id", "0_1_2"), ("controller", "0")]), "");
        assert_eq!(derive_key(KeyScheme::Values, &m), "hw.storage.pdisk.0.0_1_2");
    }

    #[test]
    fn labeled_scheme_keeps_keys() {
        let a = Metric::new("chassis_fan", "0", labels([("name", "FAN1")]), "");
        let b = Metric::new("chassis_fan", "0", labels([("slot", "FAN1")]), "");
        assert_eq!(derive_key(KeyScheme::Labeled, &a), "hw.chassis.fan[name=FAN1]");
        assert_ne!(derive_key(KeyScheme::Labeled, &a), derive_key(KeyScheme::Labeled, &b));
        assert_eq!(derive_key(KeyScheme::Values, &a), derive_key(KeyScheme::Values, &b));
    }

    #[test]
    fn labeled_scheme_quotes_separators() {
        let m = Metric::new("system", "0", labels([("component", "a,b")]), "");
        assert_eq!(derive_key(KeyScheme::Labeled, &m), "hw.system[\"component=a,b\"]");
    }

    #[test]
    fn sink_overwrites_same_key() {
        let sink = CacheSink::new(AccumulationCache::new(), KeyScheme::Values);
        let first = Metric::new("temp_cpu", "40", labels([("sensor", "0")]), "");
        let second = Metric::new("temp_cpu", "42", labels([("sensor", "0")]), "");
        sink.record(&first, 40.0).unwrap();
        sink.record(&second, 42.0).unwrap();

        assert_eq!(sink.cache().len(), 1);
        assert_eq!(sink.cache().get("hw.temp.cpu.0").as_deref(), Some("42"));
    }
}
