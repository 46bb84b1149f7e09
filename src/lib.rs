pub mod cache;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod ingest;

/// Common types used across modules
pub mod types {
    use serde::Deserialize;
    use std::collections::BTreeMap;

    /// Label set attached to a metric.
    ///
    /// Keys are unique and iterate in sorted order, which keeps derived
    /// cache keys stable between runs.
    pub type Labels = BTreeMap<String, String>;

    /// A single reading emitted by a collector.
    ///
    /// `value` stays textual until it reaches the ingestion boundary, where
    /// it is parsed as `f64`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Metric {
        pub name: String,
        pub value: String,
        pub labels: Labels,
        pub description: String,
    }

    impl Metric {
        pub fn new(
            name: impl Into<String>,
            value: impl Into<String>,
            labels: Labels,
            description: impl Into<String>,
        ) -> Self {
            Self {
                name: name.into(),
                value: value.into(),
                labels,
                description: description.into(),
            }
        }
    }

    /// Build a label set from `(key, value)` pairs.
    pub fn labels<K, V, I>(pairs: I) -> Labels
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }

    /// Monitoring backend selected at startup
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum BackendMode {
        /// Metrics are registered and scraped over HTTP
        Prometheus,
        /// Metrics are buffered and pushed to a Zabbix trapper
        Zabbix,
    }

    impl std::str::FromStr for BackendMode {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "prometheus" | "pull" => Ok(BackendMode::Prometheus),
                "zabbix" | "push" => Ok(BackendMode::Zabbix),
                other => Err(format!("unknown exporter type '{}' (expected prometheus or zabbix)", other)),
            }
        }
    }

    impl std::fmt::Display for BackendMode {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                BackendMode::Prometheus => write!(f, "prometheus"),
                BackendMode::Zabbix => write!(f, "zabbix"),
            }
        }
    }

    /// How push-mode cache keys are derived from a metric's labels
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum KeyScheme {
        /// `hw.<name>.<value>...`, label keys discarded
        #[default]
        Values,
        /// `hw.<name>[<key>=<value>,...]`, label keys kept
        Labeled,
    }

}
