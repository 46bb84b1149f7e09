pub mod chassis;
pub mod dummy;
pub mod omreport;
pub mod storage;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CollectorConfig;
use crate::ingest::Recorder;
use crate::types::Metric;
use omreport::Omreport;

/// Trait for all metric collectors.
///
/// A collector performs its readings, emits zero or more metrics through
/// the recorder, and returns an error if the readings could not be taken.
/// Collectors keep no state between invocations.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used to enable the collector (e.g., "temps", "storage_vdisk")
    fn name(&self) -> &str;

    /// Take one set of readings.
    async fn collect(&self, recorder: &Recorder) -> Result<()>;
}

/// Turns one omreport row into zero or more metrics
pub type RowParser = fn(&[String]) -> Vec<Metric>;

/// Collector backed by a single omreport invocation and a row parser.
pub struct OmreportCollector {
    name: &'static str,
    args: &'static [&'static str],
    parse: RowParser,
    omreport: Omreport,
}

impl OmreportCollector {
    pub fn new(name: &'static str, args: &'static [&'static str], parse: RowParser, omreport: Omreport) -> Self {
        Self { name, args, parse, omreport }
    }
}

#[async_trait]
impl Collector for OmreportCollector {
    fn name(&self) -> &str { self.name }

    async fn collect(&self, recorder: &Recorder) -> Result<()> {
        let rows = self.omreport.run(self.args).await?;
        for row in &rows {
            for metric in (self.parse)(row) {
                recorder.record(metric)?;
            }
        }
        Ok(())
    }
}

/// Named collectors available to the driver. Fixed once built.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in collector
    pub fn builtin(config: &CollectorConfig) -> Self {
        let omreport = Omreport::new(config.omreport_path.clone());
        let mut registry = Self::new();

        registry.register(Arc::new(dummy::DummyCollector));
        for c in chassis::collectors(&omreport) {
            registry.register(c);
        }
        for c in storage::collectors(&omreport) {
            registry.register(c);
        }

        tracing::info!(count = registry.len(), "Initialized collectors");
        registry
    }

    /// Add a collector, replacing any previous one with the same name.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> &mut Self {
        let name = collector.name().to_string();
        if self.collectors.insert(name.clone(), collector).is_some() {
            tracing::warn!(collector = %name, "Replaced previously registered collector");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.get(name).cloned()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
