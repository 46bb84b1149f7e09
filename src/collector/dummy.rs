use anyhow::Result;
use async_trait::async_trait;

use super::Collector;
use crate::ingest::Recorder;
use crate::types::Labels;

/// Always reports `dummy = 1`; lets a scraper tell the exporter is alive.
pub struct DummyCollector;

#[async_trait]
impl Collector for DummyCollector {
    fn name(&self) -> &str { "dummy" }

    async fn collect(&self, recorder: &Recorder) -> Result<()> {
        recorder.add("dummy", "1", Labels::new(), "Dummy metric, always 1.")?;
        Ok(())
    }
}
