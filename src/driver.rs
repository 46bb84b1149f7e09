use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::CollectorRegistry;
use crate::error::{CollectError, SinkError};
use crate::ingest::Recorder;

/// Outcome of a successful collection pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    /// Collectors that ran, in order
    pub ran: Vec<String>,
    /// Enabled names with no registered collector
    pub unknown: Vec<String>,
}

/// Runs the enabled collectors one at a time, in configured order.
///
/// The first failure aborts the pass; later collectors are never invoked.
pub struct Driver {
    registry: CollectorRegistry,
    enabled: Vec<String>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Driver {
    pub fn new(registry: CollectorRegistry, enabled: Vec<String>, timeout: Duration) -> Self {
        Self {
            registry,
            enabled,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the pass when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn enabled(&self) -> &[String] {
        &self.enabled
    }

    pub async fn run(&self, recorder: &Recorder) -> Result<CollectionReport, CollectError> {
        let mut report = CollectionReport::default();

        for name in &self.enabled {
            let Some(collector) = self.registry.get(name) else {
                warn!(collector = %name, "Unknown collector, skipping");
                report.unknown.push(name.clone());
                continue;
            };

            info!(collector = %name, "Running collector");
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(CollectError::Cancelled { name: name.clone() });
                }
                r = tokio::time::timeout(self.timeout, collector.collect(recorder)) => r,
            };

            match outcome {
                Err(_) => {
                    return Err(CollectError::Timeout {
                        name: name.clone(),
                        secs: self.timeout.as_secs(),
                    });
                }
                Ok(Err(e)) => return Err(classify(name, e)),
                Ok(Ok(())) => {
                    debug!(collector = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Collector finished");
                    report.ran.push(name.clone());
                }
            }
        }

        info!(ran = report.ran.len(), unknown = report.unknown.len(), "Collection pass complete");
        Ok(report)
    }
}

// Duplicate registrations get their own exit status.
fn classify(name: &str, err: anyhow::Error) -> CollectError {
    match err.downcast::<SinkError>() {
        Ok(source @ SinkError::DuplicateRegistration { .. }) => CollectError::DuplicateRegistration {
            name: name.to_string(),
            source,
        },
        Ok(other) => CollectError::Collector {
            name: name.to_string(),
            source: other.into(),
        },
        Err(err) => CollectError::Collector {
            name: name.to_string(),
            source: err,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AccumulationCache;
    use crate::collector::Collector;
    use crate::ingest::pull::RegistrySink;
    use crate::ingest::push::CacheSink;
    use crate::types::{labels, KeyScheme, Labels};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Stub {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Collector for Stub {
        fn name(&self) -> &str { self.name }

        async fn collect(&self, recorder: &Recorder) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            recorder.add(self.name, "1", Labels::new(), "stub")?;
            if self.fail {
                anyhow::bail!("{} exploded", self.name);
            }
            Ok(())
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Collector for Sleeper {
        fn name(&self) -> &str { "sleeper" }

        async fn collect(&self, _recorder: &Recorder) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    struct Doubler;

    #[async_trait]
    impl Collector for Doubler {
        fn name(&self) -> &str { "doubler" }

        async fn collect(&self, recorder: &Recorder) -> anyhow::Result<()> {
            recorder.add("uptime", "1", labels([("host", "h1")]), "d")?;
            recorder.add("uptime", "2", labels([("host", "h1")]), "d")?;
            Ok(())
        }
    }

    fn stub(name: &'static str, fail: bool) -> (Arc<Stub>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Arc::new(Stub { name, calls: calls.clone(), fail }), calls)
    }

    fn cache_recorder() -> (Recorder, AccumulationCache) {
        let cache = AccumulationCache::new();
        let recorder = Recorder::new(Arc::new(CacheSink::new(cache.clone(), KeyScheme::Values)));
        (recorder, cache)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn failure_stops_later_collectors() {
        let (first, first_calls) = stub("first", false);
        let (middle, middle_calls) = stub("middle", true);
        let (last, last_calls) = stub("last", false);

        let mut registry = CollectorRegistry::new();
        registry.register(first).register(middle).register(last);

        let driver = Driver::new(registry, names(&["first", "middle", "last"]), Duration::from_secs(5));
        let (recorder, cache) = cache_recorder();

        let err = driver.run(&recorder).await.unwrap_err();
        assert!(matches!(err, CollectError::Collector { ref name, .. } if name == "middle"));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(middle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(last_calls.load(Ordering::SeqCst), 0);

        // Only metrics recorded before the failure point are present
        assert!(cache.get("hw.first").is_some());
        assert!(cache.get("hw.middle").is_some());
        assert!(cache.get("hw.last").is_none());
    }

    #[tokio::test]
    async fn runs_in_configured_order_and_skips_unknown() {
        let (a, _) = stub("a", false);
        let (b, _) = stub("b", false);
        let mut registry = CollectorRegistry::new();
        registry.register(a).register(b);

        let driver = Driver::new(registry, names(&["b", "ghost", "a"]), Duration::from_secs(5));
        let (recorder, _cache) = cache_recorder();

        let report = driver.run(&recorder).await.unwrap();
        assert_eq!(report.ran, names(&["b", "a"]));
        assert_eq!(report.unknown, names(&["ghost"]));
    }

    #[tokio::test]
    async fn hung_collector_times_out() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Sleeper));

        let driver = Driver::new(registry, names(&["sleeper"]), Duration::from_millis(50));
        let (recorder, _cache) = cache_recorder();

        let err = driver.run(&recorder).await.unwrap_err();
        assert!(matches!(err, CollectError::Timeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_pass() {
        let (after, after_calls) = stub("after", false);
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Sleeper)).register(after);

        let token = CancellationToken::new();
        let driver = Driver::new(registry, names(&["sleeper", "after"]), Duration::from_secs(60))
            .with_cancellation(token.clone());
        let (recorder, _cache) = cache_recorder();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = driver.run(&recorder).await.unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, CollectError::Cancelled { ref name } if name == "sleeper"));
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_is_classified() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(Doubler));

        let driver = Driver::new(registry, names(&["doubler"]), Duration::from_secs(5));
        let recorder = Recorder::new(Arc::new(RegistrySink::new(prometheus::Registry::new())));

        let err = driver.run(&recorder).await.unwrap_err();
        assert!(matches!(err, CollectError::DuplicateRegistration { .. }));
        assert_eq!(err.exit_code(), crate::error::exit::DUPLICATE_REGISTRATION);
    }
}
