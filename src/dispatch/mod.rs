pub mod server;
pub mod zabbix;

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::AccumulationCache;
use crate::config::Config;
use crate::error::DispatchError;
use crate::ingest::pull::RegistrySink;
use crate::ingest::push::CacheSink;
use crate::ingest::Recorder;
use crate::types::BackendMode;
use server::MetricsServer;
use zabbix::{make_data_items, BatchSender, SenderAck, ZabbixSender};

/// Publishes the results of a collection pass to the configured backend.
pub enum Dispatcher {
    /// Serve the registry to scrapers until shutdown
    Serve {
        registry: Registry,
        listen: String,
        path: String,
    },
    /// Drain the cache into one batch and send it
    Send {
        cache: AccumulationCache,
        sender: Arc<dyn BatchSender>,
        host: String,
    },
}

/// What a completed dispatch produced
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The scrape endpoint was shut down
    Stopped,
    /// The batch was accepted by the remote collector
    Sent { items: usize, ack: SenderAck },
}

/// Build the ingestion handle and matching dispatcher for `config`.
///
/// Both halves share the same registry or cache.
pub fn backend(config: &Config) -> (Recorder, Dispatcher) {
    match config.exporter.mode {
        BackendMode::Prometheus => {
            let registry = Registry::new();
            let recorder = Recorder::new(Arc::new(RegistrySink::new(registry.clone())));
            let dispatcher = Dispatcher::Serve {
                registry,
                listen: config.prometheus.listen_addr(),
                path: config.prometheus.path.clone(),
            };
            (recorder, dispatcher)
        }
        BackendMode::Zabbix => {
            let cache = AccumulationCache::new();
            let recorder = Recorder::new(Arc::new(CacheSink::new(cache.clone(), config.zabbix.key_scheme)));
            let sender = ZabbixSender::new(
                config.zabbix.server.clone(),
                Duration::from_secs(config.zabbix.timeout_secs),
            );
            let dispatcher = Dispatcher::Send {
                cache,
                sender: Arc::new(sender),
                host: config.zabbix.from.clone(),
            };
            (recorder, dispatcher)
        }
    }
}

impl Dispatcher {
    pub async fn dispatch(self, cancel: CancellationToken) -> Result<DispatchOutcome, DispatchError> {
        match self {
            Dispatcher::Serve { registry, listen, path } => {
                let server = MetricsServer::bind(&listen, &path, registry).await?;
                server.serve(cancel).await?;
                info!("Metrics server stopped");
                Ok(DispatchOutcome::Stopped)
            }
            Dispatcher::Send { cache, sender, host } => {
                // Lock is released once the snapshot is taken
                let items = make_data_items(cache.snapshot(), &host);
                let count = items.len();

                let ack = sender.send(&items).await?;
                match ack.counts() {
                    Some((_, failed)) if failed > 0 => {
                        warn!(failed, info = %ack.info, "Server rejected some items");
                    }
                    _ => {}
                }
                info!(items = count, host = %host, response = %ack, "Sent batch");
                Ok(DispatchOutcome::Sent { items: count, ack })
            }
        }
    }
}
