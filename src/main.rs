use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dellhw_exporter::collector::CollectorRegistry;
use dellhw_exporter::config::{Config, Overrides};
use dellhw_exporter::dispatch::{self, DispatchOutcome};
use dellhw_exporter::driver::Driver;
use dellhw_exporter::error::exit;
use dellhw_exporter::types::BackendMode;

#[derive(Parser, Debug)]
#[command(name = "dellhw-exporter", about = "Dell OpenManage hardware health exporter")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Exporter type: prometheus or zabbix
    #[arg(long = "type")]
    exporter_type: Option<BackendMode>,

    /// Address on which to expose metrics
    #[arg(long = "web.listen")]
    listen: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.path")]
    path: Option<String>,

    /// Comma-separated list of collectors to use
    #[arg(long = "collect")]
    collect: Option<String>,

    /// Send to Zabbix from this host name
    #[arg(long = "zabbix.from")]
    zabbix_from: Option<String>,

    /// Zabbix server hostname or address
    #[arg(long = "zabbix.server")]
    zabbix_server: Option<String>,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            mode: self.exporter_type,
            listen: self.listen.clone(),
            path: self.path.clone(),
            collect: self.collect.clone(),
            zabbix_from: self.zabbix_from.clone(),
            zabbix_server: self.zabbix_server.clone(),
        }
    }
}

#[tokio::main(worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("dellhw-exporter {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let (config, repeated) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            return ExitCode::from(exit::CONFIG_INVALID);
        }
    };

    if cli.check {
        println!("Configuration is valid.");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialise logging: {:#}", e);
        return ExitCode::from(exit::CONFIG_INVALID);
    }

    for name in &repeated {
        warn!(collector = %name, "Collector listed more than once, keeping first occurrence");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %config.exporter.mode,
        collectors = ?config.collector.enabled,
        "Starting dellhw-exporter"
    );

    run(config).await
}

fn load_config(cli: &Cli) -> Result<(Config, Vec<String>)> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(cli.overrides());
    let repeated = config.validate()?;
    Ok((config, repeated))
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.agent.log_level)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

async fn run(config: Config) -> ExitCode {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, exiting");
            shutdown.cancel();
        }
    });

    let (recorder, dispatcher) = dispatch::backend(&config);

    let registry = CollectorRegistry::builtin(&config.collector);
    let driver = Driver::new(
        registry,
        config.collector.enabled.clone(),
        Duration::from_secs(config.collector.timeout_secs),
    )
    .with_cancellation(cancel.clone());

    if let Err(e) = driver.run(&recorder).await {
        error!(error = %e, "Collection pass failed");
        return ExitCode::from(e.exit_code());
    }

    match dispatcher.dispatch(cancel).await {
        Ok(DispatchOutcome::Sent { ack, .. }) => {
            println!("{}", ack);
            ExitCode::SUCCESS
        }
        Ok(DispatchOutcome::Stopped) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Dispatch failed");
            ExitCode::from(e.exit_code())
        }
    }
}
