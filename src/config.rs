use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::types::{BackendMode, KeyScheme};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dellhw-exporter/config.toml";

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub zabbix: ZabbixConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Collectors to run, in order
    #[serde(default = "default_enabled_collectors")]
    pub enabled: Vec<String>,
    /// Upper bound for a single collector invocation
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_omreport_path")]
    pub omreport_path: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_collectors(),
            timeout_secs: default_collector_timeout(),
            omreport_path: default_omreport_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExporterConfig {
    #[serde(default = "default_mode")]
    pub mode: BackendMode,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self { mode: default_mode() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrometheusConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { listen: default_listen(), path: default_metrics_path() }
    }
}

impl PrometheusConfig {
    /// Listen address with a bare `:port` widened to all interfaces.
    pub fn listen_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZabbixConfig {
    #[serde(default = "default_zabbix_server")]
    pub server: String,
    /// Host name the items are reported for
    #[serde(default = "default_source_host")]
    pub from: String,
    #[serde(default)]
    pub key_scheme: KeyScheme,
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
}

impl Default for ZabbixConfig {
    fn default() -> Self {
        Self {
            server: default_zabbix_server(),
            from: default_source_host(),
            key_scheme: KeyScheme::default(),
            timeout_secs: default_send_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// Without an explicit path the default location is tried, and built-in
    /// defaults are used when nothing is there.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => DEFAULT_CONFIG_PATH,
            None => return Ok(Config::default()),
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        // Expand environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        Ok(config)
    }

    /// Apply command-line values on top of the file configuration.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(mode) = overrides.mode {
            self.exporter.mode = mode;
        }
        if let Some(listen) = overrides.listen {
            self.prometheus.listen = listen;
        }
        if let Some(path) = overrides.path {
            self.prometheus.path = path;
        }
        if let Some(collect) = overrides.collect {
            self.collector.enabled = parse_collector_list(&collect);
        }
        if let Some(from) = overrides.zabbix_from {
            self.zabbix.from = from;
        }
        if let Some(server) = overrides.zabbix_server {
            self.zabbix.server = server;
        }
    }

    /// Check invariants and normalise the enabled collector list.
    ///
    /// Returns the collector names dropped as repeats, so the caller can
    /// report them once logging is up.
    pub fn validate(&mut self) -> Result<Vec<String>> {
        check_metrics_path(&self.prometheus.path)?;
        if self.collector.timeout_secs == 0 {
            bail!("collector.timeout_secs must be greater than zero");
        }
        if self.zabbix.from.trim().is_empty() {
            bail!("zabbix.from must not be empty");
        }

        let mut seen = std::collections::HashSet::new();
        let mut enabled = Vec::with_capacity(self.collector.enabled.len());
        let mut repeated = Vec::new();
        for name in self.collector.enabled.drain(..) {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if seen.insert(name.clone()) {
                enabled.push(name);
            } else {
                repeated.push(name);
            }
        }
        self.collector.enabled = enabled;

        Ok(repeated)
    }
}

/// Values given on the command line, each replacing its config entry when set
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub mode: Option<BackendMode>,
    pub listen: Option<String>,
    pub path: Option<String>,
    pub collect: Option<String>,
    pub zabbix_from: Option<String>,
    pub zabbix_server: Option<String>,
}

/// The scrape path is mounted as a static route, so router capture syntax
/// (`:param`, `*rest`) is not allowed in it.
fn check_metrics_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        bail!("prometheus.path must start with '/', got '{}'", path);
    }
    if path.contains(|c: char| c == ':' || c == '*') {
        bail!("prometheus.path must be a literal path without ':' or '*', got '{}'", path);
    }
    Ok(())
}

/// Split a comma-separated collector list as given on the command line
pub fn parse_collector_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string())
}

/// Fully qualified host name used as the Zabbix source host.
///
/// `HOSTNAME` and `DOMAINNAME` take precedence over the system host name.
pub fn default_source_host() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        });

    match std::env::var("DOMAINNAME") {
        Ok(domain) if !domain.is_empty() && !host.contains('.') => format!("{}.{}", host, domain),
        _ => host,
    }
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_mode() -> BackendMode { BackendMode::Prometheus }
fn default_listen() -> String { "0.0.0.0:4242".to_string() }
fn default_metrics_path() -> String { "/metrics".to_string() }
fn default_zabbix_server() -> String { "localhost".to_string() }
fn default_send_timeout() -> u64 { 10 }
fn default_collector_timeout() -> u64 { 30 }
fn default_omreport_path() -> String { "omreport".to_string() }
fn default_enabled_collectors() -> Vec<String> {
    parse_collector_list(
        "dummy,chassis,memory,processors,ps,ps_amps_sysboard_pwr,storage_battery,\
         storage_enclosure,storage_vdisk,system,temps,volts",
    )
}
