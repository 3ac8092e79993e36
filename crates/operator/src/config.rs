//! Operator configuration
//!
//! Values come from an optional YAML file overlaid by `KPT_*` environment
//! variables, e.g. `KPT_RECONCILE_INTERVAL_SECS=5`.

use anyhow::{bail, Context, Result};
use operator_lib::dispatcher::DispatchConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the optional config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kpt-operator/config.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "KPT_CONFIG";

/// Operator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// Explicit kubeconfig; inferred when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace the operator runs in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Label selector of the probe pods
    #[serde(default = "default_probe_selector")]
    pub probe_selector: String,

    #[serde(default = "default_probe_port")]
    pub probe_port: u16,

    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Timeout for a single probe delivery
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,

    /// Deliveries in flight per request; 1 delivers sequentially
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    /// When false, requests are only acknowledged with `Created`
    #[serde(default = "default_probe_enabled")]
    pub probe_enabled: bool,

    /// Directory of CRD manifests created at startup
    #[serde(default = "default_crd_dir")]
    pub crd_dir: PathBuf,

    #[serde(default = "default_fleet_report_interval")]
    pub fleet_report_interval_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_namespace() -> String {
    "kpt-system".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconcile_interval() -> u64 {
    10
}

fn default_probe_selector() -> String {
    operator_lib::discovery::PROBE_SELECTOR.to_string()
}

fn default_probe_port() -> u16 {
    8081
}

fn default_probe_path() -> String {
    "/api/monitor".to_string()
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_max_concurrent_deliveries() -> usize {
    1
}

fn default_probe_enabled() -> bool {
    true
}

fn default_crd_dir() -> PathBuf {
    PathBuf::from("/etc/kpt-operator/crds")
}

fn default_fleet_report_interval() -> u64 {
    60
}

fn default_api_port() -> u16 {
    8080
}

impl OperatorConfig {
    /// Load configuration from the config file named by `KPT_CONFIG` and the environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load configuration from `path` (if it exists) and the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("KPT").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let config: OperatorConfig = config
            .try_deserialize()
            .context("invalid operator configuration")?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.reconcile_interval_secs == 0 {
            bail!("reconcile_interval_secs must be greater than zero");
        }
        if self.fleet_report_interval_secs == 0 {
            bail!("fleet_report_interval_secs must be greater than zero");
        }
        if self.delivery_timeout_secs == 0 {
            bail!("delivery_timeout_secs must be greater than zero");
        }
        if self.max_concurrent_deliveries == 0 {
            bail!("max_concurrent_deliveries must be greater than zero");
        }
        Ok(())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            probe_selector: self.probe_selector.clone(),
            probe_port: self.probe_port,
            probe_path: self.probe_path.clone(),
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
            max_concurrent_deliveries: self.max_concurrent_deliveries,
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn fleet_report_interval(&self) -> Duration {
        Duration::from_secs(self.fleet_report_interval_secs)
    }
}
