//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The explainer API key is loaded from EXPLAINER_API_KEY or api_key_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub carrier: CarrierConfig,
    pub acquirer: AcquirerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub explainer: Option<ExplainerConfig>,
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
}

/// Persistent state locations
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Account seed used when no account collection is stored yet
    #[serde(default = "default_accounts_seed")]
    pub accounts_seed: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            accounts_seed: default_accounts_seed(),
        }
    }
}

/// Carrier portal settings
#[derive(Debug, Deserialize)]
pub struct CarrierConfig {
    #[serde(default = "default_carrier_url")]
    pub base_url: String,
    #[serde(default = "default_carrier_timeout")]
    pub timeout_secs: u64,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            base_url: default_carrier_url(),
            timeout_secs: default_carrier_timeout(),
        }
    }
}

/// Session acquisition sidecar
#[derive(Debug, Deserialize)]
pub struct AcquirerConfig {
    pub endpoint: String,
    /// Browser logins are slow; the default allows just over two minutes
    #[serde(default = "default_acquirer_timeout")]
    pub timeout_secs: u64,
}

/// Periodic ticks and top-up policy
#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_top_up_interval")]
    pub top_up_interval_secs: u64,
    #[serde(default = "default_balance_floor")]
    pub balance_floor: f64,
    #[serde(default = "default_top_up_min")]
    pub top_up_min: u32,
    #[serde(default = "default_top_up_max")]
    pub top_up_max: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            top_up_interval_secs: default_top_up_interval(),
            balance_floor: default_balance_floor(),
            top_up_min: default_top_up_min(),
            top_up_max: default_top_up_max(),
        }
    }
}

/// Worker concurrency per queue
#[derive(Debug, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_label_concurrency")]
    pub label_concurrency: usize,
    #[serde(default = "default_session_concurrency")]
    pub session_concurrency: usize,
    /// Delay before a transient session-job failure is retried
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            label_concurrency: default_label_concurrency(),
            session_concurrency: default_session_concurrency(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Operator API listener
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// OpenAI-compatible error explainer
#[derive(Debug, Deserialize)]
pub struct ExplainerConfig {
    pub base_url: String,
    #[serde(default = "default_explainer_model")]
    pub model: String,
    #[serde(default = "default_explainer_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    /// Path to a file containing the API key (alternative to EXPLAINER_API_KEY)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
}

/// Requester notification webhook
#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    pub webhook_url: String,
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_accounts_seed() -> PathBuf {
    PathBuf::from("data/accounts.json")
}

fn default_carrier_url() -> String {
    carrier::constants::DEFAULT_BASE_URL.to_string()
}

fn default_carrier_timeout() -> u64 {
    60
}

fn default_acquirer_timeout() -> u64 {
    130
}

fn default_refresh_interval() -> u64 {
    900
}

fn default_top_up_interval() -> u64 {
    300
}

fn default_balance_floor() -> f64 {
    500.0
}

fn default_top_up_min() -> u32 {
    10
}

fn default_top_up_max() -> u32 {
    500
}

fn default_label_concurrency() -> usize {
    4
}

fn default_session_concurrency() -> usize {
    2
}

fn default_retry_delay() -> u64 {
    30
}

fn default_max_connections() -> usize {
    64
}

fn default_explainer_model() -> String {
    "gpt-4o".to_string()
}

fn default_explainer_timeout() -> u64 {
    30
}

fn default_notifier_timeout() -> u64 {
    30
}

fn require_http_url(field: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}

fn require_non_zero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, validate it, then resolve secrets.
    ///
    /// Explainer API key resolution order:
    /// 1. EXPLAINER_API_KEY env var
    /// 2. api_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Some(explainer) = config.explainer.as_mut() {
            if let Ok(key) = std::env::var("EXPLAINER_API_KEY") {
                explainer.api_key = Some(Secret::new(key));
            } else if let Some(ref key_file) = explainer.api_key_file {
                let key = std::fs::read_to_string(key_file).map_err(|e| {
                    common::Error::Config(format!(
                        "failed to read api_key_file {}: {e}",
                        key_file.display()
                    ))
                })?;
                let key = key.trim().to_owned();
                if !key.is_empty() {
                    explainer.api_key = Some(Secret::new(key));
                }
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("carrier.base_url", &self.carrier.base_url)?;
        require_non_zero("carrier.timeout_secs", self.carrier.timeout_secs)?;
        require_http_url("acquirer.endpoint", &self.acquirer.endpoint)?;
        require_non_zero("acquirer.timeout_secs", self.acquirer.timeout_secs)?;

        let scheduler = &self.scheduler;
        require_non_zero("scheduler.refresh_interval_secs", scheduler.refresh_interval_secs)?;
        require_non_zero("scheduler.top_up_interval_secs", scheduler.top_up_interval_secs)?;
        if scheduler.balance_floor.is_nan() || scheduler.balance_floor < 0.0 {
            return Err(common::Error::Config(
                "scheduler.balance_floor must not be negative".into(),
            ));
        }
        if scheduler.top_up_min == 0 || scheduler.top_up_min > scheduler.top_up_max {
            return Err(common::Error::Config(format!(
                "scheduler top-up range is invalid: {}..={}",
                scheduler.top_up_min, scheduler.top_up_max
            )));
        }

        require_non_zero("queues.label_concurrency", self.queues.label_concurrency as u64)?;
        require_non_zero("queues.session_concurrency", self.queues.session_concurrency as u64)?;
        require_non_zero("admin.max_connections", self.admin.max_connections as u64)?;

        if let Some(explainer) = &self.explainer {
            require_http_url("explainer.base_url", &explainer.base_url)?;
            require_non_zero("explainer.timeout_secs", explainer.timeout_secs)?;
        }
        if let Some(notifier) = &self.notifier {
            require_http_url("notifier.webhook_url", &notifier.webhook_url)?;
            require_non_zero("notifier.timeout_secs", notifier.timeout_secs)?;
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("label-worker.toml")
    }
}
