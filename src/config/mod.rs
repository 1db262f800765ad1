use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub selection: SelectionConfig,
    pub storage: StorageConfig,
    pub collector: CollectorConfig,
    pub pipeline: PipelineConfig,
}

/// Reference dataset for the symbol universe
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub format: CatalogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    /// `c;v;market`
    #[default]
    Gurufocus,
    /// `Company,Ticker,Exchange`
    Euronext,
}

/// Symbol selection. At most one filter applies: symbol, then market, then resume_from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub symbol: Option<String>,
    pub market: Option<String>,
    pub resume_from: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    #[serde(default = "default_export_file")]
    pub export_file: String,
}

/// Collector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Empty means every currency is in scope.
    #[serde(default)]
    pub allowed_currencies: Vec<String>,
}

/// Path templates relative to `base_url`; `{market}` and `{ticker}` are substituted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub key_metrics: String,
    pub profitability: String,
    pub health: String,
    pub cash_flow: String,
    pub valuation: String,
}

/// Pipeline configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Leave symbols whose record is the empty sentinel out of a full crawl.
    pub skip_empty: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/gurufocus_de.csv")
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_export_file() -> String {
    "_results.csv".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:8080/stocks/".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_request_delay_ms() -> u64 {
    5000
}
fn default_jitter_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "qv-score/0.1 (research project; fundamentals scoring)".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            format: CatalogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            export_file: default_export_file(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: EndpointConfig::default(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
            allowed_currencies: Vec::new(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            key_metrics: "{market}/{ticker}/key-metrics-summary".to_string(),
            profitability: "{market}/{ticker}/profitability".to_string(),
            health: "{market}/{ticker}/financial-health".to_string(),
            cash_flow: "{market}/{ticker}/cash-flow".to_string(),
            valuation: "{market}/{ticker}/valuation".to_string(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("QVS").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize().context("Invalid configuration")
    }

    pub fn export_path(&self) -> PathBuf {
        self.storage.results_dir.join(&self.storage.export_file)
    }
}
