pub mod http_client;
pub mod responses;

use crate::config::{CollectorConfig, EndpointConfig};
use crate::error::CollectorError;
use crate::models::{RawFinancialRecord, SymbolRef};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use self::http_client::HttpClient;
use self::responses::Sections;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Result of one collection attempt. Collectors never return errors: every
/// failure is folded into `Miss` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fresh metrics.
    Found(RawFinancialRecord),
    /// The symbol is out of scope or has no usable data.
    Miss(String),
    /// Transient trouble (timeout, rate limit, server error). Nothing new learned.
    Failed(String),
}

/// Swappable metrics source.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, symbol: &SymbolRef) -> FetchOutcome;
}

// ── Morningstar JSON gateway ──────────────────────────────────────────────────

pub struct MorningstarClient {
    client: HttpClient,
    base_url: Url,
    endpoints: EndpointConfig,
    allowed_currencies: Vec<String>,
}

impl MorningstarClient {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: Url::parse(&base).with_context(|| format!("Bad base_url {}", base))?,
            endpoints: config.endpoints.clone(),
            allowed_currencies: config.allowed_currencies.clone(),
        })
    }

    /// Expand a section template, e.g. `{market}/{ticker}/valuation` → `xpar/ai/valuation`.
    fn section_url(&self, template: &str, symbol: &SymbolRef) -> Result<Url, CollectorError> {
        let path = template
            .replace("{market}", &symbol.market.to_lowercase())
            .replace("{ticker}", &symbol.symbol.to_lowercase());
        Ok(self.base_url.join(&path)?)
    }

    async fn get<T: DeserializeOwned>(&self, template: &str, symbol: &SymbolRef) -> Result<T, CollectorError> {
        let url = self.section_url(template, symbol)?;
        self.client.get_json(url.as_str()).await
    }

    async fn fetch_sections(&self, symbol: &SymbolRef) -> Result<Sections, CollectorError> {
        let e = &self.endpoints;
        Ok(Sections {
            key_metrics: self.get(&e.key_metrics, symbol).await?,
            profitability: self.get(&e.profitability, symbol).await?,
            health: self.get(&e.health, symbol).await?,
            cash_flow: self.get(&e.cash_flow, symbol).await?,
            valuation: self.get(&e.valuation, symbol).await?,
        })
    }

    fn currency_in_scope(&self, currency: Option<&str>) -> bool {
        if self.allowed_currencies.is_empty() {
            return true;
        }
        currency.is_some_and(|c| self.allowed_currencies.iter().any(|a| a.eq_ignore_ascii_case(c)))
    }
}

#[async_trait]
impl MetricsSource for MorningstarClient {
    async fn fetch(&self, symbol: &SymbolRef) -> FetchOutcome {
        self.client.polite_delay().await;

        let sections = match self.fetch_sections(symbol).await {
            Ok(s) => s,
            Err(CollectorError::NotFound(url)) => {
                return FetchOutcome::Miss(format!("not listed ({})", url));
            }
            Err(e) => {
                warn!("{}: collection failed: {}", symbol.key(), e);
                return FetchOutcome::Failed(e.to_string());
            }
        };

        let currency = sections.currency().map(str::to_string);
        if !self.currency_in_scope(currency.as_deref()) {
            info!("{}: currency {:?} out of scope", symbol.key(), currency);
            return FetchOutcome::Miss(format!("currency {:?} out of scope", currency));
        }

        let raw = sections.into_raw();
        if raw.is_blank() {
            return FetchOutcome::Miss("no usable metrics".to_string());
        }

        debug!(
            "{}: {} ROIC points, {} margin points, ratios={}",
            symbol.key(),
            raw.roic_history.len(),
            raw.net_margin_history.len(),
            raw.ratio_available
        );
        FetchOutcome::Found(raw)
    }
}
