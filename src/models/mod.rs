use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Symbol reference ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolRef {
    #[serde(alias = "c")]
    pub name: String,
    #[serde(alias = "v")]
    pub symbol: String,
    pub market: String,  // MIC, e.g. "XPAR", "XETR"
    #[serde(default)]
    pub isin: Option<String>,
}

impl SymbolRef {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            market: market.into(),
            isin: None,
        }
    }

    /// Store key: lower-cased `{market}_{symbol}`, path separators replaced
    /// by `-` so the key is always a plain file name.
    pub fn key(&self) -> String {
        let key = format!("{}_{}", self.market, self.symbol).to_lowercase();
        key.chars().map(|c| if is_path_unsafe(c) { '-' } else { c }).collect()
    }
}

/// Characters that cannot appear in a store key.
pub fn is_path_unsafe(c: char) -> bool {
    matches!(c, '/' | '\\' | ':') || c.is_control()
}

// ── Raw financial record ──────────────────────────────────────────────────────

/// Collected metrics. Every series is ordered oldest → newest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawFinancialRecord {
    #[serde(default)]
    pub net_margin_history: Vec<f64>,
    #[serde(default)]
    pub roe_history: Vec<f64>,
    #[serde(default)]
    pub roic_history: Vec<f64>,
    #[serde(default)]
    pub revenue_growth_history: Vec<f64>,
    #[serde(default)]
    pub book_value_history: Vec<f64>,
    #[serde(default)]
    pub current_ratio_history: Vec<f64>,
    #[serde(default)]
    pub cf_net_income_history: Vec<f64>,
    #[serde(default)]
    pub cf_share_history: Vec<f64>,

    #[serde(default)]
    pub ratio_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbv: Option<f64>,  // price / book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcf: Option<f64>,  // price / cash flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ps: Option<f64>,   // price / sales
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per: Option<f64>,  // price / earnings
}

impl RawFinancialRecord {
    /// True when neither a series point nor a valuation ratio was collected.
    pub fn is_blank(&self) -> bool {
        self.net_margin_history.is_empty()
            && self.roe_history.is_empty()
            && self.roic_history.is_empty()
            && self.revenue_growth_history.is_empty()
            && self.book_value_history.is_empty()
            && self.current_ratio_history.is_empty()
            && self.cf_net_income_history.is_empty()
            && self.cf_share_history.is_empty()
            && [self.pbv, self.pcf, self.ps, self.per].iter().all(Option::is_none)
    }
}

// ── Score breakdown ───────────────────────────────────────────────────────────

/// Number of individual sub-scores summed into `total_score`.
pub const SUB_SCORE_COUNT: usize = 21;

/// Export column order for the breakdown; also the zero-fill schema for
/// records written before a field existed.
pub const SCORE_COLUMNS: [&str; SUB_SCORE_COUNT + 6] = [
    "roicHistoryPositive",
    "netMarginHistoryPositive",
    "revenueGrowthHistoryPositive",
    "roeHistoryPositive",
    "fcfSharePositive",
    "fcfNetIncomeGood",
    "roeHistoryGood",
    "netMarginHistoryGreat",
    "roicHistoryGreat",
    "roeHistoryGreat",
    "fcfNetIncomeGreat",
    "revenueGrowthHistoryGreat",
    "roicHistoryIncrease",
    "netMarginHistoryIncrease",
    "bookValueHistoryIncrease",
    "roeHistoryIncrease",
    "fcfShareIncrease",
    "priceBookScore",
    "priceSalesScore",
    "priceCashFlowScore",
    "priceEarningsScore",
    "valueRatiosTotal",
    "baseProfitTotal",
    "greatProfitTotal",
    "totalScore",
    "profitabilityTotal",
    "sweetSpotValue",
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreBreakdown {
    // positive / good
    pub roic_history_positive: f64,
    pub net_margin_history_positive: f64,
    pub revenue_growth_history_positive: f64,
    pub roe_history_positive: f64,
    pub fcf_share_positive: f64,
    pub fcf_net_income_good: f64,
    pub roe_history_good: f64,

    // great
    pub net_margin_history_great: f64,
    pub roic_history_great: f64,
    pub roe_history_great: f64,
    pub fcf_net_income_great: f64,
    pub revenue_growth_history_great: f64,

    // increasing
    pub roic_history_increase: f64,
    pub net_margin_history_increase: f64,
    pub book_value_history_increase: f64,
    pub roe_history_increase: f64,
    pub fcf_share_increase: f64,

    // valuation
    pub price_book_score: f64,
    pub price_sales_score: f64,
    pub price_cash_flow_score: f64,
    pub price_earnings_score: f64,

    // composites
    pub value_ratios_total: f64,
    pub base_profit_total: f64,
    pub great_profit_total: f64,
    pub total_score: f64,
    pub profitability_total: f64,
    pub sweet_spot_value: f64,
}

impl ScoreBreakdown {
    /// The individual sub-scores, in `SCORE_COLUMNS` order.
    pub fn sub_scores(&self) -> [f64; SUB_SCORE_COUNT] {
        [
            self.roic_history_positive,
            self.net_margin_history_positive,
            self.revenue_growth_history_positive,
            self.roe_history_positive,
            self.fcf_share_positive,
            self.fcf_net_income_good,
            self.roe_history_good,
            self.net_margin_history_great,
            self.roic_history_great,
            self.roe_history_great,
            self.fcf_net_income_great,
            self.revenue_growth_history_great,
            self.roic_history_increase,
            self.net_margin_history_increase,
            self.book_value_history_increase,
            self.roe_history_increase,
            self.fcf_share_increase,
            self.price_book_score,
            self.price_sales_score,
            self.price_cash_flow_score,
            self.price_earnings_score,
        ]
    }

    /// Every field, in `SCORE_COLUMNS` order.
    pub fn values(&self) -> [f64; SCORE_COLUMNS.len()] {
        let mut out = [0.0; SCORE_COLUMNS.len()];
        out[..SUB_SCORE_COUNT].copy_from_slice(&self.sub_scores());
        out[SUB_SCORE_COUNT..].copy_from_slice(&[
            self.value_ratios_total,
            self.base_profit_total,
            self.great_profit_total,
            self.total_score,
            self.profitability_total,
            self.sweet_spot_value,
        ]);
        out
    }
}

// ── Persisted record ──────────────────────────────────────────────────────────

/// A stored, collected symbol: identity, raw metrics and derived scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<SymbolRef>,
    #[serde(flatten)]
    pub raw: RawFinancialRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

/// What the store holds for one key.
///
/// `Empty` is the on-disk `{}` sentinel: collection was attempted and
/// produced nothing usable. It is distinct from the key being absent.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedRecord {
    Empty,
    Stock(Box<StockRecord>),
}

impl PersistedRecord {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_stock(&self) -> Option<&StockRecord> {
        match self {
            Self::Empty => None,
            Self::Stock(r) => Some(r),
        }
    }
}

// ── Raw catalog rows ──────────────────────────────────────────────────────────

/// gurufocus export: `c;v;market`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGurufocusRow {
    #[serde(default)]
    pub c: Option<String>,
    #[serde(default)]
    pub v: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
}

/// Euronext listing export: `Company,Ticker,Exchange`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEuronextRow {
    #[serde(rename = "Company", default)]
    pub company: Option<String>,
    #[serde(rename = "Ticker", default)]
    pub ticker: Option<String>,
    #[serde(rename = "Exchange", default)]
    pub exchange: Option<String>,
}
