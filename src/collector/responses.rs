//! JSON payloads served per section, and their reduction to a `RawFinancialRecord`.

use crate::models::RawFinancialRecord;
use serde::Deserialize;

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataList<T> {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub data_list: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetricsSummary {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub income_statement_list: DataList<IncomeStatementRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatementRow {
    pub fiscal_period_year_month: Option<String>,
    pub fiscal_period_date: Option<String>,
    pub revenue_growth_per: Option<f64>,
    pub net_income_margin_per: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitEfficiencyRow {
    pub fiscal_period_year: Option<String>,
    pub roe: Option<f64>,
    pub roic: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRow {
    pub fiscal_period_year_month: Option<String>,
    pub current_ratio: Option<f64>,
    pub book_value_per_share: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowRow {
    pub fiscal_period_year_month: Option<String>,
    pub fiscal_period_date: Option<String>,
    pub free_cash_flow_per_net_income: Option<f64>,
    pub free_cash_flow_per_share: Option<f64>,
}

/// Current valuation multiples.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub price_book: Option<f64>,
    pub price_sales: Option<f64>,
    pub price_earnings: Option<f64>,
    pub price_cash_flow: Option<f64>,
}

/// Everything fetched for one symbol.
#[derive(Debug, Clone, Default)]
pub struct Sections {
    pub key_metrics: KeyMetricsSummary,
    pub profitability: DataList<ProfitEfficiencyRow>,
    pub health: DataList<HealthRow>,
    pub cash_flow: DataList<CashFlowRow>,
    pub valuation: Valuation,
}

// ── Periods ───────────────────────────────────────────────────────────────────

trait Periodic {
    fn period(&self) -> Option<&str>;
}

impl Periodic for IncomeStatementRow {
    fn period(&self) -> Option<&str> {
        self.fiscal_period_year_month.as_deref().or(self.fiscal_period_date.as_deref())
    }
}

impl Periodic for ProfitEfficiencyRow {
    fn period(&self) -> Option<&str> {
        self.fiscal_period_year.as_deref()
    }
}

impl Periodic for HealthRow {
    fn period(&self) -> Option<&str> {
        self.fiscal_period_year_month.as_deref()
    }
}

impl Periodic for CashFlowRow {
    fn period(&self) -> Option<&str> {
        self.fiscal_period_year_month.as_deref().or(self.fiscal_period_date.as_deref())
    }
}

/// Dated periods start with a four-digit year; "TTM", "5-Yr" and the like do not.
fn is_dated(period: &str) -> bool {
    period.len() >= 4 && period.as_bytes()[..4].iter().all(u8::is_ascii_digit)
}

/// Oldest → newest values of one metric, skipping undated periods and gaps.
fn series<R: Periodic>(rows: &[R], pick: impl Fn(&R) -> Option<f64>) -> Vec<f64> {
    let mut points: Vec<(&str, f64)> = rows
        .iter()
        .filter_map(|r| {
            let period = r.period().filter(|p| is_dated(p))?;
            let value = pick(r).filter(|v| v.is_finite())?;
            Some((period, value))
        })
        .collect();
    points.sort_by(|a, b| a.0.cmp(b.0));
    points.into_iter().map(|(_, v)| v).collect()
}

// ── Sections → raw record ─────────────────────────────────────────────────────

impl Sections {
    pub fn currency(&self) -> Option<&str> {
        self.key_metrics
            .currency
            .as_deref()
            .or(self.key_metrics.income_statement_list.currency.as_deref())
    }

    pub fn into_raw(self) -> RawFinancialRecord {
        let income = &self.key_metrics.income_statement_list.data_list;
        let v = &self.valuation;

        RawFinancialRecord {
            net_margin_history: series(income, |r| r.net_income_margin_per),
            revenue_growth_history: series(income, |r| r.revenue_growth_per),
            roe_history: series(&self.profitability.data_list, |r| r.roe),
            roic_history: series(&self.profitability.data_list, |r| r.roic),
            current_ratio_history: series(&self.health.data_list, |r| r.current_ratio),
            book_value_history: series(&self.health.data_list, |r| r.book_value_per_share),
            cf_net_income_history: series(&self.cash_flow.data_list, |r| {
                r.free_cash_flow_per_net_income
            }),
            cf_share_history: series(&self.cash_flow.data_list, |r| r.free_cash_flow_per_share),
            ratio_available: [v.price_book, v.price_sales, v.price_earnings, v.price_cash_flow]
                .iter()
                .any(Option::is_some),
            pbv: v.price_book,
            pcf: v.price_cash_flow,
            ps: v.price_sales,
            per: v.price_earnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_income_series_sorted_and_cleaned() {
        let summary: KeyMetricsSummary = serde_json::from_str(
            r#"{
                "currency": "EUR",
                "incomeStatementList": {
                    "dataList": [
                        {"fiscalPeriodYearMonth": "2021-12", "revenueGrowthPer": 6.1, "netIncomeMarginPer": 9.0},
                        {"fiscalPeriodYearMonth": "TTM", "revenueGrowthPer": 3.0, "netIncomeMarginPer": 8.0},
                        {"fiscalPeriodYearMonth": "2019-12", "revenueGrowthPer": null, "netIncomeMarginPer": 7.5},
                        {"fiscalPeriodYearMonth": "2020-12", "revenueGrowthPer": -1.0, "netIncomeMarginPer": 6.0}
                    ]
                }
            }"#,
        )
        .unwrap();

        let sections = Sections { key_metrics: summary, ..Default::default() };
        assert_eq!(sections.currency(), Some("EUR"));

        let raw = sections.into_raw();
        assert_eq!(raw.net_margin_history, vec![7.5, 6.0, 9.0]);
        assert_eq!(raw.revenue_growth_history, vec![-1.0, 6.1]);
        assert!(!raw.ratio_available);
    }

    #[test]
    fn test_sections_map_to_fields() {
        let profitability: DataList<ProfitEfficiencyRow> = serde_json::from_str(
            r#"{"dataList": [
                {"fiscalPeriodYear": "2022", "roe": 14.0, "roic": 11.0},
                {"fiscalPeriodYear": "2021", "roe": 12.0, "roic": 9.5}
            ]}"#,
        )
        .unwrap();
        let cash_flow: DataList<CashFlowRow> = serde_json::from_str(
            r#"{"dataList": [
                {"fiscalPeriodDate": "2022-12-31", "freeCashFlowPerNetIncome": 0.9, "freeCashFlowPerShare": 2.1}
            ]}"#,
        )
        .unwrap();
        let valuation: Valuation =
            serde_json::from_str(r#"{"priceBook": 1.4, "priceEarnings": 12.0}"#).unwrap();

        let raw = Sections {
            profitability,
            cash_flow,
            valuation,
            ..Default::default()
        }
        .into_raw();

        assert_eq!(raw.roe_history, vec![12.0, 14.0]);
        assert_eq!(raw.roic_history, vec![9.5, 11.0]);
        assert_eq!(raw.cf_net_income_history, vec![0.9]);
        assert_eq!(raw.cf_share_history, vec![2.1]);
        assert!(raw.ratio_available);
        assert_eq!(raw.pbv, Some(1.4));
        assert_eq!(raw.ps, None);
        assert_eq!(raw.per, Some(12.0));
    }

    #[test]
    fn test_is_dated() {
        assert!(is_dated("2020"));
        assert!(is_dated("2020-12"));
        assert!(!is_dated("TTM"));
        assert!(!is_dated("5-Yr"));
    }
}
