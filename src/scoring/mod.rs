//! Scoring engine: raw metrics → `ScoreBreakdown`.
//!
//! Three reducer families feed the breakdown:
//!   - threshold ratio: share of a series strictly above a threshold, scaled to a max
//!   - monotone increase: share of year-over-year steps that did not decrease
//!   - point-ratio transforms: piecewise-linear (or step) scores of current valuation ratios
//!
//! Every reducer returns 0 on empty or missing input, so composites are always
//! finite. All published values are rounded to one decimal.

use crate::models::{RawFinancialRecord, ScoreBreakdown};

// ── Thresholds ────────────────────────────────────────────────────────────────

const NET_MARGIN_GREAT: f64 = 7.0;
const ROIC_GREAT: f64 = 15.0;
const ROE_GREAT: f64 = 20.0;
const ROE_GOOD: f64 = 10.0;
const FCF_NET_INCOME_GOOD: f64 = 0.5;
const FCF_NET_INCOME_GREAT: f64 = 0.8;
const REVENUE_GROWTH_GREAT: f64 = 5.0;

// ── Reducers ──────────────────────────────────────────────────────────────────

/// Round half away from zero to one decimal.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// `max * share of points > threshold`, 0 for an empty series.
pub fn ratio_score(series: &[f64], threshold: f64, max: f64) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let above = series.iter().filter(|&&x| x > threshold).count();
    round1(max * above as f64 / series.len() as f64)
}

/// `max * share of steps with S[i] >= S[i-1]`, 0 below two points.
pub fn trend_score(series: &[f64], max: f64) -> f64 {
    if series.len() <= 1 {
        return 0.0;
    }
    let non_decreasing = series.windows(2).filter(|w| w[1] >= w[0]).count();
    round1(max * non_decreasing as f64 / (series.len() - 1) as f64)
}

/// Returns the ratio only when it is present, finite and strictly positive.
fn usable(ratio: Option<f64>) -> Option<f64> {
    ratio.filter(|r| r.is_finite() && *r > 0.0)
}

/// Linear decay from `2` at ratio 0 to `0` at `intercept / slope`.
fn linear_ratio_score(ratio: Option<f64>, slope: f64, intercept: f64) -> f64 {
    match usable(ratio) {
        Some(x) => round1((intercept - slope * x).max(0.0) * 2.0 / intercept),
        None => 0.0,
    }
}

/// P/B: 2 below 2.0, 1 below 3.0, else 0.
pub fn price_book_score(ratio: Option<f64>) -> f64 {
    match usable(ratio) {
        Some(x) if x < 2.0 => 2.0,
        Some(x) if x < 3.0 => 1.0,
        _ => 0.0,
    }
}

/// P/S: `max(0, -15x + 24) * 2/24`, zero from 1.6.
pub fn price_sales_score(ratio: Option<f64>) -> f64 {
    linear_ratio_score(ratio, 15.0, 24.0)
}

/// P/CF: `max(0, -0.7x + 25) * 2/25`, zero from ~35.7.
pub fn price_cash_flow_score(ratio: Option<f64>) -> f64 {
    linear_ratio_score(ratio, 0.7, 25.0)
}

/// P/E: `max(0, -0.5x + 14) * 2/14`, zero from 28.
pub fn price_earnings_score(ratio: Option<f64>) -> f64 {
    linear_ratio_score(ratio, 0.5, 14.0)
}

// ── Breakdown ─────────────────────────────────────────────────────────────────

/// Full breakdown for one record. Pure: equal input gives equal output.
pub fn score(raw: &RawFinancialRecord) -> ScoreBreakdown {
    let mut s = ScoreBreakdown {
        roic_history_positive: ratio_score(&raw.roic_history, 0.0, 2.0),
        net_margin_history_positive: ratio_score(&raw.net_margin_history, 0.0, 2.0),
        revenue_growth_history_positive: ratio_score(&raw.revenue_growth_history, 0.0, 2.0),
        roe_history_positive: ratio_score(&raw.roe_history, 0.0, 2.0),
        fcf_share_positive: ratio_score(&raw.cf_share_history, 0.0, 3.0),
        fcf_net_income_good: ratio_score(&raw.cf_net_income_history, FCF_NET_INCOME_GOOD, 2.0),
        roe_history_good: ratio_score(&raw.roe_history, ROE_GOOD, 2.0),

        net_margin_history_great: ratio_score(&raw.net_margin_history, NET_MARGIN_GREAT, 4.0),
        roic_history_great: ratio_score(&raw.roic_history, ROIC_GREAT, 4.0),
        // Historically scored against the ROIC series; kept for comparability
        // with published results.
        roe_history_great: ratio_score(&raw.roic_history, ROE_GREAT, 4.0),
        fcf_net_income_great: ratio_score(&raw.cf_net_income_history, FCF_NET_INCOME_GREAT, 4.0),
        revenue_growth_history_great: ratio_score(
            &raw.revenue_growth_history,
            REVENUE_GROWTH_GREAT,
            4.0,
        ),

        roic_history_increase: trend_score(&raw.roic_history, 2.0),
        net_margin_history_increase: trend_score(&raw.net_margin_history, 2.0),
        book_value_history_increase: trend_score(&raw.book_value_history, 3.0),
        roe_history_increase: trend_score(&raw.roe_history, 2.0),
        fcf_share_increase: trend_score(&raw.cf_share_history, 3.0),

        price_book_score: price_book_score(raw.pbv),
        price_sales_score: price_sales_score(raw.ps),
        price_cash_flow_score: price_cash_flow_score(raw.pcf),
        price_earnings_score: price_earnings_score(raw.per),

        ..Default::default()
    };

    s.value_ratios_total = round1(
        s.price_book_score + s.price_sales_score + s.price_cash_flow_score + s.price_earnings_score,
    );
    s.base_profit_total = round1(
        s.roic_history_positive
            + s.net_margin_history_positive
            + s.revenue_growth_history_positive
            + s.roe_history_positive
            + s.fcf_share_positive,
    );
    s.great_profit_total = round1(
        s.roe_history_great
            + s.roic_history_great
            + s.net_margin_history_great
            + s.fcf_net_income_great
            + s.revenue_growth_history_great
            + s.fcf_share_increase
            + s.book_value_history_increase,
    );
    s.total_score = round1(s.sub_scores().iter().sum());
    s.sweet_spot_value = round1(s.value_ratios_total + s.great_profit_total);
    s.profitability_total = round1(s.total_score - s.value_ratios_total);
    s
}
