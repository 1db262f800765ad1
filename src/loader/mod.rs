//! Symbol catalog loader: reference CSV → ordered `SymbolRef` list, plus the
//! selection filters shared by both run modes.

use crate::config::{CatalogFormat, SelectionConfig};
use crate::error::CatalogError;
use crate::models::{RawEuronextRow, RawGurufocusRow, SymbolRef};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load and filter the catalog. Failing to read the dataset is fatal.
pub fn load_catalog(
    path: &Path,
    format: CatalogFormat,
    selection: &SelectionConfig,
) -> Result<Vec<SymbolRef>, CatalogError> {
    let symbols = match format {
        CatalogFormat::Gurufocus => read_rows::<RawGurufocusRow>(path, b';')?
            .into_iter()
            .filter_map(gurufocus_row_to_symbol)
            .collect::<Vec<_>>(),
        CatalogFormat::Euronext => read_rows::<RawEuronextRow>(path, b',')?
            .into_iter()
            .filter_map(euronext_row_to_symbol)
            .collect::<Vec<_>>(),
    };

    info!("{:?}: {} symbols in catalog", path, symbols.len());
    Ok(apply_selection(symbols, selection))
}

fn read_rows<T: DeserializeOwned>(path: &Path, delimiter: u8) -> Result<Vec<T>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::Missing(path.to_path_buf()));
    }
    let unreadable = |source: csv::Error| CatalogError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    if !path.is_file() {
        let e = std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file");
        return Err(unreadable(e.into()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(unreadable)?;
    // Row errors are skipped below; a header that cannot be read is not.
    reader.headers().map_err(unreadable)?;

    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Row {} in {:?}: {}", i + 1, path, e),
        }
    }
    Ok(rows)
}

// ── Row → SymbolRef ───────────────────────────────────────────────────────────

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn gurufocus_row_to_symbol(row: RawGurufocusRow) -> Option<SymbolRef> {
    let (Some(symbol), Some(market)) = (non_empty(row.v), non_empty(row.market)) else {
        warn!("Skipping catalog row without ticker or market (name={:?})", row.c);
        return None;
    };
    Some(SymbolRef::new(row.c.unwrap_or_default().trim(), symbol, market))
}

pub fn euronext_row_to_symbol(row: RawEuronextRow) -> Option<SymbolRef> {
    let ticker = non_empty(row.ticker)?;
    let symbol = ticker.split('.').next().unwrap_or_default().to_string();
    if symbol.is_empty() {
        warn!("Skipping Euronext row with ticker {:?}", ticker);
        return None;
    }
    let mut market = market_from_exchange_name(row.exchange.as_deref().unwrap_or_default()).to_string();
    if market == "UNK" {
        if let Some((_, suffix)) = ticker.split_once('.') {
            market = market_from_symbol_suffix(suffix);
        }
    }
    Some(SymbolRef::new(
        row.company.unwrap_or_default().trim(),
        symbol,
        market,
    ))
}

/// Euronext venue name → MIC.
pub fn market_from_exchange_name(name: &str) -> &'static str {
    match name.trim() {
        "Euronext Paris" | "Euronext Growth Paris" | "Euronext Access Paris" => "XPAR",
        "Euronext Lisbon" => "XLIS",
        "Euronext Amsterdam" => "XAMS",
        "Euronext Brussels" => "XBRU",
        "Euronext Expand Oslo" | "Euronext Growth Oslo" | "Oslo Bors" => "XOSL",
        _ => "UNK",
    }
}

/// Yahoo-style ticker suffix (`AI.PA`) → MIC. Unknown suffixes pass through.
pub fn market_from_symbol_suffix(suffix: &str) -> String {
    match suffix {
        "PA" => "XPAR".to_string(),
        "BR" => "XBRU".to_string(),
        "LS" => "XLIS".to_string(),
        "AS" => "XAMS".to_string(),
        other => other.to_string(),
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Apply the first configured filter: exact symbol, market, then resume-from.
pub fn apply_selection(symbols: Vec<SymbolRef>, selection: &SelectionConfig) -> Vec<SymbolRef> {
    select_by(symbols, selection, |s| s)
}

/// `apply_selection` over any items that carry a `SymbolRef`.
pub fn select_by<T>(
    items: Vec<T>,
    selection: &SelectionConfig,
    symbol_of: impl Fn(&T) -> &SymbolRef,
) -> Vec<T> {
    if let Some(code) = selection.symbol.as_deref().filter(|s| !s.is_empty()) {
        let found: Vec<T> = items
            .into_iter()
            .filter(|t| symbol_of(t).symbol == code)
            .take(1)
            .collect();
        if found.is_empty() {
            warn!("Symbol {} not found", code);
        }
        return found;
    }

    if let Some(market) = selection.market.as_deref().filter(|s| !s.is_empty()) {
        let subset: Vec<T> = items
            .into_iter()
            .filter(|t| symbol_of(t).market.eq_ignore_ascii_case(market))
            .collect();
        debug!("Market {}: {} symbols", market, subset.len());
        return subset;
    }

    if let Some(start) = selection.resume_from.as_deref().filter(|s| !s.is_empty()) {
        return match items.iter().position(|t| symbol_of(t).symbol.eq_ignore_ascii_case(start)) {
            Some(idx) => {
                info!("Resuming at {} (index {})", start, idx);
                items.into_iter().skip(idx).collect()
            }
            None => {
                warn!("Resume symbol {} not found, keeping full list", start);
                items
            }
        };
    }

    items
}
