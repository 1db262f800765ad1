//! Aggregate export: every scored record flattened into one CSV.

use crate::error::StoreError;
use crate::models::{SCORE_COLUMNS, ScoreBreakdown, StockRecord};
use crate::storage::{RecordStore, write_atomic};
use std::path::Path;
use tracing::{debug, info};

/// Identity columns, ahead of the score columns.
pub const SYMBOL_COLUMNS: [&str; 4] = ["name", "symbol", "market", "isin"];

/// Header row: symbol columns then every breakdown field in canonical order.
pub fn header() -> Vec<&'static str> {
    SYMBOL_COLUMNS.iter().chain(SCORE_COLUMNS.iter()).copied().collect()
}

/// One CSV row. Missing identity fields are blank and missing scores are 0.
pub fn row(record: &StockRecord) -> Vec<String> {
    let mut out = Vec::with_capacity(SYMBOL_COLUMNS.len() + SCORE_COLUMNS.len());
    match &record.stock {
        Some(s) => {
            out.push(s.name.clone());
            out.push(s.symbol.clone());
            out.push(s.market.clone());
            out.push(s.isin.clone().unwrap_or_default());
        }
        None => out.extend(std::iter::repeat_n(String::new(), SYMBOL_COLUMNS.len())),
    }
    let scores = record.scores.unwrap_or_default();
    out.extend(ScoreBreakdown::values(&scores).iter().map(|v| v.to_string()));
    out
}

/// Write the aggregate file, rows ordered by store key. Sentinels and
/// unreadable records are skipped. Returns the number of data rows.
pub fn export_csv(store: &RecordStore, out_path: &Path) -> Result<usize, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header())?;

    let mut rows = 0usize;
    for key in store.keys()? {
        let Some(record) = store.get(&key) else { continue };
        let Some(stock) = record.as_stock() else {
            debug!("{}: sentinel, not exported", key);
            continue;
        };
        writer.write_record(row(stock))?;
        rows += 1;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let dir = match out_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    write_atomic(dir, out_path, &bytes)?;

    info!("Exported {} rows to {:?}", rows, out_path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::FetchOutcome;
    use crate::models::{PersistedRecord, RawFinancialRecord, SymbolRef};
    use crate::storage::merge;

    fn stored(store: &RecordStore, symbol: &SymbolRef, raw: RawFinancialRecord) {
        let record = merge(symbol, None, FetchOutcome::Found(raw));
        store.put(&symbol.key(), &record).unwrap();
    }

    fn read_back(path: &Path) -> Vec<Vec<String>> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_header_order() {
        let h = header();
        assert_eq!(&h[..4], &SYMBOL_COLUMNS);
        assert_eq!(h[4], "roicHistoryPositive");
        assert_eq!(*h.last().unwrap(), "sweetSpotValue");
        assert_eq!(h.len(), 4 + SCORE_COLUMNS.len());
    }

    #[test]
    fn test_export_sorted_skips_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        stored(&store, &SymbolRef::new("Vinci", "DG", "XPAR"), RawFinancialRecord {
            pbv: Some(1.5),
            ..Default::default()
        });
        stored(&store, &SymbolRef::new("ASML", "ASML", "XAMS"), RawFinancialRecord {
            roic_history: vec![5.0, 8.0, 12.0, 20.0],
            ..Default::default()
        });
        store.put("xpar_zz", &PersistedRecord::Empty).unwrap();

        let out = dir.path().join("_results.csv");
        assert_eq!(export_csv(&store, &out).unwrap(), 2);

        let rows = read_back(&out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "ASML");
        assert_eq!(rows[1][1], "DG");

        let col = |name: &str| header().iter().position(|h| *h == name).unwrap();
        assert_eq!(rows[0][col("roicHistoryPositive")], "2");
        assert_eq!(rows[0][col("roicHistoryGreat")], "1");
        assert_eq!(rows[1][col("priceBookScore")], "2");
        assert_eq!(rows[1][col("valueRatiosTotal")], "2");
    }

    #[test]
    fn test_export_zero_fills_unscored_and_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("xetr_sap.json"),
            r#"{"stock":{"c":"SAP SE","v":"SAP","isin":"","market":"XETR"},"scores":{"totalScore":7.5}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("xetr_old.json"), r#"{"roeHistory":[1.0]}"#).unwrap();

        let out = dir.path().join("_results.csv");
        assert_eq!(export_csv(&store, &out).unwrap(), 2);

        let rows = read_back(&out);
        let total = header().iter().position(|h| *h == "totalScore").unwrap();
        let sweet = header().iter().position(|h| *h == "sweetSpotValue").unwrap();
        // xetr_old sorts first and has no stock or scores
        assert_eq!(rows[0][0], "");
        assert_eq!(rows[0][total], "0");
        assert_eq!(rows[1][0], "SAP SE");
        assert_eq!(rows[1][total], "7.5");
        assert_eq!(rows[1][sweet], "0");
    }
}
