//! Pipeline orchestrator: ties catalog → collector → store → export together.
//!
//! ## Run modes
//!
//! `crawl()`: full crawl
//!   1. Load the symbol catalog and apply the selection filter
//!   2. For each symbol in order: load baseline → fetch → merge → store
//!      (symbols stored as empty are fetched again unless `skip_empty` is set)
//!   3. Export the aggregate CSV
//!   Symbols are processed one at a time; a failing symbol never stops the run.
//!
//! `update()`: update only
//!   1. Enumerate stored records (sentinels are terminal and left alone)
//!   2. Rescore each from its stored raw fields and write it back
//!   3. Export the aggregate CSV
//!
//! A stop request is honoured between symbols; the export still runs.

use crate::collector::{FetchOutcome, MetricsSource};
use crate::config::AppConfig;
use crate::export::export_csv;
use crate::loader::{load_catalog, select_by};
use crate::models::{PersistedRecord, StockRecord, SymbolRef};
use crate::storage::{RecordStore, merge, rescore};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Which pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    FullCrawl,
    UpdateOnly,
}

pub struct Pipeline {
    config: AppConfig,
    store: RecordStore,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = RecordStore::open(&config.storage.results_dir)
            .with_context(|| format!("Failed to open results dir {:?}", config.storage.results_dir))?;
        Ok(Self {
            config,
            store,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the run before the next symbol once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run one mode. Only a full crawl needs a metrics source.
    pub async fn run(&self, mode: RunMode, source: Option<&dyn MetricsSource>) -> Result<PipelineStats> {
        match mode {
            RunMode::FullCrawl => {
                let source = source.context("Full crawl needs a metrics source")?;
                self.crawl(source).await
            }
            RunMode::UpdateOnly => self.update(),
        }
    }

    pub async fn crawl(&self, source: &dyn MetricsSource) -> Result<PipelineStats> {
        let symbols = load_catalog(
            &self.config.catalog.path,
            self.config.catalog.format,
            &self.config.selection,
        )
        .context("Symbol catalog unavailable")?;

        info!("=== Crawling {} symbols ===", symbols.len());
        let mut stats = PipelineStats {
            selected: symbols.len(),
            ..Default::default()
        };

        for (i, symbol) in symbols.iter().enumerate() {
            if self.stop_requested() {
                warn!("Stop requested, {} symbols left (resume from {})", symbols.len() - i, symbol.symbol);
                break;
            }
            self.crawl_one(symbol, source, &mut stats).await;
        }

        self.finish(stats)
    }

    async fn crawl_one(&self, symbol: &SymbolRef, source: &dyn MetricsSource, stats: &mut PipelineStats) {
        let key = symbol.key();
        let baseline = self.store.get(&key);

        if baseline.as_ref().is_some_and(PersistedRecord::is_empty) && self.config.pipeline.skip_empty {
            debug!("{}: empty sentinel, skipping", key);
            stats.skipped += 1;
            return;
        }

        let outcome = source.fetch(symbol).await;
        match &outcome {
            FetchOutcome::Found(_) => {
                info!("{}: collected", key);
                stats.collected += 1;
            }
            FetchOutcome::Miss(reason) => {
                info!("{}: miss ({})", key, reason);
                stats.misses += 1;
            }
            FetchOutcome::Failed(reason) => {
                warn!("{}: failed ({}), keeping stored data", key, reason);
                stats.failures += 1;
            }
        }

        let merged = merge(symbol, baseline, outcome);
        if merged.is_empty() {
            stats.sentinels += 1;
        }
        if let Err(e) = self.store.put(&key, &merged) {
            error!("{}: write failed: {}", key, e);
            stats.errors += 1;
        }
    }

    pub fn update(&self) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();
        let mut records: Vec<(SymbolRef, String, StockRecord)> = Vec::new();

        for key in self.store.keys().context("Failed to list stored records")? {
            match self.store.get(&key) {
                None => stats.errors += 1,
                Some(PersistedRecord::Empty) => stats.skipped += 1,
                Some(PersistedRecord::Stock(record)) => match record.stock.clone() {
                    Some(symbol) => records.push((symbol, key, *record)),
                    None => {
                        warn!("{}: record has no symbol, skipping", key);
                        stats.skipped += 1;
                    }
                },
            }
        }

        let records = select_by(records, &self.config.selection, |(s, _, _)| s);
        info!("=== Rescoring {} stored records ===", records.len());
        stats.selected = records.len();

        let total = records.len();
        for (i, (_, key, record)) in records.into_iter().enumerate() {
            if self.stop_requested() {
                warn!("Stop requested, {} records left", total - i);
                break;
            }
            let rescored = PersistedRecord::Stock(Box::new(rescore(record)));
            match self.store.put(&key, &rescored) {
                Ok(()) => stats.rescored += 1,
                Err(e) => {
                    error!("{}: write failed: {}", key, e);
                    stats.errors += 1;
                }
            }
        }

        self.finish(stats)
    }

    pub fn export(&self) -> Result<usize> {
        let path = self.config.export_path();
        export_csv(&self.store, &path).with_context(|| format!("Export to {:?} failed", path))
    }

    fn finish(&self, mut stats: PipelineStats) -> Result<PipelineStats> {
        stats.exported = self.export()?;
        info!(
            "=== Done: {} selected | {} collected | {} misses | {} failures | {} skipped | {} rescored | {} errors | {} exported ===",
            stats.selected,
            stats.collected,
            stats.misses,
            stats.failures,
            stats.skipped,
            stats.rescored,
            stats.errors,
            stats.exported,
        );
        Ok(stats)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub selected: usize,
    pub collected: usize,
    pub misses: usize,
    pub failures: usize,
    pub sentinels: usize,
    pub skipped: usize,
    pub rescored: usize,
    pub errors: usize,
    pub exported: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionConfig;
    use crate::models::RawFinancialRecord;
    use crate::scoring;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    /// In-memory source keyed by store key; unknown symbols miss.
    #[derive(Default)]
    struct FakeSource {
        outcomes: HashMap<String, FetchOutcome>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn with(mut self, key: &str, outcome: FetchOutcome) -> Self {
            self.outcomes.insert(key.to_string(), outcome);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricsSource for FakeSource {
        async fn fetch(&self, symbol: &SymbolRef) -> FetchOutcome {
            let key = symbol.key();
            self.calls.lock().unwrap().push(key.clone());
            self.outcomes
                .get(&key)
                .cloned()
                .unwrap_or_else(|| FetchOutcome::Miss("unknown".into()))
        }
    }

    fn raw(roic: &[f64]) -> RawFinancialRecord {
        RawFinancialRecord {
            roic_history: roic.to_vec(),
            pbv: Some(2.5),
            ratio_available: true,
            ..Default::default()
        }
    }

    fn config(root: &Path) -> AppConfig {
        let catalog = root.join("catalog.csv");
        std::fs::write(
            &catalog,
            "c;v;market\nAlpha;A;XPAR\nBeta;B;XPAR\nGamma;C;XAMS\nDelta;D;XAMS\n",
        )
        .unwrap();
        let mut cfg = AppConfig::default();
        cfg.catalog.path = catalog;
        cfg.storage.results_dir = root.join("results");
        cfg
    }

    fn stored(p: &Pipeline, key: &str) -> Option<PersistedRecord> {
        p.store().get(key)
    }

    #[test]
    fn test_full_crawl_merges_each_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();

        // C has good data from an earlier run; D was found empty before and is asked again.
        let gamma = SymbolRef::new("Gamma", "C", "XAMS");
        let baseline = merge(&gamma, None, FetchOutcome::Found(raw(&[10.0, 12.0])));
        pipeline.store().put("xams_c", &baseline).unwrap();
        pipeline.store().put("xams_d", &PersistedRecord::Empty).unwrap();

        let source = FakeSource::default()
            .with("xpar_a", FetchOutcome::Found(raw(&[5.0, 8.0, 12.0, 20.0])))
            .with("xpar_b", FetchOutcome::Miss("out of region".into()))
            .with("xams_c", FetchOutcome::Failed("timeout".into()));

        let stats = tokio_test::block_on(pipeline.crawl(&source)).unwrap();

        assert_eq!(source.calls(), ["xpar_a", "xpar_b", "xams_c", "xams_d"]);
        assert_eq!(
            stats,
            PipelineStats {
                selected: 4,
                collected: 1,
                misses: 2,
                failures: 1,
                sentinels: 2,
                exported: 2,
                ..Default::default()
            }
        );

        let a = stored(&pipeline, "xpar_a").unwrap();
        let a = a.as_stock().unwrap();
        assert_eq!(a.scores.unwrap().roic_history_great, 1.0);
        assert_eq!(a.stock.as_ref().unwrap().name, "Alpha");

        assert_eq!(stored(&pipeline, "xpar_b"), Some(PersistedRecord::Empty));
        assert_eq!(stored(&pipeline, "xams_c"), Some(baseline));
        assert_eq!(stored(&pipeline, "xams_d"), Some(PersistedRecord::Empty));
        assert!(dir.path().join("results/_results.csv").exists());
    }

    #[test]
    fn test_failure_without_baseline_is_retried_next_crawl() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.selection = SelectionConfig { symbol: Some("D".into()), ..Default::default() };
        let pipeline = Pipeline::new(cfg).unwrap();

        let flaky = FakeSource::default().with("xams_d", FetchOutcome::Failed("timeout".into()));
        let first = tokio_test::block_on(pipeline.crawl(&flaky)).unwrap();
        assert_eq!((first.failures, first.sentinels), (1, 1));
        assert_eq!(stored(&pipeline, "xams_d"), Some(PersistedRecord::Empty));

        let healthy = FakeSource::default().with("xams_d", FetchOutcome::Found(raw(&[1.0])));
        let second = tokio_test::block_on(pipeline.run(RunMode::FullCrawl, Some(&healthy as &dyn MetricsSource))).unwrap();

        assert_eq!(healthy.calls(), ["xams_d"]);
        assert_eq!((second.collected, second.skipped), (1, 0));
        assert!(!stored(&pipeline, "xams_d").unwrap().is_empty());
        assert_eq!(second.exported, 1);
    }

    #[test]
    fn test_skip_empty_leaves_sentinels_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.pipeline.skip_empty = true;
        cfg.selection = SelectionConfig { market: Some("XAMS".into()), ..Default::default() };
        let pipeline = Pipeline::new(cfg).unwrap();
        pipeline.store().put("xams_d", &PersistedRecord::Empty).unwrap();

        let source = FakeSource::default()
            .with("xams_c", FetchOutcome::Found(raw(&[1.0])))
            .with("xams_d", FetchOutcome::Found(raw(&[1.0])));
        let stats = tokio_test::block_on(pipeline.crawl(&source)).unwrap();

        assert_eq!(source.calls(), ["xams_c"]);
        assert_eq!((stats.collected, stats.skipped), (1, 1));
        assert_eq!(stored(&pipeline, "xams_d"), Some(PersistedRecord::Empty));
    }

    #[test]
    fn test_malformed_record_is_overwritten_by_fresh_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.selection = SelectionConfig { symbol: Some("A".into()), ..Default::default() };
        let pipeline = Pipeline::new(cfg).unwrap();
        std::fs::write(dir.path().join("results/xpar_a.json"), "{\"roicHistory\": [1.0,").unwrap();

        let source = FakeSource::default().with("xpar_a", FetchOutcome::Found(raw(&[5.0, 8.0, 12.0, 20.0])));
        let stats = tokio_test::block_on(pipeline.crawl(&source)).unwrap();

        assert_eq!((stats.collected, stats.errors, stats.exported), (1, 0, 1));
        let a = stored(&pipeline, "xpar_a").unwrap();
        let a = a.as_stock().unwrap();
        assert_eq!(a.raw.roic_history, vec![5.0, 8.0, 12.0, 20.0]);
        assert!(a.scores.is_some());
    }

    #[test]
    fn test_failed_write_is_counted_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.selection = SelectionConfig { market: Some("XPAR".into()), ..Default::default() };
        let pipeline = Pipeline::new(cfg).unwrap();
        // a directory where xpar_a's record belongs makes its write fail
        std::fs::create_dir(dir.path().join("results/xpar_a.json")).unwrap();

        let source = FakeSource::default()
            .with("xpar_a", FetchOutcome::Found(raw(&[1.0, 2.0])))
            .with("xpar_b", FetchOutcome::Found(raw(&[3.0, 4.0])));
        let stats = tokio_test::block_on(pipeline.crawl(&source)).unwrap();

        assert_eq!(source.calls(), ["xpar_a", "xpar_b"]);
        assert_eq!(
            stats,
            PipelineStats {
                selected: 2,
                collected: 2,
                errors: 1,
                exported: 1,
                ..Default::default()
            }
        );
        assert!(stored(&pipeline, "xpar_b").unwrap().as_stock().is_some());
    }

    #[test]
    fn test_missing_catalog_aborts_before_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.catalog.path = dir.path().join("nope.csv");
        let pipeline = Pipeline::new(cfg).unwrap();

        let source = FakeSource::default();
        assert!(tokio_test::block_on(pipeline.crawl(&source)).is_err());
        assert!(source.calls().is_empty());
        assert!(!dir.path().join("results/_results.csv").exists());
    }

    #[test]
    fn test_directory_catalog_aborts_before_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.catalog.path = dir.path().to_path_buf();
        let pipeline = Pipeline::new(cfg).unwrap();

        let source = FakeSource::default();
        assert!(tokio_test::block_on(pipeline.crawl(&source)).is_err());
        assert!(source.calls().is_empty());
        assert!(!dir.path().join("results/_results.csv").exists());
    }

    #[test]
    fn test_stop_before_first_symbol_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        pipeline.stop_handle().store(true, Ordering::Relaxed);

        let source = FakeSource::default();
        let stats = tokio_test::block_on(pipeline.crawl(&source)).unwrap();

        assert!(source.calls().is_empty());
        assert_eq!(stats.exported, 0);
        assert!(dir.path().join("results/_results.csv").exists());
    }

    #[test]
    fn test_update_rescores_and_leaves_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();

        let alpha = SymbolRef::new("Alpha", "A", "XPAR");
        let mut unscored = merge(&alpha, None, FetchOutcome::Found(raw(&[5.0, 20.0])))
            .as_stock()
            .unwrap()
            .clone();
        unscored.scores = None;
        pipeline
            .store()
            .put("xpar_a", &PersistedRecord::Stock(Box::new(unscored.clone())))
            .unwrap();
        pipeline.store().put("xpar_b", &PersistedRecord::Empty).unwrap();
        std::fs::write(dir.path().join("results/xpar_bad.json"), "not json").unwrap();

        let stats = tokio_test::block_on(pipeline.run(RunMode::UpdateOnly, None)).unwrap();

        assert_eq!(stats.rescored, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.exported, 1);

        let a = stored(&pipeline, "xpar_a").unwrap();
        let a = a.as_stock().unwrap();
        assert_eq!(a.raw, unscored.raw);
        assert_eq!(a.scores, Some(scoring::score(&unscored.raw)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("results/xpar_b.json")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_update_honours_market_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.selection = SelectionConfig { market: Some("XAMS".into()), ..Default::default() };
        let pipeline = Pipeline::new(cfg).unwrap();

        for s in [SymbolRef::new("Alpha", "A", "XPAR"), SymbolRef::new("Gamma", "C", "XAMS")] {
            let record = merge(&s, None, FetchOutcome::Found(raw(&[1.0, 2.0])));
            pipeline.store().put(&s.key(), &record).unwrap();
        }

        let stats = pipeline.update().unwrap();
        assert_eq!(stats.selected, 1);
        assert_eq!(stats.rescored, 1);
        // export covers the whole store, not just the selection
        assert_eq!(stats.exported, 2);
    }
}
