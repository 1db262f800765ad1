mod collector;
mod config;
mod error;
mod export;
mod loader;
mod models;
mod pipeline;
mod scoring;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::collector::{MetricsSource, MorningstarClient};
use crate::config::{AppConfig, CatalogFormat};
use crate::pipeline::{Pipeline, RunMode};

#[derive(Parser)]
#[command(name = "qv-score", about = "Quality/value scoring of equities from collected fundamentals", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Collect metrics for every catalog symbol, score, store and export
    Crawl {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Reference dataset (overrides catalog.path)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Reference dataset layout (overrides catalog.format)
        #[arg(long, value_enum)]
        format: Option<CatalogFormat>,

        /// Do not re-collect symbols previously found empty
        #[arg(long)]
        skip_empty: bool,
    },

    /// Rescore stored records without collecting, then export
    Update {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Write the aggregate CSV from stored records
    Export,

    /// Show record store statistics
    Stats,

    /// Print one stored record, e.g. `show xpar_ai`
    Show { key: String },
}

/// Selection filters; the first one given wins (symbol, market, resume-from).
#[derive(Args, Debug)]
struct SelectionArgs {
    /// Only this exact ticker
    #[arg(long)]
    symbol: Option<String>,

    /// Only this market code (MIC)
    #[arg(long)]
    market: Option<String>,

    /// Start at this ticker (case-insensitive), e.g. after an interrupted run
    #[arg(long)]
    resume_from: Option<String>,
}

impl SelectionArgs {
    /// CLI filters replace the configured selection when any is given.
    fn apply(self, config: &mut AppConfig) {
        if self.symbol.is_some() || self.market.is_some() || self.resume_from.is_some() {
            config.selection.symbol = self.symbol;
            config.selection.market = self.market;
            config.selection.resume_from = self.resume_from;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "quality_value_scorer=info,warn",
        1 => "quality_value_scorer=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Crawl { selection, catalog, format, skip_empty } => {
            let _t = utils::Timer::start("Full crawl");
            selection.apply(&mut config);
            if let Some(path) = catalog {
                config.catalog.path = path;
            }
            if let Some(format) = format {
                config.catalog.format = format;
            }
            config.pipeline.skip_empty |= skip_empty;

            let source = MorningstarClient::new(&config.collector)
                .context("Failed to build metrics collector")?;
            run(config, RunMode::FullCrawl, Some(&source as &dyn MetricsSource)).await?;
        }

        Command::Update { selection } => {
            let _t = utils::Timer::start("Update");
            selection.apply(&mut config);
            run(config, RunMode::UpdateOnly, None).await?;
        }

        Command::Export => {
            let _t = utils::Timer::start("Export");
            let rows = Pipeline::new(config)?.export()?;
            info!("Done: {} rows", rows);
        }

        Command::Stats => {
            let pipeline = Pipeline::new(config)?;
            let store = pipeline.store();
            let s = store.summarize()?;
            println!("─────────────────────────────────");
            println!("  qv-score: Record Store");
            println!("─────────────────────────────────");
            println!("  Directory  : {}", store.dir().display());
            println!("  Scored     : {}", utils::fmt_number(s.scored));
            println!("  Unscored   : {}", utils::fmt_number(s.unscored));
            println!("  Empty      : {}", utils::fmt_number(s.sentinels));
            println!("  Unreadable : {}", utils::fmt_number(s.unreadable));
            println!("─────────────────────────────────");
        }

        Command::Show { key } => {
            let pipeline = Pipeline::new(config)?;
            let key = key.to_lowercase();
            match pipeline.store().get(&key) {
                None => println!("No readable record for {}", key),
                Some(record) => match record.as_stock() {
                    None => println!("{}: empty (collection found nothing usable)", key),
                    Some(stock) => println!("{}", serde_json::to_string_pretty(stock)?),
                },
            }
        }
    }

    Ok(())
}

async fn run(config: AppConfig, mode: RunMode, source: Option<&dyn MetricsSource>) -> Result<()> {
    let pipeline = Pipeline::new(config)?;

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current symbol");
            stop.store(true, Ordering::Relaxed);
        }
    });

    let stats = pipeline.run(mode, source).await?;
    info!(
        "Done: {} collected, {} rescored, {} misses, {} failures, {} exported",
        stats.collected, stats.rescored, stats.misses, stats.failures, stats.exported
    );
    Ok(())
}
