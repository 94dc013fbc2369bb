use crate::{
    commands::{Commands, SourceArgs},
    error::CliError,
    simulate::SimulatedSource,
};
use clap::Parser;
use futures_util::TryStreamExt;
use rowset::{PageFetcher, PagingConfig, PagingStatsSnapshot, RowSet, Value};
use serde::Serialize;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod simulate;

#[derive(Parser)]
#[command(name = "rowset", version = "0.1.0", about = "Paged result cursor driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Serialize)]
struct DrainReport {
    rows_expected: u64,
    rows_received: u64,
    distinct_rows: usize,
    rows_per_consumer: Vec<usize>,
    page_requests: u64,
    elapsed_ms: u128,
    stats: PagingStatsSnapshot,
}

#[derive(Debug, Serialize)]
struct PageSummary {
    index: usize,
    rows: usize,
    first_id: Option<i64>,
    last_id: Option<i64>,
    paging_state: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Logs go to stderr so reports on stdout stay parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Drain {
            source,
            consumers,
            output,
        } => {
            let report = drain(source, consumers).await?;
            output::emit(&report, output).await?;
        }
        Commands::Pages { source, output } => {
            let pages = walk_pages(source).await?;
            output::emit(&pages, output).await?;
        }
    }

    Ok(())
}

async fn load_config(path: Option<&str>) -> Result<PagingConfig, CliError> {
    let config = match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            serde_json::from_str(&raw)?
        }
        None => PagingConfig::default(),
    };
    Ok(config.from_env()?)
}

fn simulated_source(args: &SourceArgs) -> Result<SimulatedSource, CliError> {
    SimulatedSource::new(
        args.rows,
        args.page_size,
        Duration::from_millis(args.latency_ms),
    )
}

async fn drain(args: SourceArgs, consumers: usize) -> Result<DrainReport, CliError> {
    let config = load_config(args.config.as_deref()).await?;
    let source = Arc::new(simulated_source(&args)?);

    let rowset = source.execute(None)?.with_config(&config);
    rowset.bind_page_source(PageFetcher::new(source.clone(), &config)?)?;

    info!(
        rows = args.rows,
        page_size = args.page_size,
        consumers,
        auto_page = config.auto_page,
        "Draining simulated result"
    );

    let started = Instant::now();
    let tasks: Vec<_> = (0..consumers.max(1))
        .map(|_| tokio::spawn(consume(rowset.clone())))
        .collect();

    let mut rows_per_consumer = Vec::with_capacity(tasks.len());
    let mut seen = HashSet::new();
    for task in tasks {
        let ids = task.await??;
        rows_per_consumer.push(ids.len());
        seen.extend(ids);
    }
    let elapsed = started.elapsed();

    let report = DrainReport {
        rows_expected: args.rows,
        rows_received: rows_per_consumer.iter().sum::<usize>() as u64,
        distinct_rows: seen.len(),
        rows_per_consumer,
        page_requests: source.requests(),
        elapsed_ms: elapsed.as_millis(),
        stats: rowset.stats(),
    };
    info!(
        rows = report.rows_received,
        pages = report.stats.pages_fetched,
        joined = report.stats.joined_fetches,
        ?elapsed,
        "Drain finished"
    );
    Ok(report)
}

/// Take rows until the result ends, returning the ids seen.
async fn consume(rowset: RowSet) -> Result<Vec<i64>, CliError> {
    let ids = rowset
        .stream()
        .try_fold(Vec::new(), |mut ids, row| async move {
            ids.extend(row.get_value(0).as_i64());
            Ok(ids)
        })
        .await?;
    Ok(ids)
}

/// Page through the result by hand, re-running the query with each paging state.
async fn walk_pages(args: SourceArgs) -> Result<Vec<PageSummary>, CliError> {
    let config = load_config(args.config.as_deref()).await?.with_auto_page(false);
    let source = simulated_source(&args)?;

    let mut pages = Vec::new();
    let mut paging_state = None;
    loop {
        let rowset = source.execute(paging_state.take())?.with_config(&config);
        // Auto paging is off, so this never blocks on a fetch
        let rows = rowset.rows().collect::<Result<Vec<_>, _>>()?;
        let next = rowset.paging_state();

        pages.push(PageSummary {
            index: pages.len(),
            rows: rows.len(),
            first_id: rows.first().and_then(|r| r.get(0)).and_then(Value::as_i64),
            last_id: rows.last().and_then(|r| r.get(0)).and_then(Value::as_i64),
            paging_state: next.as_ref().map(|s| format!("{s:?}")),
        });

        match next {
            Some(state) => paging_state = Some(state),
            None => break,
        }
    }

    info!(pages = pages.len(), "Walked all pages");
    Ok(pages)
}
