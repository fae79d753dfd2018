//! `tracker-cli`: the process entry point wiring config, storage, the HTTP
//! client, the sync orchestrator, and the metrics reports together.

mod config_files;

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracker_http::{RateLimiter, TrackerHttpClient};
use tracker_model::{HierarchyConfig, TrackerConfig};
use tracker_storage::{GroupBy, PostgresStorage, PostgresStorageConfig, SqliteStorage, SqliteStorageConfig, TrackerStorage};
use tracker_sync::{SingleInstanceLock, SyncInput, SyncOrchestrator, RunOutcome};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_LOCK_CONTENTION: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "tracker-cli", about = "Issue-tracker sync and delivery-metrics engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Raise the default log level from info to debug.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Pull tasks matching a search filter and replay their status history.
    Sync {
        #[arg(long)]
        filter: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        skip_history: bool,
        #[arg(long)]
        force_full_history: bool,
    },
    /// Per-task delivery-metrics CSV.
    TtmDetails {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, value_enum, default_value = "team")]
        group_by: GroupByArg,
        /// Also write a `<output>.aggregate.csv` aggregated-by-quarter sidecar.
        #[arg(long)]
        aggregate: bool,
    },
    /// Per-root downstream return counts across a task's whole hierarchy.
    /// Requires an explicit root-queue selector, as `status-time` already
    /// does, rather than hardcode a queue name (see DESIGN.md).
    FullstackSubepicReturns {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        queue: String,
        #[arg(long)]
        start_date: Option<NaiveDate>,
    },
    /// Per-task cumulative time-in-status CSV.
    StatusTime {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        queue: String,
        #[arg(long)]
        created_since: Option<NaiveDate>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupByArg {
    Author,
    Team,
}

impl From<GroupByArg> for GroupBy {
    fn from(value: GroupByArg) -> Self {
        match value {
            GroupByArg::Author => GroupBy::Author,
            GroupByArg::Team => GroupBy::Team,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            EXIT_FAILED
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = TrackerConfig::from_env()?;

    match cli.command {
        Command::Sync {
            filter,
            limit,
            skip_history,
            force_full_history,
        } => run_sync(&config, filter, limit, skip_history, force_full_history).await,
        Command::TtmDetails {
            output,
            as_of,
            group_by,
            aggregate,
        } => run_ttm_details(&config, output, as_of, group_by.into(), aggregate).await,
        Command::FullstackSubepicReturns {
            output,
            queue,
            start_date,
        } => run_subepic_returns(&config, output, queue, start_date).await,
        Command::StatusTime {
            output,
            queue,
            created_since,
        } => run_status_time(&config, output, queue, created_since).await,
    }
}

async fn open_storage(config: &TrackerConfig) -> anyhow::Result<Box<dyn TrackerStorage>> {
    if config.database_url.starts_with("postgres://") || config.database_url.starts_with("postgresql://") {
        let storage = PostgresStorage::connect(PostgresStorageConfig {
            database_url: config.database_url.clone(),
            ..Default::default()
        })
        .await?;
        Ok(Box::new(storage))
    } else {
        let database_path = config
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| config.database_url.strip_prefix("sqlite:"))
            .unwrap_or(&config.database_url);
        let storage = SqliteStorage::connect(SqliteStorageConfig {
            database_path: database_path.into(),
            ..Default::default()
        })
        .await?;
        Ok(Box::new(storage))
    }
}

fn build_client(config: &TrackerConfig) -> anyhow::Result<TrackerHttpClient> {
    let rate_limiter = RateLimiter::new(config.request_delay);
    Ok(TrackerHttpClient::new(
        &config.api_base_url,
        &config.api_token,
        &config.org_id,
        config.scroll_page_size,
        rate_limiter,
    )?)
}

async fn run_sync(
    config: &TrackerConfig,
    filter: String,
    limit: Option<usize>,
    skip_history: bool,
    force_full_history: bool,
) -> anyhow::Result<i32> {
    let lock = SingleInstanceLock::try_acquire(&config.lock_path)?;
    let Some(_lock) = lock else {
        error!(path = %config.lock_path.display(), "another sync instance already holds the lock");
        return Ok(EXIT_LOCK_CONTENTION);
    };

    let client = build_client(config)?;
    let storage = open_storage(config).await?;
    let orchestrator = SyncOrchestrator::new(&client, storage.as_ref(), config.max_workers);

    let result = orchestrator
        .run(SyncInput {
            filter,
            limit,
            skip_history,
            force_full_history,
        })
        .await?;

    info!(
        run_id = %result.run_id,
        tasks_processed = result.counters.tasks_processed,
        tasks_created = result.counters.tasks_created,
        tasks_updated = result.counters.tasks_updated,
        history_entries_processed = result.counters.history_entries_processed,
        errors_count = result.counters.errors_count,
        "sync run finished"
    );

    Ok(match result.outcome {
        RunOutcome::Completed => EXIT_SUCCESS,
        RunOutcome::Cancelled => EXIT_CANCELLED,
        RunOutcome::Failed(reason) => {
            error!(reason = %reason, "sync run failed");
            EXIT_FAILED
        }
    })
}

async fn run_ttm_details(
    config: &TrackerConfig,
    output: PathBuf,
    as_of: Option<NaiveDate>,
    group_by: GroupBy,
    aggregate: bool,
) -> anyhow::Result<i32> {
    let quarters = config_files::load_quarters(&config.quarters_file)?;
    let mapping = config_files::load_status_mapping(&config.status_mapping_file)?;
    let storage = open_storage(config).await?;
    let hierarchy = HierarchyConfig::from_env()?;

    let (start, end) = quarter_bounds(&quarters)?;
    let as_of_dt = as_of.map(|d| d.and_hms_opt(23, 59, 59).unwrap().and_utc());

    let details = tracker_metrics::collect_ttm_details(
        storage.as_ref(),
        start,
        end,
        &mapping,
        &quarters,
        &hierarchy,
        group_by,
        config.min_status_duration,
        as_of_dt,
    )
    .await?;

    let rows: Vec<tracker_metrics::DetailRow> = details.into_iter().map(Into::into).collect();
    write_report(&output, &rows)?;

    if aggregate {
        let aggregate_rows = tracker_metrics::aggregate_by_quarter(&rows);
        let aggregate_path = output.with_extension("aggregate.csv");
        write_report(&aggregate_path, &aggregate_rows)?;
    }

    info!(count = rows.len(), path = %output.display(), "wrote ttm-details report");
    Ok(EXIT_SUCCESS)
}

async fn run_subepic_returns(
    config: &TrackerConfig,
    output: PathBuf,
    queue: String,
    start_date: Option<NaiveDate>,
) -> anyhow::Result<i32> {
    let mapping = config_files::load_status_mapping(&config.status_mapping_file)?;
    let storage = open_storage(config).await?;
    let hierarchy = HierarchyConfig::from_env()?;

    let returns = tracker_metrics::collect_subepic_returns(
        storage.as_ref(),
        &queue,
        start_date,
        &mapping,
        &hierarchy,
        config.min_status_duration,
    )
    .await?;

    let rows: Vec<tracker_metrics::SubepicReturnRow> = returns.into_iter().map(Into::into).collect();
    write_report(&output, &rows)?;

    info!(count = rows.len(), path = %output.display(), "wrote fullstack-subepic-returns report");
    Ok(EXIT_SUCCESS)
}

async fn run_status_time(
    config: &TrackerConfig,
    output: PathBuf,
    queue: String,
    created_since: Option<NaiveDate>,
) -> anyhow::Result<i32> {
    let storage = open_storage(config).await?;

    let rows = tracker_metrics::collect_status_time(storage.as_ref(), &queue, created_since, Utc::now()).await?;
    let rows: Vec<tracker_metrics::StatusTimeCsvRow> = rows.into_iter().map(Into::into).collect();
    write_report(&output, &rows)?;

    info!(count = rows.len(), path = %output.display(), "wrote status-time report");
    Ok(EXIT_SUCCESS)
}

fn quarter_bounds(quarters: &tracker_model::QuarterSet) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let start = quarters.iter().map(|q| q.start_date).min();
    let end = quarters.iter().map(|q| q.end_date).max();
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => anyhow::bail!("quarters file defines no quarters"),
    }
}

fn write_report<T: serde::Serialize>(path: &std::path::Path, rows: &[T]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracker_metrics::write_csv(path, rows)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_model::QuarterConfig;

    fn q(name: &str, s: (i32, u32, u32), e: (i32, u32, u32)) -> QuarterConfig {
        QuarterConfig {
            name: name.into(),
            start_date: NaiveDate::from_ymd_opt(s.0, s.1, s.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(e.0, e.1, e.2).unwrap(),
        }
    }

    #[test]
    fn quarter_bounds_spans_min_start_to_max_end() {
        let quarters = tracker_model::QuarterSet::new(vec![
            q("Q1", (2026, 1, 1), (2026, 3, 31)),
            q("Q2", (2026, 4, 1), (2026, 6, 30)),
        ])
        .unwrap();

        let (start, end) = quarter_bounds(&quarters).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());
    }

    #[test]
    fn quarter_bounds_errors_on_empty_set() {
        let quarters = tracker_model::QuarterSet::default();
        assert!(quarter_bounds(&quarters).is_err());
    }

    #[test]
    fn group_by_arg_maps_onto_storage_group_by() {
        assert!(matches!(GroupBy::from(GroupByArg::Author), GroupBy::Author));
        assert!(matches!(GroupBy::from(GroupByArg::Team), GroupBy::Team));
    }
}
