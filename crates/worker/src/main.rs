use anyhow::Context;
use clap::{Parser, Subcommand};
use stockprice_core::pricing::GroupingStrategy;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod inspect;

#[derive(Debug, Parser)]
#[command(name = "stockprice_worker")]
struct Args {
    /// Latest-batch grouping: batch-id, timestamp or latest-per-unit. Overrides PRICE_GROUPING.
    #[arg(long, global = true)]
    grouping: Option<GroupingStrategy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve prices from a JSON document `{ "stocks": [...], "units": [...] }`.
    Resolve {
        /// Input file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        input: String,
    },

    /// Show stock batches and resolved latest prices for a product at an outlet.
    Inspect {
        #[arg(long)]
        product_id: String,
        #[arg(long)]
        outlet_id: String,
    },

    /// Write latest price snapshots onto delivery history rows.
    Backfill {
        /// Do everything except writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Only rows without a latest price yet.
        #[arg(long)]
        only_missing: bool,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        product_id: Option<String>,
    },

    /// Row counts of the tables the backfill touches.
    Counts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockprice_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let grouping = args.grouping.unwrap_or(settings.grouping);

    let result = run(args.command, grouping, &settings).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        let error = format!("{err:#}");
        tracing::error!(%error, "worker run failed");
    }
    result
}

async fn run(
    command: Command,
    grouping: GroupingStrategy,
    settings: &stockprice_core::config::Settings,
) -> anyhow::Result<()> {
    match command {
        Command::Resolve { input } => inspect::resolve_file(&input, grouping),
        Command::Inspect {
            product_id,
            outlet_id,
        } => {
            let pool = connect(settings).await?;
            inspect::inspect_product(&pool, &product_id, &outlet_id, grouping).await
        }
        Command::Backfill {
            dry_run,
            only_missing,
            limit,
            product_id,
        } => {
            if let Some(limit) = limit {
                anyhow::ensure!(limit >= 1, "--limit must be >= 1 (got {limit})");
            }
            let pool = connect(settings).await?;
            let opts = stockprice_core::backfill::BackfillOptions {
                grouping,
                dry_run,
                filter: stockprice_core::catalog::PendingFilter {
                    only_missing,
                    product_id,
                    limit,
                },
            };
            backfill(&pool, &opts).await
        }
        Command::Counts => {
            let pool = connect(settings).await?;
            for c in stockprice_core::storage::counts::table_counts(&pool).await? {
                match c.rows {
                    Some(rows) => tracing::info!(table = c.table, rows, "row count"),
                    None => tracing::warn!(table = c.table, "table missing"),
                }
            }
            Ok(())
        }
    }
}

async fn connect(settings: &stockprice_core::config::Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    stockprice_core::storage::connect(db_url, settings.db_max_connections).await
}

async fn backfill(
    pool: &sqlx::PgPool,
    opts: &stockprice_core::backfill::BackfillOptions,
) -> anyhow::Result<()> {
    // Hold the advisory lock on one dedicated session for the whole run.
    let mut lock_conn = pool.acquire().await.context("acquire lock connection failed")?;
    let acquired = stockprice_core::storage::lock::try_acquire_backfill_lock(&mut *lock_conn).await?;
    if !acquired {
        tracing::warn!("backfill lock not acquired; another run in progress");
        return Ok(());
    }

    let catalog = stockprice_core::storage::PgCatalog::new(pool.clone());
    let result = stockprice_core::backfill::run_backfill(&catalog, &catalog, opts).await;

    let _ = stockprice_core::storage::lock::release_backfill_lock(&mut *lock_conn).await;

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    anyhow::ensure!(report.failed == 0, "{} delivery history rows failed", report.failed);
    Ok(())
}

fn init_sentry(settings: &stockprice_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
