use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use xrate_client::ReqwestFetcher;
use xrate_core::currency::{self, PairGenerator};
use xrate_core::publish::RecordPublisher;
use xrate_core::queue::QueueTransport;
use xrate_core::worker::WorkerPool;
use xrate_core::{JobLifecycleManager, JobRecord, LifecyclePolicy, RateExtractor, WorkerConfig, XeCom};
use xrate_db::{Database, DatabaseConfig, PgQueueTransport};

#[derive(Parser)]
#[command(name = "xrate", version, about = "Currency exchange-rate extraction worker")]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Pool size (defaults to one connection per worker plus one, minimum 5)
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS")]
    db_max_connections: Option<u32>,

    /// Queue tube to work on
    #[arg(long, global = true, env = "XRATE_TUBE", default_value = "rates")]
    tube: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool until interrupted
    Work {
        /// Number of concurrent workers
        #[arg(short, long, env = "XRATE_WORKERS", default_value_t = 10)]
        workers: usize,

        /// Prefix for worker ids (random if omitted)
        #[arg(long, env = "XRATE_WORKER_ID")]
        worker_id: Option<String>,

        /// Failed attempts after which a job is buried
        #[arg(long, env = "XRATE_FAIL_LIMIT", default_value_t = 3)]
        fail_limit: u32,

        /// Successful attempts after which a job is deleted
        #[arg(long, env = "XRATE_SUCCESS_LIMIT", default_value_t = 10)]
        success_limit: u32,

        /// Requeue delay after a failed attempt, in seconds
        #[arg(long, env = "XRATE_FAILURE_DELAY_SECS", default_value_t = 3)]
        failure_delay_secs: u64,

        /// Requeue delay after a successful attempt, in seconds
        #[arg(long, env = "XRATE_SUCCESS_DELAY_SECS", default_value_t = 60)]
        success_delay_secs: u64,

        /// How long one reserve call waits for a job, in milliseconds
        #[arg(long, env = "XRATE_RESERVE_TIMEOUT_MS", default_value_t = 10)]
        reserve_timeout_ms: u64,

        /// Pause after an empty reserve, in milliseconds
        #[arg(long, env = "XRATE_IDLE_BACKOFF_MS", default_value_t = 0)]
        idle_backoff_ms: u64,

        /// Capacity of the channel between workers and the publisher
        #[arg(long, env = "XRATE_OUTPUT_BUFFER", default_value_t = 1000)]
        buffer: usize,

        /// HTTP timeout for one page fetch, in seconds
        #[arg(long, env = "XRATE_FETCH_TIMEOUT_SECS", default_value_t = 30)]
        fetch_timeout_secs: u64,

        /// Time-to-run of a reservation, in seconds; must exceed the fetch timeout
        #[arg(long, env = "XRATE_TTR_SECS", default_value_t = 60)]
        ttr_secs: u64,
    },

    /// Enqueue conversion jobs
    Produce {
        /// Number of jobs to enqueue
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Source currency (random pairs if omitted)
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Target currency
        #[arg(long, requires = "from")]
        to: Option<String>,
    },

    /// List buried jobs
    Buried {
        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Move buried jobs back to the ready queue
    Kick {
        /// Maximum number of jobs to kick
        #[arg(short, long, default_value_t = 100)]
        bound: u64,
    },

    /// Show stored rates for a currency pair
    History {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Number of results to show
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("xrate=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut db_config = DatabaseConfig::new(&cli.database_url);
    if let Some(max) = cli.db_max_connections {
        db_config = db_config.with_max_connections(max);
    }
    if let Commands::Work { workers, .. } = &cli.command {
        db_config = db_config.sized_for_workers(*workers);
    }
    let db = Database::open(&db_config)
        .await
        .context("Failed to open database")?;

    match cli.command {
        Commands::Work {
            workers,
            worker_id,
            fail_limit,
            success_limit,
            failure_delay_secs,
            success_delay_secs,
            reserve_timeout_ms,
            idle_backoff_ms,
            buffer,
            fetch_timeout_secs,
            ttr_secs,
        } => {
            let fetch_timeout = Duration::from_secs(fetch_timeout_secs);
            let policy = LifecyclePolicy::default()
                .with_limits(fail_limit, success_limit)
                .with_delays(
                    Duration::from_secs(failure_delay_secs),
                    Duration::from_secs(success_delay_secs),
                )
                .with_ttr(Duration::from_secs(ttr_secs));
            policy.validate().map_err(|e| anyhow::anyhow!(e))?;
            policy
                .check_ttr_covers(fetch_timeout)
                .map_err(|e| anyhow::anyhow!(e))?;

            let mut config = WorkerConfig::default()
                .with_reserve_timeout(Duration::from_millis(reserve_timeout_ms))
                .with_idle_backoff(Duration::from_millis(idle_backoff_ms));
            if let Some(id) = worker_id {
                config = config.with_worker_id(id);
            }

            let fetcher = ReqwestFetcher::with_timeout(fetch_timeout)
                .context("Failed to create HTTP client")?;

            cmd_work(
                &db,
                &cli.tube,
                workers,
                policy,
                config,
                fetcher,
                buffer,
            )
            .await?;
        }
        Commands::Produce { count, from, to } => {
            cmd_produce(&db, &cli.tube, count, from.zip(to)).await?;
        }
        Commands::Buried { limit } => {
            cmd_buried(&db.queue(&cli.tube), limit).await?;
        }
        Commands::Kick { bound } => {
            let kicked = db
                .queue(&cli.tube)
                .kick(bound)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Kicked {kicked} job(s) on tube '{}'", cli.tube);
        }
        Commands::History { from, to, limit } => {
            cmd_history(&db, &from, &to, limit).await?;
        }
    }

    Ok(())
}

async fn cmd_work(
    db: &Database,
    tube: &str,
    workers: usize,
    policy: LifecyclePolicy,
    config: WorkerConfig,
    fetcher: ReqwestFetcher,
    buffer: usize,
) -> Result<()> {
    if buffer == 0 {
        bail!("--buffer must be at least 1");
    }

    let lifecycle = JobLifecycleManager::new(db.queue(tube), policy);
    let extractor = RateExtractor::new(fetcher, XeCom);
    let cancel_token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(buffer);

    let pool = WorkerPool::spawn(
        workers,
        lifecycle,
        extractor,
        tx,
        config,
        cancel_token.clone(),
    )
    .map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(workers = pool.len(), tube, "Worker pool started");

    let publisher = RecordPublisher::new(db.rate_repo());
    let publisher_token = cancel_token.clone();
    let publisher_task = tokio::spawn(async move { publisher.run(rx, publisher_token).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C handler")?;
    tracing::info!("Shutdown signal received");

    pool.shutdown();
    pool.join().await;

    let stats = publisher_task.await.context("Publisher task panicked")?;
    tracing::info!(stored = stats.stored, dropped = stats.dropped, "Shutdown complete");

    Ok(())
}

async fn cmd_produce(
    db: &Database,
    tube: &str,
    count: usize,
    pair: Option<(String, String)>,
) -> Result<()> {
    let lifecycle = JobLifecycleManager::new(db.queue(tube), LifecyclePolicy::default());

    let fixed = match pair {
        Some((from, to)) => {
            let from = currency::lookup(&from)
                .with_context(|| format!("Unknown currency '{from}'"))?;
            let to = currency::lookup(&to).with_context(|| format!("Unknown currency '{to}'"))?;
            if from.code == to.code {
                bail!("--from and --to must differ");
            }
            Some(JobRecord::new(from.code, to.code))
        }
        None => None,
    };

    let mut generator = PairGenerator::from_clock();
    for _ in 0..count {
        let job = match &fixed {
            Some(job) => job.clone(),
            None => generator.next_job(),
        };
        let handle = lifecycle
            .enqueue(&job)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!(%handle, job = %job, "Job enqueued");
    }

    println!("Enqueued {count} job(s) on tube '{tube}'");
    Ok(())
}

async fn cmd_buried(queue: &PgQueueTransport, limit: usize) -> Result<()> {
    let entries = queue
        .list_buried(limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if entries.is_empty() {
        println!("No buried jobs on tube '{}'", queue.tube());
        return Ok(());
    }

    println!("Buried jobs on tube '{}':\n", queue.tube());
    for entry in &entries {
        let job = match JobRecord::decode(&entry.payload) {
            Ok(job) => job.to_string(),
            Err(_) => format!("<undecodable, {} bytes>", entry.payload.len()),
        };
        println!(
            "  [{}] {} {}",
            entry.handle,
            entry.buried_at.format("%Y-%m-%d %H:%M:%S UTC"),
            job,
        );
    }
    println!("\nTotal: {} buried", entries.len());
    Ok(())
}

async fn cmd_history(db: &Database, from: &str, to: &str, limit: i64) -> Result<()> {
    let from = from.to_ascii_uppercase();
    let to = to.to_ascii_uppercase();
    let history = db
        .rate_repo()
        .history(&from, &to, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if history.is_empty() {
        println!("No rates found for {from}/{to}");
        return Ok(());
    }

    println!("Rate history for {from}/{to}:\n");
    for rate in &history {
        println!(
            "  {}  {:.2}",
            rate.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            rate.rate,
        );
    }
    println!("\nTotal: {} rates", history.len());
    Ok(())
}
