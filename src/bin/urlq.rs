//! urlq CLI: run, drain, enqueue and inspect the download pipeline.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::info;
use urlq::config::{Config, validate_queue_name};
use urlq::db::{Db, PgDedupCache, PgmqQueue};
use urlq::engine::{Coordinator, CoordinatorConfig, PipelineContext};
use urlq::fetch::Fetcher;
use urlq::model::WorkItem;
use urlq::queue::QueueClient;
use urlq::storage::LocalDiskStorage;
use urlq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "urlq", version, about = "Queue-driven URL download pipeline")]
struct Cli {
    /// TOML file with queue, concurrency, buffer_factor, storage_dir, log_level
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download from the queue until interrupted
    Run(PipelineArgs),
    /// Download until the queue is empty and nothing is in flight, then exit
    Drain(PipelineArgs),
    /// Push URLs onto the queue tail
    Enqueue {
        /// Queue name
        #[arg(long)]
        queue: Option<String>,
        /// Read URLs from a file, one per line ("-" for stdin)
        #[arg(long)]
        file: Option<PathBuf>,
        /// URLs to enqueue
        urls: Vec<String>,
    },
    /// Show queue length and completion count
    Status {
        /// Queue name
        #[arg(long)]
        queue: Option<String>,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// Maximum concurrent downloads
    #[arg(long)]
    concurrency: Option<usize>,
    /// Ingress buffer size as a multiple of concurrency
    #[arg(long)]
    buffer_factor: Option<usize>,
    /// Queue name
    #[arg(long)]
    queue: Option<String>,
    /// Directory to save downloads into
    #[arg(long)]
    dir: Option<PathBuf>,
}

impl PipelineArgs {
    fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.buffer_factor {
            config.buffer_factor = n;
        }
        if let Some(q) = self.queue {
            config.queue = q;
        }
        if let Some(dir) = self.dir {
            config.storage_dir = dir;
        }
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => {
            args.apply(&mut config)?;
            cmd_pipeline(config, false).await
        }
        Command::Drain(args) => {
            args.apply(&mut config)?;
            cmd_pipeline(config, true).await
        }
        Command::Enqueue { queue, file, urls } => {
            if let Some(q) = queue {
                validate_queue_name(&q)?;
                config.queue = q;
            }
            cmd_enqueue(&config, file, urls).await
        }
        Command::Status { queue } => {
            if let Some(q) = queue {
                validate_queue_name(&q)?;
                config.queue = q;
            }
            cmd_status(&config).await
        }
    }
}

async fn connect(config: &Config, max_connections: u32) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret(), max_connections).await?;
    db.migrate().await?;
    db.create_queue(&config.queue).await?;
    Ok(db)
}

async fn cmd_pipeline(config: Config, until_quiescent: bool) -> anyhow::Result<()> {
    let telemetry = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "urlq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    // Producer, quiescence check and one connection per task.
    let max_connections = u32::try_from(config.concurrency.saturating_add(2)).unwrap_or(u32::MAX);
    let db = connect(&config, max_connections).await?;

    let storage = LocalDiskStorage::new(&config.storage_dir);
    info!(dir = %storage.root().display(), "saving downloads");

    let ctx = PipelineContext {
        queue: Arc::new(PgmqQueue::new(db.clone(), &config.queue)),
        dedup: Arc::new(PgDedupCache::for_queue(db, &config.queue)),
        storage: Arc::new(storage),
        fetcher: Fetcher::new()?,
    };
    let coordinator = Coordinator::new(ctx, CoordinatorConfig::from_config(&config))?;

    info!(instance = %coordinator.instance(), queue = %config.queue, "pipeline ready");

    let ctrl = coordinator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.stop();
    });

    if until_quiescent {
        let watcher = coordinator.clone();
        tokio::spawn(async move {
            watcher.wait_until_quiescent().await;
            info!("queue drained");
            watcher.stop();
        });
    }

    coordinator.start().await;
    // Drain requeue counts go out before the process exits.
    telemetry.force_flush();
    Ok(())
}

async fn cmd_enqueue(
    config: &Config,
    file: Option<PathBuf>,
    mut urls: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(path) = file {
        let lines: Vec<String> = if path.as_os_str() == "-" {
            std::io::stdin().lock().lines().collect::<Result<_, _>>()?
        } else {
            std::io::BufReader::new(std::fs::File::open(&path)?)
                .lines()
                .collect::<Result<_, _>>()?
        };
        urls.extend(lines);
    }

    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && !u.starts_with('#'))
        .collect();
    if urls.is_empty() {
        anyhow::bail!("no URLs given");
    }

    let db = connect(config, 2).await?;
    let queue = PgmqQueue::new(db, &config.queue);
    for url in &urls {
        queue.push(&WorkItem::new(url.as_str())).await?;
    }

    println!("Enqueued {} URL(s) to {}", urls.len(), config.queue);
    Ok(())
}

async fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let db = connect(config, 2).await?;
    let queue = PgmqQueue::new(db.clone(), &config.queue);
    let dedup = PgDedupCache::for_queue(db, &config.queue);

    println!("Queue:      {}", queue.name());
    println!("Pending:    {}", queue.len().await?);
    println!("Bucket:     {}", dedup.bucket());
    println!("Completed:  {}", dedup.count().await?);
    Ok(())
}
