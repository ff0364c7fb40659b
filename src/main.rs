use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use onionspider::config::{load_settings, Settings};
use onionspider::models::JobKind;
use onionspider::services::{load_seeds, submit_seeds, CrawlRequest};
use onionspider::AppContext;

#[derive(Debug, Parser)]
#[command(
    name = "onionspider",
    version,
    about = "Crawl onion and clear-web sites through Tor"
)]
struct Cli {
    /// Data directory (overrides config)
    #[arg(long, global = true, env = "ONIONSPIDER_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// SOCKS proxy, e.g. socks5h://127.0.0.1:9050
    #[arg(long, global = true, env = "ONIONSPIDER_PROXY", value_name = "URL")]
    proxy: Option<String>,

    /// Job queue broker ("database" or redis://host:port)
    #[arg(long, global = true, env = "ONIONSPIDER_BROKER", value_name = "URL")]
    broker: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Crawl a single URL
    Crawl {
        #[arg(value_name = "URL")]
        url: String,
        /// Link depth to follow
        #[arg(short, long, value_name = "N")]
        depth: Option<u32>,
        /// Connect directly instead of through the proxy
        #[arg(long, default_value_t = false)]
        no_proxy: bool,
        /// Keep stored content if the URL was crawled before
        #[arg(long, default_value_t = false)]
        no_recrawl: bool,
        /// Queue the crawl for a worker instead of running it now
        #[arg(long, default_value_t = false)]
        enqueue: bool,
    },
    /// Queue every URL in a seed file
    Seed {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(short, long, value_name = "N")]
        depth: Option<u32>,
        #[arg(long, default_value_t = false)]
        no_proxy: bool,
    },
    /// Process queued jobs until interrupted
    Worker {
        #[arg(short, long, value_name = "N")]
        concurrency: Option<usize>,
        /// Exit once the queue is empty
        #[arg(long, default_value_t = false)]
        drain: bool,
    },
    /// Show document and queue statistics
    Stats,
}

fn apply_cli(cli: &Cli, settings: &mut Settings) {
    if let Some(ref dir) = cli.data_dir {
        settings.data_dir = dir.clone();
        settings.screenshots_dir = dir.join("screenshots");
    }
    if let Some(ref proxy) = cli.proxy {
        settings.proxy_url = proxy.clone();
    }
    if let Some(ref broker) = cli.broker {
        settings.broker_url = Some(broker.clone());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onionspider=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings().await;
    apply_cli(&cli, &mut settings);

    if let Command::Worker {
        concurrency: Some(n),
        ..
    } = cli.command
    {
        settings.worker_concurrency = n.max(1);
    }

    let ctx = AppContext::init(settings).await?;
    let result = run(&ctx, cli.command).await;
    ctx.shutdown().await;
    result
}

async fn run(ctx: &AppContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            info!("Database ready at {}", ctx.settings.database_path().display());
        }
        Command::Crawl {
            url,
            depth,
            no_proxy,
            no_recrawl,
            enqueue,
        } => {
            let url = onionspider::onion::normalize_url(&url)
                .with_context(|| format!("not an http(s) URL: {}", url))?;
            let depth = ctx.settings.effective_depth(depth);
            let request = CrawlRequest::seed(&url, depth)
                .with_proxy(!no_proxy)
                .with_re_crawl(!no_recrawl);

            if enqueue {
                let job = JobKind::Crawl(request.into());
                let id = ctx.queue.enqueue(&job, ctx.settings.enqueue_options()).await?;
                println!("queued {} as job {}", url, id);
            } else {
                let report = ctx.spider().crawl_report(request).await;
                println!("{}", serde_json::to_string_pretty(&report)?);
                if report.document_id.is_none() {
                    anyhow::bail!("crawl of {} was not persisted", url);
                }
            }
        }
        Command::Seed {
            file,
            depth,
            no_proxy,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let seeds = load_seeds(&text, ctx.settings.strict_onion_admission);
            if seeds.is_empty() {
                warn!("No usable seeds in {}", file.display());
                return Ok(());
            }
            let depth = ctx.settings.effective_depth(depth);
            let report = submit_seeds(
                ctx.queue.as_ref(),
                &seeds,
                depth,
                !no_proxy,
                ctx.settings.enqueue_options(),
            )
            .await;
            println!("queued {} seed(s), {} failed", report.enqueued, report.failed);
        }
        Command::Worker { drain, .. } => {
            let worker = ctx.worker();
            if drain {
                let processed = worker.drain().await?;
                println!("processed {} job(s)", processed);
            } else {
                let (tx, rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupt received, finishing in-flight jobs");
                        let _ = tx.send(true);
                    }
                });
                worker.run(rx).await;
            }
        }
        Command::Stats => {
            println!("documents: {}", ctx.documents.count().await?);
            for (status, count) in ctx.documents.count_by_status().await? {
                let label = status.map_or_else(|| "none".to_string(), |s| s.to_string());
                println!("  status {:>4}: {}", label, count);
            }
            for doc in ctx.documents.recent(5).await? {
                println!(
                    "  {} {} {}",
                    doc.seen_time.format("%Y-%m-%d %H:%M"),
                    doc.url,
                    doc.title.unwrap_or_default()
                );
            }
            if ctx.settings.broker_url.is_none() {
                let queue = onionspider::queue::DieselJobQueue::new(
                    ctx.pool.clone(),
                    &ctx.settings.queue_name,
                );
                for (status, count) in queue.count_by_status().await? {
                    println!("  jobs {}: {}", status, count);
                }
            }
        }
    }
    Ok(())
}
