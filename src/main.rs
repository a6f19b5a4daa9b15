use clap::Parser;
use feed_collector::config::{self, CollectorConfig, SourceConfig, SourceMode};
use feed_collector::sources::{ItemSource, RssFeedSource, TopicApiSource};
use feed_collector::{
    FetchConfig, Fetcher, FilterStore, IngestionCycleController, JsonSnapshotSink,
    MemoryFilterStore, RedisBloomStore, SourceRun, TopicFilterRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feed-collector")]
#[command(about = "Duplicate-aware feed collector: fetches configured sources, \
deduplicates against a shared membership filter, writes JSON snapshots")]
struct Cli {
    /// Path to the feeds configuration file
    #[arg(long, default_value = "feeds.json")]
    config: PathBuf,

    /// Snapshot output directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single cycle and exit instead of looping
    #[arg(long)]
    once: bool,

    /// Use an in-process membership filter instead of RedisBloom.
    /// Dedup state is lost on exit; meant for dry runs.
    #[arg(long)]
    in_memory: bool,

    /// RedisBloom URL (falls back to REDIS_URL, then localhost)
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Config load and filter-store init are the only fatal failures;
    // everything past this point is recovered at topic granularity.
    let config = CollectorConfig::load(&cli.config)?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir.clone());

    let store: Arc<dyn FilterStore> = if cli.in_memory {
        warn!("using in-memory filter store; dedup state will not survive restart");
        Arc::new(MemoryFilterStore::new())
    } else {
        let url = cli.redis_url.unwrap_or_else(config::redis_url_from_env);
        Arc::new(RedisBloomStore::connect(&url).await?)
    };

    let registry = Arc::new(TopicFilterRegistry::new(store, config.key_prefix.clone()));
    let sink = Arc::new(JsonSnapshotSink::new(data_dir));
    let controller = Arc::new(IngestionCycleController::new(registry, sink));
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));

    let shutdown = Arc::new(Notify::new());
    let running = controller.running_flag();
    let notifier = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, finishing current topics");
            *running.write().await = false;
            notifier.notify_waiters();
        }
    });

    let running = controller.running_flag();
    loop {
        info!(sources = config.sources.len(), "collector cycle starting");

        // Sources own disjoint filter namespaces, so they run as
        // independent tasks; topics within each source stay sequential.
        let mut handles = Vec::new();
        for source_config in &config.sources {
            let run = build_run(source_config, fetcher.clone());
            let controller = controller.clone();
            handles.push(tokio::spawn(
                async move { controller.run_source(&run).await },
            ));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("source task failed: {e}");
            }
        }

        if cli.once || !*running.read().await {
            break;
        }
        info!(seconds = config.interval_secs, "cycle complete, sleeping");
        if !wait_for_next_cycle(&shutdown, Duration::from_secs(config.interval_secs)).await {
            break;
        }
    }

    info!("collector stopped");
    Ok(())
}

/// Wait out the configured interval, waking early on shutdown. Returns
/// false when shutdown arrived during the wait.
async fn wait_for_next_cycle(shutdown: &Notify, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = shutdown.notified() => false,
    }
}

/// Turn one source's configuration into a runnable description. The
/// per-publisher variation is all data: shape, URLs, tuning.
fn build_run(config: &SourceConfig, fetcher: Arc<Fetcher>) -> SourceRun {
    let source = match &config.mode {
        SourceMode::Feed { topics } => {
            let feeds = topics
                .iter()
                .map(|t| (t.name.clone(), t.url.clone()))
                .collect();
            ItemSource::Feed(Box::new(RssFeedSource::new(fetcher, feeds)))
        }
        SourceMode::Paginated {
            base_url,
            topics,
            max_pages,
        } => {
            let topic_ids = topics.iter().map(|t| (t.name.clone(), t.id)).collect();
            ItemSource::Paginated {
                source: Box::new(TopicApiSource::new(fetcher, base_url.clone(), topic_ids)),
                max_pages: *max_pages,
            }
        }
    };

    SourceRun {
        name: config.name.clone(),
        topics: config.topic_names(),
        source,
        tuning: config.tuning(),
        normalize_links: config.normalize_links,
    }
}
