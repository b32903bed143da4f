//! courier - operator CLI over a file-backed event queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio::time::{Duration, Instant, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use courier_core::domain::{DeliveryFailure, DeliveryOutcome, EventEnvelope, EventId, Priority, QueueNotice};
use courier_core::impls::{CallbackSink, ChannelEventSink, FileStorage, HttpDelivery, HttpDeliveryConfig, InMemoryStorage};
use courier_core::ports::DeliveryAdapter;
use courier_core::{EnqueueOptions, EventQueue, EventQueueBuilder, QueueConfig};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Durable outbound event queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (missing fields use defaults)
    #[arg(short, long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the queue snapshot
    #[arg(long, global = true, default_value = ".courier", env = "COURIER_DATA_DIR")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an event to the queue
    Enqueue {
        /// Event type
        #[arg(short = 't', long = "type")]
        event_type: String,
        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        payload: String,
        /// low | normal | high
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },
    /// Show one event
    Status { id: EventId },
    /// Counts per status
    Stats,
    /// Every event in queue order
    List,
    /// Delete one event (not while in flight)
    Remove { id: EventId },
    /// Delete events that are not in flight
    Clear {
        /// Only delete completed events
        #[arg(long)]
        completed: bool,
    },
    /// Reset failed events to pending with a fresh retry budget
    RetryFailed,
    /// Deliver pending events to an HTTP endpoint, then exit
    Drain {
        /// Destination URL (overrides the config file)
        #[arg(long, env = "COURIER_ENDPOINT")]
        endpoint: Option<String>,
        /// Bearer token
        #[arg(long, env = "COURIER_TOKEN")]
        token: Option<String>,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// In-process run against a flaky in-memory destination
    Demo,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&PathBuf>) -> Result<QueueConfig> {
    match path {
        Some(path) => QueueConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(QueueConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// File-backed queue without a delivery adapter (read/modify commands).
fn open_queue(config: QueueConfig, data_dir: PathBuf) -> Result<EventQueue> {
    let queue = EventQueueBuilder::new()
        .config(config)
        .storage(Arc::new(FileStorage::new(data_dir)))
        .build()?;
    Ok(queue)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Enqueue {
            event_type,
            payload,
            priority,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let queue = open_queue(config, cli.data_dir)?;
            let id = queue.enqueue(event_type, payload, EnqueueOptions::priority(priority));
            println!("{id}");
        }
        Commands::Status { id } => {
            let queue = open_queue(config, cli.data_dir)?;
            match queue.status(id) {
                Some(event) => print_json(&event)?,
                None => bail!("no event {id}"),
            }
        }
        Commands::Stats => {
            let queue = open_queue(config, cli.data_dir)?;
            print_json(&queue.stats())?;
        }
        Commands::List => {
            let queue = open_queue(config, cli.data_dir)?;
            for event in queue.events() {
                println!(
                    "{}  {:<9} {:<6} attempts={} {}",
                    event.id, event.status, event.priority, event.attempts, event.event_type
                );
            }
        }
        Commands::Remove { id } => {
            let queue = open_queue(config, cli.data_dir)?;
            if !queue.remove(id) {
                bail!("{id} not found or in flight");
            }
            println!("removed {id}");
        }
        Commands::Clear { completed } => {
            let queue = open_queue(config, cli.data_dir)?;
            println!("removed {} event(s)", queue.clear(completed));
        }
        Commands::RetryFailed => {
            let queue = open_queue(config, cli.data_dir)?;
            println!("reset {} event(s)", queue.retry_failed());
        }
        Commands::Drain {
            endpoint,
            token,
            timeout_secs,
        } => {
            drain(config, cli.data_dir, endpoint, token, timeout_secs).await?;
        }
        Commands::Demo => demo().await?,
    }

    Ok(())
}

async fn drain(
    mut config: QueueConfig,
    data_dir: PathBuf,
    endpoint: Option<String>,
    token: Option<String>,
    timeout_secs: u64,
) -> Result<()> {
    if endpoint.is_some() {
        config.endpoint = endpoint;
    }
    let Some(url) = config.endpoint.clone() else {
        bail!("no endpoint: pass --endpoint or set it in the config file");
    };

    let mut http = HttpDeliveryConfig::new(url);
    http.auth_token = token;
    http.timeout = config.delivery_timeout();
    let delivery = HttpDelivery::new(http).context("building HTTP client")?;

    let sink = CallbackSink::new()
        .on_success(|notice| info!(?notice, "delivered"))
        .on_failure(|notice| warn!(?notice, "delivery problem"));

    let queue = EventQueueBuilder::new()
        .config(config)
        .storage(Arc::new(FileStorage::new(data_dir)))
        .delivery(Arc::new(delivery))
        .sink(Arc::new(sink))
        .build()?;

    let report = queue.load_report();
    info!(
        restored = report.restored,
        demoted = report.demoted,
        endpoint = %queue.config().endpoint.as_deref().unwrap_or_default(),
        "Draining queue"
    );

    queue.set_native_online(true);
    queue.start()?;

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let finished = loop {
        let stats = queue.stats();
        if stats.is_drained() {
            break true;
        }
        if Instant::now() >= deadline {
            break false;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break false;
            }
            _ = sleep(Duration::from_millis(200)) => {}
        }
    };

    queue.shutdown().await;
    let stats = queue.stats();
    print_json(&stats)?;
    if !finished {
        bail!("{} event(s) still pending", stats.pending + stats.in_flight);
    }
    Ok(())
}

/// Destination that fails the first `remaining_failures` calls.
struct FlakyDelivery {
    remaining_failures: AtomicU32,
}

impl FlakyDelivery {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl DeliveryAdapter for FlakyDelivery {
    async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome {
        sleep(Duration::from_millis(50)).await;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(DeliveryFailure::rejected(
                503,
                Some(format!("intentional failure (left={left})")),
            ));
        }

        println!("  -> {} {} {}", envelope.id, envelope.event_type, envelope.payload);
        Ok(())
    }
}

async fn demo() -> Result<()> {
    let config = QueueConfig {
        processing_interval_ms: 1_000,
        retry_interval_ms: 200,
        retry_multiplier: 2.0,
        max_retry_delay_ms: 1_000,
        success_delay_ms: 50,
        ..QueueConfig::default()
    };
    let (sink, mut notices) = ChannelEventSink::new();

    let queue = EventQueueBuilder::new()
        .config(config)
        .storage(Arc::new(InMemoryStorage::new()))
        .delivery(Arc::new(FlakyDelivery::new(2)))
        .sink(Arc::new(sink))
        .build()?;

    // offline のうちに積んでおく
    queue.set_native_online(false);
    queue.enqueue("page.view", serde_json::json!({ "path": "/" }), EnqueueOptions::default());
    queue.enqueue(
        "achievement.unlocked",
        serde_json::json!({ "id": 7 }),
        EnqueueOptions::priority(Priority::High),
    );
    queue.enqueue(
        "telemetry.tick",
        serde_json::json!({ "n": 1 }),
        EnqueueOptions::priority(Priority::Low),
    );
    println!("queued while offline: {:?}", queue.stats());

    queue.start()?;
    queue.set_native_online(true);

    while let Some(notice) = notices.recv().await {
        match &notice {
            QueueNotice::QueueChanged(stats) => {
                if stats.is_drained() && stats.online {
                    break;
                }
            }
            other => println!("{}", serde_json::to_string(other)?),
        }
    }

    queue.shutdown().await;
    println!("final: {:?}", queue.stats());
    Ok(())
}
