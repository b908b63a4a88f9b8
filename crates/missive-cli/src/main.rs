use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use missive_core::app::worker_loop::{
    ENV_BATCH_LIMIT, ENV_DISABLED, ENV_DRY_RUN, ENV_INITIAL_DELAY_MS, ENV_INTERVAL_MS,
};
use missive_core::app::{
    BatchOptions, BatchProcessor, BatchProcessorConfig, WorkerConfig, start_worker,
};
use missive_core::domain::{DispatchError, QueueItem, SendPayload};
use missive_core::impls::{InMemoryQueueStore, LogDispatch};
use missive_core::ports::{
    Clock, Delivery, DispatchExecutor, IdGenerator, OwnerContext, QueueStore, SystemClock,
    UlidGenerator,
};
use missive_core::queue::RetryPolicy;

#[derive(Debug, Parser)]
#[command(name = "missive", about = "Scheduled message queue processor")]
struct Cli {
    /// Seed the in-memory queue with this many due messages.
    #[arg(long, global = true, default_value_t = 0)]
    demo: usize,

    /// Make the log transport reject the first N sends.
    #[arg(long, global = true, default_value_t = 0)]
    fail_first: u32,

    /// Growth factor of the retry delay; 1.0 keeps it flat.
    #[arg(long, global = true, default_value_t = 1.0)]
    retry_multiplier: f64,

    /// Give up on a single send after this many milliseconds.
    #[arg(long, global = true)]
    dispatch_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single batch and print the report as JSON.
    Process {
        /// Clamped into 1..=100.
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Run the periodic worker until Ctrl-C.
    Worker(WorkerArgs),
}

#[derive(Debug, Args)]
struct WorkerArgs {
    #[arg(long, env = ENV_DISABLED)]
    disabled: Option<String>,

    #[arg(long, env = ENV_INTERVAL_MS)]
    interval_ms: Option<String>,

    #[arg(long, env = ENV_INITIAL_DELAY_MS)]
    initial_delay_ms: Option<String>,

    #[arg(long, env = ENV_BATCH_LIMIT)]
    batch_limit: Option<String>,

    #[arg(long, env = ENV_DRY_RUN)]
    dry_run: Option<String>,
}

impl WorkerArgs {
    fn config(&self) -> Result<WorkerConfig> {
        let config = WorkerConfig::from_lookup(|key| match key {
            ENV_DISABLED => self.disabled.clone(),
            ENV_INTERVAL_MS => self.interval_ms.clone(),
            ENV_INITIAL_DELAY_MS => self.initial_delay_ms.clone(),
            ENV_BATCH_LIMIT => self.batch_limit.clone(),
            ENV_DRY_RUN => self.dry_run.clone(),
            _ => None,
        })?;
        Ok(config)
    }
}

/// Wraps the log transport and rejects the first few sends, so the retry
/// path can be watched from the command line.
struct FlakyDispatch {
    inner: LogDispatch,
    remaining_failures: AtomicU32,
}

#[async_trait]
impl DispatchExecutor for FlakyDispatch {
    async fn send(&self, payload: &SendPayload, owner: &OwnerContext) -> Result<Delivery, DispatchError> {
        if let Ok(left) = self
            .remaining_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            return Err(DispatchError::Rejected(format!("intentional failure (left={left})")));
        }
        self.inner.send(payload, owner).await
    }
}

async fn seed(store: &dyn QueueStore, clock: &dyn Clock, ids: &dyn IdGenerator, n: usize) -> Result<()> {
    let now = clock.now();
    for i in 0..n {
        let payload = SendPayload::new(
            format!("guest{i}@example.com"),
            "Save the date",
            format!("Hello guest {i}, see you in June."),
        );
        let due = now - Duration::seconds((n - i) as i64);
        let item = QueueItem::new(ids.queue_item_id(), Some("demo".into()), payload, due, now);
        store.insert(item).await.context("seeding demo messages")?;
    }
    if n > 0 {
        tracing::info!(count = n, "seeded demo messages");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,missive_core=debug")),
        )
        .init();

    let cli = Cli::parse();

    // (A) store / transport / clock を組み立てる
    let store = Arc::new(InMemoryQueueStore::new());
    let clock = Arc::new(SystemClock);
    let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
    let dispatch = Arc::new(FlakyDispatch {
        inner: LogDispatch::new(),
        remaining_failures: AtomicU32::new(cli.fail_first),
    });
    seed(store.as_ref(), clock.as_ref(), ids.as_ref(), cli.demo).await?;

    let processor = Arc::new(BatchProcessor::new(store.clone(), dispatch, clock, ids).with_config(
        BatchProcessorConfig {
            retry: RetryPolicy {
                multiplier: cli.retry_multiplier,
                ..RetryPolicy::default()
            },
            dispatch_timeout: cli.dispatch_timeout_ms.map(std::time::Duration::from_millis),
        },
    ));

    match cli.command {
        Command::Process { limit, dry_run } => {
            // (B) 1 回だけ batch を流す
            let report = processor
                .process_batch(BatchOptions::manual(limit, dry_run))
                .await
                .context("batch failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Worker(args) => {
            // (B) worker を起動して Ctrl-C を待つ
            let handle = start_worker(Arc::clone(&processor), args.config()?);
            if !handle.is_running() {
                return Ok(());
            }
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            handle.stop_and_join().await;
        }
    }

    let counts = store.counts_by_status().await?;
    tracing::info!(
        scheduled = counts.scheduled,
        processing = counts.processing,
        sent = counts.sent,
        failed = counts.failed,
        cancelled = counts.cancelled,
        "queue counts"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn flaky_dispatch_fails_exactly_n_times() {
        let dispatch = Arc::new(FlakyDispatch {
            inner: LogDispatch::new(),
            remaining_failures: AtomicU32::new(5),
        });
        let payload = SendPayload::new("guest@example.com", "RSVP", "Please reply");
        let ids = UlidGenerator::new(SystemClock);

        let sends: Vec<_> = (0..32)
            .map(|_| {
                let dispatch = Arc::clone(&dispatch);
                let payload = payload.clone();
                let item_id = ids.queue_item_id();
                tokio::spawn(async move {
                    let owner = OwnerContext {
                        item_id,
                        owner_id: None,
                    };
                    dispatch.send(&payload, &owner).await.is_err()
                })
            })
            .collect();

        let mut failures = 0;
        for send in sends {
            if send.await.unwrap() {
                failures += 1;
            }
        }

        assert_eq!(failures, 5);
        assert_eq!(dispatch.remaining_failures.load(Ordering::SeqCst), 0);
    }
}
