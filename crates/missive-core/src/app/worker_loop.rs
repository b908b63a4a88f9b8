//! WorkerLoop - timer-driven batch runner.
//!
//! # フロー
//! 1. `initial_delay` 待機
//! 2. `interval` ごとに tick
//! 3. 前回の batch が実行中なら tick ごとスキップ（キューには積まない）
//! 4. `BatchProcessor::process_batch()` を別タスクで実行、エラーはログのみ

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::batch::{BatchOptions, BatchProcessor};
use crate::domain::ConfigError;

pub const ENV_DISABLED: &str = "MISSIVE_WORKER_DISABLED";
pub const ENV_INTERVAL_MS: &str = "MISSIVE_WORKER_INTERVAL_MS";
pub const ENV_INITIAL_DELAY_MS: &str = "MISSIVE_WORKER_INITIAL_DELAY_MS";
pub const ENV_BATCH_LIMIT: &str = "MISSIVE_WORKER_BATCH_LIMIT";
pub const ENV_DRY_RUN: &str = "MISSIVE_WORKER_DRY_RUN";

/// Worker settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Kill switch: `start_worker` returns a no-op handle.
    pub disabled: bool,
    /// Period between ticks. Zero means the configured value was unusable.
    pub interval: Duration,
    pub initial_delay: Duration,
    pub batch_limit: usize,
    pub dry_run: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            interval: Duration::from_millis(60_000),
            initial_delay: Duration::from_millis(5_000),
            batch_limit: BatchOptions::DEFAULT_LIMIT,
            dry_run: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their default.
    ///
    /// An interval that is not a positive, finite number of milliseconds is
    /// not an error here: it is kept as zero so that [`start_worker`] can
    /// refuse to start while the rest of the process carries on.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DISABLED) {
            config.disabled = parse_flag(ENV_DISABLED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_INTERVAL_MS) {
            config.interval = match parse_interval(&raw) {
                Ok(interval) => interval,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring worker interval");
                    Duration::ZERO
                }
            };
        }
        if let Some(raw) = lookup(ENV_INITIAL_DELAY_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_INITIAL_DELAY_MS,
                value: raw.clone(),
            })?;
            config.initial_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_BATCH_LIMIT) {
            config.batch_limit = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_BATCH_LIMIT,
                        value: raw,
                    });
                }
            };
        }
        if let Some(raw) = lookup(ENV_DRY_RUN) {
            config.dry_run = parse_flag(ENV_DRY_RUN, &raw)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidInterval(format!("{:?}", self.interval)));
        }
        Ok(())
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            limit: self.batch_limit,
            dry_run: self.dry_run,
            now: None,
        }
    }
}

/// Parse milliseconds; fractional values are accepted, zero, negative,
/// NaN and infinity are not.
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(raw.to_string());
    let ms: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !ms.is_finite() || ms <= 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(ms / 1000.0).map_err(|_| invalid())
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Handle to a running worker.
/// - `stop()` で以降の tick を止める（実行中の batch は中断しない）
/// - handle を drop しても停止する
pub struct WorkerHandle {
    shutdown_tx: Option<watch::Sender<bool>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// A handle with nothing behind it.
    pub fn noop() -> Self {
        Self {
            shutdown_tx: None,
            join: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Cancel the pending initial delay and all future ticks. Safe to call
    /// any number of times.
    pub fn stop(&self) {
        if let Some(tx) = &self.shutdown_tx {
            // ignore send error: the loop may already be gone
            let _ = tx.send(true);
        }
    }

    /// Stop and wait for the timer task to exit. A batch already in flight
    /// keeps running on its own task.
    pub async fn stop_and_join(mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Start the periodic worker.
///
/// Returns a no-op handle when the worker is disabled or the interval is
/// unusable; neither case is fatal to the caller.
pub fn start_worker(processor: Arc<BatchProcessor>, config: WorkerConfig) -> WorkerHandle {
    if config.disabled {
        tracing::info!("scheduled message worker disabled");
        return WorkerHandle::noop();
    }
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "scheduled message worker not started");
        return WorkerHandle::noop();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        initial_delay_ms = config.initial_delay.as_millis() as u64,
        batch_limit = config.batch_limit,
        dry_run = config.dry_run,
        "scheduled message worker started"
    );

    let join = tokio::spawn(run(processor, config, shutdown_rx));
    WorkerHandle {
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
    }
}

async fn run(
    processor: Arc<BatchProcessor>,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let busy = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval_at(Instant::now() + config.initial_delay, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // Err: sender dropped
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let Some(guard) = BusyGuard::try_acquire(&busy) else {
            tracing::warn!("previous batch still running, skipping tick");
            continue;
        };

        let processor = Arc::clone(&processor);
        let options = config.batch_options();
        // batch は別タスク: stop() が in-flight の batch を止めないように
        tokio::spawn(async move {
            let _guard = guard;
            match processor.process_batch(options).await {
                Ok(report) => tracing::debug!(processed = report.processed, "worker tick finished"),
                Err(e) => tracing::error!(error = %e, "worker tick failed"),
            }
        });
    }

    tracing::info!("scheduled message worker stopped");
}

/// Holds the re-entrancy flag; released on drop, including when the batch
/// task panics.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
