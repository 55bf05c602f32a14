//! Usage reporter for flag evaluation telemetry.
//!
//! Counts evaluations per flag and ships the counts once per wall-clock
//! bucket. Buckets are aligned to multiples of the report interval in epoch
//! time, so the cadence is the same across process restarts.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::core::config::{
    FlagbookOptions, DEFAULT_REPORT_INTERVAL, DEFAULT_REPORT_TICK, MAX_TIMER_HORIZON,
};
use crate::error::{FlagbookError, Result};
use crate::types::TraceReport;

/// Configuration for the usage reporter.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Bucket size counters are flushed on. Default: 10 seconds
    pub report_interval: Duration,

    /// How often the loop wakes to check for a passed boundary. Default: 1 second
    pub tick: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            report_interval: DEFAULT_REPORT_INTERVAL,
            tick: DEFAULT_REPORT_TICK,
        }
    }
}

impl From<&FlagbookOptions> for ReporterConfig {
    fn from(options: &FlagbookOptions) -> Self {
        Self {
            report_interval: options.report_interval,
            tick: options.report_tick,
        }
    }
}

/// Callback type for shipping a trace.
pub type TraceSender =
    Arc<dyn Fn(TraceReport) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Wall clock in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Default clock backed by the system time.
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// First bucket boundary strictly after `now_ms`. Saturates at `i64::MAX`.
pub fn next_boundary(now_ms: i64, interval_ms: i64) -> i64 {
    let interval_ms = interval_ms.max(1);
    now_ms.saturating_add(interval_ms - now_ms.rem_euclid(interval_ms))
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Aggregates per-flag evaluation counts and flushes them on bucket boundaries.
///
/// Counters accumulated since the last boundary are dropped on
/// [`dispose`](Self::dispose); there is no final flush.
pub struct UsageReporter {
    config: ReporterConfig,
    counters: Arc<Mutex<HashMap<String, u64>>>,
    next_boundary: Arc<AtomicI64>,
    sender: TraceSender,
    clock: Clock,
    is_running: Arc<AtomicBool>,
    disposed: Arc<AtomicBool>,
}

impl UsageReporter {
    pub fn new(config: ReporterConfig, sender: TraceSender) -> Self {
        Self::with_clock(config, sender, system_clock())
    }

    pub fn with_clock(config: ReporterConfig, sender: TraceSender, clock: Clock) -> Self {
        let boundary = next_boundary(clock(), millis(config.report_interval));
        Self {
            config,
            counters: Arc::new(Mutex::new(HashMap::new())),
            next_boundary: Arc::new(AtomicI64::new(boundary)),
            sender,
            clock,
            is_running: Arc::new(AtomicBool::new(false)),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Count one evaluation of `flag_name`.
    pub fn report(&self, flag_name: &str) {
        let mut counters = self.counters.lock();
        *counters.entry(flag_name.to_string()).or_insert(0) += 1;
    }

    /// Current count for `flag_name` in the open bucket.
    pub fn count(&self, flag_name: &str) -> u64 {
        self.counters.lock().get(flag_name).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }

    /// Boundary at which the open bucket will be flushed, epoch milliseconds.
    pub fn next_report_time(&self) -> i64 {
        self.next_boundary.load(Ordering::SeqCst)
    }

    /// Start the background flush loop on the current Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| FlagbookError::no_runtime())?;

        if self.disposed.load(Ordering::SeqCst) || self.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let worker = self.worker();
        let tick = self.config.tick.min(MAX_TIMER_HORIZON);
        let disposed = Arc::clone(&self.disposed);
        let is_running = Arc::clone(&self.is_running);

        handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if disposed.load(Ordering::SeqCst) {
                    tracing::debug!("Usage reporter shutting down");
                    break;
                }

                let now = (worker.clock)();
                worker.flush_due(now).await;
            }

            is_running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Flush if `now_ms` has reached the pending boundary.
    ///
    /// Returns the number of traces handed to the sender.
    pub async fn flush_due(&self, now_ms: i64) -> usize {
        self.worker().flush_due(now_ms).await
    }

    /// Stop the loop at its next wake-up. Unflushed counts are discarded.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    fn worker(&self) -> FlushWorker {
        FlushWorker {
            interval_ms: millis(self.config.report_interval),
            counters: Arc::clone(&self.counters),
            next_boundary: Arc::clone(&self.next_boundary),
            sender: Arc::clone(&self.sender),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl Drop for UsageReporter {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// State shared between the reporter handle and its background loop.
struct FlushWorker {
    interval_ms: i64,
    counters: Arc<Mutex<HashMap<String, u64>>>,
    next_boundary: Arc<AtomicI64>,
    sender: TraceSender,
    clock: Clock,
}

impl FlushWorker {
    async fn flush_due(&self, now_ms: i64) -> usize {
        let boundary = self.next_boundary.load(Ordering::SeqCst);
        if now_ms < boundary {
            return 0;
        }

        // Reset before sending so counts made during the sends land in the next bucket.
        let counters = std::mem::take(&mut *self.counters.lock());
        self.next_boundary
            .store(next_boundary(now_ms, self.interval_ms), Ordering::SeqCst);

        let mut traces: Vec<TraceReport> = counters
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(flag_name, count)| TraceReport {
                flag_name,
                timestamp: boundary,
                count,
            })
            .collect();
        traces.sort_by(|a, b| a.flag_name.cmp(&b.flag_name));

        let total = traces.len();
        if total > 0 {
            tracing::debug!(traces = total, boundary, "Flushing usage traces");
        }

        for trace in traces {
            let flag_name = trace.flag_name.clone();
            if let Err(e) = (self.sender)(trace).await {
                tracing::warn!(flag = %flag_name, error = %e, "Failed to send usage trace");
            }
        }

        total
    }
}
