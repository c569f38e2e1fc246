//! Concurrent load driver.
//!
//! Measures the maximum sustainable increment rate on one counter:
//! - warm-up (cache + resolve) happens outside the timed region,
//! - N blocking workers increment with no delay until cancelled,
//! - cancellation is broadcast once, then every worker is joined before any
//!   count is read.
//!
//! Workers own their counts; nothing is shared on the increment path except
//! the client and the cancellation flag.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Span, debug, error, info, instrument, warn};

use counters::{CounterBackend, CounterClient, CounterHandle, CounterKey, Result};

use crate::cancel::CancelSignal;
use crate::config::{LoadConfig, ResolveMode};
use crate::report::as_millis;
use crate::warmup::warm_up;

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerOutcome {
    /// Observed the cancellation signal.
    Cancelled,
    /// Stopped early on a backend error; its count up to that point is kept.
    Failed { error: String },
    /// The worker task panicked; its count is lost.
    Panicked,
}

/// Result of one worker, read only after the worker has been joined.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub increments: u64,
    pub failures: u64,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub outcome: WorkerOutcome,
}

/// Wall-clock cost of each phase of a load run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseTimings {
    /// Category caching and handle resolution.
    #[serde(serialize_with = "as_millis")]
    pub warmup: Duration,
    /// Spawning every worker.
    #[serde(serialize_with = "as_millis")]
    pub startup: Duration,
    /// Time workers were left running before cancellation.
    #[serde(serialize_with = "as_millis")]
    pub run: Duration,
    /// Broadcasting the cancellation signal.
    #[serde(serialize_with = "as_millis")]
    pub signal: Duration,
    /// Joining every worker after cancellation.
    #[serde(serialize_with = "as_millis")]
    pub shutdown: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub counter: String,
    pub resolve: ResolveMode,
    pub initial_value: f64,
    pub workers: Vec<WorkerStats>,
    pub total_increments: u64,
    pub total_failures: u64,
    pub throughput_per_sec: f64,
    pub timings: PhaseTimings,
}

impl LoadReport {
    fn new(
        started_at: DateTime<Utc>,
        counter: &CounterKey,
        resolve: ResolveMode,
        initial_value: f64,
        workers: Vec<WorkerStats>,
        timings: PhaseTimings,
    ) -> Self {
        let total_increments = workers.iter().map(|w| w.increments).sum();
        let total_failures = workers.iter().map(|w| w.failures).sum();
        let secs = timings.run.as_secs_f64();
        let throughput_per_sec = if secs > 0.0 {
            total_increments as f64 / secs
        } else {
            0.0
        };

        Self {
            started_at,
            counter: counter.to_string(),
            resolve,
            initial_value,
            workers,
            total_increments,
            total_failures,
            throughput_per_sec,
            timings,
        }
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1_000.0;
        let t = &self.timings;

        writeln!(
            f,
            "Counter {} ({} handle), value before run {}",
            self.counter, self.resolve, self.initial_value
        )?;
        writeln!(f, "Caching took {:.3} ms", ms(t.warmup))?;
        writeln!(f, "Started in {:.3} ms", ms(t.startup))?;
        writeln!(f, "Stopping after {:.3} ms", ms(t.run))?;
        writeln!(f, "All workers signaled in {:.3} ms", ms(t.signal))?;
        writeln!(f, "All workers stopped in {:.3} ms", ms(t.shutdown))?;
        for w in &self.workers {
            let outcome = match &w.outcome {
                WorkerOutcome::Cancelled => "cancelled".to_string(),
                WorkerOutcome::Failed { error } => format!("failed: {error}"),
                WorkerOutcome::Panicked => "panicked".to_string(),
            };
            writeln!(
                f,
                "  worker {}: {} increments, {} failures, ran {:.3} ms ({})",
                w.worker_id,
                w.increments,
                w.failures,
                ms(w.elapsed),
                outcome
            )?;
        }
        write!(
            f,
            "{} workers incremented {} times ({:.0}/sec), {} failures",
            self.workers.len(),
            self.total_increments,
            self.throughput_per_sec,
            self.total_failures
        )
    }
}

/// What a worker increments.
#[derive(Clone)]
enum Target {
    Handle(CounterHandle),
    Key(CounterKey),
}

struct Worker<B> {
    id: usize,
    client: CounterClient<B>,
    target: Target,
    cancel: CancelSignal,
}

impl<B: CounterBackend> Worker<B> {
    /// Increments until cancelled or until the backend fails.
    fn run(self) -> WorkerStats {
        debug!(worker_id = self.id, "worker ready");
        let started = Instant::now();
        let mut increments = 0u64;
        let mut failures = 0u64;
        let mut outcome = WorkerOutcome::Cancelled;

        while !self.cancel.is_cancelled() {
            let result = match &self.target {
                Target::Handle(handle) => self.client.increment(*handle),
                Target::Key(key) => self
                    .client
                    .resolve(key)
                    .and_then(|handle| self.client.increment(handle)),
            };

            if let Err(e) = result {
                failures += 1;
                warn!(
                    worker_id = self.id,
                    increments,
                    error = %e,
                    remediation = e.remediation(),
                    "worker stopped on backend failure"
                );
                outcome = WorkerOutcome::Failed {
                    error: e.to_string(),
                };
                break;
            }
            increments += 1;
        }

        let elapsed = started.elapsed();
        debug!(
            worker_id = self.id,
            increments,
            elapsed_ms = elapsed.as_millis() as u64,
            "worker finished"
        );

        WorkerStats {
            worker_id: self.id,
            increments,
            failures,
            elapsed,
            outcome,
        }
    }
}

pub struct LoadDriver<B> {
    client: CounterClient<B>,
    target: CounterKey,
    config: LoadConfig,
}

impl<B: CounterBackend> LoadDriver<B> {
    pub fn new(client: CounterClient<B>, target: CounterKey, config: LoadConfig) -> Self {
        Self {
            client,
            target,
            config,
        }
    }

    /// Runs one timed load test.
    ///
    /// Fails before touching the backend on an invalid config, and fails on
    /// warm-up errors. Worker failures never fail the run; they show up in
    /// the report.
    #[instrument(
        skip(self),
        target = "load",
        fields(counter = %self.target, workers = self.config.workers)
    )]
    pub async fn run(&self) -> Result<LoadReport> {
        self.config.validate()?;
        let started_at = Utc::now();

        let warmup_started = Instant::now();
        let (handle, initial_value) =
            warm_up("load_warmup", &self.client, &self.target).await?;
        let warmup = warmup_started.elapsed();

        info!(
            %handle,
            initial_value,
            warmup_ms = warmup.as_millis() as u64,
            "counter cached; starting workers"
        );

        let cancel = CancelSignal::new();
        // Dropping this future before the workers are joined must still stop them.
        let _stop_workers = cancel.drop_guard();
        let target = match self.config.resolve {
            ResolveMode::Shared => Target::Handle(handle),
            ResolveMode::ByName => Target::Key(self.target.clone()),
        };

        let startup_started = Instant::now();
        let mut tasks = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                client: self.client.clone(),
                target: target.clone(),
                cancel: cancel.clone(),
            };
            let span = tracing::info_span!(parent: Span::current(), "worker", worker_id = id);
            tasks.push(tokio::task::spawn_blocking(move || {
                span.in_scope(|| worker.run())
            }));
        }
        let startup = startup_started.elapsed();

        let run_started = Instant::now();
        tokio::time::sleep(self.config.duration).await;
        let run = run_started.elapsed();

        let signal_started = Instant::now();
        cancel.cancel();
        let signal = signal_started.elapsed();

        let shutdown_started = Instant::now();
        let mut workers = Vec::with_capacity(tasks.len());
        for (id, task) in tasks.into_iter().enumerate() {
            match task.await {
                Ok(stats) => workers.push(stats),
                Err(e) => {
                    error!(worker_id = id, error = %e, "worker task did not complete");
                    workers.push(WorkerStats {
                        worker_id: id,
                        increments: 0,
                        failures: 0,
                        elapsed: Duration::ZERO,
                        outcome: WorkerOutcome::Panicked,
                    });
                }
            }
        }
        let shutdown = shutdown_started.elapsed();

        let report = LoadReport::new(
            started_at,
            &self.target,
            self.config.resolve,
            initial_value,
            workers,
            PhaseTimings {
                warmup,
                startup,
                run,
                signal,
                shutdown,
            },
        );

        info!(
            total_increments = report.total_increments,
            total_failures = report.total_failures,
            throughput_per_sec = report.throughput_per_sec as u64,
            "load run complete"
        );
        Ok(report)
    }
}
