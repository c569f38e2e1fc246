//! Sawtooth waveform generator.
//!
//! Each repetition is a ramp phase (`counts_per_second` increments evenly
//! spaced across `phase`) followed by a quiet phase of the same length, so a
//! rate-windowed observer sees the rate climb and then settle. The generator
//! runs on a single task and must stay that way: the pacing is the signal.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, instrument};

use counters::{CounterBackend, CounterClient, CounterHandle, CounterKey, Result};

use crate::config::WaveformConfig;
use crate::report::as_millis;
use crate::warmup::warm_up;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaveState {
    Ramp(u32),
    Quiet(u32),
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaveformReport {
    pub started_at: DateTime<Utc>,
    pub counter: String,
    pub increments: u64,
    pub repetitions: u32,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl fmt::Display for WaveformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Waveform on {}: {} repetitions, {} increments in {:.3} ms",
            self.counter,
            self.repetitions,
            self.increments,
            self.elapsed.as_secs_f64() * 1_000.0
        )
    }
}

pub struct WaveformGenerator<B> {
    client: CounterClient<B>,
    target: CounterKey,
    config: WaveformConfig,
}

impl<B: CounterBackend> WaveformGenerator<B> {
    pub fn new(client: CounterClient<B>, target: CounterKey, config: WaveformConfig) -> Self {
        Self {
            client,
            target,
            config,
        }
    }

    /// Caches the target, then drives the full waveform.
    ///
    /// Any increment failure aborts the remaining repetitions.
    #[instrument(
        skip(self),
        target = "waveform",
        fields(
            counter = %self.target,
            phase_ms = self.config.phase.as_millis() as u64,
            repetitions = self.config.repetitions
        )
    )]
    pub async fn run(&self) -> Result<WaveformReport> {
        self.config.validate()?;

        let (handle, initial_value) =
            warm_up("waveform_warmup", &self.client, &self.target).await?;

        let started_at = Utc::now();
        let started = Instant::now();
        let mut increments = 0u64;
        let mut completed = 0u32;
        let mut state = WaveState::Ramp(0);

        info!(
            %handle,
            initial_value,
            spacing_us = self.config.spacing().as_micros() as u64,
            "waveform started"
        );

        loop {
            state = match state {
                WaveState::Ramp(rep) => {
                    increments += self.ramp(handle, rep).await?;
                    WaveState::Quiet(rep)
                }
                WaveState::Quiet(rep) => {
                    debug!(rep, "quiet phase");
                    sleep(self.config.phase).await;
                    completed = rep + 1;
                    if completed == self.config.repetitions {
                        WaveState::Done
                    } else {
                        WaveState::Ramp(rep + 1)
                    }
                }
                WaveState::Done => break,
            };
        }

        let report = WaveformReport {
            started_at,
            counter: self.target.to_string(),
            increments,
            repetitions: completed,
            elapsed: started.elapsed(),
        };
        info!(increments, repetitions = completed, "waveform complete");
        Ok(report)
    }

    /// One ramp phase: evenly spaced increments filling exactly one phase.
    async fn ramp(&self, handle: CounterHandle, rep: u32) -> Result<u64> {
        debug!(rep, "ramp phase");
        let mut ticker = interval(self.config.spacing());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut issued = 0u64;
        for _ in 0..self.config.counts_per_second {
            ticker.tick().await;
            if let Err(e) = self.client.increment(handle) {
                error!(rep, issued, error = %e, "waveform aborted on increment failure");
                return Err(e);
            }
            issued += 1;
        }
        // Hold the last slot so the ramp spans the whole phase.
        ticker.tick().await;
        Ok(issued)
    }
}
