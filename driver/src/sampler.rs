use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{info, instrument};

use counters::{CounterBackend, CounterClient, CounterKey, Result};

use crate::config::SamplerConfig;
use crate::report::as_millis;
use crate::warmup::warm_up;

#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub index: u32,
    /// Offset from the first sample.
    #[serde(serialize_with = "as_millis")]
    pub at: Duration,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub counter: String,
    pub samples: Vec<Sample>,
}

impl fmt::Display for SampleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.samples.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "found value for counter {} {}", self.counter, s.value)?;
        }
        Ok(())
    }
}

/// Reads one counter at a fixed interval without modifying it.
pub struct ReadSampler<B> {
    client: CounterClient<B>,
    target: CounterKey,
    config: SamplerConfig,
}

impl<B: CounterBackend> ReadSampler<B> {
    pub fn new(client: CounterClient<B>, target: CounterKey, config: SamplerConfig) -> Self {
        Self {
            client,
            target,
            config,
        }
    }

    #[instrument(skip(self), target = "sampler", fields(counter = %self.target))]
    pub async fn run(&self) -> Result<SampleReport> {
        self.config.validate()?;

        let (handle, initial_value) =
            warm_up("sampler_warmup", &self.client, &self.target).await?;
        info!(%handle, initial_value, "sampling started");

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut samples = Vec::with_capacity(self.config.samples as usize);
        let mut first: Option<Instant> = None;

        for index in 0..self.config.samples {
            let now = ticker.tick().await;
            let value = self.client.next_value(handle)?;
            let at = now - *first.get_or_insert(now);

            info!(index, value, "counter sampled");
            samples.push(Sample { index, at, value });
        }

        Ok(SampleReport {
            counter: self.target.to_string(),
            samples,
        })
    }
}
