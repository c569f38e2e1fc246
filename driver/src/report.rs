use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::Instrument;

use common::logger::{RunId, run_span};
use counters::{CounterBackend, CounterClient, Result};

use crate::config::{Mode, RunConfig};
use crate::load::{LoadDriver, LoadReport};
use crate::sampler::{ReadSampler, SampleReport};
use crate::waveform::{WaveformGenerator, WaveformReport};

/// Outcome of a single run, one variant per mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RunReport {
    Load(LoadReport),
    Waveform(WaveformReport),
    Readonly(SampleReport),
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReport::Load(r) => fmt::Display::fmt(r, f),
            RunReport::Waveform(r) => fmt::Display::fmt(r, f),
            RunReport::Readonly(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// Validates `config` and runs the selected mode inside a root span tagged with `run_id`.
///
/// Configuration errors are returned before the backend is contacted.
pub async fn execute<B: CounterBackend>(
    client: CounterClient<B>,
    config: &RunConfig,
    run_id: RunId,
) -> Result<RunReport> {
    config.validate()?;
    let target = config.target()?;

    let span = run_span(config.mode.as_str(), &run_id);
    span.record("counter", tracing::field::display(&target));

    async move {
        match config.mode {
            Mode::Load => LoadDriver::new(client, target, config.load.clone())
                .run()
                .await
                .map(RunReport::Load),
            Mode::Waveform => WaveformGenerator::new(client, target, config.waveform.clone())
                .run()
                .await
                .map(RunReport::Waveform),
            Mode::Readonly => ReadSampler::new(client, target, config.sampler.clone())
                .run()
                .await
                .map(RunReport::Readonly),
        }
    }
    .instrument(span)
    .await
}

/// Serializes a duration as fractional milliseconds.
pub(crate) fn as_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
}
