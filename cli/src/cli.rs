use std::time::Duration;

use clap::{Parser, ValueEnum};

use counters::{CounterError, CounterKind, InMemoryBackend};
use driver::{Mode, ResolveMode, RunConfig};

/// Categories every run starts with, matching the stock test setup.
const DEFAULT_CATEGORIES: [&str; 2] = ["Freemansoft.JavaTestCategory", "Freemansoft.TestCategory"];

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeCli {
    Load,
    Waveform,
    Readonly,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ResolveCli {
    Shared,
    ByName,
}

/// One `--provision CATEGORY:COUNTER:KIND` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSpec {
    pub category: String,
    pub counter: String,
    pub kind: CounterKind,
}

#[derive(Debug, Parser)]
#[clap(name = "counterbench", version)]
pub struct Cli {
    /// Run mode
    #[clap(long, value_enum)]
    pub mode: Option<ModeCli>,

    /// Concurrent load workers
    #[clap(long)]
    pub workers: Option<usize>,

    /// Load run length in milliseconds
    #[clap(long)]
    pub duration_ms: Option<u64>,

    #[clap(long)]
    pub category: Option<String>,

    /// Category instance; empty selects the default instance
    #[clap(long)]
    pub instance: Option<String>,

    #[clap(long)]
    pub counter: Option<String>,

    /// Waveform ramp and quiet phase length in milliseconds
    #[clap(long)]
    pub phase_ms: Option<u64>,

    /// Waveform repetitions
    #[clap(long)]
    pub repetitions: Option<u32>,

    /// Increments issued during each ramp phase
    #[clap(long)]
    pub counts_per_second: Option<u32>,

    /// Reads taken in readonly mode
    #[clap(long)]
    pub samples: Option<u32>,

    #[clap(long)]
    pub sample_interval_ms: Option<u64>,

    /// How load workers obtain their handle
    #[clap(long, value_enum)]
    pub resolve: Option<ResolveCli>,

    /// Extra counters to provision (repeatable)
    #[clap(long, value_parser = parse_provision)]
    pub provision: Vec<ProvisionSpec>,

    /// Print the report as JSON
    #[clap(long, env = "COUNTERS_JSON")]
    pub json: bool,
}

pub(crate) fn cli_to_mode(m: ModeCli) -> Mode {
    match m {
        ModeCli::Load => Mode::Load,
        ModeCli::Waveform => Mode::Waveform,
        ModeCli::Readonly => Mode::Readonly,
    }
}

pub(crate) fn cli_to_resolve(r: ResolveCli) -> ResolveMode {
    match r {
        ResolveCli::Shared => ResolveMode::Shared,
        ResolveCli::ByName => ResolveMode::ByName,
    }
}

/// Parses `CATEGORY:COUNTER:KIND`; the category may itself contain colons.
pub(crate) fn parse_provision(raw: &str) -> Result<ProvisionSpec, String> {
    let mut parts = raw.rsplitn(3, ':');
    let (Some(kind), Some(counter), Some(category)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected CATEGORY:COUNTER:KIND, got '{raw}'"));
    };
    if category.is_empty() || counter.is_empty() {
        return Err(format!("empty category or counter in '{raw}'"));
    }

    Ok(ProvisionSpec {
        category: category.to_string(),
        counter: counter.to_string(),
        kind: kind.parse().map_err(|e: CounterError| e.to_string())?,
    })
}

/// Environment defaults with command-line overrides on top.
pub(crate) fn build_config(cli: &Cli) -> Result<RunConfig, CounterError> {
    let mut cfg = RunConfig::from_env()?;

    if let Some(m) = cli.mode {
        cfg.mode = cli_to_mode(m);
    }
    if let Some(c) = &cli.category {
        cfg.category = c.clone();
    }
    if let Some(i) = &cli.instance {
        cfg.instance = Some(i.clone()).filter(|i| !i.is_empty());
    }
    if let Some(c) = &cli.counter {
        cfg.counter = c.clone();
    }

    // =========================
    // Load
    // =========================
    if let Some(w) = cli.workers {
        cfg.load.workers = w;
    }
    if let Some(ms) = cli.duration_ms {
        cfg.load.duration = Duration::from_millis(ms);
    }
    if let Some(r) = cli.resolve {
        cfg.load.resolve = cli_to_resolve(r);
    }

    // =========================
    // Waveform
    // =========================
    if let Some(ms) = cli.phase_ms {
        cfg.waveform.phase = Duration::from_millis(ms);
    }
    if let Some(r) = cli.repetitions {
        cfg.waveform.repetitions = r;
    }
    if let Some(c) = cli.counts_per_second {
        cfg.waveform.counts_per_second = c;
    }

    // =========================
    // Sampler
    // =========================
    if let Some(s) = cli.samples {
        cfg.sampler.samples = s;
    }
    if let Some(ms) = cli.sample_interval_ms {
        cfg.sampler.interval = Duration::from_millis(ms);
    }

    Ok(cfg)
}

/// Provisions the stock test categories plus every `--provision` entry,
/// all under the run's instance.
pub(crate) fn provision_backend(
    backend: &InMemoryBackend,
    config: &RunConfig,
    extra: &[ProvisionSpec],
) -> Result<(), CounterError> {
    let instance = config.instance.as_deref();
    let stock = [
        ("TestCounter", CounterKind::NumberOfItems),
        ("TestRate", CounterKind::RateOfCountsPerSecond),
    ];

    for category in DEFAULT_CATEGORIES {
        backend.provision(category, instance, &stock)?;
    }
    for p in extra {
        backend.provision(&p.category, instance, &[(p.counter.as_str(), p.kind)])?;
    }
    Ok(())
}

/// Process exit status for a fatal run error.
pub(crate) fn exit_status(e: &CounterError) -> u8 {
    match e {
        CounterError::NotFound(_) | CounterError::CategoryNotFound { .. } => 2,
        CounterError::Unavailable(_) => 3,
        CounterError::InvalidConfig(_) | CounterError::InvalidKey(_) => 64,
        CounterError::UnknownHandle(_)
        | CounterError::NoBaseCounter(_)
        | CounterError::ReadOnly(_) => 1,
    }
}
