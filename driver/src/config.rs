use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use counters::{CounterError, CounterKey, Result};
use serde::Serialize;

/// What a run does with the target counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Saturate the counter from many workers and report throughput.
    Load,
    /// Drive a sawtooth pattern of paced increments.
    Waveform,
    /// Periodically read the counter without changing it.
    Readonly,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Load => "load",
            Mode::Waveform => "waveform",
            Mode::Readonly => "readonly",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "load" => Ok(Mode::Load),
            "waveform" => Ok(Mode::Waveform),
            "readonly" => Ok(Mode::Readonly),
            other => Err(CounterError::InvalidConfig(format!(
                "unknown mode '{other}' (expected load, waveform or readonly)"
            ))),
        }
    }
}

/// How load workers obtain the handle they increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMode {
    /// Resolve once during warm-up; every worker reuses that handle.
    Shared,
    /// Resolve by name through the handle cache on every increment.
    ByName,
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolveMode::Shared => "shared",
            ResolveMode::ByName => "by-name",
        };
        f.write_str(s)
    }
}

impl FromStr for ResolveMode {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" => Ok(ResolveMode::Shared),
            "by-name" => Ok(ResolveMode::ByName),
            other => Err(CounterError::InvalidConfig(format!(
                "unknown resolve mode '{other}' (expected shared or by-name)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Number of concurrent workers. Must be at least one.
    pub workers: usize,
    /// Wall-clock time between starting the workers and signalling them to stop.
    pub duration: Duration,
    pub resolve: ResolveMode,
}

impl LoadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CounterError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.duration.is_zero() {
            return Err(CounterError::InvalidConfig(
                "run duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sawtooth parameters: each repetition is one ramp phase followed by one
/// quiet phase of the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformConfig {
    pub phase: Duration,
    pub repetitions: u32,
    /// Increments issued during each ramp phase.
    pub counts_per_second: u32,
}

impl WaveformConfig {
    /// Gap between two increments of a ramp.
    pub fn spacing(&self) -> Duration {
        if self.counts_per_second == 0 {
            return Duration::ZERO;
        }
        self.phase / self.counts_per_second
    }

    pub fn validate(&self) -> Result<()> {
        if self.phase.is_zero() {
            return Err(CounterError::InvalidConfig(
                "phase time must be greater than zero".to_string(),
            ));
        }
        if self.repetitions == 0 {
            return Err(CounterError::InvalidConfig(
                "repetitions must be at least 1".to_string(),
            ));
        }
        if self.counts_per_second == 0 {
            return Err(CounterError::InvalidConfig(
                "counts per second must be at least 1".to_string(),
            ));
        }
        if self.spacing().is_zero() {
            return Err(CounterError::InvalidConfig(format!(
                "{} counts do not fit in a {:?} phase",
                self.counts_per_second, self.phase
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerConfig {
    pub samples: u32,
    pub interval: Duration,
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(CounterError::InvalidConfig(
                "sample count must be at least 1".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(CounterError::InvalidConfig(
                "sample interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable snapshot of one run's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub mode: Mode,

    // =========================
    // Target counter
    // =========================
    pub category: String,
    /// `None` (or empty) selects the category's default instance.
    pub instance: Option<String>,
    pub counter: String,

    pub load: LoadConfig,
    pub waveform: WaveformConfig,
    pub sampler: SamplerConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Load,
            category: "Freemansoft.JavaTestCategory".to_string(),
            instance: None,
            counter: "TestRate".to_string(),
            load: LoadConfig {
                workers: 2,
                duration: Duration::from_secs(10),
                resolve: ResolveMode::Shared,
            },
            // 200 increments spread over 2 s, then 2 s quiet, 20 times.
            waveform: WaveformConfig {
                phase: Duration::from_millis(2_000),
                repetitions: 20,
                counts_per_second: 200,
            },
            sampler: SamplerConfig {
                samples: 20,
                interval: Duration::from_millis(100),
            },
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `COUNTERS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        Ok(Self {
            mode: env_or("COUNTERS_MODE", d.mode)?,
            category: env_or("COUNTERS_CATEGORY", d.category)?,
            instance: std::env::var("COUNTERS_INSTANCE")
                .ok()
                .filter(|i| !i.is_empty()),
            counter: env_or("COUNTERS_COUNTER", d.counter)?,
            load: LoadConfig {
                workers: env_or("COUNTERS_WORKERS", d.load.workers)?,
                duration: env_millis_or("COUNTERS_DURATION_MS", d.load.duration)?,
                resolve: env_or("COUNTERS_RESOLVE", d.load.resolve)?,
            },
            waveform: WaveformConfig {
                phase: env_millis_or("COUNTERS_PHASE_MS", d.waveform.phase)?,
                repetitions: env_or("COUNTERS_REPETITIONS", d.waveform.repetitions)?,
                counts_per_second: env_or(
                    "COUNTERS_COUNTS_PER_SECOND",
                    d.waveform.counts_per_second,
                )?,
            },
            sampler: SamplerConfig {
                samples: env_or("COUNTERS_SAMPLES", d.sampler.samples)?,
                interval: env_millis_or("COUNTERS_SAMPLE_INTERVAL_MS", d.sampler.interval)?,
            },
        })
    }

    /// Target counter key; fails with `InvalidKey` on empty names.
    pub fn target(&self) -> Result<CounterKey> {
        CounterKey::new(
            self.category.as_str(),
            self.instance.as_deref(),
            self.counter.as_str(),
        )
    }

    /// Checks the target and the section used by the selected mode.
    pub fn validate(&self) -> Result<()> {
        self.target()?;
        match self.mode {
            Mode::Load => self.load.validate(),
            Mode::Waveform => self.waveform.validate(),
            Mode::Readonly => self.sampler.validate(),
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| CounterError::InvalidConfig(format!("{name}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_millis_or(name: &str, default: Duration) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    env_or(name, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(phase_ms: u64, repetitions: u32, counts: u32) -> WaveformConfig {
        WaveformConfig {
            phase: Duration::from_millis(phase_ms),
            repetitions,
            counts_per_second: counts,
        }
    }

    #[test]
    fn defaults_are_valid_for_every_mode() {
        for mode in [Mode::Load, Mode::Waveform, Mode::Readonly] {
            let cfg = RunConfig {
                mode,
                ..RunConfig::default()
            };
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn zero_workers_is_invalid() {
        let mut cfg = RunConfig::default();
        cfg.load.workers = 0;
        assert!(matches!(cfg.validate(), Err(CounterError::InvalidConfig(_))));
    }

    #[test]
    fn validation_only_checks_the_selected_mode() {
        let mut cfg = RunConfig::default();
        cfg.load.workers = 0;
        cfg.mode = Mode::Waveform;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn waveform_spacing_and_limits() {
        assert_eq!(waveform(100, 3, 10).spacing(), Duration::from_millis(10));
        assert_eq!(
            waveform(2_000, 20, 200).spacing(),
            Duration::from_millis(10)
        );

        assert!(waveform(0, 3, 10).validate().is_err());
        assert!(waveform(100, 0, 10).validate().is_err());
        assert!(waveform(100, 3, 0).validate().is_err());

        let too_dense = WaveformConfig {
            phase: Duration::from_nanos(5),
            repetitions: 1,
            counts_per_second: 10,
        };
        assert!(too_dense.validate().is_err());
    }

    #[test]
    fn empty_counter_name_is_rejected() {
        let cfg = RunConfig {
            counter: String::new(),
            ..RunConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CounterError::InvalidKey(_))));
    }

    #[test]
    fn empty_instance_targets_default_instance() {
        let cfg = RunConfig {
            instance: Some(String::new()),
            ..RunConfig::default()
        };
        assert_eq!(cfg.target().unwrap().instance(), None);
    }

    #[test]
    fn mode_and_resolve_parse() {
        assert_eq!("waveform".parse::<Mode>().unwrap(), Mode::Waveform);
        assert_eq!("by-name".parse::<ResolveMode>().unwrap(), ResolveMode::ByName);
        assert!("burst".parse::<Mode>().is_err());
    }
}
