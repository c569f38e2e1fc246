pub mod cancel;
pub mod config;
pub mod load;
pub mod report;
pub mod sampler;
pub mod waveform;
mod warmup;

pub use cancel::{CancelOnDrop, CancelSignal};
pub use config::{LoadConfig, Mode, ResolveMode, RunConfig, SamplerConfig, WaveformConfig};
pub use load::{LoadDriver, LoadReport, PhaseTimings, WorkerOutcome, WorkerStats};
pub use report::{RunReport, execute};
pub use sampler::{ReadSampler, Sample, SampleReport};
pub use waveform::{WaveformGenerator, WaveformReport};
