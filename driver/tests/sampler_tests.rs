use std::sync::Arc;
use std::time::Duration;

use counters::{CounterClient, CounterKey};
use driver::{ReadSampler, SamplerConfig};

mod mock_backend;
use mock_backend::MockBackend;

fn key() -> CounterKey {
    CounterKey::new("Freemansoft.JavaTestCategory", None, "TestCounter").unwrap()
}

fn sampler(backend: &Arc<MockBackend>, samples: u32) -> ReadSampler<MockBackend> {
    ReadSampler::new(
        CounterClient::new(Arc::clone(backend)),
        key(),
        SamplerConfig {
            samples,
            interval: Duration::from_millis(100),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn samples_are_taken_one_interval_apart() -> anyhow::Result<()> {
    let backend = Arc::new(MockBackend::new(vec![key()]));
    let report = sampler(&backend, 4).run().await?;

    let offsets: Vec<Duration> = report.samples.iter().map(|s| s.at).collect();
    assert_eq!(
        offsets,
        (0..4u64)
            .map(|i| Duration::from_millis(i * 100))
            .collect::<Vec<_>>()
    );
    assert_eq!(backend.increments(), 0);
    Ok(())
}

#[tokio::test]
async fn warm_up_runs_on_the_blocking_pool() -> anyhow::Result<()> {
    let backend = Arc::new(MockBackend::new(vec![key()]));
    sampler(&backend, 1).run().await?;

    let driver_thread = std::thread::current().id();
    let threads = backend.lookup_threads.lock().clone();
    assert!(!threads.is_empty());
    assert!(threads.iter().all(|t| *t != driver_thread));
    Ok(())
}
