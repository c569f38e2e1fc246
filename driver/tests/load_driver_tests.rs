use std::sync::Arc;
use std::time::Duration;

use counters::{CounterClient, CounterError, CounterKey};
use driver::{LoadConfig, LoadDriver, ResolveMode, WorkerOutcome};

mod mock_backend;
use mock_backend::MockBackend;

const CATEGORY: &str = "Freemansoft.JavaTestCategory";

fn key(name: &str) -> CounterKey {
    CounterKey::new(CATEGORY, None, name).unwrap()
}

fn backend() -> MockBackend {
    MockBackend::new(vec![key("TestCounter"), key("TestRate")])
}

fn config(workers: usize, millis: u64, resolve: ResolveMode) -> LoadConfig {
    LoadConfig {
        workers,
        duration: Duration::from_millis(millis),
        resolve,
    }
}

fn driver(backend: &Arc<MockBackend>, cfg: LoadConfig) -> LoadDriver<MockBackend> {
    LoadDriver::new(CounterClient::new(Arc::clone(backend)), key("TestRate"), cfg)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_counts_sum_to_backend_increments() -> anyhow::Result<()> {
    let backend = Arc::new(backend());
    let report = driver(&backend, config(4, 100, ResolveMode::Shared))
        .run()
        .await?;

    assert_eq!(report.workers.len(), 4);
    assert!(report.total_increments > 0);
    assert_eq!(report.total_increments, backend.increments());
    assert_eq!(report.total_failures, 0);
    assert!(
        report
            .workers
            .iter()
            .all(|w| w.outcome == WorkerOutcome::Cancelled)
    );

    // Warm-up resolved each counter once; workers never looked anything up.
    assert_eq!(backend.lookups_for(&key("TestRate")), 1);
    Ok(())
}

#[tokio::test]
async fn zero_workers_fails_fast_without_backend_calls() {
    let backend = Arc::new(backend());
    let err = driver(&backend, config(0, 100, ResolveMode::Shared))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, CounterError::InvalidConfig(_)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_loss_keeps_partial_counts() -> anyhow::Result<()> {
    let backend = Arc::new(backend().failing_after(1_000));
    let report = driver(&backend, config(4, 200, ResolveMode::Shared))
        .run()
        .await?;

    assert_eq!(report.total_increments, 1_000);
    assert_eq!(report.total_increments, backend.increments());
    assert!(report.total_failures >= 1);

    for w in &report.workers {
        match &w.outcome {
            WorkerOutcome::Failed { error } => {
                assert_eq!(w.failures, 1);
                assert!(error.contains("unavailable"));
            }
            WorkerOutcome::Cancelled => assert_eq!(w.failures, 0),
            WorkerOutcome::Panicked => panic!("worker {} panicked", w.worker_id),
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn by_name_workers_resolve_through_the_cache() -> anyhow::Result<()> {
    let backend = Arc::new(backend());
    let report = driver(&backend, config(3, 50, ResolveMode::ByName))
        .run()
        .await?;

    assert_eq!(report.resolve, ResolveMode::ByName);
    assert_eq!(report.total_increments, backend.increments());
    assert_eq!(backend.lookups_for(&key("TestRate")), 1);
    Ok(())
}

#[tokio::test]
async fn unprovisioned_target_fails_during_warmup() {
    let backend = Arc::new(backend());
    let err = LoadDriver::new(
        CounterClient::new(Arc::clone(&backend)),
        key("Missing"),
        config(2, 50, ResolveMode::Shared),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err, CounterError::NotFound(key("Missing")));
    assert_eq!(backend.increments(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn report_exposes_phase_timings() -> anyhow::Result<()> {
    let backend = Arc::new(backend());
    let report = driver(&backend, config(2, 50, ResolveMode::Shared))
        .run()
        .await?;

    assert!(report.timings.run >= Duration::from_millis(50));
    assert!(report.throughput_per_sec > 0.0);

    let text = report.to_string();
    assert!(text.contains("All workers stopped in"));
    assert!(text.contains(&format!("2 workers incremented {} times", report.total_increments)));

    let json = serde_json::to_value(&report)?;
    assert!(json["timings"]["run"].as_f64().unwrap_or_default() >= 50.0);
    assert_eq!(json["workers"][0]["outcome"]["kind"], "cancelled");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_a_run_stops_its_workers() -> anyhow::Result<()> {
    let backend = Arc::new(backend());
    let driver = driver(&backend, config(2, 30_000, ResolveMode::Shared));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), driver.run()).await;
    assert!(abandoned.is_err());

    // Workers stop at their next cancellation check.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = backend.increments();
    assert!(settled > 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.increments(), settled);
    Ok(())
}
