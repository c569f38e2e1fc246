use std::time::Duration;

use tracing::{Span, field};

use super::RunId;

/// Root span for one run (load, waveform or readonly).
pub fn run_span(mode: &'static str, run_id: &RunId) -> Span {
    tracing::info_span!(
        "run",
        mode = %mode,
        run_id = %run_id,
        counter = field::Empty
    )
}

/// Child span for a named phase of a run; inherits the run id from its parent.
pub fn phase_span(name: &'static str) -> Span {
    tracing::info_span!("phase", name = %name)
}

/// Awaits `fut` and emits a `performance` warning when it took longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn warn_if_slow_returns_inner_output() {
        let out = warn_if_slow("noop", Duration::from_secs(1), async { 41 + 1 }).await;
        assert_eq!(out, 42);
    }

    #[test]
    fn spans_can_be_built_without_subscriber() {
        let id = RunId::new();
        let root = run_span("load", &id);
        let _enter = root.enter();
        let child = phase_span("warmup");
        child.in_scope(|| tracing::debug!("inside phase"));
    }
}
