use std::time::Duration;

use common::logger::{phase_span, warn_if_slow};
use counters::{CounterBackend, CounterClient, CounterError, CounterHandle, CounterKey, Result};

const SLOW_WARMUP: Duration = Duration::from_secs(1);

/// Caches the target's category, resolves its handle and reads its value.
///
/// Backend calls block, so they run on the blocking pool rather than on the
/// driver's task. `label` names the warm-up in slow-operation warnings.
pub(crate) async fn warm_up<B: CounterBackend>(
    label: &'static str,
    client: &CounterClient<B>,
    target: &CounterKey,
) -> Result<(CounterHandle, f64)> {
    let client = client.clone();
    let target = target.clone();
    let span = phase_span("warmup");

    let task = tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            client.cache_counters(target.category(), target.instance())?;
            let handle = client.resolve(&target)?;
            let value = client.next_value(handle)?;
            Ok::<_, CounterError>((handle, value))
        })
    });

    warn_if_slow(label, SLOW_WARMUP, task)
        .await
        .map_err(|e| CounterError::Unavailable(format!("warm-up task failed: {e}")))?
}
