use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation shared by a driver and its workers.
///
/// Workers poll it between iterations; an in-flight backend call always
/// completes before a worker notices.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals every clone at once. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Guard that cancels this signal when dropped, so workers never
    /// outlive an abandoned driver future.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

#[must_use = "the signal is cancelled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CancelOnDrop(CancelSignal);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_broadcasts_to_clones() {
        let signal = CancelSignal::new();
        let worker_view = signal.clone();
        assert!(!worker_view.is_cancelled());

        signal.cancel();
        signal.cancel();

        assert!(worker_view.is_cancelled());
    }

    #[test]
    fn guard_cancels_on_drop() {
        let signal = CancelSignal::new();
        let guard = signal.drop_guard();
        assert!(!signal.is_cancelled());

        drop(guard);
        assert!(signal.is_cancelled());
    }
}
