use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, instrument, warn};

use crate::backend::CounterBackend;
use crate::error::{CounterError, Result};
use crate::model::{CounterHandle, CounterKey};

/// Lazily populated `CounterKey -> CounterHandle` map shared by every caller.
///
/// Guarantees:
/// - At most one backend lookup is in flight per key; concurrent callers for
///   the same key wait for it and receive its result, success or failure.
/// - The map lock is never held across a backend call, so lookups of
///   different keys proceed independently.
/// - Failed lookups leave no entry behind; the next call retries.
/// - Resolved entries are never evicted.
pub struct HandleCache<B> {
    backend: Arc<B>,
    slots: RwLock<HashMap<CounterKey, Slot>>,
    /// Backend lookups issued, successful or not.
    lookups: AtomicU64,
}

enum Slot {
    Ready(CounterHandle),
    Pending(Arc<Inflight>),
}

/// Result slot for one in-flight lookup.
struct Inflight {
    result: Mutex<Option<Result<CounterHandle>>>,
    done: Condvar,
}

impl Inflight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<CounterHandle> {
        let mut result = self.result.lock();
        loop {
            if let Some(r) = result.as_ref() {
                return r.clone();
            }
            self.done.wait(&mut result);
        }
    }

    fn complete(&self, r: Result<CounterHandle>) {
        *self.result.lock() = Some(r);
        self.done.notify_all();
    }
}

/// Publishes an outcome for the in-flight lookup even if the backend panics.
struct LookupGuard<'a, B> {
    cache: &'a HandleCache<B>,
    key: &'a CounterKey,
    inflight: Arc<Inflight>,
    finished: bool,
}

impl<B> LookupGuard<'_, B> {
    fn finish(mut self, result: &Result<CounterHandle>) {
        self.finished = true;
        self.cache.publish(self.key, &self.inflight, result);
    }
}

impl<B> Drop for LookupGuard<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            let aborted = Err(CounterError::Unavailable(format!(
                "lookup of {} aborted",
                self.key
            )));
            self.cache.publish(self.key, &self.inflight, &aborted);
        }
    }
}

impl<B: CounterBackend> HandleCache<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            slots: RwLock::new(HashMap::new()),
            lookups: AtomicU64::new(0),
        }
    }

    /// Returns the handle for `key`, asking the backend only on a miss.
    pub fn resolve(&self, key: &CounterKey) -> Result<CounterHandle> {
        if let Some(Slot::Ready(handle)) = self.slots.read().get(key) {
            return Ok(*handle);
        }
        self.resolve_slow(key)
    }

    #[instrument(skip(self, key), target = "cache", fields(key = %key))]
    fn resolve_slow(&self, key: &CounterKey) -> Result<CounterHandle> {
        let mut slots = self.slots.write();

        let pending = match slots.get(key) {
            Some(Slot::Ready(handle)) => return Ok(*handle),
            Some(Slot::Pending(inflight)) => Some(Arc::clone(inflight)),
            None => None,
        };

        if let Some(inflight) = pending {
            drop(slots);
            debug!("waiting on in-flight counter lookup");
            return inflight.wait();
        }

        let inflight = Arc::new(Inflight::new());
        slots.insert(key.clone(), Slot::Pending(Arc::clone(&inflight)));
        drop(slots);

        let guard = LookupGuard {
            cache: self,
            key,
            inflight,
            finished: false,
        };

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let result = self.backend.lookup(key);
        guard.finish(&result);

        match &result {
            Ok(handle) => debug!(%handle, "counter handle cached"),
            Err(e) => warn!(error = %e, "counter lookup failed"),
        }
        result
    }

    /// Cached handle for `key`, without contacting the backend.
    pub fn get(&self, key: &CounterKey) -> Option<CounterHandle> {
        match self.slots.read().get(key) {
            Some(Slot::Ready(handle)) => Some(*handle),
            _ => None,
        }
    }

    /// Number of resolved keys.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend lookups issued so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl<B> HandleCache<B> {
    fn publish(&self, key: &CounterKey, inflight: &Inflight, result: &Result<CounterHandle>) {
        {
            let mut slots = self.slots.write();
            match result {
                Ok(handle) => {
                    slots.insert(key.clone(), Slot::Ready(*handle));
                }
                Err(_) => {
                    slots.remove(key);
                }
            }
        }
        inflight.complete(result.clone());
    }
}
