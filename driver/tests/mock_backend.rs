use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::time::Instant;

use counters::{CounterBackend, CounterError, CounterHandle, CounterKey, Result};

/// Backend fake that counts calls and can lose its session after a number
/// of successful increments.
#[derive(Default)]
pub struct MockBackend {
    keys: Vec<CounterKey>,
    pub lookups: Mutex<HashMap<CounterKey, usize>>,
    /// Every call, successful or not.
    pub calls: AtomicU64,
    /// Successful increments only.
    pub increments: AtomicU64,
    /// Session is lost once this many increments succeeded.
    pub fail_after: Option<u64>,
    /// When set, the time of every successful increment is recorded.
    pub record_times: bool,
    pub times: Mutex<Vec<Instant>>,
    /// Thread each lookup ran on.
    pub lookup_threads: Mutex<Vec<ThreadId>>,
}

impl MockBackend {
    pub fn new(keys: Vec<CounterKey>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }

    pub fn failing_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn recording_times(mut self) -> Self {
        self.record_times = true;
        self
    }

    pub fn increments(&self) -> u64 {
        self.increments.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn lookups_for(&self, key: &CounterKey) -> usize {
        self.lookups.lock().get(key).copied().unwrap_or(0)
    }

    fn unavailable() -> CounterError {
        CounterError::Unavailable("mock session lost".into())
    }

    fn session_lost(&self) -> bool {
        self.fail_after
            .is_some_and(|limit| self.increments.load(Ordering::SeqCst) >= limit)
    }
}

impl CounterBackend for MockBackend {
    fn lookup(&self, key: &CounterKey) -> Result<CounterHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.lookups.lock().entry(key.clone()).or_default() += 1;
        self.lookup_threads.lock().push(thread::current().id());

        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| CounterHandle::new(i as u32))
            .ok_or_else(|| CounterError::NotFound(key.clone()))
    }

    fn cache_category(&self, category: &str, instance: Option<&str>) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let names: Vec<String> = self
            .keys
            .iter()
            .filter(|k| k.category() == category && k.instance() == instance.filter(|i| !i.is_empty()))
            .map(|k| k.name().to_string())
            .collect();

        if names.is_empty() {
            return Err(CounterError::CategoryNotFound {
                category: category.to_string(),
                instance: instance.map(str::to_string),
            });
        }
        Ok(names)
    }

    fn read(&self, _: CounterHandle) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.session_lost() {
            return Err(Self::unavailable());
        }
        Ok(self.increments() as f64)
    }

    fn increment(&self, _: CounterHandle) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.fail_after {
            Some(limit) => {
                let mut current = self.increments.load(Ordering::SeqCst);
                loop {
                    if current >= limit {
                        return Err(Self::unavailable());
                    }
                    match self.increments.compare_exchange(
                        current,
                        current + 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
            }
            None => {
                self.increments.fetch_add(1, Ordering::SeqCst);
            }
        }

        if self.record_times {
            self.times.lock().push(Instant::now());
        }
        Ok(())
    }

    fn increment_by(&self, handle: CounterHandle, _: i64) -> Result<()> {
        self.increment(handle)
    }

    fn increment_by_with_base(&self, handle: CounterHandle, _: i64, _: i64) -> Result<()> {
        self.increment(handle)
    }

    fn decrement(&self, _: CounterHandle) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn raw_value(&self, _: CounterHandle) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.increments() as i64)
    }

    fn set_raw_value(&self, _: CounterHandle, _: i64) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
