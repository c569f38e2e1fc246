use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::CounterBackend;
use crate::error::{CounterError, Result};
use crate::model::{CounterHandle, CounterKey, CounterKind, normalize_instance};

const DEFAULT_CAPACITY: usize = 1024;

/// In-process counter backend.
///
/// Categories and counters must be provisioned before they can be looked up,
/// mirroring an OS counter registry. Counter cells live in a fixed table of
/// write-once slots, so reads and increments never take a lock.
pub struct InMemoryBackend {
    /// (category, instance) -> counter name -> handle. Also serialises provisioning.
    categories: RwLock<HashMap<CategoryId, HashMap<String, CounterHandle>>>,
    /// Indexed by `CounterHandle::raw()`.
    cells: Box<[OnceCell<CounterCell>]>,
    /// Slots handed out so far; only advanced under the `categories` write lock.
    provisioned: AtomicUsize,
    closed: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CategoryId {
    category: String,
    instance: Option<String>,
}

impl CategoryId {
    fn new(category: &str, instance: Option<&str>) -> Self {
        Self {
            category: category.to_owned(),
            instance: normalize_instance(instance).map(str::to_owned),
        }
    }
}

struct CounterCell {
    key: CounterKey,
    kind: CounterKind,
    read_only: bool,
    raw: AtomicI64,
    base: Option<AtomicI64>,
    /// Previous (raw, time) pair for rate reads.
    last_sample: Mutex<Option<(i64, Instant)>>,
}

impl CounterCell {
    fn new(key: CounterKey, kind: CounterKind, read_only: bool) -> Self {
        Self {
            key,
            kind,
            read_only,
            raw: AtomicI64::new(0),
            base: kind.has_base().then(|| AtomicI64::new(0)),
            last_sample: Mutex::new(None),
        }
    }

    fn writable(&self) -> Result<&Self> {
        if self.read_only {
            return Err(CounterError::ReadOnly(self.key.clone()));
        }
        Ok(self)
    }

    fn next_value(&self) -> f64 {
        let raw = self.raw.load(Ordering::Acquire);
        match self.kind {
            CounterKind::NumberOfItems => raw as f64,
            CounterKind::RateOfCountsPerSecond => {
                let now = Instant::now();
                let mut last = self.last_sample.lock();
                let value = match *last {
                    Some((prev_raw, prev_at)) => {
                        let secs = now.duration_since(prev_at).as_secs_f64();
                        if secs > 0.0 {
                            (raw - prev_raw) as f64 / secs
                        } else {
                            0.0
                        }
                    }
                    None => 0.0,
                };
                *last = Some((raw, now));
                value
            }
            CounterKind::AverageCount => {
                let base = self
                    .base
                    .as_ref()
                    .map(|b| b.load(Ordering::Acquire))
                    .unwrap_or(0);
                if base == 0 { 0.0 } else { raw as f64 / base as f64 }
            }
        }
    }

    /// Adds to the raw value and, when the counter has one, to its base.
    fn add(&self, amount: i64, base_amount: i64) {
        self.raw.fetch_add(amount, Ordering::AcqRel);
        if let Some(base) = &self.base {
            base.fetch_add(base_amount, Ordering::AcqRel);
        }
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Backend able to hold at most `capacity` counters.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            categories: RwLock::new(HashMap::new()),
            cells: (0..capacity).map(|_| OnceCell::new()).collect(),
            provisioned: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a category (if needed) and registers writable `counters` in it.
    ///
    /// Re-provisioning an existing counter keeps its handle, value and access.
    pub fn provision(
        &self,
        category: &str,
        instance: Option<&str>,
        counters: &[(&str, CounterKind)],
    ) -> Result<()> {
        self.provision_with(category, instance, counters, false)
    }

    /// Registers counters that can be read but never written, like OS system counters.
    pub fn provision_read_only(
        &self,
        category: &str,
        instance: Option<&str>,
        counters: &[(&str, CounterKind)],
    ) -> Result<()> {
        self.provision_with(category, instance, counters, true)
    }

    fn provision_with(
        &self,
        category: &str,
        instance: Option<&str>,
        counters: &[(&str, CounterKind)],
        read_only: bool,
    ) -> Result<()> {
        let id = CategoryId::new(category, instance);
        let mut categories = self.categories.write();
        let names = categories.entry(id).or_default();

        for (name, kind) in counters {
            if names.contains_key(*name) {
                continue;
            }
            let key = CounterKey::new(category, instance, *name)?;

            let slot = self.provisioned.load(Ordering::Acquire);
            let raw = u32::try_from(slot)
                .ok()
                .filter(|_| slot < self.cells.len())
                .ok_or_else(|| {
                    CounterError::InvalidConfig(format!(
                        "counter table full ({} counters)",
                        self.cells.len()
                    ))
                })?;
            if self.cells[slot]
                .set(CounterCell::new(key, *kind, read_only))
                .is_err()
            {
                return Err(CounterError::InvalidConfig(format!(
                    "counter slot {slot} already taken"
                )));
            }
            self.provisioned.store(slot + 1, Ordering::Release);

            let handle = CounterHandle::new(raw);
            names.insert((*name).to_string(), handle);

            debug!(%handle, category, counter = *name, %kind, read_only, "counter provisioned");
        }

        info!(category, count = names.len(), "category provisioned");
        Ok(())
    }

    /// Tears the session down; every later call fails with `Unavailable`.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            warn!("counter backend session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CounterError::Unavailable(
                "in-memory backend has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    /// Lock-free: a filled slot is never replaced.
    #[inline]
    fn cell(&self, handle: CounterHandle) -> Result<&CounterCell> {
        self.ensure_open()?;
        self.cells
            .get(handle.raw() as usize)
            .and_then(OnceCell::get)
            .ok_or(CounterError::UnknownHandle(handle))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterBackend for InMemoryBackend {
    fn lookup(&self, key: &CounterKey) -> Result<CounterHandle> {
        self.ensure_open()?;
        let id = CategoryId::new(key.category(), key.instance());
        self.categories
            .read()
            .get(&id)
            .and_then(|names| names.get(key.name()))
            .copied()
            .ok_or_else(|| CounterError::NotFound(key.clone()))
    }

    fn cache_category(&self, category: &str, instance: Option<&str>) -> Result<Vec<String>> {
        self.ensure_open()?;
        let id = CategoryId::new(category, instance);
        let categories = self.categories.read();
        let names = categories
            .get(&id)
            .ok_or_else(|| CounterError::CategoryNotFound {
                category: id.category.clone(),
                instance: id.instance.clone(),
            })?;

        let mut out: Vec<String> = names.keys().cloned().collect();
        out.sort();
        Ok(out)
    }

    fn read(&self, handle: CounterHandle) -> Result<f64> {
        Ok(self.cell(handle)?.next_value())
    }

    fn increment(&self, handle: CounterHandle) -> Result<()> {
        self.cell(handle)?.writable()?.add(1, 1);
        Ok(())
    }

    fn increment_by(&self, handle: CounterHandle, amount: i64) -> Result<()> {
        self.cell(handle)?.writable()?.add(amount, 1);
        Ok(())
    }

    fn increment_by_with_base(
        &self,
        handle: CounterHandle,
        amount: i64,
        base_amount: i64,
    ) -> Result<()> {
        let cell = self.cell(handle)?.writable()?;
        if cell.base.is_none() {
            return Err(CounterError::NoBaseCounter(cell.key.clone()));
        }
        cell.add(amount, base_amount);
        Ok(())
    }

    /// Lowers the value by one and, like every sample, raises the base by one.
    fn decrement(&self, handle: CounterHandle) -> Result<()> {
        self.cell(handle)?.writable()?.add(-1, 1);
        Ok(())
    }

    fn raw_value(&self, handle: CounterHandle) -> Result<i64> {
        Ok(self.cell(handle)?.raw.load(Ordering::Acquire))
    }

    fn set_raw_value(&self, handle: CounterHandle, value: i64) -> Result<()> {
        self.cell(handle)?
            .writable()?
            .raw
            .store(value, Ordering::Release);
        Ok(())
    }
}
