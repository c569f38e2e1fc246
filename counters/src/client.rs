use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::backend::CounterBackend;
use crate::cache::HandleCache;
use crate::error::Result;
use crate::model::{CounterHandle, CounterKey};

/// Public counter API: handle resolution through the shared [`HandleCache`],
/// reads and increments straight to the backend.
///
/// Cloning is cheap and every clone shares the same backend and cache.
pub struct CounterClient<B> {
    backend: Arc<B>,
    cache: Arc<HandleCache<B>>,
}

impl<B> Clone for CounterClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<B: CounterBackend> CounterClient<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let cache = Arc::new(HandleCache::new(Arc::clone(&backend)));
        Self { backend, cache }
    }

    /// Resolves every counter of `category` into the cache.
    #[instrument(skip(self), target = "client")]
    pub fn cache_counters(&self, category: &str, instance: Option<&str>) -> Result<()> {
        let names = self.backend.cache_category(category, instance)?;
        for name in &names {
            let key = CounterKey::new(category, instance, name.as_str())?;
            self.cache.resolve(&key)?;
        }
        info!(count = names.len(), "category counters cached");
        Ok(())
    }

    pub fn get_counter_id(
        &self,
        category: &str,
        instance: Option<&str>,
        name: &str,
    ) -> Result<CounterHandle> {
        let key = CounterKey::new(category, instance, name)?;
        self.resolve(&key)
    }

    pub fn resolve(&self, key: &CounterKey) -> Result<CounterHandle> {
        self.cache.resolve(key)
    }

    pub fn next_value(&self, handle: CounterHandle) -> Result<f64> {
        self.backend.read(handle)
    }

    #[inline]
    pub fn increment(&self, handle: CounterHandle) -> Result<()> {
        self.backend.increment(handle)
    }

    pub fn increment_by(&self, handle: CounterHandle, amount: i64) -> Result<()> {
        debug!(%handle, amount, "increment_by");
        self.backend.increment_by(handle, amount)
    }

    pub fn increment_by_with_base(
        &self,
        handle: CounterHandle,
        amount: i64,
        base_amount: i64,
    ) -> Result<()> {
        self.backend
            .increment_by_with_base(handle, amount, base_amount)
    }

    pub fn decrement(&self, handle: CounterHandle) -> Result<()> {
        self.backend.decrement(handle)
    }

    pub fn raw_value(&self, handle: CounterHandle) -> Result<i64> {
        self.backend.raw_value(handle)
    }

    pub fn set_raw_value(&self, handle: CounterHandle, value: i64) -> Result<()> {
        self.backend.set_raw_value(handle, value)
    }

    pub fn cache(&self) -> &HandleCache<B> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}
