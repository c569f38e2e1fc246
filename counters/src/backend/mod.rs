//! Counter storage the client talks to.
//!
//! The trait is synchronous: counter publication is a blocking native call
//! on every real platform, and keeping it free of boxed futures keeps the
//! increment path allocation-free.

mod memory;

pub use memory::InMemoryBackend;

use crate::error::Result;
use crate::model::{CounterHandle, CounterKey};

pub trait CounterBackend: Send + Sync + 'static {
    /// Resolves a key to a handle. Fails with `NotFound` if the counter is not provisioned.
    fn lookup(&self, key: &CounterKey) -> Result<CounterHandle>;

    /// Loads a category and returns the names of the counters it holds.
    /// Fails with `CategoryNotFound` if the category does not exist.
    fn cache_category(&self, category: &str, instance: Option<&str>) -> Result<Vec<String>>;

    /// Reads the calculated value of a counter.
    fn read(&self, handle: CounterHandle) -> Result<f64>;

    fn increment(&self, handle: CounterHandle) -> Result<()>;

    fn increment_by(&self, handle: CounterHandle, amount: i64) -> Result<()>;

    /// Adds `amount` to the counter and `base_amount` to its base counter.
    fn increment_by_with_base(
        &self,
        handle: CounterHandle,
        amount: i64,
        base_amount: i64,
    ) -> Result<()>;

    fn decrement(&self, handle: CounterHandle) -> Result<()>;

    fn raw_value(&self, handle: CounterHandle) -> Result<i64>;

    fn set_raw_value(&self, handle: CounterHandle, value: i64) -> Result<()>;
}
