pub mod backend;
pub mod cache;
pub mod client;
pub mod error;
pub mod model;

pub use backend::{CounterBackend, InMemoryBackend};
pub use cache::HandleCache;
pub use client::CounterClient;
pub use error::{CounterError, Result};
pub use model::{CounterHandle, CounterKey, CounterKind};
