use thiserror::Error;

use crate::model::{CounterHandle, CounterKey};

pub type Result<T, E = CounterError> = std::result::Result<T, E>;

/// Failures surfaced by the counter client and its backends.
///
/// `Clone` so that one failed in-flight lookup can be handed to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CounterError {
    #[error("counter not provisioned: {0}")]
    NotFound(CounterKey),

    #[error("counter category not provisioned: {category}{}", instance_suffix(.instance))]
    CategoryNotFound {
        category: String,
        instance: Option<String>,
    },

    #[error("counter backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid counter key: {0}")]
    InvalidKey(&'static str),

    #[error("counter handle {0} was not issued by this backend")]
    UnknownHandle(CounterHandle),

    #[error("counter {0} has no base counter")]
    NoBaseCounter(CounterKey),

    #[error("counter {0} is read-only")]
    ReadOnly(CounterKey),
}

fn instance_suffix(instance: &Option<String>) -> String {
    match instance {
        Some(i) => format!("({i})"),
        None => String::new(),
    }
}

impl CounterError {
    /// True for both a missing counter and a missing category.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CounterError::NotFound(_) | CounterError::CategoryNotFound { .. }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CounterError::Unavailable(_))
    }

    /// One-line hint shown to the operator next to a fatal error.
    pub fn remediation(&self) -> &'static str {
        match self {
            CounterError::NotFound(_) | CounterError::CategoryNotFound { .. } => {
                "provision the counter category and counters before running"
            }
            CounterError::Unavailable(_) => {
                "the counter backend session is gone; restart it and rerun"
            }
            CounterError::InvalidConfig(_) | CounterError::InvalidKey(_) => {
                "fix the run parameters and rerun"
            }
            CounterError::UnknownHandle(_) => {
                "resolve the counter through get_counter_id before using its handle"
            }
            CounterError::NoBaseCounter(_) => {
                "use increment_by_with_base only on counters provisioned with a base"
            }
            CounterError::ReadOnly(_) => "read-only counters can be read but never written",
        }
    }
}
