use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CounterError;

/// Identity of a counter: category, optional instance and counter name.
///
/// An empty instance string is the same key as no instance at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    category: String,
    instance: Option<String>,
    name: String,
}

impl CounterKey {
    pub fn new(
        category: impl Into<String>,
        instance: Option<&str>,
        name: impl Into<String>,
    ) -> Result<Self, CounterError> {
        let category = category.into();
        let name = name.into();

        if category.is_empty() {
            return Err(CounterError::InvalidKey("missing category name"));
        }
        if name.is_empty() {
            return Err(CounterError::InvalidKey("missing counter name"));
        }

        Ok(Self {
            category,
            instance: normalize_instance(instance).map(str::to_owned),
            name,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}({}):{}", self.category, instance, self.name),
            None => write!(f, "{}:{}", self.category, self.name),
        }
    }
}

/// Treats `Some("")` as the default instance.
pub fn normalize_instance(instance: Option<&str>) -> Option<&str> {
    instance.filter(|i| !i.is_empty())
}

/// Opaque handle issued by a backend for one resolved [`CounterKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterHandle(u32);

impl CounterHandle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CounterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a counter's raw value is turned into the value returned by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterKind {
    /// Reads return the raw value.
    NumberOfItems,
    /// Reads return counts per second since the previous read.
    RateOfCountsPerSecond,
    /// Reads return the raw value divided by an associated base counter.
    AverageCount,
}

impl CounterKind {
    pub fn has_base(self) -> bool {
        matches!(self, CounterKind::AverageCount)
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CounterKind::NumberOfItems => "items",
            CounterKind::RateOfCountsPerSecond => "rate",
            CounterKind::AverageCount => "average",
        };
        f.write_str(s)
    }
}

impl FromStr for CounterKind {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "items" => Ok(CounterKind::NumberOfItems),
            "rate" => Ok(CounterKind::RateOfCountsPerSecond),
            "average" => Ok(CounterKind::AverageCount),
            other => Err(CounterError::InvalidConfig(format!(
                "unknown counter kind '{other}' (expected items, rate or average)"
            ))),
        }
    }
}
