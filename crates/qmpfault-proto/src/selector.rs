//! Processor addressing for memory transactions.
//!
//! The target resolves the CPU issuing a memory access either from its index
//! or from a QOM object path. The two modes are told apart by argument key
//! (`cpu` vs `qom`), so the selector decides the key as well as the value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// CPU issuing a memory transaction.
///
/// Serializes untagged: an integer selects by index, a string by QOM path.
/// Callers pick the representation; it is never coerced into the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CpuSelector {
    /// CPU index (`cpu` argument)
    Index(u64),
    /// QOM path of a CPU object (`qom` argument)
    Path(String),
}

impl CpuSelector {
    /// Argument key the target expects for this addressing mode.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Index(_) => "cpu",
            Self::Path(_) => "qom",
        }
    }

    /// Argument value for this addressing mode.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Index(index) => Value::from(*index),
            Self::Path(path) => Value::from(path.as_str()),
        }
    }
}

impl From<u64> for CpuSelector {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for CpuSelector {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for CpuSelector {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl fmt::Display for CpuSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Path(path) => write!(f, "{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_follows_variant() {
        assert_eq!(CpuSelector::Index(0).key(), "cpu");
        assert_eq!(CpuSelector::from("/machine/cpu[0]").key(), "qom");
    }

    #[test]
    fn numeric_string_stays_a_path() {
        let selector = CpuSelector::from("1");
        assert_eq!(selector.to_value(), Value::from("1"));
    }

    #[test]
    fn deserializes_untagged() {
        let index: CpuSelector = serde_json::from_str("3").unwrap();
        assert_eq!(index, CpuSelector::Index(3));

        let path: CpuSelector = serde_json::from_str("\"/machine/unattached/device[0]\"").unwrap();
        assert_eq!(path, CpuSelector::Path("/machine/unattached/device[0]".to_string()));
    }
}
