use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Identifier of a persisted record.
///
/// Storage adapters are free to use integer or string identifiers (the
/// filesystem layout uses slugs such as `"john-doe"`, document stores use
/// generated keys). Both forms are kept as-is: `Int(1)` and `Str("1")` are
/// different identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Int(i64),
    Str(String),
}

impl EntryId {
    /// Generate a fresh, time-ordered identifier (UUID v7).
    pub fn generate() -> Self {
        Self::Str(uuid::Uuid::now_v7().to_string())
    }

    /// Read an identifier from a raw value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// Same as [`EntryId::from_value`] but reports why the value was rejected.
    pub fn try_from_value(value: &Value) -> Result<Self, TypeError> {
        Self::from_value(value).ok_or_else(|| TypeError::InvalidId(value.to_string()))
    }

    /// The raw value written back into records and conditions.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::String(s.clone()),
        }
    }

    /// The string form, if this is a string identifier.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntryId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EntryId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<EntryId> for Value {
    fn from(id: EntryId) -> Self {
        id.to_value()
    }
}
