use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// A value held by the [`VariableStore`].
///
/// File-declared variables and resolved chaining tokens are plain strings,
/// executed tests are recorded as nested snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Snapshot(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Snapshot(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::String(_) => None,
            Value::Snapshot(map) => map.get(key),
        }
    }

    pub fn snapshot<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Snapshot(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Snapshot(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{json}")
            }
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

/// Variables shared by the request parser, the facit parser and the runner
/// for the duration of one run.
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Follows `segments` from a top level variable down through snapshots.
    pub fn lookup_path<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Option<&Value> {
        let mut segments = segments.into_iter();
        let first = segments.next()?;

        segments.try_fold(self.values.get(first)?, |value, key| value.get(key))
    }

    /// Names of all variables currently holding a plain string.
    pub fn string_keys(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|(_, v)| matches!(v, Value::String(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
