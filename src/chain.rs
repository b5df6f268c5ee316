//! Runtime resolution of chaining tokens.
//!
//! A chaining token reads a value out of an earlier test's snapshot, e.g.
//! `{{createUser.response.body$.id}}` takes the response body recorded for
//! `createUser`, parses it as JSON and evaluates the JSON-path `$.id`
//! against it.
//!
//! Resolution is best effort. A token pointing at a test that has not run
//! yet, or at a value that cannot be extracted, stays in the text verbatim.

use std::sync::LazyLock;

use regex::Captures;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::jsonpath::JsonPath;
use crate::jsonpath::JsonPathError;
use crate::model::Test;
use crate::variables::Value;
use crate::variables::VariableStore;

static CHAIN_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\.?(\$[^{}]*?)\s*\}\}")
        .expect("chaining token pattern is valid")
});

#[derive(Debug, Error)]
pub enum ChainResolutionError {
    #[error("value is not a JSON document: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Query(#[from] JsonPathError),

    #[error("JSON-path result is not a string: {0}")]
    NotAString(serde_json::Value),
}

/// A parsed `{{segments$jsonpath}}` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainToken<'a> {
    /// Text between the braces, used as the memoization key.
    pub key: &'a str,
    /// `segments[0]` is a test name, the rest walk its snapshot.
    pub segments: Vec<&'a str>,
    pub query: &'a str,
}

impl<'a> ChainToken<'a> {
    fn from_captures(caps: &Captures<'a>) -> Option<Self> {
        let whole = caps.get(0)?.as_str();
        let path = caps.get(1)?.as_str();
        let query = caps.get(2)?.as_str();

        Some(Self {
            key: whole[2..whole.len() - 2].trim(),
            segments: path.split('.').collect(),
            query,
        })
    }

    /// Every chaining token in `text`, in order of appearance.
    pub fn find_all(text: &'a str) -> Vec<ChainToken<'a>> {
        CHAIN_TOKEN
            .captures_iter(text)
            .filter_map(|caps| Self::from_captures(&caps))
            .collect()
    }

    /// Resolves the token against the store, memoizing successful lookups.
    pub fn resolve(&self, store: &mut VariableStore) -> Option<String> {
        if let Some(Value::String(value)) = store.get(self.key) {
            return Some(value.clone());
        }

        let test = self.segments[0];
        if !store.contains(test) {
            debug!(token = self.key, test, "referenced test has not run yet");
            return None;
        }

        let Some(Value::String(document)) = store.lookup_path(self.segments.iter().copied())
        else {
            debug!(token = self.key, "token does not point at a recorded string value");
            return None;
        };

        match extract(document, self.query) {
            Ok(value) => {
                debug!(token = self.key, %value, "resolved chaining token");
                store.insert(self.key, value.clone());
                Some(value)
            }
            Err(error) => {
                warn!(token = self.key, "could not resolve chaining token: {error}");
                None
            }
        }
    }
}

/// Parses `document` as JSON and evaluates `query` against it. Only string
/// results can be substituted.
pub fn extract(document: &str, query: &str) -> Result<String, ChainResolutionError> {
    let path: JsonPath = query.parse()?;
    let json: serde_json::Value = serde_json::from_str(document)?;

    match path.select(&json)? {
        serde_json::Value::String(value) => Ok(value),
        other => Err(ChainResolutionError::NotAString(other)),
    }
}

/// Replaces every resolvable chaining token in `text`.
pub fn resolve(text: &str, store: &mut VariableStore) -> String {
    if !text.contains("{{") {
        return text.to_owned();
    }

    CHAIN_TOKEN
        .replace_all(text, |caps: &Captures<'_>| {
            ChainToken::from_captures(caps)
                .and_then(|token| token.resolve(store))
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

/// Resolves the chaining tokens a test depends on right before it runs:
/// string variables, the path, header values and the body.
pub fn resolve_test(test: &mut Test, store: &mut VariableStore) {
    for key in store.string_keys() {
        let Some(value) = store.get(&key).and_then(Value::as_str) else {
            continue;
        };

        if ChainToken::find_all(value).is_empty() {
            continue;
        }

        let value = value.to_owned();
        let resolved = resolve(&value, store);
        if resolved != value {
            store.insert(key, resolved);
        }
    }

    test.path = resolve(&test.path, store);

    for value in test.headers.values_mut() {
        *value = resolve(value, store);
    }

    test.body = resolve(&test.body, store);
}
