//! A small JSON-path evaluator covering what chaining tokens need:
//! `$`, `.key`, `['key']`, `[0]`, `[-1]` and the `*` wildcard.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Key(String),
    Index(i64),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    selectors: Vec<Selector>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JsonPathError {
    #[error("JSON-path `{0}` must start with `$`")]
    MissingRoot(String),

    #[error("unexpected `{found}` at position {position} in JSON-path `{query}`")]
    Unexpected {
        query: String,
        position: usize,
        found: char,
    },

    #[error("JSON-path `{0}` ends unexpectedly")]
    UnexpectedEnd(String),

    #[error("invalid array index `{index}` in JSON-path `{query}`")]
    InvalidIndex { query: String, index: String },

    #[error("JSON-path `{0}` matched nothing")]
    NoMatch(String),
}

impl FromStr for JsonPath {
    type Err = JsonPathError;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        let query = query.trim();
        let mut chars = query.char_indices().peekable();

        if !matches!(chars.next(), Some((_, '$'))) {
            return Err(JsonPathError::MissingRoot(query.to_owned()));
        }

        let mut selectors = vec![];
        while let Some((position, c)) = chars.next() {
            let selector = match c {
                '.' => dot_selector(query, &mut chars)?,
                '[' => bracket_selector(query, &mut chars)?,
                found => {
                    return Err(JsonPathError::Unexpected {
                        query: query.to_owned(),
                        position,
                        found,
                    });
                }
            };
            selectors.push(selector);
        }

        Ok(Self {
            source: query.to_owned(),
            selectors,
        })
    }
}

fn dot_selector(
    query: &str,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<Selector, JsonPathError> {
    if chars.next_if(|(_, c)| *c == '*').is_some() {
        return Ok(Selector::Wildcard);
    }

    let mut key = String::new();
    while let Some((_, c)) = chars.next_if(|(_, c)| *c != '.' && *c != '[') {
        key.push(c);
    }

    if !key.is_empty() {
        return Ok(Selector::Key(key));
    }

    match chars.peek() {
        Some(&(position, found)) => Err(JsonPathError::Unexpected {
            query: query.to_owned(),
            position,
            found,
        }),
        None => Err(JsonPathError::UnexpectedEnd(query.to_owned())),
    }
}

fn bracket_selector(
    query: &str,
    chars: &mut Peekable<CharIndices<'_>>,
) -> Result<Selector, JsonPathError> {
    let mut content = String::new();
    let mut quote = None;

    loop {
        let Some((_, c)) = chars.next() else {
            return Err(JsonPathError::UnexpectedEnd(query.to_owned()));
        };

        match (quote, c) {
            (None, ']') => break,
            (None, '\'' | '"') if content.trim().is_empty() => {
                content.clear();
                quote = Some(c);
            }
            (None, _) => content.push(c),
            (Some(q), c) if c == q => {
                // closing quote must be followed by `]`
                return match chars.next() {
                    Some((_, ']')) => Ok(Selector::Key(content)),
                    Some((position, found)) => Err(JsonPathError::Unexpected {
                        query: query.to_owned(),
                        position,
                        found,
                    }),
                    None => Err(JsonPathError::UnexpectedEnd(query.to_owned())),
                };
            }
            (Some(_), c) => content.push(c),
        }
    }

    let content = content.trim();
    if content == "*" {
        return Ok(Selector::Wildcard);
    }

    content
        .parse::<i64>()
        .map(Selector::Index)
        .map_err(|_| JsonPathError::InvalidIndex {
            query: query.to_owned(),
            index: content.to_owned(),
        })
}

impl JsonPath {
    /// All values matched by the path, in document order.
    pub fn query<'v>(&self, root: &'v Value) -> Vec<&'v Value> {
        self.selectors
            .iter()
            .fold(vec![root], |current, selector| {
                current
                    .into_iter()
                    .flat_map(|value| apply(selector, value))
                    .collect()
            })
    }

    /// A single match is returned as is, several matches as an array.
    pub fn select(&self, root: &Value) -> Result<Value, JsonPathError> {
        let mut matches = self.query(root);

        match matches.len() {
            0 => Err(JsonPathError::NoMatch(self.source.clone())),
            1 => Ok(matches.remove(0).clone()),
            _ => Ok(Value::Array(matches.into_iter().cloned().collect())),
        }
    }
}

fn apply<'v>(selector: &Selector, value: &'v Value) -> Vec<&'v Value> {
    match (selector, value) {
        (Selector::Key(key), Value::Object(map)) => map.get(key).into_iter().collect(),
        (Selector::Index(idx), Value::Array(items)) => {
            let idx = if *idx < 0 {
                items.len() as i64 + idx
            } else {
                *idx
            };
            usize::try_from(idx)
                .ok()
                .and_then(|idx| items.get(idx))
                .into_iter()
                .collect()
        }
        (Selector::Wildcard, Value::Array(items)) => items.iter().collect(),
        (Selector::Wildcard, Value::Object(map)) => map.values().collect(),
        _ => vec![],
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
