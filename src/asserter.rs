use core::fmt;
use std::fmt::Display;

use crate::model::Response;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Status,
    Header(String),
    Body,
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Status => write!(f, "status"),
            Field::Header(key) => write!(f, "headers.{key}"),
            Field::Body => write!(f, "body"),
        }
    }
}

/// One field where the actual response differs from the facit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub field: Field,
    pub expected: String,
    pub actual: String,
}

impl Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expected {} but was {}",
            self.field, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TestResult {
    Pass,
    Fail(Vec<DiffEntry>),
    /// Not in the facit yet, recorded during this run.
    New,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertResult {
    pub name: String,
    pub status: TestResult,
}

impl AssertResult {
    pub fn diffed(name: &str, diffs: Vec<DiffEntry>) -> Self {
        let status = if diffs.is_empty() {
            TestResult::Pass
        } else {
            TestResult::Fail(diffs)
        };

        Self {
            name: name.to_owned(),
            status,
        }
    }

    pub fn new_test(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: TestResult::New,
        }
    }
}

impl Display for AssertResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", console::style(format!("### {}", self.name)).bold())?;

        match &self.status {
            TestResult::Pass => writeln!(f, "{}", console::style("Success!").green().bold()),
            TestResult::Fail(diffs) => {
                for diff in diffs {
                    writeln!(
                        f,
                        "{} {} {} {} {}",
                        console::style(&diff.field).red().bold(),
                        console::style("expected").dim(),
                        console::style(&diff.expected).green(),
                        console::style("but was").dim(),
                        console::style(&diff.actual).red(),
                    )?;
                }
                Ok(())
            }
            TestResult::New => writeln!(
                f,
                "{}",
                console::style("New test found. Result was added to facit.").yellow()
            ),
        }
    }
}

pub trait Assert {
    /// Compares `self` (what the server answered) against the recorded facit.
    fn assert_against(&self, facit: &Response) -> Vec<DiffEntry>;
}

impl Assert for Response {
    fn assert_against(&self, facit: &Response) -> Vec<DiffEntry> {
        let mut diffs = vec![];

        if let Some(diff) = assert_status(facit.status, self.status) {
            diffs.push(diff);
        }

        diffs.extend(assert_headers(facit, self));

        if facit.body != self.body {
            diffs.push(DiffEntry {
                field: Field::Body,
                expected: facit.body.clone(),
                actual: self.body.clone(),
            });
        }

        diffs
    }
}

/// The first facit record named `name`.
pub fn find_by_name<'a>(facit: &'a [Response], name: &str) -> Option<&'a Response> {
    facit.iter().find(|response| response.name == name)
}

fn assert_status(expected: u16, actual: u16) -> Option<DiffEntry> {
    (expected != actual).then(|| DiffEntry {
        field: Field::Status,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

/// Only headers present in the facit are checked, extra actual headers are
/// ignored.
fn assert_headers(expected: &Response, actual: &Response) -> Vec<DiffEntry> {
    expected
        .headers
        .iter()
        .filter_map(|(key, value)| {
            let got = actual.headers.get(key).unwrap_or_default();
            (got != value).then(|| DiffEntry {
                field: Field::Header(key.to_owned()),
                expected: value.to_owned(),
                actual: got.to_owned(),
            })
        })
        .collect()
}
