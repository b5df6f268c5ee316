//! Reconciles a run against its facit file.
//!
//! Tests already present in the facit are diffed, unknown tests are appended
//! to it. An existing record is never rewritten.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::asserter::Assert;
use crate::asserter::AssertResult;
use crate::asserter::find_by_name;
use crate::lexer;
use crate::lexer::LineKind;
use crate::model::Response;
use crate::parser::ParseError;
use crate::parser::parse_facit;
use crate::variables::VariableStore;

#[derive(Error, Debug, Diagnostic)]
pub enum ReconcileError {
    #[error("Failed to {action} facit file {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
}

/// Serializes one response in facit form. Names containing whitespace use
/// the `# @name` annotation so they read back unchanged.
pub fn serialize(response: &Response) -> String {
    let mut out = if response.name.contains(char::is_whitespace) {
        format!("# @name {}\n", response.name)
    } else {
        format!("### {}\n", response.name)
    };

    out.push_str(&format!("{}\n", response.status));
    for (name, value) in response.headers.iter() {
        out.push_str(&format!("{name}: {value}\n"));
    }
    out.push('\n');

    if !response.body.is_empty() {
        if let Some(reason) = unreadable_body(&response.body) {
            warn!(
                test = %response.name,
                "recorded body will not read back unchanged, {reason}"
            );
        }
        out.push_str(&response.body);
        out.push_str("\n\n");
    }

    out
}

/// Why `body` would read back differently from a facit file, if it would.
fn unreadable_body(body: &str) -> Option<&'static str> {
    if body.ends_with('\r') {
        return Some("it ends with a carriage return");
    }

    if body.contains("{{") {
        return Some("`{{` is read back as a template placeholder");
    }

    body.split('\n').find_map(|line| {
        match lexer::classify(line.strip_suffix('\r').unwrap_or(line)) {
            LineKind::Blank => Some("a blank line ends the record"),
            LineKind::Divider | LineKind::Marker { .. } => {
                Some("a line starting with `#` ends the record")
            }
            LineKind::Variable { .. } => Some("an `@key = value` line is read as a variable"),
            LineKind::Invalid(_) | LineKind::Content(_) => None,
        }
    })
}

pub struct Facit {
    path: PathBuf,
}

impl Facit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Diffs `actual` against the facit file and records the responses it
    /// does not know yet. Results come back in the order of `actual`.
    ///
    /// `store` must hold the snapshots of this run, the facit may chain off
    /// them.
    pub fn reconcile(
        &self,
        actual: &[Response],
        store: &mut VariableStore,
    ) -> Result<Vec<AssertResult>, ReconcileError> {
        let mut file = match OpenOptions::new().read(true).append(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.create(actual),
            Err(e) => return Err(self.io("open", e)),
        };

        let mut src = String::new();
        file.read_to_string(&mut src)
            .map_err(|e| self.io("read", e))?;

        let file_name = self.path.display().to_string();
        let expected = parse_facit(&src, &file_name, store)?;
        debug!(path = %file_name, records = expected.len(), "loaded facit");

        let mut results = Vec::with_capacity(actual.len());
        for response in actual {
            match find_by_name(&expected, &response.name) {
                Some(facit) => {
                    let diffs = response.assert_against(facit);
                    results.push(AssertResult::diffed(&response.name, diffs));
                }
                None => {
                    self.append(&mut file, response)?;
                    results.push(AssertResult::new_test(&response.name));
                }
            }
        }

        Ok(results)
    }

    fn create(&self, actual: &[Response]) -> Result<Vec<AssertResult>, ReconcileError> {
        let mut file = File::create(&self.path).map_err(|e| self.io("create", e))?;

        let records: Vec<String> = actual.iter().map(serialize).collect();
        file.write_all(records.join("\n").as_bytes())
            .map_err(|e| self.io("write", e))?;
        info!(path = %self.path.display(), records = actual.len(), "created facit");

        Ok(actual
            .iter()
            .map(|response| AssertResult::new_test(&response.name))
            .collect())
    }

    fn append(&self, file: &mut File, response: &Response) -> Result<(), ReconcileError> {
        let record = format!("\n{}", serialize(response));
        file.write_all(record.as_bytes())
            .map_err(|e| self.io("write", e))?;
        info!(test = %response.name, path = %self.path.display(), "recorded new test");

        Ok(())
    }

    fn io(&self, action: &'static str, source: io::Error) -> ReconcileError {
        ReconcileError::Io {
            action,
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use crate::asserter::DiffEntry;
    use crate::asserter::Field;
    use crate::asserter::TestResult;
    use crate::facit::Facit;
    use crate::facit::ReconcileError;
    use crate::facit::serialize;
    use crate::facit::unreadable_body;
    use crate::model::Headers;
    use crate::model::Response;
    use crate::parser::parse_facit;
    use crate::variables::Value;
    use crate::variables::VariableStore;

    fn response(name: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Response {
        Response {
            name: name.into(),
            status,
            headers: headers.iter().copied().collect::<Headers>(),
            body: body.into(),
        }
    }

    fn run() -> Vec<Response> {
        vec![
            response(
                "createUser",
                201,
                &[("content-type", "application/json")],
                r#"{"id":"42"}"#,
            ),
            response("health", 200, &[], ""),
        ]
    }

    #[test]
    fn serialize_record() {
        assert_eq!(
            serialize(&run()[0]),
            "### createUser\n201\ncontent-type: application/json\n\n{\"id\":\"42\"}\n\n"
        );
        assert_eq!(serialize(&run()[1]), "### health\n200\n\n");
        assert_eq!(
            serialize(&response("create user", 204, &[], "")),
            "# @name create user\n204\n\n"
        );
    }

    #[test]
    fn serialized_records_parse_back() {
        let mut responses = run();
        responses.push(response(
            "list users",
            200,
            &[("x-total", "2"), ("set-cookie", "a=1;b=2")],
            "[\n  1,\n  2\n]",
        ));

        let src: Vec<String> = responses.iter().map(serialize).collect();
        let mut store = VariableStore::new();
        let parsed = parse_facit(&src.join("\n"), "facit", &mut store).unwrap();

        assert_eq!(parsed, responses);
    }

    #[test]
    fn crlf_bodies_read_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let facit = Facit::new(dir.path().join("api.http.facit"));
        let mut store = VariableStore::new();
        let actual = vec![response("legacy", 200, &[], "line1\r\nline2\r\nline3")];

        facit.reconcile(&actual, &mut store).unwrap();
        let before = std::fs::read(facit.path()).unwrap();
        let results = facit.reconcile(&actual, &mut store).unwrap();

        assert_eq!(results[0].status, TestResult::Pass);
        assert_eq!(std::fs::read(facit.path()).unwrap(), before);
    }

    #[test]
    fn at_lines_in_bodies_are_content() {
        let recorded = response("styles", 200, &[], "@import url(x.css);\nbody { margin: 0 }");

        let mut store = VariableStore::new();
        let parsed = parse_facit(&serialize(&recorded), "facit", &mut store).unwrap();

        assert_eq!(parsed, vec![recorded]);
    }

    #[test]
    fn flags_bodies_that_do_not_read_back() {
        assert_eq!(unreadable_body(r#"{"id":"42"}"#), None);
        assert_eq!(unreadable_body("a\r\nb"), None);
        assert_eq!(unreadable_body("@import url(x.css);"), None);

        for body in [
            "<html>\n\n<body>hi</body>",
            "# heading",
            "text\n### more",
            "@mode = dark",
            "{{name}}",
            "trailing\r",
        ] {
            assert!(unreadable_body(body).is_some(), "{body:?}");
        }
    }

    #[test]
    fn creates_missing_facit() {
        let dir = TempDir::new().unwrap();
        let facit = Facit::new(dir.path().join("api.http.facit"));
        let mut store = VariableStore::new();

        let results = facit.reconcile(&run(), &mut store).unwrap();

        assert!(results.iter().all(|r| r.status == TestResult::New));
        assert_eq!(
            std::fs::read_to_string(facit.path()).unwrap(),
            "### createUser\n201\ncontent-type: application/json\n\n{\"id\":\"42\"}\n\n\n### health\n200\n\n"
        );
    }

    #[test]
    fn second_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let facit = Facit::new(dir.path().join("api.http.facit"));
        let mut store = VariableStore::new();

        facit.reconcile(&run(), &mut store).unwrap();
        let before = std::fs::read(facit.path()).unwrap();

        let results = facit.reconcile(&run(), &mut store).unwrap();

        assert!(results.iter().all(|r| r.status == TestResult::Pass));
        assert_eq!(std::fs::read(facit.path()).unwrap(), before);
    }

    #[test]
    fn appends_new_tests_and_diffs_known_ones() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api.http.facit");
        std::fs::write(&path, "### health\n200\ncontent-type: text/plain\n\n").unwrap();
        let facit = Facit::new(&path);
        let mut store = VariableStore::new();

        let results = facit
            .reconcile(
                &[
                    response("health", 503, &[], ""),
                    response("version", 200, &[], "1.0"),
                ],
                &mut store,
            )
            .unwrap();

        assert_eq!(
            results[0].status,
            TestResult::Fail(vec![
                DiffEntry {
                    field: Field::Status,
                    expected: "200".into(),
                    actual: "503".into(),
                },
                DiffEntry {
                    field: Field::Header("content-type".into()),
                    expected: "text/plain".into(),
                    actual: "".into(),
                },
            ])
        );
        assert_eq!(results[1].status, TestResult::New);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "### health\n200\ncontent-type: text/plain\n\n\n### version\n200\n\n1.0\n\n"
        );
    }

    #[test]
    fn facit_chains_off_the_current_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api.http.facit");
        std::fs::write(
            &path,
            "### createUser\n201\nLocation: /users/{{createUser.response.body$.id}}\n\n",
        )
        .unwrap();

        let mut store = VariableStore::new();
        store.insert(
            "createUser",
            Value::snapshot([(
                "response",
                Value::snapshot([("body", Value::from(r#"{"id":"43"}"#))]),
            )]),
        );

        let results = Facit::new(&path)
            .reconcile(
                &[response("createUser", 201, &[("location", "/users/43")], "")],
                &mut store,
            )
            .unwrap();

        assert_eq!(results[0].status, TestResult::Pass);
    }

    #[test]
    fn malformed_facit_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api.http.facit");
        std::fs::write(&path, "### health\nOK\n\n").unwrap();
        let mut store = VariableStore::new();

        let err = Facit::new(&path)
            .reconcile(&run(), &mut store)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Parse(_)));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "### health\nOK\n\n"
        );
    }
}
