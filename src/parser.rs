use std::collections::HashSet;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use thiserror::Error;

use crate::lexer;
use crate::lexer::Line;
use crate::lexer::LineKind;
use crate::model::Headers;
use crate::template::RenderError;
use crate::variables::VariableStore;

mod facit;
mod request;

pub use facit::parse_facit;
pub use request::parse_script;

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid script on line {line}: {message}")]
pub struct ParseError {
    line: usize,
    message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    label: String,
}

#[cfg(test)]
impl ParseError {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a single line was rejected. Turned into a [`ParseError`] with source
/// context by the [`Parser`].
#[derive(Debug)]
pub(crate) enum Invalid {
    Syntax(String),
    Render { offset: usize, error: RenderError },
}

/// The parts that differ between the request and the facit grammar.
pub(crate) trait Grammar {
    /// What the line after the record name parses into.
    type Head;
    type Record;

    /// Used in error messages, e.g. "request line".
    const HEAD: &'static str;
    /// Whether two records may share a name.
    const UNIQUE_NAMES: bool;

    fn head(&self, text: &str, store: &mut VariableStore) -> Result<Self::Head, Invalid>;

    /// Renders a header value or a body.
    fn render(&self, text: &str, store: &mut VariableStore) -> Result<String, RenderError>;

    fn record(&self, name: String, head: Self::Head, headers: Headers, body: String)
    -> Self::Record;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Name,
    Head,
    Headers,
    Body,
}

struct Draft<H> {
    name: String,
    /// Offset, length and line number of the naming marker.
    marker: (usize, usize, usize),
    head: Option<H>,
    headers: Headers,
    body: String,
    body_start: Option<(usize, usize)>,
}

pub(crate) struct Parser<'s, G: Grammar> {
    grammar: G,
    src: &'s str,
    file_name: &'s str,
    state: State,
    draft: Option<Draft<G::Head>>,
    records: Vec<G::Record>,
    names: HashSet<String>,
}

impl<'s, G: Grammar> Parser<'s, G> {
    pub(crate) fn new(grammar: G, src: &'s str, file_name: &'s str) -> Self {
        Self {
            grammar,
            src,
            file_name,
            state: State::Name,
            draft: None,
            records: vec![],
            names: HashSet::new(),
        }
    }

    pub(crate) fn parse(
        mut self,
        store: &mut VariableStore,
    ) -> Result<Vec<G::Record>, ParseError> {
        for line in lexer::lines(self.src) {
            self.feed(&line, store)?;
        }

        match self.state {
            State::Name => {}
            State::Head => {
                if let Some(draft) = &self.draft {
                    return Err(self.missing_head(&draft.name, draft.marker));
                }
            }
            State::Headers | State::Body => self.finish(store)?,
        }

        Ok(self.records)
    }

    fn feed(&mut self, line: &Line<'_>, store: &mut VariableStore) -> Result<(), ParseError> {
        match line.kind {
            LineKind::Variable { key, value } => {
                store.insert(key, value);
                return Ok(());
            }
            // Inside a record such a line is ordinary header or body text.
            LineKind::Invalid(reason) if !matches!(self.state, State::Headers | State::Body) => {
                return Err(self.error(line, 0, line.text.len(), reason, "here"));
            }
            LineKind::Divider | LineKind::Marker { .. }
                if matches!(self.state, State::Headers | State::Body) =>
            {
                self.finish(store)?;
            }
            _ => {}
        }

        match (self.state, line.kind) {
            (State::Name, LineKind::Marker { name: Some(name) }) => self.start(line, name),
            (State::Name, LineKind::Marker { name: None }) => Err(self.error(
                line,
                0,
                line.text.len(),
                "section marker without a name, use `# @name <name>` or `### <name>`",
                "expected a name",
            )),
            (State::Head, LineKind::Content(text)) => {
                let head = self
                    .grammar
                    .head(text, store)
                    .map_err(|invalid| self.invalid(line, invalid))?;
                if let Some(draft) = self.draft.as_mut() {
                    draft.head = Some(head);
                }
                self.state = State::Headers;
                Ok(())
            }
            (State::Headers, LineKind::Blank) => {
                self.state = State::Body;
                Ok(())
            }
            (State::Headers, LineKind::Content(_) | LineKind::Invalid(_)) => {
                self.header(line, line.text, store)
            }
            (State::Body, LineKind::Blank) => self.finish(store),
            (State::Body, LineKind::Content(_) | LineKind::Invalid(_)) => {
                if let Some(draft) = self.draft.as_mut() {
                    if draft.body_start.is_none() {
                        draft.body_start = Some((line.offset, line.number));
                    } else {
                        draft.body.push('\n');
                    }
                    draft.body.push_str(line.raw);
                }
                Ok(())
            }
            // Dividers, comments in front of the request line and free text
            // between records carry no meaning.
            _ => Ok(()),
        }
    }

    fn start(&mut self, line: &Line<'_>, name: &str) -> Result<(), ParseError> {
        if G::UNIQUE_NAMES && !self.names.insert(name.to_owned()) {
            return Err(self.error(
                line,
                0,
                line.text.len(),
                &format!("duplicate test name `{name}`, names must be unique"),
                "already used",
            ));
        }

        self.draft = Some(Draft {
            name: name.to_owned(),
            marker: (line.offset, line.text.len(), line.number),
            head: None,
            headers: Headers::new(),
            body: String::new(),
            body_start: None,
        });
        self.state = State::Head;

        Ok(())
    }

    fn header(
        &mut self,
        line: &Line<'_>,
        text: &str,
        store: &mut VariableStore,
    ) -> Result<(), ParseError> {
        let Some((name, rest)) = text.split_once(':') else {
            return Err(self.error(
                line,
                0,
                text.len(),
                "headers must look like `Name: value`",
                "missing `:`",
            ));
        };

        let value = rest.trim();
        let value_offset = text.len() - rest.trim_start().len();

        let value = self
            .grammar
            .render(value, store)
            .map_err(|error| {
                let invalid = Invalid::Render {
                    offset: value_offset,
                    error,
                };
                self.invalid(line, invalid)
            })?;

        if let Some(draft) = self.draft.as_mut() {
            draft.headers.insert(name.trim(), value);
        }

        Ok(())
    }

    /// Completes the record under construction and goes back to waiting for
    /// the next name.
    fn finish(&mut self, store: &mut VariableStore) -> Result<(), ParseError> {
        self.state = State::Name;

        let Some(draft) = self.draft.take() else {
            return Ok(());
        };

        let Draft {
            name,
            marker,
            head,
            headers,
            body,
            body_start,
        } = draft;

        let Some(head) = head else {
            return Err(self.missing_head(&name, marker));
        };

        // The `\r` of the last body line belongs to its line terminator.
        let body = match body.strip_suffix('\r') {
            Some(stripped) => stripped.to_owned(),
            None => body,
        };

        let body = match body_start {
            Some((offset, number)) => self.grammar.render(&body, store).map_err(|error| {
                self.spanned(
                    number,
                    offset + error.offset(),
                    2,
                    &error.to_string(),
                    "invalid template",
                )
            })?,
            None => body,
        };

        let record = self.grammar.record(name, head, headers, body);
        self.records.push(record);

        Ok(())
    }

    fn missing_head(&self, name: &str, (offset, len, number): (usize, usize, usize)) -> ParseError {
        self.spanned(
            number,
            offset,
            len,
            &format!("`{name}` is missing its {}", G::HEAD),
            "record starts here",
        )
    }

    fn invalid(&self, line: &Line<'_>, invalid: Invalid) -> ParseError {
        match invalid {
            Invalid::Syntax(message) => self.error(line, 0, line.text.len(), &message, "here"),
            Invalid::Render { offset, error } => self.error(
                line,
                offset + error.offset(),
                2,
                &error.to_string(),
                "invalid template",
            ),
        }
    }

    fn error(
        &self,
        line: &Line<'_>,
        column: usize,
        len: usize,
        message: &str,
        label: &str,
    ) -> ParseError {
        let column = column.min(line.text.len());
        let len = len.min(line.text.len() - column);
        self.spanned(line.number, line.offset + column, len, message, label)
    }

    fn spanned(
        &self,
        line: usize,
        offset: usize,
        len: usize,
        message: &str,
        label: &str,
    ) -> ParseError {
        let offset = offset.min(self.src.len());
        let len = len.min(self.src.len() - offset);

        ParseError {
            line,
            message: message.to_owned(),
            src: NamedSource::new(self.file_name, self.src.to_owned()),
            span: SourceSpan::new(offset.into(), len),
            label: label.to_owned(),
        }
    }
}
