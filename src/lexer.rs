//! Splits script text into classified lines.
//!
//! Both the request script and the facit file share this line grammar, the
//! parsers only differ in how they interpret content lines.

const NAME_ANNOTATION: &str = "@name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// A line made of `#` only, e.g. `###`. Separates records visually.
    Divider,
    /// A `#` line, possibly naming the next record.
    Marker { name: Option<&'a str> },
    /// `@key = value`
    Variable { key: &'a str, value: &'a str },
    /// A line starting with `@` that is not a valid variable declaration.
    Invalid(&'static str),
    Blank,
    Content(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub kind: LineKind<'a>,
    /// The line with a trailing `\r` stripped.
    pub text: &'a str,
    /// The line as written, only the `\n` removed. Body lines keep their
    /// `\r` so recorded CRLF bodies read back byte for byte.
    pub raw: &'a str,
    /// Byte offset of the line in the source.
    pub offset: usize,
    /// 1-based line number.
    pub number: usize,
}

pub fn lines(src: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;

    src.split('\n').enumerate().map(move |(idx, raw)| {
        let start = offset;
        offset += raw.len() + 1;

        let text = raw.strip_suffix('\r').unwrap_or(raw);

        Line {
            kind: classify(text),
            text,
            raw,
            offset: start,
            number: idx + 1,
        }
    })
}

pub fn classify(text: &str) -> LineKind<'_> {
    let trimmed = text.trim();

    if text.starts_with('#') {
        if trimmed.chars().all(|c| c == '#') {
            return LineKind::Divider;
        }

        return LineKind::Marker {
            name: marker_name(text),
        };
    }

    if let Some(rest) = text.strip_prefix('@') {
        let Some((key, value)) = rest.split_once('=') else {
            return LineKind::Invalid("variable declarations must look like `@key = value`");
        };

        let key = key.trim();
        if key.is_empty() {
            return LineKind::Invalid("variable declaration is missing a name");
        }

        return LineKind::Variable {
            key,
            value: value.trim(),
        };
    }

    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    LineKind::Content(text)
}

/// `# @name create user` names the record `create user`, otherwise the
/// second whitespace separated token is used: `### login` names it `login`.
fn marker_name(text: &str) -> Option<&str> {
    if let Some(idx) = text.find(NAME_ANNOTATION) {
        let name = text[idx + NAME_ANNOTATION.len()..].trim();
        return (!name.is_empty()).then_some(name);
    }

    text.split_whitespace().nth(1)
}
