//! Static `{{identifier}}` substitution against the [`VariableStore`].
//!
//! Only plain variable lookups are supported. Placeholders containing a `$`
//! are chaining tokens and are copied through untouched, they are resolved
//! at runtime by [`crate::chain`].

use thiserror::Error;
use tracing::debug;

use crate::variables::VariableStore;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("unclosed `{{{{` placeholder")]
    Unclosed { offset: usize },

    #[error("empty `{{{{}}}}` placeholder")]
    Empty { offset: usize },

    #[error("unsupported template construct `{construct}`")]
    Unsupported { offset: usize, construct: String },
}

impl RenderError {
    /// Byte offset of the offending placeholder in the rendered template.
    pub fn offset(&self) -> usize {
        match self {
            RenderError::Unclosed { offset }
            | RenderError::Empty { offset }
            | RenderError::Unsupported { offset, .. } => *offset,
        }
    }
}

pub fn render(template: &str, store: &VariableStore) -> Result<String, RenderError> {
    if !template.contains(OPEN) {
        return Ok(template.to_owned());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut cursor = 0;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);

        let offset = cursor + start;
        let inner_start = start + OPEN.len();
        let Some(len) = rest[inner_start..].find(CLOSE) else {
            return Err(RenderError::Unclosed { offset });
        };

        let token_end = inner_start + len + CLOSE.len();
        let token = &rest[start..token_end];
        let inner = &rest[inner_start..inner_start + len];

        substitute(token, inner, offset, store, &mut out)?;

        rest = &rest[token_end..];
        cursor += token_end;
    }

    out.push_str(rest);
    Ok(out)
}

fn substitute(
    token: &str,
    inner: &str,
    offset: usize,
    store: &VariableStore,
    out: &mut String,
) -> Result<(), RenderError> {
    let name = inner.trim();

    if name.is_empty() {
        return Err(RenderError::Empty { offset });
    }

    if name.contains('$') {
        out.push_str(token);
        return Ok(());
    }

    if !is_identifier(name) {
        return Err(RenderError::Unsupported {
            offset,
            construct: token.to_owned(),
        });
    }

    match store.lookup_path(name.split('.')) {
        Some(value) => out.push_str(&value.to_string()),
        None => debug!(variable = name, "undefined template variable, rendering as empty"),
    }

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    name.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

#[cfg(test)]
mod test {
    use super::RenderError;
    use super::render;
    use crate::variables::Value;
    use crate::variables::VariableStore;

    fn store() -> VariableStore {
        let mut store = VariableStore::new();
        store.insert("baseUrl", "http://api.test");
        store.insert("user_id", "7");
        store
    }

    #[test]
    fn substitutes_variables() {
        let rendered = render("{{baseUrl}}/users/{{ user_id }}", &store()).unwrap();
        assert_eq!(rendered, "http://api.test/users/7");
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        let body = r#"{"nested":{"a":{"b":1}}}"#;
        assert_eq!(render(body, &store()).unwrap(), body);
    }

    #[test]
    fn undefined_variables_render_empty() {
        assert_eq!(render("Bearer {{token}}", &store()).unwrap(), "Bearer ");
    }

    #[test]
    fn chaining_tokens_are_left_for_runtime() {
        let template = "{{baseUrl}}/users/{{createUser.response.body$.id}}";
        assert_eq!(
            render(template, &store()).unwrap(),
            "http://api.test/users/{{createUser.response.body$.id}}"
        );
    }

    #[test]
    fn dotted_names_read_snapshots() {
        let mut store = store();
        store.insert(
            "login",
            Value::snapshot([("response", Value::snapshot([("body", "ok")]))]),
        );

        assert_eq!(render("{{login.response.body}}", &store).unwrap(), "ok");
    }

    #[test]
    fn malformed_templates_fail() {
        let store = store();

        assert_eq!(
            render("{{baseUrl}}/{{id", &store),
            Err(RenderError::Unclosed { offset: 12 })
        );
        assert_eq!(render("a {{ }}", &store), Err(RenderError::Empty { offset: 2 }));

        for construct in ["{{#if x}}", "{{/if}}", "{{> partial}}", "{{!note}}", "{{{raw}}}", "{{upper name}}"] {
            let err = render(construct, &store).unwrap_err();
            assert!(
                matches!(err, RenderError::Unsupported { offset: 0, .. }),
                "{construct} gave {err:?}"
            );
        }
    }
}
