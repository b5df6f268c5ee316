use crate::chain;
use crate::model::Headers;
use crate::model::Response;
use crate::parser::Grammar;
use crate::parser::Invalid;
use crate::parser::ParseError;
use crate::parser::Parser;
use crate::template;
use crate::template::RenderError;
use crate::variables::VariableStore;

/// Facit files: a status code after the name. Header values and bodies may
/// reference already executed tests through chaining tokens.
pub(crate) struct FacitGrammar;

impl Grammar for FacitGrammar {
    type Head = u16;
    type Record = Response;

    const HEAD: &'static str = "status line";
    const UNIQUE_NAMES: bool = false;

    fn head(&self, text: &str, _store: &mut VariableStore) -> Result<Self::Head, Invalid> {
        text.trim().parse::<u16>().map_err(|e| {
            Invalid::Syntax(format!(
                "expected a numeric status code, got `{}` ({e})",
                text.trim()
            ))
        })
    }

    fn render(&self, text: &str, store: &mut VariableStore) -> Result<String, RenderError> {
        let resolved = chain::resolve(text, store);
        template::render(&resolved, store)
    }

    fn record(&self, name: String, status: u16, headers: Headers, body: String) -> Response {
        Response {
            name,
            status,
            headers,
            body,
        }
    }
}

/// Parses a facit file into its recorded responses, in file order.
///
/// The store should already hold the snapshots of the executed tests, so
/// chaining tokens in the facit resolve to this run's values.
pub fn parse_facit(
    src: &str,
    file_name: &str,
    store: &mut VariableStore,
) -> Result<Vec<Response>, ParseError> {
    Parser::new(FacitGrammar, src, file_name).parse(store)
}

#[cfg(test)]
mod test {
    use super::parse_facit;
    use crate::variables::Value;
    use crate::variables::VariableStore;

    #[test]
    fn parses_responses() {
        let src = "### createUser\n201\nContent-Type: application/json\nLocation: /users/42\n\n{\"id\":\"42\"}\n\n### health\n200\n\n";
        let mut store = VariableStore::new();
        let responses = parse_facit(src, "api.http.facit", &mut store).unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].name, "createUser");
        assert_eq!(responses[0].status, 201);
        assert_eq!(responses[0].headers.get("location"), Some("/users/42"));
        assert_eq!(responses[0].body, "{\"id\":\"42\"}");
        assert_eq!(responses[1].name, "health");
        assert_eq!(responses[1].status, 200);
        assert_eq!(responses[1].headers.len(), 0);
        assert!(responses[1].body.is_empty());
    }

    #[test]
    fn duplicate_names_are_kept() {
        let src = "### a\n200\n\n### a\n404\n\n";
        let mut store = VariableStore::new();
        let responses = parse_facit(src, "f.facit", &mut store).unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].status, 200);
    }

    #[test]
    fn non_numeric_status_is_fatal() {
        let src = "### a\n200\n\n### b\nOK\n\n";
        let mut store = VariableStore::new();
        let err = parse_facit(src, "f.facit", &mut store).unwrap_err();

        assert_eq!(err.line(), 5);
        assert!(err.message().contains("numeric status code"));
    }

    #[test]
    fn resolves_chaining_tokens_from_executed_tests() {
        let mut store = VariableStore::new();
        store.insert(
            "createUser",
            Value::snapshot([(
                "response",
                Value::snapshot([("body", Value::from(r#"{"id":"42"}"#))]),
            )]),
        );

        let src = "### getUser\n200\nX-User: {{createUser.response.body$.id}}\nX-Pending: {{later.response.body$.id}}\n\n{\"id\":\"{{createUser.response.body$.id}}\"}\n";
        let responses = parse_facit(src, "f.facit", &mut store).unwrap();

        assert_eq!(responses[0].headers.get("X-User"), Some("42"));
        assert_eq!(
            responses[0].headers.get("X-Pending"),
            Some("{{later.response.body$.id}}")
        );
        assert_eq!(responses[0].body, "{\"id\":\"42\"}");
    }

    #[test]
    fn facit_variables_share_the_store() {
        let mut store = VariableStore::new();
        store.insert("version", "1");

        let src = "@server = nginx\n### a\n200\nServer: {{server}}/{{version}}\n\n";
        let responses = parse_facit(src, "f.facit", &mut store).unwrap();

        assert_eq!(responses[0].headers.get("Server"), Some("nginx/1"));
        assert_eq!(store.get("server"), Some(&Value::from("nginx")));
    }
}
