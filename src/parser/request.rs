use crate::model::Headers;
use crate::model::Method;
use crate::model::Test;
use crate::parser::Grammar;
use crate::parser::Invalid;
use crate::parser::ParseError;
use crate::parser::Parser;
use crate::template;
use crate::template::RenderError;
use crate::variables::VariableStore;

/// Request scripts: `METHOD path` after the name, static templating only.
pub(crate) struct RequestGrammar;

impl Grammar for RequestGrammar {
    type Head = (Method, String);
    type Record = Test;

    const HEAD: &'static str = "request line (`METHOD path`)";
    const UNIQUE_NAMES: bool = true;

    fn head(&self, text: &str, store: &mut VariableStore) -> Result<Self::Head, Invalid> {
        let Some((method, path)) = text.trim_end().split_once(' ') else {
            return Err(Invalid::Syntax(format!(
                "request lines must look like `METHOD path`, got `{}`",
                text.trim()
            )));
        };

        let method = method.parse::<Method>().map_err(Invalid::Syntax)?;

        let offset = text.len() - path.trim_start().len();
        let path = template::render(path.trim(), store)
            .map_err(|error| Invalid::Render { offset, error })?;

        if path.is_empty() {
            return Err(Invalid::Syntax("request line is missing a path".into()));
        }

        Ok((method, path))
    }

    fn render(&self, text: &str, store: &mut VariableStore) -> Result<String, RenderError> {
        template::render(text, store)
    }

    fn record(
        &self,
        name: String,
        (method, path): Self::Head,
        headers: Headers,
        body: String,
    ) -> Test {
        Test {
            name,
            method,
            path,
            headers,
            body,
        }
    }
}

/// Parses a request script into its tests, in script order.
///
/// `@key = value` declarations are written into `store` as they are met, so
/// a variable can only be used below its declaration.
pub fn parse_script(
    src: &str,
    file_name: &str,
    store: &mut VariableStore,
) -> Result<Vec<Test>, ParseError> {
    Parser::new(RequestGrammar, src, file_name).parse(store)
}
