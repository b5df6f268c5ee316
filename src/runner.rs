#![allow(clippy::enum_variant_names)]

use std::time::Duration;

use miette::Diagnostic;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use url::Url;

use crate::chain;
use crate::model::Headers;
use crate::model::Method;
use crate::model::Response;
use crate::model::Test;
use crate::variables::Value;
use crate::variables::VariableStore;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: Url, secs: u64 },

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

#[derive(Error, Debug, Diagnostic)]
pub enum AddressError {
    #[error("test `{name}` has no address: `{path}` is not absolute and there is no Host header")]
    #[diagnostic(help("use an absolute URL or add a `Host:` header to the request"))]
    Missing { name: String, path: String },

    #[error("test `{name}` resolves to an invalid address `{address}`")]
    Invalid {
        name: String,
        address: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Error, Debug, Diagnostic)]
pub enum RunnerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    AddressError(#[from] AddressError),

    #[error("request for test `{name}` failed")]
    TransportError {
        name: String,
        #[source]
        source: HttpError,
    },
}

/// What is handed to the transport for a single test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<String>,
}

/// A response as it came off the wire. Header names may repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedResponse {
    pub async fn from_response(resp: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_owned(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();

        // Consume the body exactly once
        let body = resp.text().await?;

        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&self, request: OutgoingRequest) -> Result<CapturedResponse, HttpError>;
}

pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<CapturedResponse, HttpError> {
        let url = request.url.clone();

        let mut builder = self.client.request(request.method.into(), request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                HttpError::Timeout {
                    url: url.clone(),
                    secs: self.timeout.as_secs(),
                }
            } else {
                HttpError::Request(e)
            }
        };

        let response = builder.send().await.map_err(timed_out)?;
        CapturedResponse::from_response(response)
            .await
            .map_err(timed_out)
    }
}

/// Executes tests strictly in script order, one request at a time.
pub struct Runner<T> {
    transport: T,
    skip_headers: Vec<String>,
}

impl<T: Transport> Runner<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            skip_headers: vec![],
        }
    }

    /// Response headers that are dropped before recording and comparing.
    pub fn skip_headers(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skip_headers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Runs every test and records its snapshot in `store` under the test
    /// name, so later tests and the facit can chain off it.
    ///
    /// The first address or transport error aborts the run.
    pub async fn run(
        &self,
        tests: &mut [Test],
        store: &mut VariableStore,
    ) -> Result<Vec<Response>, RunnerError> {
        let mut responses = Vec::with_capacity(tests.len());

        for test in tests.iter_mut() {
            chain::resolve_test(test, store);

            let request = outgoing_request(test)?;
            info!(test = %test.name, method = %request.method, url = %request.url, "sending request");

            let url = request.url.clone();
            let captured = self.transport.send(request).await.map_err(|source| {
                RunnerError::TransportError {
                    name: test.name.clone(),
                    source,
                }
            })?;

            let response = Response {
                name: test.name.clone(),
                status: captured.status,
                headers: flatten_headers(captured.headers, &self.skip_headers),
                body: captured.body,
            };
            debug!(
                test = %test.name,
                status = response.status,
                headers = response.headers.len(),
                "received response"
            );

            store.insert(test.name.clone(), snapshot(test, &url, &response));
            responses.push(response);
        }

        Ok(responses)
    }
}

fn outgoing_request(test: &Test) -> Result<OutgoingRequest, RunnerError> {
    let url = address(test)?;

    let mut headers: Headers = test
        .headers
        .iter()
        .filter(|(name, value)| !(name.eq_ignore_ascii_case("host") && value.contains("://")))
        .collect();

    let body = (!test.body.is_empty()).then(|| test.body.clone());
    if body.is_some() && !headers.contains("content-type") {
        headers.insert("Content-Type", "application/json");
    }

    Ok(OutgoingRequest {
        method: test.method,
        url,
        headers,
        body,
    })
}

/// The absolute URL a test is sent to.
///
/// An absolute path is used as is. Otherwise the `Host` header supplies the
/// origin, defaulting to `http` when it carries no scheme.
fn address(test: &Test) -> Result<Url, AddressError> {
    let address = if test.path.starts_with("http") {
        test.path.clone()
    } else {
        match test.headers.get("host") {
            Some(host) if host.contains("://") => format!("{host}{}", test.path),
            Some(host) => format!("http://{host}{}", test.path),
            None => {
                return Err(AddressError::Missing {
                    name: test.name.clone(),
                    path: test.path.clone(),
                });
            }
        }
    };

    Url::parse(&address).map_err(|source| AddressError::Invalid {
        name: test.name.clone(),
        address,
        source,
    })
}

/// Repeated headers are joined with `;` in order of appearance.
fn flatten_headers(raw: Vec<(String, String)>, skip: &[String]) -> Headers {
    let mut headers = Headers::new();

    for (name, value) in raw {
        if skip.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            continue;
        }

        let value = match headers.get(&name) {
            Some(existing) => format!("{existing};{value}"),
            None => value,
        };
        headers.insert(name, value);
    }

    headers
}

fn snapshot(test: &Test, url: &Url, response: &Response) -> Value {
    Value::snapshot([
        (
            "request",
            Value::snapshot([
                ("method", Value::from(test.method.to_string())),
                ("url", Value::from(url.as_str())),
                ("headers", Value::from(&test.headers)),
                ("body", Value::from(test.body.as_str())),
            ]),
        ),
        (
            "response",
            Value::snapshot([
                ("status", Value::from(response.status.to_string())),
                ("headers", Value::from(&response.headers)),
                ("body", Value::from(response.body.as_str())),
            ]),
        ),
    ])
}
