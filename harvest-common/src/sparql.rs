use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_derive::Deserialize;
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum SparqlError {
    /// The endpoint could not be reached, timed out, or answered with a
    /// server error. Retried transparently when the client allows retries.
    #[error("sparql endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    /// The endpoint rejected the request. A malformed query will not get
    /// better on retry, so this surfaces immediately.
    #[error("sparql endpoint rejected the request ({status}): {body}")]
    Query { status: u16, body: String },
    #[error("unexpected response from sparql endpoint: {0}")]
    Response(String),
}

/// A single solution row of a SELECT result, variable name to bound term.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Binding(pub HashMap<String, Term>);

impl Binding {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Term)>,
        K: Into<String>,
    {
        Binding(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn value(&self, variable: &str) -> Option<&str> {
        self.0.get(variable).map(|term| term.value.as_str())
    }

    pub fn require(&self, variable: &str) -> Result<&str, SparqlError> {
        self.value(variable)
            .ok_or_else(|| SparqlError::Response(format!("missing binding for ?{}", variable)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Term {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub value: String,
}

impl Term {
    pub fn uri(value: impl Into<String>) -> Self {
        Term {
            kind: "uri".to_owned(),
            value: value.into(),
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term {
            kind: "literal".to_owned(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SparqlResults {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// Deserialized `application/sparql-results+json` body. SELECT responses
/// carry `results`, ASK responses carry `boolean`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SparqlResponse {
    #[serde(default)]
    pub results: Option<SparqlResults>,
    #[serde(default)]
    pub boolean: Option<bool>,
}

impl SparqlResponse {
    pub fn bindings(&self) -> &[Binding] {
        self.results
            .as_ref()
            .map(|results| results.bindings.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_true(&self) -> bool {
        self.boolean.unwrap_or(false)
    }
}

/// Read/write access to the graph store. The janitor components only ever
/// talk to the store through this trait, so tests can swap in a scripted one.
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn query(&self, query: &str) -> Result<SparqlResponse, SparqlError>;
    async fn update(&self, update: &str) -> Result<(), SparqlError>;
}

/// SPARQL/HTTP client for a single endpoint. Requests are form-encoded POSTs
/// expecting `application/sparql-results+json` back. When constructed with
/// retries, transport-class failures back off and try again; query rejections
/// never do.
#[derive(Clone)]
pub struct SparqlClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
    may_retry: bool,
}

impl SparqlClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        SparqlClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            retry: RetryPolicy::default(),
            may_retry: false,
        }
    }

    /// Allow transparent retries of transport failures. All operations issued
    /// by the janitor are idempotent, so replaying a request is safe.
    pub fn with_retries(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self.may_retry = true;
        self
    }

    pub async fn query(&self, query: &str) -> Result<SparqlResponse, SparqlError> {
        let response = self.post("query", query).await?;
        response
            .json::<SparqlResponse>()
            .await
            .map_err(|error| SparqlError::Response(error.to_string()))
    }

    pub async fn update(&self, update: &str) -> Result<(), SparqlError> {
        self.post("update", update).await?;
        Ok(())
    }

    async fn post(&self, field: &'static str, text: &str) -> Result<reqwest::Response, SparqlError> {
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .post(&self.endpoint)
                .header(reqwest::header::ACCEPT, "application/sparql-results+json")
                .form(&[(field, text)])
                .send()
                .await;

            let error = match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_client_error() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(SparqlError::Query {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    match response.error_for_status() {
                        Err(error) => SparqlError::Transport(error),
                        Ok(_) => SparqlError::Response(format!("unexpected status {}", status)),
                    }
                }
                Err(error) => SparqlError::Transport(error),
            };

            if !self.may_retry || attempt >= self.retry.max_attempts {
                return Err(error);
            }
            let backoff = self.retry.time_until_next_retry(attempt);
            tracing::warn!("sparql request failed, retrying in {:?}: {}", backoff, error);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl GraphClient for SparqlClient {
    async fn query(&self, query: &str) -> Result<SparqlResponse, SparqlError> {
        SparqlClient::query(self, query).await
    }

    async fn update(&self, update: &str) -> Result<(), SparqlError> {
        SparqlClient::update(self, update).await
    }
}

/// Escape a URI for interpolation into a query, mu-style: wrap in angle
/// brackets and backslash-escape the characters that could break out.
pub fn escape_uri(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('<');
    for c in value.chars() {
        match c {
            '\\' | '"' | '<' | '>' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped.push('>');
    escaped
}

pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

/// Typed xsd:dateTime literal, millisecond precision, always UTC. The full
/// datatype URI is used so callers don't depend on a PREFIX being in scope.
pub fn escape_datetime(value: &DateTime<Utc>) -> String {
    format!(
        "\"{}\"^^<http://www.w3.org/2001/XMLSchema#dateTime>",
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
