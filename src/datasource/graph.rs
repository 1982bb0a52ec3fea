//! HTTP client for GraphQL indexers (subgraphs).

use super::{ParamTypes, ParamValues, QueryExecutor, RemoteError};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Indexer client that POSTs `{query, variables}` to a subgraph endpoint.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: Client,
    url: String,
    request_timeout: Duration,
    max_elapsed: Duration,
}

impl GraphClient {
    pub fn new(url: String, request_timeout: Duration, max_elapsed: Duration) -> Self {
        Self {
            client: Client::new(),
            url,
            request_timeout,
            max_elapsed,
        }
    }

    /// Wrap a selection body in an operation declaring its variables.
    pub fn build_operation(query: &str, param_types: &ParamTypes) -> String {
        if param_types.is_empty() {
            return format!("query {{ {} }}", query.trim());
        }
        let declarations = param_types
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("query ({}) {{ {} }}", declarations, query.trim())
    }

    async fn post_once(&self, body: &Value) -> Result<Value, backoff::Error<RemoteError>> {
        let timeout_ms = self.request_timeout.as_millis() as u64;
        let send = self.client.post(&self.url).json(body).send();
        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| backoff::Error::transient(RemoteError::Timeout(timeout_ms)))?
            .map_err(|e| backoff::Error::transient(RemoteError::Network(e.to_string())))?;

        let status = response.status();
        if status == 429 {
            return Err(backoff::Error::transient(RemoteError::RateLimited));
        }
        if status.is_server_error() {
            return Err(backoff::Error::transient(RemoteError::Http {
                status: status.as_u16(),
                message: "Server error".to_string(),
            }));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(RemoteError::Http {
                status: status.as_u16(),
                message: "Client error".to_string(),
            }));
        }

        let payload = tokio::time::timeout(self.request_timeout, response.json::<Value>())
            .await
            .map_err(|_| backoff::Error::transient(RemoteError::Timeout(timeout_ms)))?
            .map_err(|e| backoff::Error::permanent(RemoteError::Parse(e.to_string())))?;

        extract_data(payload).map_err(backoff::Error::permanent)
    }
}

/// Pull `data` out of a GraphQL response envelope.
pub fn extract_data(mut payload: Value) -> Result<Value, RemoteError> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RemoteError::Graph(messages));
        }
    }
    match payload.get_mut("data").map(Value::take) {
        Some(data) if data.is_object() => Ok(data),
        _ => Err(RemoteError::Parse("response has no data object".to_string())),
    }
}

#[async_trait]
impl QueryExecutor for GraphClient {
    async fn execute(
        &self,
        query: &str,
        param_types: &ParamTypes,
        param_values: &ParamValues,
    ) -> Result<Value, RemoteError> {
        let body = serde_json::json!({
            "query": Self::build_operation(query, param_types),
            "variables": param_values,
        });
        let variables = serde_json::Value::Object(param_values.clone());
        debug!(url = %self.url, %variables, "Querying indexer");

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            self.post_once(&body).await.map_err(|e| {
                if let backoff::Error::Transient { err, .. } = &e {
                    warn!(url = %self.url, error = %err, "Transient indexer failure, retrying");
                }
                e
            })
        })
        .await
    }
}
