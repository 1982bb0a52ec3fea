//! Remote indexer access: query execution, pagination, wire schema, prices.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod graph;
pub mod mock;
pub mod pagination;
pub mod price;
pub mod queries;
pub mod schema;

pub use graph::GraphClient;
pub use mock::{MockExecutor, RecordedRequest};
pub use pagination::{
    decode_record, FetchedPages, PageQuery, PaginatedFetcher, PaginationMode, RecordError,
    GRAPH_QUERY_LIMIT,
};
pub use price::{IndexerPriceSource, PriceSource, StaticPriceSource};

/// GraphQL variable declarations, e.g. `"$limit" -> "Int!"`.
pub type ParamTypes = BTreeMap<String, String>;

/// GraphQL variable values, keyed without the `$`.
pub type ParamValues = serde_json::Map<String, Value>;

/// Executes one parameterized query against an indexer.
///
/// Implementations handle transport, retry/backoff and timeouts. Pagination
/// is the caller's concern (see [`PaginatedFetcher`]).
#[async_trait]
pub trait QueryExecutor: Send + Sync + fmt::Debug {
    /// Run `query` (the selection body) with the given variables and return
    /// the decoded `data` object.
    async fn execute(
        &self,
        query: &str,
        param_types: &ParamTypes,
        param_values: &ParamValues,
    ) -> Result<Value, RemoteError>;
}

/// Failure talking to the indexer, or data from it that cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("rate limited")]
    RateLimited,
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("indexer returned errors: {0}")]
    Graph(String),
    /// A record whose identity fields are unusable; skipping it would lose data silently.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

impl RemoteError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::RateLimited | RemoteError::Timeout(_) => true,
            RemoteError::Http { status, .. } => *status >= 500,
            RemoteError::Parse(_) | RemoteError::Graph(_) | RemoteError::CorruptRecord(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        assert_eq!(
            RemoteError::Network("connection reset".into()).to_string(),
            "network error: connection reset"
        );
        assert_eq!(
            RemoteError::Http {
                status: 502,
                message: "bad gateway".into()
            }
            .to_string(),
            "http error 502: bad gateway"
        );
        assert_eq!(RemoteError::Timeout(500).to_string(), "request timed out after 500ms");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RemoteError::Timeout(1).is_retryable());
        assert!(RemoteError::RateLimited.is_retryable());
        assert!(RemoteError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!RemoteError::Http {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!RemoteError::CorruptRecord("x".into()).is_retryable());
    }
}
