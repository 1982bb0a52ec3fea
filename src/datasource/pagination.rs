//! Client-side offset pagination over indexer queries.
//!
//! Pages are requested with `limit`/`offset` variables until a page comes back
//! shorter than the page size. There is no server-side cursor, so a fetch can
//! be restarted at any time without cleanup.

use super::{ParamTypes, ParamValues, QueryExecutor, RemoteError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Page size shared by every paginated query.
pub const GRAPH_QUERY_LIMIT: usize = 1000;

/// What to do with already-accumulated pages when a later page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    /// Discard everything and fail. Used for prices and balances.
    Strict,
    /// Stop early and hand back the successful prefix with the error.
    /// Used for history sync.
    Partial,
}

/// Why a single record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Drop the record, keep going.
    #[error("skipping record: {0}")]
    Skip(String),
    /// The record's identity is unusable; escalated to [`RemoteError::CorruptRecord`].
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Strict schema decode of one record.
pub fn decode_record<T: DeserializeOwned>(value: Value) -> Result<T, RecordError> {
    serde_json::from_value(value).map_err(|e| RecordError::Skip(e.to_string()))
}

/// One logical query: template, root field and its query-specific filters.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub template: &'static str,
    /// Field of the `data` object holding the page's records.
    pub root_key: &'static str,
    /// Types of the filter variables; `limit`/`offset` are added automatically.
    pub param_types: ParamTypes,
    pub filters: ParamValues,
}

impl PageQuery {
    pub fn new(template: &'static str, root_key: &'static str) -> Self {
        Self {
            template,
            root_key,
            param_types: ParamTypes::new(),
            filters: ParamValues::new(),
        }
    }

    pub fn filter(mut self, name: &str, ty: &str, value: Value) -> Self {
        self.param_types.insert(format!("${}", name), ty.to_string());
        self.filters.insert(name.to_string(), value);
        self
    }
}

/// Records accumulated by a paginated fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPages<T> {
    pub records: Vec<T>,
    /// Page requests that returned successfully.
    pub pages: usize,
    /// Records dropped by the decoder.
    pub skipped: usize,
    /// Set only in [`PaginationMode::Partial`] when the fetch stopped early.
    pub error: Option<RemoteError>,
}

impl<T> FetchedPages<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetches every page of a [`PageQuery`].
#[derive(Debug)]
pub struct PaginatedFetcher<'a, E: QueryExecutor + ?Sized> {
    executor: &'a E,
    page_size: usize,
}

impl<'a, E: QueryExecutor + ?Sized> PaginatedFetcher<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self::with_page_size(executor, GRAPH_QUERY_LIMIT)
    }

    pub fn with_page_size(executor: &'a E, page_size: usize) -> Self {
        Self {
            executor,
            page_size: page_size.max(1),
        }
    }

    /// Run `query` page by page, decoding each record with `decode`.
    ///
    /// In `Strict` mode any failure is returned as `Err`. In `Partial` mode a
    /// remote failure or corrupt record ends the loop and is reported in
    /// [`FetchedPages::error`] next to the records fetched so far.
    pub async fn fetch_all<T, F>(
        &self,
        query: &PageQuery,
        mode: PaginationMode,
        mut decode: F,
    ) -> Result<FetchedPages<T>, RemoteError>
    where
        F: FnMut(Value) -> Result<T, RecordError>,
    {
        let param_types = Self::paged_types(query);

        let mut fetched = FetchedPages {
            records: Vec::new(),
            pages: 0,
            skipped: 0,
            error: None,
        };
        let mut offset = 0usize;

        loop {
            let page = match self.request_page(query, &param_types, offset).await {
                Ok(page) => page,
                Err(e) => return Self::stop(fetched, e, mode, query.root_key),
            };
            fetched.pages += 1;
            let page_len = page.len();
            debug!(root = query.root_key, offset, page_len, "Fetched indexer page");

            for record in page {
                match decode(record) {
                    Ok(decoded) => fetched.records.push(decoded),
                    Err(RecordError::Skip(reason)) => {
                        warn!(root = query.root_key, %reason, "Skipping malformed record");
                        fetched.skipped += 1;
                    }
                    Err(RecordError::Corrupt(reason)) => {
                        return Self::stop(
                            fetched,
                            RemoteError::CorruptRecord(reason),
                            mode,
                            query.root_key,
                        );
                    }
                }
            }

            if page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        Ok(fetched)
    }

    /// Only the first page of `query`, for queries ordered so that the
    /// wanted records come first. Any failure is returned as `Err`.
    pub async fn fetch_first_page<T, F>(
        &self,
        query: &PageQuery,
        mut decode: F,
    ) -> Result<Vec<T>, RemoteError>
    where
        F: FnMut(Value) -> Result<T, RecordError>,
    {
        let page = self
            .request_page(query, &Self::paged_types(query), 0)
            .await?;
        let mut records = Vec::with_capacity(page.len());
        for record in page {
            match decode(record) {
                Ok(decoded) => records.push(decoded),
                Err(RecordError::Skip(reason)) => {
                    warn!(root = query.root_key, %reason, "Skipping malformed record")
                }
                Err(RecordError::Corrupt(reason)) => {
                    return Err(RemoteError::CorruptRecord(reason))
                }
            }
        }
        Ok(records)
    }

    fn paged_types(query: &PageQuery) -> ParamTypes {
        let mut param_types = query.param_types.clone();
        param_types.insert("$limit".to_string(), "Int!".to_string());
        param_types.insert("$offset".to_string(), "Int!".to_string());
        param_types
    }

    async fn request_page(
        &self,
        query: &PageQuery,
        param_types: &ParamTypes,
        offset: usize,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut values: ParamValues = query.filters.clone();
        values.insert("limit".to_string(), Value::from(self.page_size));
        values.insert("offset".to_string(), Value::from(offset));

        let data = self
            .executor
            .execute(query.template, param_types, &values)
            .await?;
        take_page(data, query.root_key)
    }

    fn stop<T>(
        mut fetched: FetchedPages<T>,
        error: RemoteError,
        mode: PaginationMode,
        root_key: &str,
    ) -> Result<FetchedPages<T>, RemoteError> {
        match mode {
            PaginationMode::Strict => Err(error),
            PaginationMode::Partial => {
                warn!(
                    root = root_key,
                    pages = fetched.pages,
                    records = fetched.records.len(),
                    %error,
                    "Paginated fetch stopped early"
                );
                fetched.error = Some(error);
                Ok(fetched)
            }
        }
    }
}

fn take_page(mut data: Value, root_key: &str) -> Result<Vec<Value>, RemoteError> {
    match data.get_mut(root_key).map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        _ => Err(RemoteError::Parse(format!(
            "expected array at data.{}",
            root_key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockExecutor;
    use serde_json::json;

    const QUERY: &str = "items(first: $limit, skip: $offset) { id }";

    fn items(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "id": i })).collect()
    }

    fn decode_id(value: Value) -> Result<u64, RecordError> {
        value
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| RecordError::Skip("missing id".to_string()))
    }

    #[tokio::test]
    async fn test_request_count_for_partial_last_page() {
        let mock = MockExecutor::new().with_records("items", items(25));
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Strict, decode_id)
            .await
            .unwrap();

        assert_eq!(result.records, (0..25).collect::<Vec<u64>>());
        assert_eq!(result.pages, 3);
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_extra_request() {
        let mock = MockExecutor::new().with_records("items", items(20));
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Strict, decode_id)
            .await
            .unwrap();

        assert_eq!(result.records.len(), 20);
        assert_eq!(mock.request_count(), 3);
        let offsets: Vec<u64> = mock.requests().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_empty_result_single_request() {
        let mock = MockExecutor::new().with_records("items", vec![]);
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Strict, decode_id)
            .await
            .unwrap();
        assert!(result.records.is_empty());
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_discards_prefix() {
        let mock = MockExecutor::new()
            .with_records("items", items(25))
            .fail_on_request(1, RemoteError::RateLimited);
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Strict, decode_id)
            .await;
        assert_eq!(result, Err(RemoteError::RateLimited));
    }

    #[tokio::test]
    async fn test_partial_mode_keeps_prefix() {
        let mock = MockExecutor::new()
            .with_records("items", items(25))
            .fail_on_request(1, RemoteError::Timeout(100));
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Partial, decode_id)
            .await
            .unwrap();

        assert_eq!(result.records.len(), 10);
        assert_eq!(result.pages, 1);
        assert_eq!(result.error, Some(RemoteError::Timeout(100)));
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn test_skipped_records_do_not_stop_fetch() {
        let mut records = items(5);
        records.insert(2, json!({ "id": "not-a-number" }));
        let mock = MockExecutor::new().with_records("items", records);
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Strict, decode_id)
            .await
            .unwrap();
        assert_eq!(result.records, vec![0, 1, 2, 3, 4]);
        assert_eq!(result.skipped, 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_escalates() {
        let mock = MockExecutor::new().with_records("items", items(3));
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let result = fetcher
            .fetch_all(&PageQuery::new(QUERY, "items"), PaginationMode::Strict, |_| {
                Err::<u64, _>(RecordError::Corrupt("bad primary key".to_string()))
            })
            .await;
        assert_eq!(
            result,
            Err(RemoteError::CorruptRecord("bad primary key".to_string()))
        );
    }

    #[tokio::test]
    async fn test_filters_and_paging_variables_sent() {
        let mock = MockExecutor::new().with_records("items", items(1));
        let fetcher = PaginatedFetcher::with_page_size(&mock, 10);
        let query = PageQuery::new(QUERY, "items").filter("start_ts", "BigInt!", json!("5"));
        fetcher
            .fetch_all(&query, PaginationMode::Strict, decode_id)
            .await
            .unwrap();

        let request = &mock.requests()[0];
        assert_eq!(request.limit, 10);
        assert_eq!(request.param_types.get("$start_ts").map(String::as_str), Some("BigInt!"));
        assert_eq!(request.param_types.get("$limit").map(String::as_str), Some("Int!"));
        assert_eq!(request.values.get("start_ts"), Some(&json!("5")));
    }

    #[tokio::test]
    async fn test_first_page_is_a_single_request() {
        let mock = MockExecutor::new().with_records("items", items(25));
        let fetcher = PaginatedFetcher::with_page_size(&mock, 1);
        let records = fetcher
            .fetch_first_page(&PageQuery::new(QUERY, "items"), decode_id)
            .await
            .unwrap();

        assert_eq!(records, vec![0]);
        assert_eq!(mock.request_count(), 1);
        assert_eq!(mock.requests()[0].limit, 1);
    }
}
