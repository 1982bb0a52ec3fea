//! Scripted query executor for tests without network calls.

use super::{ParamTypes, ParamValues, QueryExecutor, RemoteError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// A request the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub root_key: String,
    pub offset: u64,
    pub limit: u64,
    pub param_types: ParamTypes,
    pub values: ParamValues,
}

#[derive(Debug, Default)]
struct MockState {
    datasets: HashMap<String, Vec<Value>>,
    requests: Vec<RecordedRequest>,
    fail_on_request: HashMap<usize, RemoteError>,
    fail_root: HashMap<String, RemoteError>,
    fail_address: HashMap<String, RemoteError>,
}

/// In-memory indexer.
///
/// Serves `limit`/`offset` pages of per-root datasets and applies the filters
/// the crate's queries use: `start_ts`/`end_ts` (inclusive, on `timestamp`),
/// `addresses`/`address` (on `owner`, `to`, `sender` or `user.id`),
/// `token_id` (on `token.id`) and `date`, which keeps records dated at or
/// before it and serves them newest first.
#[derive(Debug, Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records for a root field (e.g. `"swaps"`).
    pub fn with_records(self, root_key: &str, records: Vec<Value>) -> Self {
        self.push_records(root_key, records);
        self
    }

    /// Fail the `index`-th request (0-based, counted across all roots).
    pub fn fail_on_request(self, index: usize, error: RemoteError) -> Self {
        self.lock().fail_on_request.insert(index, error);
        self
    }

    /// Append records after construction, simulating new on-chain activity.
    pub fn push_records(&self, root_key: &str, records: Vec<Value>) {
        self.lock()
            .datasets
            .entry(root_key.to_string())
            .or_default()
            .extend(records);
    }

    /// Fail every request for `root_key` until cleared.
    pub fn set_root_failure(&self, root_key: &str, error: Option<RemoteError>) {
        let mut state = self.lock();
        match error {
            Some(e) => state.fail_root.insert(root_key.to_string(), e),
            None => state.fail_root.remove(root_key),
        };
    }

    /// Fail every request whose address filter includes `address`.
    pub fn set_address_failure(&self, address: &str, error: Option<RemoteError>) {
        let mut state = self.lock();
        let key = address.to_ascii_lowercase();
        match error {
            Some(e) => state.fail_address.insert(key, e),
            None => state.fail_address.remove(&key),
        };
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests_for(&self, root_key: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.root_key == root_key)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn root_key_of(query: &str) -> String {
    query
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Every field a query may filter its address list on.
fn record_owners(record: &Value) -> Vec<String> {
    [
        record.get("owner"),
        record.get("to"),
        record.get("sender"),
        record.get("user").and_then(|u| u.get("id")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::to_ascii_lowercase)
    .collect()
}

fn filter_addresses(values: &ParamValues) -> Option<Vec<String>> {
    if let Some(list) = values.get("addresses").and_then(Value::as_array) {
        return Some(
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_ascii_lowercase)
                .collect(),
        );
    }
    values
        .get("address")
        .and_then(Value::as_str)
        .map(|a| vec![a.to_ascii_lowercase()])
}

fn matches_filters(record: &Value, values: &ParamValues) -> bool {
    let ts = record.get("timestamp").and_then(as_i64);
    if let (Some(start), Some(ts)) = (values.get("start_ts").and_then(as_i64), ts) {
        if ts < start {
            return false;
        }
    }
    if let (Some(end), Some(ts)) = (values.get("end_ts").and_then(as_i64), ts) {
        if ts > end {
            return false;
        }
    }
    if let Some(addresses) = filter_addresses(values) {
        if !record_owners(record).iter().any(|o| addresses.contains(o)) {
            return false;
        }
    }
    if let Some(token) = values.get("token_id").and_then(Value::as_str) {
        let record_token = record
            .get("token")
            .and_then(|t| t.get("id"))
            .and_then(Value::as_str);
        if !record_token.is_some_and(|t| t.eq_ignore_ascii_case(token)) {
            return false;
        }
    }
    if let Some(date) = values.get("date").and_then(as_i64) {
        match record.get("date").and_then(as_i64) {
            Some(record_date) if record_date <= date => {}
            _ => return false,
        }
    }
    true
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(
        &self,
        query: &str,
        param_types: &ParamTypes,
        param_values: &ParamValues,
    ) -> Result<Value, RemoteError> {
        let root_key = root_key_of(query);
        let offset = param_values.get("offset").and_then(Value::as_u64).unwrap_or(0);
        let limit = param_values
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX);

        let mut state = self.lock();
        let index = state.requests.len();
        state.requests.push(RecordedRequest {
            root_key: root_key.clone(),
            offset,
            limit,
            param_types: param_types.clone(),
            values: param_values.clone(),
        });

        if let Some(error) = state.fail_on_request.get(&index) {
            return Err(error.clone());
        }
        if let Some(error) = state.fail_root.get(&root_key) {
            return Err(error.clone());
        }
        if let Some(addresses) = filter_addresses(param_values) {
            if let Some(error) = addresses.iter().find_map(|a| state.fail_address.get(a)) {
                return Err(error.clone());
            }
        }

        let mut matched: Vec<&Value> = state
            .datasets
            .get(&root_key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches_filters(r, param_values))
                    .collect()
            })
            .unwrap_or_default();
        if param_values.contains_key("date") {
            matched.sort_by_key(|r| std::cmp::Reverse(r.get("date").and_then(as_i64)));
        }
        let page: Vec<Value> = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit.min(usize::MAX as u64) as usize)
            .cloned()
            .collect();

        let mut data = serde_json::Map::new();
        data.insert(root_key, Value::Array(page));
        Ok(Value::Object(data))
    }
}
