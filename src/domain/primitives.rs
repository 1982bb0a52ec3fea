//! Domain primitives: Timestamp, TimeRange, Address, DataKind.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in seconds since Unix epoch, as reported by the indexer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a Timestamp from seconds.
    pub fn new(secs: i64) -> Self {
        Timestamp(secs)
    }

    /// The start of history; full fetches begin here.
    pub fn zero() -> Self {
        Timestamp(0)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp())
    }

    /// Get the underlying seconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive `[start, end]` interval of already-fetched history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a range, returning `None` when `start > end`.
    pub fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start <= end).then_some(TimeRange { start, end })
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),
    #[error("invalid address {0}: {1}")]
    Invalid(String, String),
}

/// Checksummed EVM account or contract address.
///
/// Stored in EIP-55 form; the indexer is queried with [`Address::to_lowercase`].
/// Equality is case-insensitive because construction always normalizes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and checksum an address in any letter case.
    pub fn parse(input: &str) -> Result<Self, AddressParseError> {
        let trimmed = input.trim();
        if !(trimmed.starts_with("0x") || trimmed.starts_with("0X")) {
            return Err(AddressParseError::MissingPrefix(trimmed.to_string()));
        }
        let raw = alloy_primitives::Address::from_str(&trimmed.to_ascii_lowercase())
            .map_err(|e| AddressParseError::Invalid(trimmed.to_string(), e.to_string()))?;
        Ok(Address(raw.to_checksum(None)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form the indexer stores and filters on.
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which slice of an address' history a range entry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    AmmTrades,
    AmmEvents,
    StakingEvents,
}

impl DataKind {
    /// Prefix of the used-query-range entry names for this kind.
    pub fn range_prefix(&self) -> &'static str {
        match self {
            DataKind::AmmTrades => "amm_trades",
            DataKind::AmmEvents => "amm_events",
            DataKind::StakingEvents => "staking_events",
        }
    }

    pub fn range_key(&self, address: &Address) -> String {
        format!("{}_{}", self.range_prefix(), address)
    }
}
