//! Traits shared by everything kept in the local history log.

use crate::domain::{Address, Balance, Timestamp};

/// A record fetched from the indexer and persisted append-only.
pub trait HistoryRecord: Clone + Send + Sync + 'static {
    /// Address whose history this record belongs to.
    fn owner(&self) -> &Address;

    fn timestamp(&self) -> Timestamp;

    /// Uniqueness key; re-adding a record with the same key is a no-op.
    fn natural_key(&self) -> String;
}

/// How an event moves value relative to the user's cost basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Funds committed to the pool (cost).
    Deposit,
    /// Funds returned to the user (gain).
    Withdraw,
    /// Bookkeeping only, no funds move.
    Neutral,
}

/// A history record that moves value into or out of a pool.
pub trait PoolFlow {
    fn pool_id(&self) -> &str;

    fn flow(&self) -> FlowDirection;

    /// Amount moved and its USD value at the time of the event.
    fn value(&self) -> Balance;
}
