//! Per-address record of already-fetched history, and the fetch plan derived
//! from it.

use crate::db::Repository;
use crate::domain::{Address, DataKind, TimeRange, Timestamp};
use std::sync::Arc;

/// Range store view for one data kind.
#[derive(Debug, Clone)]
pub struct RangeTracker {
    repo: Arc<Repository>,
    kind: DataKind,
}

impl RangeTracker {
    pub fn new(repo: Arc<Repository>, kind: DataKind) -> Self {
        Self { repo, kind }
    }

    pub async fn get_range(&self, address: &Address) -> Result<Option<TimeRange>, sqlx::Error> {
        self.repo
            .get_used_query_range(&self.kind.range_key(address))
            .await
    }

    pub async fn set_range(&self, address: &Address, range: TimeRange) -> Result<(), sqlx::Error> {
        self.repo
            .update_used_query_range(&self.kind.range_key(address), range.start, range.end)
            .await
    }

    /// Look up every address' coverage and classify it against `to`.
    pub async fn plan(&self, addresses: &[Address], to: Timestamp) -> Result<SyncPlan, sqlx::Error> {
        let mut stored = Vec::with_capacity(addresses.len());
        for address in addresses {
            stored.push((address.clone(), self.get_range(address).await?));
        }
        Ok(SyncPlan::classify(stored, to))
    }
}

/// One shared delta fetch for addresses that are behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaFetch {
    /// Minimum stored end across `addresses`.
    pub start: Timestamp,
    /// Addresses with their current coverage.
    pub addresses: Vec<(Address, TimeRange)>,
}

/// What a sync has to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Never fetched; each needs `[0, to]`.
    pub new: Vec<Address>,
    pub delta: Option<DeltaFetch>,
    /// Coverage already reaches `to`.
    pub up_to_date: Vec<Address>,
}

impl SyncPlan {
    /// Classify addresses by stored coverage. Input order is preserved within
    /// each class.
    pub fn classify(stored: Vec<(Address, Option<TimeRange>)>, to: Timestamp) -> Self {
        let mut plan = SyncPlan::default();
        let mut behind = Vec::new();

        for (address, range) in stored {
            match range {
                None => plan.new.push(address),
                Some(range) if range.end < to => behind.push((address, range)),
                Some(_) => plan.up_to_date.push(address),
            }
        }

        plan.delta = behind
            .iter()
            .map(|(_, range)| range.end)
            .min()
            .map(|start| DeltaFetch {
                start,
                addresses: behind,
            });
        plan
    }

    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.delta.is_none()
    }
}
