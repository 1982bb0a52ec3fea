//! Incremental history sync, generic over a protocol's capability set.
//!
//! One sync call runs CLASSIFY → FETCH_NEW → FETCH_DELTA → PERSIST, and the
//! history entry points follow with READBACK and (for protocols with live
//! balances) RECONCILE. All history operations of one engine are serialized
//! by a single coarse lock.

use super::range_tracker::{RangeTracker, SyncPlan};
use crate::datasource::{FetchedPages, RemoteError};
use crate::db::Repository;
use crate::domain::{
    Address, DataKind, HistoryRecord, PoolBalanceSnapshot, PoolFlow, ProfitLossResult, TimeRange,
    Timestamp,
};
use crate::engine::BalanceReconciler;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// What a protocol must provide to be synced.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    type Record: HistoryRecord;

    fn kind(&self) -> DataKind;

    /// Fetch every record of `addresses` with `start <= timestamp <= end`.
    ///
    /// Failures do not discard what was fetched before them: the successful
    /// prefix is returned with [`FetchedPages::error`] set.
    async fn fetch(
        &self,
        addresses: &[Address],
        start: Timestamp,
        end: Timestamp,
    ) -> FetchedPages<Self::Record>;

    /// Persist records idempotently; returns how many were new.
    async fn store(&self, records: &[Self::Record]) -> Result<usize, sqlx::Error>;

    /// Stored records of `address` within `[from, to]`, time-ordered.
    async fn load(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Self::Record>, sqlx::Error>;

    /// Delete stored records and their coverage for one address or all.
    async fn purge(&self, address: Option<&Address>) -> Result<u64, sqlx::Error>;
}

/// A protocol that can report live per-pool balances.
#[async_trait]
pub trait SnapshotSource: HistorySource {
    async fn snapshots(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Vec<PoolBalanceSnapshot>>, SyncError>;
}

/// Outcome of one sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Addresses whose coverage now reaches the requested end.
    pub synced: Vec<Address>,
    /// Addresses whose fetch failed; their coverage was not advanced.
    pub failed: Vec<(Address, RemoteError)>,
    pub fetched: usize,
    pub inserted: usize,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Synced and read-back history.
#[derive(Debug, Clone)]
pub struct History<R> {
    pub report: SyncReport,
    pub records: BTreeMap<Address, Vec<R>>,
}

/// History plus per-pool profit/loss for each address.
#[derive(Debug, Clone)]
pub struct ReconciledHistory<R> {
    pub history: History<R>,
    pub profit_loss: BTreeMap<Address, Vec<ProfitLossResult>>,
}

pub struct SyncEngine<S: HistorySource> {
    source: S,
    ranges: RangeTracker,
    lock: Mutex<()>,
}

impl<S: HistorySource> SyncEngine<S> {
    pub fn new(source: S, repo: Arc<Repository>) -> Self {
        let ranges = RangeTracker::new(repo, source.kind());
        Self {
            source,
            ranges,
            lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ranges(&self) -> &RangeTracker {
        &self.ranges
    }

    /// Bring coverage of `addresses` up to `to`.
    pub async fn sync(&self, addresses: &[Address], to: Timestamp) -> Result<SyncReport, SyncError> {
        let _guard = self.lock.lock().await;
        self.sync_locked(&unique_addresses(addresses), to).await
    }

    /// Sync, then read back `[from, to]` for each address.
    ///
    /// With `reset`, all stored history of this protocol is deleted first.
    pub async fn history(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
        reset: bool,
    ) -> Result<History<S::Record>, SyncError> {
        let _guard = self.lock.lock().await;
        let addresses = unique_addresses(addresses);
        if reset {
            self.source.purge(None).await?;
        }
        let report = self.sync_locked(&addresses, to).await?;
        let records = self.read_back(&addresses, from, to).await?;
        Ok(History { report, records })
    }

    /// Read stored history without contacting the indexer.
    pub async fn cached(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
    ) -> Result<BTreeMap<Address, Vec<S::Record>>, sqlx::Error> {
        let _guard = self.lock.lock().await;
        self.read_back(&unique_addresses(addresses), from, to).await
    }

    /// Delete stored history and coverage for one address, or all.
    pub async fn purge(&self, address: Option<&Address>) -> Result<u64, sqlx::Error> {
        let _guard = self.lock.lock().await;
        self.source.purge(address).await
    }

    async fn sync_locked(&self, addresses: &[Address], to: Timestamp) -> Result<SyncReport, SyncError> {
        let kind = self.source.kind().range_prefix();
        let plan = self.ranges.plan(addresses, to).await?;
        info!(
            kind,
            to = %to,
            new = plan.new.len(),
            behind = plan.delta.as_ref().map_or(0, |d| d.addresses.len()),
            up_to_date = plan.up_to_date.len(),
            "Sync plan"
        );
        if plan.is_noop() {
            return Ok(SyncReport {
                synced: addresses.to_vec(),
                ..SyncReport::default()
            });
        }

        let FetchOutcome {
            records,
            advance,
            failed,
        } = self.fetch_planned(&plan, to).await;

        let records = dedupe(records);
        let inserted = self.source.store(&records).await?;
        for (address, range) in &advance {
            self.ranges.set_range(address, *range).await?;
            info!(kind, address = %address, end = %range.end, "Advanced query range");
        }

        let failed_set: HashSet<&Address> = failed.iter().map(|(a, _)| a).collect();
        let report = SyncReport {
            synced: addresses
                .iter()
                .filter(|a| !failed_set.contains(a))
                .cloned()
                .collect(),
            fetched: records.len(),
            inserted,
            failed,
        };

        if report.synced.is_empty() {
            if let Some((_, error)) = report.failed.first() {
                return Err(SyncError::Remote(error.clone()));
            }
        }
        Ok(report)
    }

    async fn fetch_planned(&self, plan: &SyncPlan, to: Timestamp) -> FetchOutcome<S::Record> {
        let mut outcome = FetchOutcome {
            records: Vec::new(),
            advance: Vec::new(),
            failed: Vec::new(),
        };

        for address in &plan.new {
            let pages = self
                .source
                .fetch(std::slice::from_ref(address), Timestamp::zero(), to)
                .await;
            outcome.records.extend(pages.records);
            match pages.error {
                None => {
                    if let Some(range) = TimeRange::new(Timestamp::zero(), to) {
                        outcome.advance.push((address.clone(), range));
                    }
                }
                Some(error) => {
                    warn!(address = %address, %error, "Full history fetch failed");
                    outcome.failed.push((address.clone(), error));
                }
            }
        }

        if let Some(delta) = &plan.delta {
            let addresses: Vec<Address> = delta.addresses.iter().map(|(a, _)| a.clone()).collect();
            let pages = self.source.fetch(&addresses, delta.start, to).await;
            outcome.records.extend(pages.records);
            match pages.error {
                None => {
                    for (address, stored) in &delta.addresses {
                        if let Some(range) = TimeRange::new(stored.start, to) {
                            outcome.advance.push((address.clone(), range));
                        }
                    }
                }
                Some(error) => {
                    warn!(addresses = addresses.len(), %error, "Delta fetch failed");
                    outcome
                        .failed
                        .extend(addresses.into_iter().map(|a| (a, error.clone())));
                }
            }
        }

        outcome
    }

    async fn read_back(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
    ) -> Result<BTreeMap<Address, Vec<S::Record>>, sqlx::Error> {
        let mut records = BTreeMap::new();
        for address in addresses {
            records.insert(address.clone(), self.source.load(address, from, to).await?);
        }
        Ok(records)
    }
}

impl<S> SyncEngine<S>
where
    S: SnapshotSource,
    S::Record: PoolFlow,
{
    /// History with per-pool profit/loss.
    ///
    /// Live balances are only fetched for full-history queries (`from == 0`);
    /// otherwise, or if the snapshot fetch fails, results are historical deltas.
    pub async fn reconciled_history(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
        reset: bool,
    ) -> Result<ReconciledHistory<S::Record>, SyncError> {
        let history = self.history(addresses, from, to, reset).await?;

        let snapshots = if from == Timestamp::zero() {
            let addresses: Vec<Address> = history.records.keys().cloned().collect();
            match self.source.snapshots(&addresses).await {
                Ok(snapshots) => Some(snapshots),
                Err(error) => {
                    warn!(%error, "Balance snapshot unavailable, reporting historical delta");
                    None
                }
            }
        } else {
            None
        };

        let profit_loss = history
            .records
            .iter()
            .map(|(address, events)| {
                let live = snapshots
                    .as_ref()
                    .map(|s| s.get(address).map(Vec::as_slice).unwrap_or_default());
                (
                    address.clone(),
                    BalanceReconciler::profit_loss(address, events, live),
                )
            })
            .collect();

        Ok(ReconciledHistory {
            history,
            profit_loss,
        })
    }
}

struct FetchOutcome<R> {
    records: Vec<R>,
    advance: Vec<(Address, TimeRange)>,
    failed: Vec<(Address, RemoteError)>,
}

fn unique_addresses(addresses: &[Address]) -> Vec<Address> {
    let mut seen = HashSet::new();
    addresses
        .iter()
        .filter(|a| seen.insert(*a))
        .cloned()
        .collect()
}

/// Drop records whose natural key was already seen, keeping the first.
fn dedupe<R: HistoryRecord>(records: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.natural_key()))
        .collect()
}
