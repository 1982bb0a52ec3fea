//! Sync orchestration: range tracking, the generic sync engine, and the
//! per-protocol services built on it.

pub mod amm;
pub mod lp_events;
pub mod range_tracker;
pub mod staking;
pub mod sync;

pub use amm::{AmmProtocol, AmmService, TradesHistory};
pub use lp_events::AmmEventsProtocol;
pub use range_tracker::{DeltaFetch, RangeTracker, SyncPlan};
pub use staking::{StakingProtocol, StakingService};
pub use sync::{
    History, HistorySource, ReconciledHistory, SnapshotSource, SyncEngine, SyncError, SyncReport,
};
