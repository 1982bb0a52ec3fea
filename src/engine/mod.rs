//! Pure computation engine(s) for deterministic history logic.
//!
//! Nothing here touches the network or the database: inputs are fetched or
//! loaded records, outputs are recomputed on every request.

pub mod reconciler;
pub mod swap_grouper;

pub use reconciler::BalanceReconciler;
pub use swap_grouper::SwapGrouper;
