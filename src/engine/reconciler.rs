//! Per-pool profit/loss from event history and a live balance snapshot.
//!
//! `profit_loss = live + Σ withdrawals − Σ deposits`, in token units and in
//! USD. Event USD values are the ones recorded at event time; only the live
//! term carries the current price. Without a snapshot the live term is zero
//! and the result is a [`PnlBasis::HistoricalDelta`].

use crate::domain::{
    pool_name, Address, Balance, FlowDirection, PnlBasis, PoolBalanceSnapshot, PoolFlow,
    ProfitLossResult,
};
use std::collections::BTreeMap;

/// Stateless profit/loss computation.
pub struct BalanceReconciler;

impl BalanceReconciler {
    /// Profit/loss per pool for `address`.
    ///
    /// Pools are the union of pools seen in `events` and in `snapshots`,
    /// ordered by pool id. Pool ids compare case-insensitively.
    pub fn profit_loss<E: PoolFlow>(
        address: &Address,
        events: &[E],
        snapshots: Option<&[PoolBalanceSnapshot]>,
    ) -> Vec<ProfitLossResult> {
        let mut flows: BTreeMap<String, Balance> = BTreeMap::new();
        for event in events {
            let delta = flows
                .entry(event.pool_id().to_ascii_lowercase())
                .or_insert_with(Balance::zero);
            *delta = apply_flow(*delta, event.flow(), event.value());
        }

        let basis = match snapshots {
            Some(_) => PnlBasis::Current,
            None => PnlBasis::HistoricalDelta,
        };
        let mut live: BTreeMap<String, PoolBalanceSnapshot> = BTreeMap::new();
        for snapshot in snapshots.unwrap_or_default() {
            live.insert(snapshot.pool_id.to_ascii_lowercase(), snapshot.clone());
            flows.entry(snapshot.pool_id.to_ascii_lowercase()).or_insert_with(Balance::zero);
        }

        flows
            .into_iter()
            .map(|(pool_id, delta)| {
                let snapshot = live.remove(&pool_id);
                // A pool missing from the snapshot holds nothing right now.
                let live_term = snapshot
                    .as_ref()
                    .map(PoolBalanceSnapshot::total)
                    .unwrap_or_else(Balance::zero);
                ProfitLossResult {
                    address: address.clone(),
                    pool_name: pool_name(&pool_id).map(str::to_string),
                    pool_id,
                    basis,
                    snapshot,
                    profit_loss: live_term + delta,
                }
            })
            .collect()
    }
}

/// Fold one event into the running net flow.
fn apply_flow(running: Balance, flow: FlowDirection, value: Balance) -> Balance {
    match flow {
        FlowDirection::Deposit => running - value,
        FlowDirection::Withdraw => running + value,
        FlowDirection::Neutral => running,
    }
}
