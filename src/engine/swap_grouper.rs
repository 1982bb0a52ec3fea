//! Groups raw swap legs into logical trades.
//!
//! Within a transaction, legs run in log-index order. Each leg is classified
//! BUY (quote in, base out) or SELL (base in, quote out); consecutive legs on
//! the same pool in the same direction collapse into one trade.

use crate::domain::{Decimal, HistoryRecord, RawSwapLeg, Trade, TradeDirection};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Stateless grouping of swap legs into trades.
pub struct SwapGrouper;

impl SwapGrouper {
    /// Direction of a single leg, or `None` if it matches neither pattern.
    pub fn classify(leg: &RawSwapLeg) -> Option<TradeDirection> {
        if leg.amount1_in.is_positive() && leg.amount0_out.is_positive() {
            Some(TradeDirection::Buy)
        } else if leg.amount0_in.is_positive() && leg.amount1_out.is_positive() {
            Some(TradeDirection::Sell)
        } else {
            None
        }
    }

    /// Group legs from any number of transactions.
    ///
    /// Duplicate legs (same natural key) are dropped first, so overlapping
    /// fetch windows are harmless. Trades are returned ordered by
    /// `(timestamp, tx_hash)` and then by position in the transaction.
    pub fn group(legs: Vec<RawSwapLeg>) -> Vec<Trade> {
        let mut seen = HashSet::new();
        let mut by_tx: BTreeMap<String, Vec<RawSwapLeg>> = BTreeMap::new();
        for leg in legs {
            if seen.insert(leg.natural_key()) {
                by_tx
                    .entry(leg.tx_hash.to_ascii_lowercase())
                    .or_default()
                    .push(leg);
            }
        }

        let mut trades: Vec<Trade> = by_tx
            .into_values()
            .flat_map(Self::group_transaction)
            .collect();
        // Stable: trades of one transaction keep their relative order.
        trades.sort_by(|a, b| (a.timestamp, &a.tx_hash).cmp(&(b.timestamp, &b.tx_hash)));
        trades
    }

    /// Group the legs of a single transaction.
    pub fn group_transaction(mut legs: Vec<RawSwapLeg>) -> Vec<Trade> {
        legs.sort_by(|a, b| {
            a.log_index
                .cmp(&b.log_index)
                .then_with(|| a.pool_address.cmp(&b.pool_address))
        });

        let mut runs: Vec<(TradeDirection, Vec<RawSwapLeg>)> = Vec::new();
        for leg in legs {
            let Some(direction) = Self::classify(&leg) else {
                warn!(
                    tx_hash = %leg.tx_hash,
                    log_index = leg.log_index,
                    pool = %leg.pool_address,
                    "Dropping swap leg with no buy/sell pattern"
                );
                continue;
            };
            match runs.last_mut() {
                Some((last_direction, run))
                    if *last_direction == direction
                        && run[0].pool_address == leg.pool_address =>
                {
                    run.push(leg)
                }
                _ => runs.push((direction, vec![leg])),
            }
        }

        runs.into_iter()
            .enumerate()
            .map(|(index, (direction, run))| build_trade(index, direction, run))
            .collect()
    }
}

fn build_trade(index: usize, direction: TradeDirection, swaps: Vec<RawSwapLeg>) -> Trade {
    let (amount_in, amount_out) = match direction {
        TradeDirection::Buy => (
            swaps.iter().map(|s| s.amount1_in).sum::<Decimal>(),
            swaps.iter().map(|s| s.amount0_out).sum::<Decimal>(),
        ),
        TradeDirection::Sell => (
            swaps.iter().map(|s| s.amount0_in).sum::<Decimal>(),
            swaps.iter().map(|s| s.amount1_out).sum::<Decimal>(),
        ),
    };
    let first = &swaps[0];
    let tx_hash = first.tx_hash.to_ascii_lowercase();

    Trade {
        trade_id: format!("{}-{}", tx_hash, index),
        address: first.address.clone(),
        tx_hash,
        timestamp: first.timestamp,
        pool_address: first.pool_address.clone(),
        direction,
        base_asset: first.token0.clone(),
        quote_asset: first.token1.clone(),
        amount_in,
        amount_out,
        swaps,
    }
}
