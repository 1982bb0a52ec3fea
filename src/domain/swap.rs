//! Raw swap legs as recorded on chain.

use crate::domain::{Address, Decimal, HistoryRecord, Timestamp, Token};
use serde::{Deserialize, Serialize};

/// One on-chain swap record inside a transaction.
///
/// `token0` is the pool's base asset and `token1` its quote asset, as given by
/// the pair record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSwapLeg {
    pub tx_hash: String,
    pub log_index: i64,
    /// Tracked address this leg was fetched for.
    pub address: Address,
    pub from_address: Address,
    pub to_address: Address,
    pub timestamp: Timestamp,
    pub pool_address: Address,
    pub token0: Token,
    pub token1: Token,
    pub amount0_in: Decimal,
    pub amount1_in: Decimal,
    pub amount0_out: Decimal,
    pub amount1_out: Decimal,
}

impl HistoryRecord for RawSwapLeg {
    fn owner(&self) -> &Address {
        &self.address
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn natural_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.tx_hash.to_ascii_lowercase(),
            self.log_index,
            self.pool_address.to_lowercase()
        )
    }
}
