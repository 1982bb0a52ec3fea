//! Liquidity added to or removed from AMM pools.

use crate::domain::{
    Address, Balance, Decimal, FlowDirection, HistoryRecord, PoolFlow, Timestamp, Token,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpEventType {
    Mint,
    Burn,
}

impl LpEventType {
    pub const ALL: [LpEventType; 2] = [LpEventType::Mint, LpEventType::Burn];

    /// User-facing label, also the persisted discriminator.
    pub fn label(&self) -> &'static str {
        match self {
            LpEventType::Mint => "mint",
            LpEventType::Burn => "burn",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl std::fmt::Display for LpEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One mint or burn of a pool's LP token by a tracked address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpEvent {
    pub tx_hash: String,
    pub log_index: i64,
    pub event_type: LpEventType,
    /// Liquidity provider.
    pub address: Address,
    pub timestamp: Timestamp,
    pub pool_address: Address,
    pub token0: Token,
    pub token1: Token,
    pub amount0: Decimal,
    pub amount1: Decimal,
    /// LP tokens minted or burned, with the USD value at event time.
    pub lp_amount: Balance,
}

impl LpEvent {
    /// Display ordering: oldest first, then by log index.
    pub fn ordering_key(&self) -> (Timestamp, i64) {
        (self.timestamp, self.log_index)
    }
}

impl HistoryRecord for LpEvent {
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
            self.event_type.label()
        )
    }
}

impl PoolFlow for LpEvent {
    fn pool_id(&self) -> &str {
        self.pool_address.as_str()
    }

    fn flow(&self) -> FlowDirection {
        match self.event_type {
            LpEventType::Mint => FlowDirection::Deposit,
            LpEventType::Burn => FlowDirection::Withdraw,
        }
    }

    fn value(&self) -> Balance {
        self.lp_amount
    }
}
