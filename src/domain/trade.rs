//! Logical trades derived from grouped swap legs.

use crate::domain::{Address, Decimal, RawSwapLeg, Timestamp, Token};
use serde::{Deserialize, Serialize};

/// Trade direction relative to the pool's base asset (token0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    /// Quote in, base out.
    Buy,
    /// Base in, quote out.
    Sell,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "buy"),
            TradeDirection::Sell => write!(f, "sell"),
        }
    }
}

/// One or more consecutive same-pool, same-direction legs of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// `{tx_hash}-{n}` where `n` is the trade's position within the transaction.
    pub trade_id: String,
    pub address: Address,
    pub tx_hash: String,
    pub timestamp: Timestamp,
    pub pool_address: Address,
    pub direction: TradeDirection,
    pub base_asset: Token,
    pub quote_asset: Token,
    /// Total of the asset sent into the pool.
    pub amount_in: Decimal,
    /// Total of the asset received from the pool.
    pub amount_out: Decimal,
    pub swaps: Vec<RawSwapLeg>,
}

impl Trade {
    pub fn base_amount(&self) -> Decimal {
        match self.direction {
            TradeDirection::Buy => self.amount_out,
            TradeDirection::Sell => self.amount_in,
        }
    }

    pub fn quote_amount(&self) -> Decimal {
        match self.direction {
            TradeDirection::Buy => self.amount_in,
            TradeDirection::Sell => self.amount_out,
        }
    }

    /// Quote units paid or received per base unit.
    pub fn rate(&self) -> Option<Decimal> {
        self.quote_amount().checked_div(self.base_amount())
    }
}
