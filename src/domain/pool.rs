//! Point-in-time pool balances and derived profit/loss.

use crate::domain::{Address, Balance, Decimal, Token};
use serde::{Deserialize, Serialize};

/// An address' position and unclaimed reward in one pool, valid only at the
/// moment it was fetched.
///
/// `balance` and `unclaimed` are in the pool's own token. A reward paid in a
/// different token is carried in `reward` and kept out of [`Self::total`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalanceSnapshot {
    pub address: Address,
    pub pool_id: String,
    pub balance: Balance,
    pub unclaimed: Balance,
    pub reward: Option<RewardBalance>,
    /// Amount staked in the pool by everyone.
    pub pool_total_staked: Option<Decimal>,
}

impl PoolBalanceSnapshot {
    /// A plain position with nothing unclaimed.
    pub fn holding(address: Address, pool_id: String, balance: Balance) -> Self {
        PoolBalanceSnapshot {
            address,
            pool_id,
            balance,
            unclaimed: Balance::zero(),
            reward: None,
            pool_total_staked: None,
        }
    }

    /// Everything the user could withdraw right now, in the pool's token.
    pub fn total(&self) -> Balance {
        self.balance + self.unclaimed
    }
}

/// Unclaimed reward denominated in a second token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBalance {
    pub token: Token,
    pub unclaimed: Balance,
}

/// Whether a profit/loss figure includes a live balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlBasis {
    /// Full history plus the current balance snapshot.
    Current,
    /// Net flow over the requested window only; not a true profit/loss.
    HistoricalDelta,
}

/// Net value change of one pool. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitLossResult {
    pub address: Address,
    pub pool_id: String,
    pub pool_name: Option<String>,
    pub basis: PnlBasis,
    pub snapshot: Option<PoolBalanceSnapshot>,
    pub profit_loss: Balance,
}

/// One underlying asset of a liquidity pool and the user's share of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolAsset {
    pub asset: Token,
    pub total_amount: Decimal,
    pub user_balance: Balance,
}

/// A user's LP position in an AMM pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub address: Address,
    pub assets: Vec<LiquidityPoolAsset>,
    pub total_supply: Decimal,
    /// LP token balance; `usd_value` is the sum of the assets' USD values.
    pub user_balance: Balance,
}
