//! Domain types for synchronized protocol history.
//!
//! This module provides:
//! - Lossless amounts via the Decimal wrapper
//! - Primitives: Timestamp, TimeRange, Address, DataKind
//! - Raw swap legs and the trades grouped from them
//! - LP mint/burn events
//! - Staking events and pool balance / profit-loss types
//! - The `HistoryRecord` and `PoolFlow` traits the sync engine is generic over

pub mod decimal;
pub mod history;
pub mod lp_event;
pub mod pool;
pub mod primitives;
pub mod staking;
pub mod swap;
pub mod token;
pub mod trade;

pub use decimal::Decimal;
pub use history::{FlowDirection, HistoryRecord, PoolFlow};
pub use lp_event::{LpEvent, LpEventType};
pub use pool::{
    LiquidityPool, LiquidityPoolAsset, PnlBasis, PoolBalanceSnapshot, ProfitLossResult,
    RewardBalance,
};
pub use primitives::{Address, AddressParseError, DataKind, TimeRange, Timestamp};
pub use staking::{pool_name, EventCore, StakingEvent, StakingEventType, TOM_POOL_ID};
pub use swap::RawSwapLeg;
pub use token::{Balance, Token};
pub use trade::{Trade, TradeDirection};
