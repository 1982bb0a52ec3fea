pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{GraphClient, MockExecutor, QueryExecutor, RemoteError};
pub use db::{init_db, Repository};
pub use domain::{
    Address, Balance, DataKind, Decimal, RawSwapLeg, StakingEvent, TimeRange, Timestamp, Token,
    Trade, TradeDirection,
};
pub use error::AppError;
pub use orchestration::{AmmService, StakingService, SyncEngine, SyncError, SyncReport};
