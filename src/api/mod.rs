pub mod amm;
pub mod health;
pub mod history;
pub mod staking;

use crate::db::Repository;
use crate::domain::{Address, Balance, PnlBasis, ProfitLossResult, Timestamp, Token};
use crate::error::AppError;
use crate::orchestration::{AmmService, StakingService, SyncReport};
use axum::{
    extract::FromRef,
    routing::{delete, get},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub amm: Arc<AmmService>,
    pub staking: Arc<StakingService>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        amm: Arc<AmmService>,
        staking: Arc<StakingService>,
    ) -> Self {
        Self { repo, amm, staking }
    }
}

impl FromRef<AppState> for Arc<Repository> {
    fn from_ref(state: &AppState) -> Self {
        state.repo.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/amm/trades", get(amm::get_trades))
        .route("/v1/amm/balances", get(amm::get_balances))
        .route("/v1/amm/events", get(amm::get_events))
        .route("/v1/amm/history", delete(history::delete_amm_history))
        .route(
            "/v1/staking/history",
            get(staking::get_history).delete(history::delete_staking_history),
        )
        .layer(cors)
        .with_state(state)
}

/// Parse a comma-separated address list. Empty entries are ignored.
pub(crate) fn parse_addresses(raw: &str) -> Result<Vec<Address>, AppError> {
    let addresses = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Address::parse(s)
                .map_err(|e| AppError::BadRequest(format!("Invalid address {}: {}", s, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if addresses.is_empty() {
        return Err(AppError::BadRequest("At least one address is required".into()));
    }
    Ok(addresses)
}

/// `[from_ts, to_ts]` with `from` defaulting to 0 and `to` to now. Both must
/// be non-negative.
pub(crate) fn parse_window(
    from_ts: Option<i64>,
    to_ts: Option<i64>,
) -> Result<(Timestamp, Timestamp), AppError> {
    for (name, value) in [("fromTs", from_ts), ("toTs", to_ts)] {
        if let Some(value) = value.filter(|v| *v < 0) {
            return Err(AppError::BadRequest(format!(
                "{} must not be negative, got {}",
                name, value
            )));
        }
    }
    let from = Timestamp::new(from_ts.unwrap_or(0));
    let to = to_ts.map(Timestamp::new).unwrap_or_else(Timestamp::now);
    if from > to {
        return Err(AppError::BadRequest(format!(
            "fromTs ({}) must not be after toTs ({})",
            from, to
        )));
    }
    Ok((from, to))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDto {
    pub amount: String,
    pub usd_value: Option<String>,
}

impl From<Balance> for BalanceDto {
    fn from(balance: Balance) -> Self {
        BalanceDto {
            amount: balance.amount.to_canonical_string(),
            usd_value: balance.usd_value.map(|v| v.to_canonical_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDto {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl From<&Token> for TokenDto {
    fn from(token: &Token) -> Self {
        TokenDto {
            address: token.address.to_string(),
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            decimals: token.decimals,
        }
    }
}

/// Per-pool profit/loss with the snapshot it was reconciled against.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDetailsDto {
    pub pool_id: String,
    pub pool_name: Option<String>,
    /// `current` or `historical_delta`.
    pub basis: PnlBasis,
    pub balance: Option<BalanceDto>,
    pub unclaimed: Option<BalanceDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_staked: Option<String>,
    pub profit_loss: BalanceDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardDto {
    pub token: TokenDto,
    pub unclaimed: BalanceDto,
}

impl From<&ProfitLossResult> for PoolDetailsDto {
    fn from(result: &ProfitLossResult) -> Self {
        let snapshot = result.snapshot.as_ref();
        PoolDetailsDto {
            pool_id: result.pool_id.clone(),
            pool_name: result.pool_name.clone(),
            basis: result.basis,
            balance: snapshot.map(|s| s.balance.into()),
            unclaimed: snapshot.map(|s| s.unclaimed.into()),
            reward: snapshot.and_then(|s| s.reward.as_ref()).map(|r| RewardDto {
                token: (&r.token).into(),
                unclaimed: r.unclaimed.into(),
            }),
            total_staked: snapshot
                .and_then(|s| s.pool_total_staked)
                .map(|t| t.to_canonical_string()),
            profit_loss: result.profit_loss.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAddressDto {
    pub address: String,
    pub error: String,
}

/// Addresses whose history could not be brought up to date.
pub(crate) fn failed_addresses(report: Option<&SyncReport>) -> Vec<FailedAddressDto> {
    report
        .map(|r| {
            r.failed
                .iter()
                .map(|(address, error)| FailedAddressDto {
                    address: address.to_string(),
                    error: error.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
