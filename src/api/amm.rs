use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{failed_addresses, parse_addresses, parse_window, AppState};
use super::{BalanceDto, FailedAddressDto, PoolDetailsDto, TokenDto};
use crate::domain::{LiquidityPool, LpEvent, RawSwapLeg, Trade};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesQuery {
    pub addresses: String,
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
    pub only_cache: Option<bool>,
    pub reset: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    /// Keyed by checksummed address.
    pub trades: BTreeMap<String, Vec<TradeDto>>,
    pub failed_addresses: Vec<FailedAddressDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDto {
    pub trade_id: String,
    pub tx_hash: String,
    pub timestamp: i64,
    pub pool_address: String,
    pub direction: String,
    pub base_asset: TokenDto,
    pub quote_asset: TokenDto,
    pub amount_in: String,
    pub amount_out: String,
    pub rate: Option<String>,
    pub swaps: Vec<SwapDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapDto {
    pub log_index: i64,
    pub from_address: String,
    pub to_address: String,
    pub amount0_in: String,
    pub amount1_in: String,
    pub amount0_out: String,
    pub amount1_out: String,
}

impl From<&RawSwapLeg> for SwapDto {
    fn from(leg: &RawSwapLeg) -> Self {
        SwapDto {
            log_index: leg.log_index,
            from_address: leg.from_address.to_string(),
            to_address: leg.to_address.to_string(),
            amount0_in: leg.amount0_in.to_canonical_string(),
            amount1_in: leg.amount1_in.to_canonical_string(),
            amount0_out: leg.amount0_out.to_canonical_string(),
            amount1_out: leg.amount1_out.to_canonical_string(),
        }
    }
}

impl From<&Trade> for TradeDto {
    fn from(trade: &Trade) -> Self {
        TradeDto {
            trade_id: trade.trade_id.clone(),
            tx_hash: trade.tx_hash.clone(),
            timestamp: trade.timestamp.as_i64(),
            pool_address: trade.pool_address.to_string(),
            direction: trade.direction.to_string(),
            base_asset: (&trade.base_asset).into(),
            quote_asset: (&trade.quote_asset).into(),
            amount_in: trade.amount_in.to_canonical_string(),
            amount_out: trade.amount_out.to_canonical_string(),
            rate: trade.rate().map(|r| r.to_canonical_string()),
            swaps: trade.swaps.iter().map(SwapDto::from).collect(),
        }
    }
}

pub async fn get_trades(
    Query(params): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesResponse>, AppError> {
    let addresses = parse_addresses(&params.addresses)?;
    let (from, to) = parse_window(params.from_ts, params.to_ts)?;

    let history = state
        .amm
        .trades_history(
            &addresses,
            from,
            to,
            params.only_cache.unwrap_or(false),
            params.reset.unwrap_or(false),
        )
        .await?;

    let trades: BTreeMap<String, Vec<TradeDto>> = history
        .trades
        .iter()
        .map(|(address, trades)| {
            (
                address.to_string(),
                trades.iter().map(TradeDto::from).collect(),
            )
        })
        .collect();

    Ok(Json(TradesResponse {
        trades,
        failed_addresses: failed_addresses(history.report.as_ref()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BalancesQuery {
    pub addresses: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    pub balances: BTreeMap<String, Vec<LiquidityPoolDto>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityPoolDto {
    pub address: String,
    pub total_supply: String,
    pub user_balance: BalanceDto,
    pub assets: Vec<PoolAssetDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAssetDto {
    pub asset: TokenDto,
    pub total_amount: String,
    pub user_balance: BalanceDto,
}

impl From<&LiquidityPool> for LiquidityPoolDto {
    fn from(pool: &LiquidityPool) -> Self {
        LiquidityPoolDto {
            address: pool.address.to_string(),
            total_supply: pool.total_supply.to_canonical_string(),
            user_balance: pool.user_balance.into(),
            assets: pool
                .assets
                .iter()
                .map(|a| PoolAssetDto {
                    asset: (&a.asset).into(),
                    total_amount: a.total_amount.to_canonical_string(),
                    user_balance: a.user_balance.into(),
                })
                .collect(),
        }
    }
}

pub async fn get_balances(
    Query(params): Query<BalancesQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalancesResponse>, AppError> {
    let addresses = parse_addresses(&params.addresses)?;
    let balances = state.amm.balances(&addresses).await?;

    Ok(Json(BalancesResponse {
        balances: balances
            .iter()
            .map(|(address, pools)| {
                (
                    address.to_string(),
                    pools.iter().map(LiquidityPoolDto::from).collect(),
                )
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub addresses: String,
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
    pub reset: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub history: BTreeMap<String, AddressEventsDto>,
    pub failed_addresses: Vec<FailedAddressDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEventsDto {
    pub events: Vec<LpEventDto>,
    pub pools: Vec<PoolDetailsDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LpEventDto {
    /// `mint` or `burn`.
    pub event_type: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub timestamp: i64,
    pub pool_address: String,
    pub token0: TokenDto,
    pub token1: TokenDto,
    pub amount0: String,
    pub amount1: String,
    pub lp_amount: BalanceDto,
}

impl From<&LpEvent> for LpEventDto {
    fn from(event: &LpEvent) -> Self {
        LpEventDto {
            event_type: event.event_type.label().to_string(),
            tx_hash: event.tx_hash.clone(),
            log_index: event.log_index,
            timestamp: event.timestamp.as_i64(),
            pool_address: event.pool_address.to_string(),
            token0: (&event.token0).into(),
            token1: (&event.token1).into(),
            amount0: event.amount0.to_canonical_string(),
            amount1: event.amount1.to_canonical_string(),
            lp_amount: event.lp_amount.into(),
        }
    }
}

pub async fn get_events(
    Query(params): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<EventsResponse>, AppError> {
    let addresses = parse_addresses(&params.addresses)?;
    let (from, to) = parse_window(params.from_ts, params.to_ts)?;

    let result = state
        .amm
        .events_history(&addresses, from, to, params.reset.unwrap_or(false))
        .await?;

    let history = result
        .history
        .records
        .iter()
        .map(|(address, events)| {
            let pools = result
                .profit_loss
                .get(address)
                .map(|pools| pools.iter().map(PoolDetailsDto::from).collect())
                .unwrap_or_default();
            (
                address.to_string(),
                AddressEventsDto {
                    events: events.iter().map(LpEventDto::from).collect(),
                    pools,
                },
            )
        })
        .collect();

    Ok(Json(EventsResponse {
        history,
        failed_addresses: failed_addresses(Some(&result.history.report)),
    }))
}
