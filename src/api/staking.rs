use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{failed_addresses, parse_addresses, parse_window, AppState};
use super::{BalanceDto, FailedAddressDto, PoolDetailsDto};
use crate::domain::StakingEvent;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingHistoryQuery {
    pub addresses: String,
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
    pub reset: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingHistoryResponse {
    pub history: BTreeMap<String, AddressHistoryDto>,
    pub failed_addresses: Vec<FailedAddressDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressHistoryDto {
    pub events: Vec<StakingEventDto>,
    pub pools: Vec<PoolDetailsDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingEventDto {
    pub event_type: String,
    pub tx_hash: String,
    pub timestamp: i64,
    pub identity_address: String,
    pub pool_id: String,
    pub value: BalanceDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_at: Option<i64>,
}

impl From<&StakingEvent> for StakingEventDto {
    fn from(event: &StakingEvent) -> Self {
        let core = event.core();
        let (bond_id, channel_id, unlock_at) = match event {
            StakingEvent::Bond { bond_id, .. } | StakingEvent::Unbond { bond_id, .. } => {
                (Some(bond_id.clone()), None, None)
            }
            StakingEvent::UnbondRequest {
                bond_id, unlock_at, ..
            } => (Some(bond_id.clone()), None, Some(unlock_at.as_i64())),
            StakingEvent::ChannelWithdraw { channel_id, .. } => {
                (None, Some(channel_id.clone()), None)
            }
        };
        StakingEventDto {
            event_type: event.event_type().label().to_string(),
            tx_hash: core.tx_hash.clone(),
            timestamp: core.timestamp.as_i64(),
            identity_address: core.identity_address.to_string(),
            pool_id: core.pool_id.clone(),
            value: core.value.into(),
            bond_id,
            channel_id,
            unlock_at,
        }
    }
}

pub async fn get_history(
    Query(params): Query<StakingHistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<StakingHistoryResponse>, AppError> {
    let addresses = parse_addresses(&params.addresses)?;
    let (from, to) = parse_window(params.from_ts, params.to_ts)?;

    let result = state
        .staking
        .staking_history(&addresses, from, to, params.reset.unwrap_or(false))
        .await?;

    let history: BTreeMap<String, AddressHistoryDto> = result
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
                AddressHistoryDto {
                    events: events.iter().map(StakingEventDto::from).collect(),
                    pools,
                },
            )
        })
        .collect();

    Ok(Json(StakingHistoryResponse {
        history,
        failed_addresses: failed_addresses(Some(&result.history.report)),
    }))
}
