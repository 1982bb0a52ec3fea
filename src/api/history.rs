use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteHistoryResponse {
    pub protocol: &'static str,
    pub deleted: u64,
}

/// Drop stored AMM history and coverage; the next request refetches everything.
pub async fn delete_amm_history(
    State(state): State<AppState>,
) -> Result<Json<DeleteHistoryResponse>, AppError> {
    let deleted = state.amm.deactivate().await?;
    Ok(Json(DeleteHistoryResponse {
        protocol: "amm",
        deleted,
    }))
}

pub async fn delete_staking_history(
    State(state): State<AppState>,
) -> Result<Json<DeleteHistoryResponse>, AppError> {
    let deleted = state.staking.deactivate().await?;
    Ok(Json(DeleteHistoryResponse {
        protocol: "staking",
        deleted,
    }))
}
