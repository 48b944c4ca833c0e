use axum::{extract::{State, Path}, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::auth::AuthAccount;
use crate::api::dtos::requests::{DecisionRequest, OverrideDecisionRequest};
use crate::api::dtos::responses::DecisionResponse;
use crate::domain::services::validation_gate::DecisionInput;
use crate::error::AppError;
use std::sync::Arc;

pub async fn decide(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(request_id): Path<String>,
    Json(payload): Json<DecisionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.validation_gate
        .decide(&request_id, &caller.account_id, DecisionInput {
            action: payload.action,
            reason: payload.reason,
            slot_id: payload.slot_id,
        })
        .await?;
    Ok(Json(DecisionResponse::from(outcome)))
}

pub async fn override_decision(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(request_id): Path<String>,
    Json(payload): Json<OverrideDecisionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.validation_gate
        .override_decision(&request_id, &caller, payload.action, payload.reason, payload.slot_id)
        .await?;
    Ok(Json(DecisionResponse::from(outcome)))
}

pub async fn list_overrides(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized("Only administrators can read the override trail".into()));
    }
    Ok(Json(state.validation_gate.list_overrides(&request_id).await?))
}
