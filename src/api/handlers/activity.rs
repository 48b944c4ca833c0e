use axum::{extract::{State, Path}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::auth::AuthAccount;
use crate::api::dtos::requests::{CreateActivityRequest, CreateSlotRequest};
use crate::error::AppError;
use std::sync::Arc;

pub async fn create_activity(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<CreateActivityRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized("Only administrators can create activities".into()));
    }
    let activity = state.slot_store.create_activity(payload.name, payload.description).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn create_slot(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(activity_id): Path<String>,
    Json(payload): Json<CreateSlotRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized("Only administrators can create slots".into()));
    }
    let slot = state.slot_store
        .create_slot(&activity_id, payload.seats_total, payload.start_time, payload.end_time)
        .await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    AuthAccount(_caller): AuthAccount,
    Path(activity_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.slot_store.list_slots(&activity_id).await?))
}

pub async fn get_slot(
    State(state): State<Arc<AppState>>,
    AuthAccount(_caller): AuthAccount,
    Path(slot_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.slot_store.find_slot(&slot_id).await?))
}
