use axum::{extract::{State, Path}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::auth::AuthAccount;
use crate::api::dtos::requests::{CreateLinkingRequest, RedeemCodeRequest};
use crate::api::dtos::responses::{LinkingRequestCreatedResponse, RedeemResponse};
use crate::error::AppError;
use std::sync::Arc;

/// A minor asks for an activity; the response carries the code to hand to a guardian.
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<CreateLinkingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = state.linking_service
        .create_child_request(&payload.activity_id, &caller.account_id, payload.slot_id)
        .await?;
    Ok((StatusCode::CREATED, Json(LinkingRequestCreatedResponse::from(request))))
}

pub async fn redeem_code(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<RedeemCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let linked = state.linking_service
        .link_parent_to_minor(&payload.linking_code, &caller.account_id)
        .await?;
    Ok(Json(RedeemResponse { request_id: linked.id, status: linked.status }))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.linking_service.get_request(&request_id, &caller).await?))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.linking_service.list_requests_for_account(&caller.account_id).await?))
}
