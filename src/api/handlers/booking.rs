use axum::{
    extract::{State, Path},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use crate::state::AppState;
use crate::api::extractors::auth::AuthAccount;
use crate::api::dtos::requests::{CancelBookingRequest, CreateBookingRequest};
use crate::domain::models::{
    account::Account,
    auth::{Identity, Role},
    booking::Booking,
};
use crate::domain::services::booking_workflow::CreateBooking;
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

async fn load_child(state: &AppState, child_id: &str) -> Result<Account, AppError> {
    state.account_repo.find_by_id(child_id).await?
        .ok_or(AppError::NotFound(format!("Account {} not found", child_id)))
}

/// Owner, the child, the child's guardian or an administrator.
async fn ensure_can_view(state: &AppState, caller: &Identity, booking: &Booking) -> Result<(), AppError> {
    if caller.is_admin() || booking.account_id == caller.account_id || booking.child_id == caller.account_id {
        return Ok(());
    }
    let child = load_child(state, &booking.child_id).await?;
    if child.is_guarded_by(&caller.account_id) {
        return Ok(());
    }
    Err(AppError::Unauthorized("You cannot access this booking".into()))
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let child = load_child(&state, &payload.child_id).await?;

    // Bookings belong to the guardian, also when the child or an admin places them.
    let account_id = match caller.role {
        Role::Admin => child.guardian_id.clone().ok_or(
            AppError::Validation("The child has no guardian to own this booking".into()),
        )?,
        Role::Guardian if child.is_guarded_by(&caller.account_id) => caller.account_id.clone(),
        Role::Minor if child.id == caller.account_id => child.guardian_id.clone().ok_or(
            AppError::Unauthorized("Ask a guardian to approve this activity through a linking code".into()),
        )?,
        _ => return Err(AppError::Unauthorized("You cannot book for this child".into())),
    };

    let response = state.booking_workflow.create_booking(CreateBooking {
        activity_id: payload.activity_id,
        slot_id: payload.slot_id,
        child_id: payload.child_id,
        account_id,
        idempotency_key: payload.idempotency_key,
        express: payload.express_flag,
        linking_request_id: None,
        on_full: None,
    }).await?;

    let status = if response.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, [(header::CONTENT_TYPE, "application/json")], response.body))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.booking_workflow.get_booking(&booking_id).await?;
    ensure_can_view(&state, &caller, &booking).await?;
    Ok(Json(booking))
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let bookings = state.booking_workflow.list_bookings_for_account(&caller.account_id).await?;
    Ok(Json(bookings))
}

pub async fn list_slot_bookings(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(slot_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized("Only administrators can list slot bookings".into()));
    }
    state.slot_store.find_slot(&slot_id).await?;
    Ok(Json(state.booking_workflow.list_for_slot(&slot_id).await?))
}

pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.booking_workflow.get_booking(&booking_id).await?;
    if !caller.is_admin() {
        let child = load_child(&state, &booking.child_id).await?;
        if !child.is_guarded_by(&caller.account_id) {
            return Err(AppError::Unauthorized("Only the child's guardian can confirm this booking".into()));
        }
    }

    let confirmed = state.booking_workflow.confirm_booking(&booking_id).await?;
    Ok(Json(confirmed))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Path(booking_id): Path<String>,
    payload: Option<Json<CancelBookingRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.booking_workflow.get_booking(&booking_id).await?;
    if !caller.is_admin() && booking.account_id != caller.account_id {
        let child = load_child(&state, &booking.child_id).await?;
        if !child.is_guarded_by(&caller.account_id) {
            return Err(AppError::Unauthorized("You cannot cancel this booking".into()));
        }
    }

    let reason = payload.and_then(|Json(body)| body.reason);
    let cancelled = state.booking_workflow.cancel_booking(&booking_id, reason).await?;
    info!(booking_id = %cancelled.id, cancelled_by = %caller.account_id, "Cancellation processed");
    Ok(Json(cancelled))
}
