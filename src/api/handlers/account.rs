use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::auth::AuthAccount;
use crate::api::dtos::requests::CreateAccountRequest;
use crate::domain::models::account::{Account, AccountKind};
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized("Only administrators can register accounts".into()));
    }
    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::Validation("display_name is required".into()));
    }

    if let Some(guardian_id) = &payload.guardian_id {
        if payload.kind != AccountKind::Minor {
            return Err(AppError::Validation("Only minor accounts have a guardian".into()));
        }
        let guardian = state.account_repo.find_by_id(guardian_id).await?
            .ok_or(AppError::NotFound(format!("Account {} not found", guardian_id)))?;
        if guardian.kind != AccountKind::Guardian {
            return Err(AppError::Validation("guardian_id must reference a guardian account".into()));
        }
    }

    let account = state.account_repo
        .create(&Account::new(display_name.to_string(), payload.kind, payload.guardian_id))
        .await?;
    info!(account_id = %account.id, kind = account.kind.as_str(), "Account registered");

    Ok((StatusCode::CREATED, Json(account)))
}
