use crate::domain::models::{account::AccountKind, linking::DecisionAction};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub display_name: String,
    pub kind: AccountKind,
    pub guardian_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateActivityRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateSlotRequest {
    pub seats_total: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub activity_id: String,
    pub slot_id: String,
    pub child_id: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub express_flag: bool,
}

#[derive(Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateLinkingRequest {
    pub activity_id: String,
    pub slot_id: Option<String>,
}

#[derive(Deserialize)]
pub struct RedeemCodeRequest {
    pub linking_code: String,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub action: DecisionAction,
    pub reason: Option<String>,
    pub slot_id: Option<String>,
}

#[derive(Deserialize)]
pub struct OverrideDecisionRequest {
    pub action: DecisionAction,
    pub reason: String,
    /// Required when approving a request made without a slot.
    pub slot_id: Option<String>,
}
