use crate::domain::models::linking::{LinkingRequest, LinkingStatus};
use crate::domain::services::validation_gate::DecisionOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct LinkingRequestCreatedResponse {
    pub request_id: String,
    pub linking_code: String,
    pub status: LinkingStatus,
    pub expires_at: DateTime<Utc>,
}

impl From<LinkingRequest> for LinkingRequestCreatedResponse {
    fn from(request: LinkingRequest) -> Self {
        Self {
            request_id: request.id,
            linking_code: request.linking_code,
            status: request.status,
            expires_at: request.expires_at,
        }
    }
}

#[derive(Serialize)]
pub struct RedeemResponse {
    pub request_id: String,
    pub status: LinkingStatus,
}

#[derive(Serialize)]
pub struct DecisionResponse {
    pub request_id: String,
    pub status: LinkingStatus,
    pub booking_id: Option<String>,
}

impl From<DecisionOutcome> for DecisionResponse {
    fn from(outcome: DecisionOutcome) -> Self {
        Self {
            request_id: outcome.request.id,
            status: outcome.request.status,
            booking_id: outcome.booking_id,
        }
    }
}
