use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::booking::{Booking, BookingStatus};
use super::linking::LinkingRequest;
use super::state::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    BookingCreated,
    BookingWaitlisted,
    BookingConfirmed,
    BookingCancelled,
    BookingPromoted,
    RequestLinked,
    RequestValidated,
    RequestRejected,
    RequestExpired,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::BookingCreated => "BOOKING_CREATED",
            NotificationEvent::BookingWaitlisted => "BOOKING_WAITLISTED",
            NotificationEvent::BookingConfirmed => "BOOKING_CONFIRMED",
            NotificationEvent::BookingCancelled => "BOOKING_CANCELLED",
            NotificationEvent::BookingPromoted => "BOOKING_PROMOTED",
            NotificationEvent::RequestLinked => "REQUEST_LINKED",
            NotificationEvent::RequestValidated => "REQUEST_VALIDATED",
            NotificationEvent::RequestRejected => "REQUEST_REJECTED",
            NotificationEvent::RequestExpired => "REQUEST_EXPIRED",
        }
    }

    pub fn for_new_booking(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Confirmed => NotificationEvent::BookingConfirmed,
            BookingStatus::WaitingList => NotificationEvent::BookingWaitlisted,
            BookingStatus::Pending | BookingStatus::Cancelled => NotificationEvent::BookingCreated,
        }
    }
}

impl TryFrom<String> for NotificationEvent {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let event = match value.as_str() {
            "BOOKING_CREATED" => NotificationEvent::BookingCreated,
            "BOOKING_WAITLISTED" => NotificationEvent::BookingWaitlisted,
            "BOOKING_CONFIRMED" => NotificationEvent::BookingConfirmed,
            "BOOKING_CANCELLED" => NotificationEvent::BookingCancelled,
            "BOOKING_PROMOTED" => NotificationEvent::BookingPromoted,
            "REQUEST_LINKED" => NotificationEvent::RequestLinked,
            "REQUEST_VALIDATED" => NotificationEvent::RequestValidated,
            "REQUEST_REJECTED" => NotificationEvent::RequestRejected,
            "REQUEST_EXPIRED" => NotificationEvent::RequestExpired,
            _ => return Err(UnknownVariant::new("notification event", value)),
        };
        Ok(event)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobPayload {
    pub recipient_id: String,
    pub subject_id: String,
    pub data: serde_json::Value,
}

/// Outbox row: written in the same transaction as the state change it
/// announces, dispatched by the background worker after commit.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Job {
    pub id: String,
    #[sqlx(try_from = "String")]
    pub job_type: NotificationEvent,
    pub payload: Json<JobPayload>,
    pub execute_at: DateTime<Utc>,
    pub status: String, // PENDING, PROCESSING, COMPLETED, FAILED
    pub error_message: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_type: NotificationEvent, recipient_id: String, subject_id: String, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_type,
            payload: Json(JobPayload { recipient_id, subject_id, data }),
            execute_at: now,
            status: "PENDING".to_string(),
            error_message: None,
            attempts: 0,
            created_at: now,
        }
    }

    pub fn for_booking(job_type: NotificationEvent, booking: &Booking) -> Self {
        Self::new(
            job_type,
            booking.account_id.clone(),
            booking.id.clone(),
            serde_json::json!({
                "booking_id": booking.id,
                "slot_id": booking.slot_id,
                "activity_id": booking.activity_id,
                "child_id": booking.child_id,
                "status": booking.status,
                "reason": booking.cancellation_reason,
            }),
        )
    }

    /// Request notifications go to the guardian once one is known, otherwise
    /// to the minor who asked.
    pub fn for_request(job_type: NotificationEvent, request: &LinkingRequest) -> Self {
        let recipient = request.guardian_id.clone().unwrap_or_else(|| request.minor_id.clone());
        Self::new(
            job_type,
            recipient,
            request.id.clone(),
            serde_json::json!({
                "request_id": request.id,
                "activity_id": request.activity_id,
                "minor_id": request.minor_id,
                "status": request.status,
                "booking_id": request.booking_id,
                "reason": request.rejection_reason,
            }),
        )
    }
}
