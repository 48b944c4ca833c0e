use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use super::idempotency::IdempotencyRecord;
use super::state::{Transition, UnknownVariant};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    WaitingList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Confirm,
    Cancel,
    Promote,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::WaitingList => "waiting_list",
        }
    }

    pub fn apply(self, action: BookingAction) -> Result<Transition<Self>, AppError> {
        use BookingAction::*;
        use BookingStatus::*;

        match (self, action) {
            (Pending, Confirm) => Ok(Transition::To(Confirmed)),
            (Confirmed, Confirm) => Ok(Transition::Unchanged),
            (Pending | Confirmed | WaitingList, Cancel) => Ok(Transition::To(Cancelled)),
            (Cancelled, Cancel) => Ok(Transition::Unchanged),
            (WaitingList, Promote) => Ok(Transition::To(Pending)),
            (WaitingList, Confirm) => Err(AppError::InvalidStateTransition(
                "Booking is on the waiting list and holds no seat".into(),
            )),
            (Cancelled, Confirm | Promote) => Err(AppError::InvalidStateTransition(
                "Booking has been cancelled".into(),
            )),
            (Pending | Confirmed, Promote) => Err(AppError::InvalidStateTransition(
                "Booking already holds a seat".into(),
            )),
        }
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "waiting_list" => Ok(BookingStatus::WaitingList),
            _ => Err(UnknownVariant::new("booking status", value)),
        }
    }
}

/// What happens to a booking request when the slot has no seat left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    Waitlist,
    Reject,
}

impl FromStr for CapacityPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "waitlist" | "waiting_list" => Ok(CapacityPolicy::Waitlist),
            "reject" => Ok(CapacityPolicy::Reject),
            _ => Err(UnknownVariant::new("capacity policy", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Booking {
    pub id: String,
    pub activity_id: String,
    pub slot_id: String,
    pub child_id: String,
    pub account_id: String,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub idempotency_key: String,
    pub seat_held: bool,
    pub linking_request_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

pub struct NewBookingParams {
    pub activity_id: String,
    pub slot_id: String,
    pub child_id: String,
    pub account_id: String,
    pub idempotency_key: String,
    pub linking_request_id: Option<String>,
}

impl Booking {
    pub fn new(params: NewBookingParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_id: params.activity_id,
            slot_id: params.slot_id,
            child_id: params.child_id,
            account_id: params.account_id,
            status: BookingStatus::Pending,
            idempotency_key: params.idempotency_key,
            seat_held: false,
            linking_request_id: params.linking_request_id,
            cancellation_reason: None,
            version: 1,
            created_at: Utc::now(),
            confirmed_at: None,
            cancelled_at: None,
        }
    }
}

/// The payload returned to the caller of booking creation, and cached
/// verbatim against the idempotency key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub booking_id: String,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingReceipt {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            status: booking.status,
        }
    }
}

impl BookingReceipt {
    pub fn to_body(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(|e| AppError::InternalWithMsg(format!("Receipt encoding failed: {}", e)))
    }
}

/// Everything the store needs to create a booking in one transaction.
pub struct BookingDraft {
    pub booking: Booking,
    pub idempotency: IdempotencyRecord,
    pub confirm_on_reserve: bool,
    pub on_full: CapacityPolicy,
}

pub enum BookingCreation {
    Created(Booking, IdempotencyRecord),
    /// The idempotency key (or the booking carrying it) was committed by
    /// another transaction first.
    Duplicate,
}

pub struct CancelOutcome {
    pub cancelled: Booking,
    pub promoted: Option<Booking>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_booking_confirms_and_cancels() {
        assert_eq!(BookingStatus::Pending.apply(BookingAction::Confirm).unwrap(), Transition::To(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::Pending.apply(BookingAction::Cancel).unwrap(), Transition::To(BookingStatus::Cancelled));
    }

    #[test]
    fn repeated_cancel_and_confirm_are_noops() {
        assert_eq!(BookingStatus::Cancelled.apply(BookingAction::Cancel).unwrap(), Transition::Unchanged);
        assert_eq!(BookingStatus::Confirmed.apply(BookingAction::Confirm).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn waiting_list_only_promotes_or_cancels() {
        assert_eq!(BookingStatus::WaitingList.apply(BookingAction::Promote).unwrap(), Transition::To(BookingStatus::Pending));
        assert_eq!(BookingStatus::WaitingList.apply(BookingAction::Cancel).unwrap(), Transition::To(BookingStatus::Cancelled));
        assert!(matches!(
            BookingStatus::WaitingList.apply(BookingAction::Confirm),
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn cancelled_booking_cannot_come_back() {
        assert!(BookingStatus::Cancelled.apply(BookingAction::Confirm).is_err());
        assert!(BookingStatus::Cancelled.apply(BookingAction::Promote).is_err());
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [BookingStatus::Pending, BookingStatus::Confirmed, BookingStatus::Cancelled, BookingStatus::WaitingList] {
            assert_eq!(BookingStatus::try_from(status.as_str().to_string()).unwrap(), status);
        }
        assert!(BookingStatus::try_from("CONFIRMED".to_string()).is_err());
    }

    #[test]
    fn receipt_serializes_snake_case_status() {
        let receipt = BookingReceipt { booking_id: "b1".into(), status: BookingStatus::WaitingList };
        assert_eq!(receipt.to_body().unwrap(), r#"{"booking_id":"b1","status":"waiting_list"}"#);
    }

    #[test]
    fn capacity_policy_parses_config_values() {
        assert_eq!("waitlist".parse::<CapacityPolicy>().unwrap(), CapacityPolicy::Waitlist);
        assert_eq!("REJECT".parse::<CapacityPolicy>().unwrap(), CapacityPolicy::Reject);
        assert!("bounce".parse::<CapacityPolicy>().is_err());
    }
}
