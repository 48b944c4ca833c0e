use crate::domain::models::{
    account::Account, activity::{Activity, Slot},
    booking::{Booking, BookingCreation, BookingDraft, CancelOutcome},
    idempotency::IdempotencyRecord, job::Job,
    linking::{DecisionOverride, LinkingRequest, ValidationDecision},
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, account: &Account) -> Result<Account, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, AppError>;
}

/// Capacity counters per slot. `reserve` and `release` are single
/// conditional updates; callers never read-then-write the counter.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn create_activity(&self, activity: &Activity) -> Result<Activity, AppError>;
    async fn find_activity(&self, id: &str) -> Result<Option<Activity>, AppError>;
    async fn create_slot(&self, slot: &Slot) -> Result<Slot, AppError>;
    async fn find_slot(&self, id: &str) -> Result<Option<Slot>, AppError>;
    async fn list_slots(&self, activity_id: &str) -> Result<Vec<Slot>, AppError>;
    async fn reserve(&self, slot_id: &str, seats: i64) -> Result<Slot, AppError>;
    async fn release(&self, slot_id: &str, seats: i64) -> Result<Slot, AppError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Claims the idempotency key, reserves a seat and inserts the booking and
    /// its notification in one transaction.
    async fn create_reserving(&self, draft: BookingDraft) -> Result<BookingCreation, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, AppError>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, AppError>;
    async fn find_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, AppError>;
    async fn list_by_account(&self, account_id: &str) -> Result<Vec<Booking>, AppError>;
    async fn list_by_slot(&self, slot_id: &str) -> Result<Vec<Booking>, AppError>;
    async fn confirm(&self, booking: &Booking) -> Result<Booking, AppError>;
    /// Cancels `booking`, releasing its seat when one is held and, if
    /// `promote_waitlist` is set, handing the seat to the oldest waiting booking.
    async fn cancel(&self, booking: &Booking, reason: Option<String>, promote_waitlist: bool) -> Result<CancelOutcome, AppError>;
    async fn purge_expired_idempotency(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Every mutating call takes the request as it should look afterwards and is
/// conditioned on the `version` that was read; losing that race yields
/// `AppError::ConcurrentModification`.
#[async_trait]
pub trait LinkingRepository: Send + Sync {
    async fn create(&self, request: &LinkingRequest) -> Result<LinkingRequest, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<LinkingRequest>, AppError>;
    async fn find_latest_by_code(&self, code: &str) -> Result<Option<LinkingRequest>, AppError>;
    async fn list_by_account(&self, account_id: &str) -> Result<Vec<LinkingRequest>, AppError>;
    /// Also records the family relationship on the minor's account when it has none.
    async fn link_guardian(&self, request: &LinkingRequest) -> Result<LinkingRequest, AppError>;
    /// Inserts the one decision allowed per request together with the transition.
    async fn record_decision(&self, request: &LinkingRequest, decision: &ValidationDecision) -> Result<LinkingRequest, AppError>;
    async fn find_decision(&self, request_id: &str) -> Result<Option<ValidationDecision>, AppError>;
    async fn override_decision(&self, request: &LinkingRequest, decision: &ValidationDecision, audit: &DecisionOverride) -> Result<(LinkingRequest, ValidationDecision), AppError>;
    async fn list_overrides(&self, request_id: &str) -> Result<Vec<DecisionOverride>, AppError>;
    async fn attach_booking(&self, request_id: &str, booking_id: &str) -> Result<LinkingRequest, AppError>;
    /// `None` when another writer moved the request first.
    async fn expire(&self, request: &LinkingRequest) -> Result<Option<LinkingRequest>, AppError>;
    async fn expire_stale(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LinkingRequest>, AppError>;
    async fn find_unbooked_validated(&self, validated_before: DateTime<Utc>, limit: i64) -> Result<Vec<LinkingRequest>, AppError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> Result<Job, AppError>;
    async fn find_pending(&self, limit: i32) -> Result<Vec<Job>, AppError>;
    async fn update_status(&self, id: &str, status: &str, error_message: Option<String>) -> Result<(), AppError>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event_type: &str, recipient: &str, payload: &serde_json::Value) -> Result<(), AppError>;
}
