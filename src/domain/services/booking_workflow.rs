use std::sync::Arc;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::models::{
    booking::{Booking, BookingAction, BookingCreation, BookingDraft, BookingReceipt, CapacityPolicy, NewBookingParams},
    idempotency::{request_fingerprint, IdempotencyRecord},
    state::Transition,
};
use crate::domain::ports::{AccountRepository, BookingRepository, SlotRepository};
use crate::domain::services::retry::RetryPolicy;
use crate::error::AppError;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Input of `BookingWorkflow::create_booking`.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub activity_id: String,
    pub slot_id: String,
    pub child_id: String,
    /// The account the booking belongs to.
    pub account_id: String,
    pub idempotency_key: String,
    /// Confirm straight away when a seat is reserved.
    pub express: bool,
    pub linking_request_id: Option<String>,
    /// Overrides the configured policy for a full slot.
    pub on_full: Option<CapacityPolicy>,
}

impl CreateBooking {
    fn fingerprint(&self) -> String {
        let express = if self.express { "express" } else { "standard" };
        request_fingerprint(&[&self.activity_id, &self.slot_id, &self.child_id, express])
    }
}

/// The creation response as the caller sees it, first time or on replay.
#[derive(Debug, Clone)]
pub struct IdempotentResponse {
    pub booking_id: String,
    pub body: String,
    pub replayed: bool,
}

pub struct BookingWorkflow {
    bookings: Arc<dyn BookingRepository>,
    slots: Arc<dyn SlotRepository>,
    accounts: Arc<dyn AccountRepository>,
    retry: RetryPolicy,
    capacity_policy: CapacityPolicy,
    auto_promote: bool,
    idempotency_ttl: Duration,
}

impl BookingWorkflow {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        slots: Arc<dyn SlotRepository>,
        accounts: Arc<dyn AccountRepository>,
        retry: RetryPolicy,
        capacity_policy: CapacityPolicy,
        auto_promote: bool,
        idempotency_ttl: Duration,
    ) -> Self {
        Self { bookings, slots, accounts, retry, capacity_policy, auto_promote, idempotency_ttl }
    }

    /// Creates a booking or replays the response of the one already created
    /// under `cmd.idempotency_key`. A replay never touches seat capacity.
    pub async fn create_booking(&self, cmd: CreateBooking) -> Result<IdempotentResponse, AppError> {
        let key = cmd.idempotency_key.as_str();
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(AppError::Validation("idempotency_key must be 1 to 255 characters".into()));
        }
        if key.trim() != key {
            return Err(AppError::Validation("idempotency_key must not start or end with whitespace".into()));
        }
        let hash = cmd.fingerprint();

        if let Some(replay) = self.replay(&cmd, &hash).await? {
            info!(idempotency_key = %cmd.idempotency_key, booking_id = %replay.booking_id, "Replaying booking response");
            return Ok(replay);
        }

        let slot = self.slots.find_slot(&cmd.slot_id).await?
            .ok_or(AppError::NotFound(format!("Slot {} not found", cmd.slot_id)))?;
        if slot.activity_id != cmd.activity_id {
            return Err(AppError::Validation("Slot does not belong to the requested activity".into()));
        }
        let child = self.accounts.find_by_id(&cmd.child_id).await?
            .ok_or(AppError::NotFound(format!("Account {} not found", cmd.child_id)))?;
        if !child.is_minor() {
            return Err(AppError::Validation("Bookings are made for a minor account".into()));
        }

        let cmd_ref = &cmd;
        let hash_ref = hash.as_str();
        let creation = self.retry
            .run("create_booking", move |_| self.create_once(cmd_ref, hash_ref))
            .await?;

        match creation {
            BookingCreation::Created(booking, record) => {
                info!(
                    booking_id = %booking.id,
                    slot_id = %booking.slot_id,
                    status = booking.status.as_str(),
                    "Booking created"
                );
                Ok(IdempotentResponse { booking_id: booking.id, body: record.response_body, replayed: false })
            }
            BookingCreation::Duplicate => {
                warn!(idempotency_key = %cmd.idempotency_key, "Idempotency key committed concurrently, replaying");
                self.replay(&cmd, &hash).await?
                    .ok_or(AppError::InternalWithMsg("Idempotency key claimed but no booking found".into()))
            }
        }
    }

    async fn create_once(&self, cmd: &CreateBooking, hash: &str) -> Result<BookingCreation, AppError> {
        let booking = Booking::new(NewBookingParams {
            activity_id: cmd.activity_id.clone(),
            slot_id: cmd.slot_id.clone(),
            child_id: cmd.child_id.clone(),
            account_id: cmd.account_id.clone(),
            idempotency_key: cmd.idempotency_key.clone(),
            linking_request_id: cmd.linking_request_id.clone(),
        });
        let idempotency = IdempotencyRecord::new(
            cmd.idempotency_key.clone(),
            cmd.account_id.clone(),
            hash.to_string(),
            booking.id.clone(),
            self.idempotency_ttl,
        );

        self.bookings.create_reserving(BookingDraft {
            booking,
            idempotency,
            confirm_on_reserve: cmd.express,
            on_full: cmd.on_full.unwrap_or(self.capacity_policy),
        }).await
    }

    /// Within the TTL the stored body is returned byte for byte; afterwards the
    /// response is rebuilt from the booking that owns the key.
    async fn replay(&self, cmd: &CreateBooking, hash: &str) -> Result<Option<IdempotentResponse>, AppError> {
        if let Some(record) = self.bookings.find_idempotency_record(&cmd.idempotency_key).await? {
            if record.account_id != cmd.account_id || record.request_hash != hash {
                return Err(AppError::Conflict("Idempotency key was already used for a different request".into()));
            }
            if record.is_live(Utc::now()) && !record.response_body.is_empty() {
                return Ok(Some(IdempotentResponse {
                    booking_id: record.booking_id,
                    body: record.response_body,
                    replayed: true,
                }));
            }
        }

        let Some(booking) = self.bookings.find_by_idempotency_key(&cmd.idempotency_key).await? else {
            return Ok(None);
        };
        if booking.account_id != cmd.account_id || booking.slot_id != cmd.slot_id || booking.child_id != cmd.child_id {
            return Err(AppError::Conflict("Idempotency key was already used for a different request".into()));
        }
        Ok(Some(IdempotentResponse {
            body: BookingReceipt::from(&booking).to_body()?,
            booking_id: booking.id,
            replayed: true,
        }))
    }

    pub async fn confirm_booking(&self, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.retry
            .run("confirm_booking", move |_| self.confirm_once(booking_id))
            .await?;
        info!(booking_id, status = booking.status.as_str(), "Booking confirmed");
        Ok(booking)
    }

    async fn confirm_once(&self, booking_id: &str) -> Result<Booking, AppError> {
        let booking = self.get_booking(booking_id).await?;
        match booking.status.apply(BookingAction::Confirm)? {
            Transition::Unchanged => Ok(booking),
            Transition::To(_) => self.bookings.confirm(&booking).await,
        }
    }

    /// Cancelling twice is a no-op returning the cancelled booking.
    pub async fn cancel_booking(&self, booking_id: &str, reason: Option<String>) -> Result<Booking, AppError> {
        let reason_ref = &reason;
        let booking = self.retry
            .run("cancel_booking", move |_| self.cancel_once(booking_id, reason_ref))
            .await?;
        Ok(booking)
    }

    async fn cancel_once(&self, booking_id: &str, reason: &Option<String>) -> Result<Booking, AppError> {
        let booking = self.get_booking(booking_id).await?;
        match booking.status.apply(BookingAction::Cancel)? {
            Transition::Unchanged => Ok(booking),
            Transition::To(_) => {
                let outcome = self.bookings.cancel(&booking, reason.clone(), self.auto_promote).await?;
                info!(booking_id, released = booking.seat_held, "Booking cancelled");
                if let Some(promoted) = &outcome.promoted {
                    info!(booking_id = %promoted.id, slot_id = %promoted.slot_id, "Waiting list booking promoted");
                }
                Ok(outcome.cancelled)
            }
        }
    }

    pub async fn get_booking(&self, booking_id: &str) -> Result<Booking, AppError> {
        self.bookings.find_by_id(booking_id).await?
            .ok_or(AppError::NotFound(format!("Booking {} not found", booking_id)))
    }

    pub async fn list_bookings_for_account(&self, account_id: &str) -> Result<Vec<Booking>, AppError> {
        self.bookings.list_by_account(account_id).await
    }

    pub async fn list_for_slot(&self, slot_id: &str) -> Result<Vec<Booking>, AppError> {
        self.bookings.list_by_slot(slot_id).await
    }

    pub async fn purge_expired_idempotency(&self) -> Result<u64, AppError> {
        self.bookings.purge_expired_idempotency(Utc::now()).await
    }
}
