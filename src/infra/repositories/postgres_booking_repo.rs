use crate::domain::{
    models::{
        booking::{Booking, BookingAction, BookingCreation, BookingDraft, BookingReceipt, BookingStatus, CancelOutcome, CapacityPolicy},
        idempotency::IdempotencyRecord,
        job::{Job, NotificationEvent},
        state::Transition,
    },
    ports::BookingRepository,
};
use crate::error::AppError;
use super::postgres_job_repo::insert_job;
use super::postgres_slot_repo::{release_seats, reserve_seats};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use chrono::{DateTime, Utc};

pub struct PostgresBookingRepo {
    pool: PgPool,
}

impl PostgresBookingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Hands a freed seat to the oldest waiting booking of the slot.
async fn promote_next(conn: &mut PgConnection, slot_id: &str) -> Result<Option<Booking>, AppError> {
    let next = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE slot_id = $1 AND status = $2 ORDER BY created_at ASC, id ASC LIMIT 1 FOR UPDATE"
    )
        .bind(slot_id)
        .bind(BookingStatus::WaitingList.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

    let Some(next) = next else { return Ok(None) };
    let Transition::To(status) = next.status.apply(BookingAction::Promote)? else { return Ok(None) };
    if reserve_seats(conn, slot_id, 1).await?.is_none() {
        return Ok(None);
    }

    sqlx::query_as::<_, Booking>(
        "UPDATE bookings SET status = $1, seat_held = $2, version = version + 1 WHERE id = $3 AND version = $4 RETURNING *"
    )
        .bind(status.as_str())
        .bind(true)
        .bind(&next.id)
        .bind(next.version)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?
        .ok_or(AppError::ConcurrentModification)
        .map(Some)
}

#[async_trait]
impl BookingRepository for PostgresBookingRepo {
    async fn create_reserving(&self, draft: BookingDraft) -> Result<BookingCreation, AppError> {
        let BookingDraft { mut booking, mut idempotency, confirm_on_reserve, on_full } = draft;
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // Claiming the key is the first write, so concurrent retries serialize here.
        let claim = sqlx::query(
            "INSERT INTO idempotency_keys (idempotency_key, account_id, request_hash, booking_id, response_body, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)"
        )
            .bind(&idempotency.idempotency_key)
            .bind(&idempotency.account_id)
            .bind(&idempotency.request_hash)
            .bind(&idempotency.booking_id)
            .bind(&idempotency.response_body)
            .bind(idempotency.created_at)
            .bind(idempotency.expires_at)
            .execute(&mut *tx)
            .await;
        if let Err(e) = claim {
            let err = AppError::Database(e);
            return if err.is_unique_violation() { Ok(BookingCreation::Duplicate) } else { Err(err) };
        }

        if reserve_seats(&mut tx, &booking.slot_id, 1).await?.is_some() {
            booking.seat_held = true;
            if confirm_on_reserve {
                booking.status = BookingStatus::Confirmed;
                booking.confirmed_at = Some(Utc::now());
            }
        } else {
            match on_full {
                CapacityPolicy::Waitlist => booking.status = BookingStatus::WaitingList,
                CapacityPolicy::Reject => return Err(AppError::CapacityExceeded(booking.slot_id.clone())),
            }
        }

        let inserted = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (id, activity_id, slot_id, child_id, account_id, status, idempotency_key, seat_held, linking_request_id, cancellation_reason, version, created_at, confirmed_at, cancelled_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING *"
        )
            .bind(&booking.id).bind(&booking.activity_id).bind(&booking.slot_id).bind(&booking.child_id)
            .bind(&booking.account_id).bind(booking.status.as_str()).bind(&booking.idempotency_key).bind(booking.seat_held)
            .bind(&booking.linking_request_id).bind(&booking.cancellation_reason).bind(booking.version)
            .bind(booking.created_at).bind(booking.confirmed_at).bind(booking.cancelled_at)
            .fetch_one(&mut *tx)
            .await;
        let created = match inserted {
            Ok(created) => created,
            Err(e) => {
                let err = AppError::Database(e);
                return if err.is_unique_violation() { Ok(BookingCreation::Duplicate) } else { Err(err) };
            }
        };

        idempotency.response_body = BookingReceipt::from(&created).to_body()?;
        sqlx::query("UPDATE idempotency_keys SET response_body = $1 WHERE idempotency_key = $2")
            .bind(&idempotency.response_body)
            .bind(&idempotency.idempotency_key)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        insert_job(&mut tx, &Job::for_booking(NotificationEvent::for_new_booking(created.status), &created)).await?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(BookingCreation::Created(created, idempotency))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE idempotency_key = $1").bind(key).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }

    async fn find_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>, AppError> {
        sqlx::query_as::<_, IdempotencyRecord>("SELECT * FROM idempotency_keys WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_by_account(&self, account_id: &str) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE account_id = $1 OR child_id = $2 ORDER BY created_at DESC")
            .bind(account_id)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_by_slot(&self, slot_id: &str) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE slot_id = $1 ORDER BY created_at ASC, id ASC")
            .bind(slot_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn confirm(&self, booking: &Booking) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let confirmed = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $1, confirmed_at = $2, version = version + 1
             WHERE id = $3 AND version = $4 AND status = $5
             RETURNING *"
        )
            .bind(BookingStatus::Confirmed.as_str())
            .bind(Utc::now())
            .bind(&booking.id)
            .bind(booking.version)
            .bind(BookingStatus::Pending.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .ok_or(AppError::ConcurrentModification)?;

        insert_job(&mut tx, &Job::for_booking(NotificationEvent::BookingConfirmed, &confirmed)).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(confirmed)
    }

    async fn cancel(&self, booking: &Booking, reason: Option<String>, promote_waitlist: bool) -> Result<CancelOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let cancelled = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $1, cancellation_reason = $2, cancelled_at = $3, seat_held = $4, version = version + 1
             WHERE id = $5 AND version = $6
             RETURNING *"
        )
            .bind(BookingStatus::Cancelled.as_str())
            .bind(&reason)
            .bind(Utc::now())
            .bind(false)
            .bind(&booking.id)
            .bind(booking.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .ok_or(AppError::ConcurrentModification)?;

        let mut promoted = None;
        if booking.seat_held {
            release_seats(&mut tx, &booking.slot_id, 1).await?;
            if promote_waitlist {
                promoted = promote_next(&mut tx, &booking.slot_id).await?;
            }
        }

        insert_job(&mut tx, &Job::for_booking(NotificationEvent::BookingCancelled, &cancelled)).await?;
        if let Some(promoted) = &promoted {
            insert_job(&mut tx, &Job::for_booking(NotificationEvent::BookingPromoted, promoted)).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(CancelOutcome { cancelled, promoted })
    }

    async fn purge_expired_idempotency(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }
}
