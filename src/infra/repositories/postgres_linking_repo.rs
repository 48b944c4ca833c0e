use crate::domain::{
    models::{
        job::{Job, NotificationEvent},
        linking::{DecisionOverride, LinkingRequest, LinkingStatus, ValidationDecision},
    },
    ports::LinkingRepository,
};
use crate::error::AppError;
use super::postgres_job_repo::insert_job;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use chrono::{DateTime, Utc};

pub struct PostgresLinkingRepo {
    pool: PgPool,
}

impl PostgresLinkingRepo {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

/// Writes every mutable column of `request`, conditioned on the version it was read at.
async fn update_guarded(conn: &mut PgConnection, request: &LinkingRequest) -> Result<Option<LinkingRequest>, AppError> {
    sqlx::query_as::<_, LinkingRequest>(
        "UPDATE linking_requests
         SET status = $1, guardian_id = $2, slot_id = $3, booking_id = $4, rejection_reason = $5,
             linked_at = $6, validated_at = $7, rejected_at = $8, expired_at = $9, version = version + 1
         WHERE id = $10 AND version = $11
         RETURNING *"
    )
        .bind(request.status.as_str())
        .bind(&request.guardian_id)
        .bind(&request.slot_id)
        .bind(&request.booking_id)
        .bind(&request.rejection_reason)
        .bind(request.linked_at)
        .bind(request.validated_at)
        .bind(request.rejected_at)
        .bind(request.expired_at)
        .bind(&request.id)
        .bind(request.version)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
}

fn decision_event(status: LinkingStatus) -> NotificationEvent {
    match status {
        LinkingStatus::Validated => NotificationEvent::RequestValidated,
        _ => NotificationEvent::RequestRejected,
    }
}

#[async_trait]
impl LinkingRepository for PostgresLinkingRepo {
    async fn create(&self, request: &LinkingRequest) -> Result<LinkingRequest, AppError> {
        sqlx::query_as::<_, LinkingRequest>(
            "INSERT INTO linking_requests (id, activity_id, slot_id, minor_id, linking_code, status, guardian_id, booking_id, rejection_reason, expires_at, linked_at, validated_at, rejected_at, expired_at, version, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             RETURNING *"
        )
            .bind(&request.id).bind(&request.activity_id).bind(&request.slot_id).bind(&request.minor_id)
            .bind(&request.linking_code).bind(request.status.as_str()).bind(&request.guardian_id).bind(&request.booking_id)
            .bind(&request.rejection_reason).bind(request.expires_at).bind(request.linked_at).bind(request.validated_at)
            .bind(request.rejected_at).bind(request.expired_at).bind(request.version).bind(request.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<LinkingRequest>, AppError> {
        sqlx::query_as::<_, LinkingRequest>("SELECT * FROM linking_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_latest_by_code(&self, code: &str) -> Result<Option<LinkingRequest>, AppError> {
        sqlx::query_as::<_, LinkingRequest>(
            "SELECT * FROM linking_requests WHERE linking_code = $1 ORDER BY created_at DESC LIMIT 1"
        )
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_by_account(&self, account_id: &str) -> Result<Vec<LinkingRequest>, AppError> {
        sqlx::query_as::<_, LinkingRequest>(
            "SELECT * FROM linking_requests WHERE minor_id = $1 OR guardian_id = $2 ORDER BY created_at DESC"
        )
            .bind(account_id)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn link_guardian(&self, request: &LinkingRequest) -> Result<LinkingRequest, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let linked = update_guarded(&mut tx, request).await?
            .ok_or(AppError::ConcurrentModification)?;

        if let Some(guardian_id) = &linked.guardian_id {
            sqlx::query("UPDATE accounts SET guardian_id = $1 WHERE id = $2 AND guardian_id IS NULL")
                .bind(guardian_id)
                .bind(&linked.minor_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
        }

        insert_job(&mut tx, &Job::for_request(NotificationEvent::RequestLinked, &linked)).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(linked)
    }

    async fn record_decision(&self, request: &LinkingRequest, decision: &ValidationDecision) -> Result<LinkingRequest, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let decided = update_guarded(&mut tx, request).await?
            .ok_or(AppError::ConcurrentModification)?;

        let inserted = sqlx::query(
            "INSERT INTO validation_decisions (id, request_id, guardian_id, status, reason, decided_at, version) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        )
            .bind(&decision.id)
            .bind(&decision.request_id)
            .bind(&decision.guardian_id)
            .bind(decision.status.as_str())
            .bind(&decision.reason)
            .bind(decision.decided_at)
            .bind(decision.version)
            .execute(&mut *tx)
            .await;
        if let Err(e) = inserted {
            let err = AppError::Database(e);
            return Err(if err.is_unique_violation() {
                AppError::InvalidStateTransition("A decision has already been recorded for this request".into())
            } else {
                err
            });
        }

        insert_job(&mut tx, &Job::for_request(decision_event(decided.status), &decided)).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(decided)
    }

    async fn find_decision(&self, request_id: &str) -> Result<Option<ValidationDecision>, AppError> {
        sqlx::query_as::<_, ValidationDecision>("SELECT * FROM validation_decisions WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn override_decision(
        &self,
        request: &LinkingRequest,
        decision: &ValidationDecision,
        audit: &DecisionOverride,
    ) -> Result<(LinkingRequest, ValidationDecision), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let reversed = update_guarded(&mut tx, request).await?
            .ok_or(AppError::ConcurrentModification)?;

        let revised = sqlx::query_as::<_, ValidationDecision>(
            "UPDATE validation_decisions SET status = $1, reason = $2, decided_at = $3, version = version + 1
             WHERE id = $4 AND version = $5
             RETURNING *"
        )
            .bind(decision.status.as_str())
            .bind(&decision.reason)
            .bind(decision.decided_at)
            .bind(&decision.id)
            .bind(decision.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .ok_or(AppError::ConcurrentModification)?;

        sqlx::query(
            "INSERT INTO decision_overrides (id, decision_id, request_id, actor_id, previous_status, new_status, reason, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        )
            .bind(&audit.id)
            .bind(&audit.decision_id)
            .bind(&audit.request_id)
            .bind(&audit.actor_id)
            .bind(&audit.previous_status)
            .bind(&audit.new_status)
            .bind(&audit.reason)
            .bind(audit.created_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        insert_job(&mut tx, &Job::for_request(decision_event(reversed.status), &reversed)).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok((reversed, revised))
    }

    async fn list_overrides(&self, request_id: &str) -> Result<Vec<DecisionOverride>, AppError> {
        sqlx::query_as::<_, DecisionOverride>("SELECT * FROM decision_overrides WHERE request_id = $1 ORDER BY created_at ASC")
            .bind(request_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn attach_booking(&self, request_id: &str, booking_id: &str) -> Result<LinkingRequest, AppError> {
        sqlx::query_as::<_, LinkingRequest>(
            "UPDATE linking_requests SET booking_id = $1, version = version + 1
             WHERE id = $2 AND status = 'validated' AND (booking_id IS NULL OR booking_id = $3)
             RETURNING *"
        )
            .bind(booking_id)
            .bind(request_id)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?
            .ok_or(AppError::InvalidStateTransition("Request is no longer awaiting its booking".into()))
    }

    async fn expire(&self, request: &LinkingRequest) -> Result<Option<LinkingRequest>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let expired = update_guarded(&mut tx, request).await?;
        if let Some(expired) = &expired {
            insert_job(&mut tx, &Job::for_request(NotificationEvent::RequestExpired, expired)).await?;
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(expired)
    }

    async fn expire_stale(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LinkingRequest>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let expired = sqlx::query_as::<_, LinkingRequest>(
            "UPDATE linking_requests SET status = 'expired', expired_at = $1, version = version + 1
             WHERE id IN (
                 SELECT id FROM linking_requests
                 WHERE status IN ('waiting_parent_link', 'parent_linked') AND expires_at < $2
                 ORDER BY expires_at ASC
                 LIMIT $3
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *"
        )
            .bind(now)
            .bind(now)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        for request in &expired {
            insert_job(&mut tx, &Job::for_request(NotificationEvent::RequestExpired, request)).await?;
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(expired)
    }

    async fn find_unbooked_validated(&self, validated_before: DateTime<Utc>, limit: i64) -> Result<Vec<LinkingRequest>, AppError> {
        sqlx::query_as::<_, LinkingRequest>(
            "SELECT * FROM linking_requests
             WHERE status = 'validated' AND booking_id IS NULL AND validated_at < $1
             ORDER BY validated_at ASC
             LIMIT $2"
        )
            .bind(validated_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
