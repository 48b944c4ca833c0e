use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::models::activity::{Activity, Slot};
use crate::domain::ports::SlotRepository;
use crate::domain::services::retry::RetryPolicy;
use crate::error::AppError;

/// Capacity counters for bookable slots.
pub struct SlotAvailabilityStore {
    repo: Arc<dyn SlotRepository>,
    retry: RetryPolicy,
}

impl SlotAvailabilityStore {
    pub fn new(repo: Arc<dyn SlotRepository>, retry: RetryPolicy) -> Self {
        Self { repo, retry }
    }

    pub async fn create_activity(&self, name: String, description: Option<String>) -> Result<Activity, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Activity name is required".into()));
        }
        let activity = self.repo.create_activity(&Activity::new(name.trim().to_string(), description)).await?;
        info!(activity_id = %activity.id, "Activity created");
        Ok(activity)
    }

    pub async fn create_slot(
        &self,
        activity_id: &str,
        seats_total: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Slot, AppError> {
        if seats_total < 1 {
            return Err(AppError::Validation("A slot needs at least one seat".into()));
        }
        if end_time <= start_time {
            return Err(AppError::Validation("Slot must end after it starts".into()));
        }
        self.repo.find_activity(activity_id).await?
            .ok_or(AppError::NotFound(format!("Activity {} not found", activity_id)))?;

        let slot = self.repo.create_slot(&Slot::new(activity_id.to_string(), seats_total, start_time, end_time)).await?;
        info!(slot_id = %slot.id, activity_id, seats_total, "Slot created");
        Ok(slot)
    }

    pub async fn find_slot(&self, slot_id: &str) -> Result<Slot, AppError> {
        self.repo.find_slot(slot_id).await?
            .ok_or(AppError::NotFound(format!("Slot {} not found", slot_id)))
    }

    pub async fn list_slots(&self, activity_id: &str) -> Result<Vec<Slot>, AppError> {
        self.repo.find_activity(activity_id).await?
            .ok_or(AppError::NotFound(format!("Activity {} not found", activity_id)))?;
        self.repo.list_slots(activity_id).await
    }

    pub async fn reserve(&self, slot_id: &str, seats: i64) -> Result<Slot, AppError> {
        if seats < 1 {
            return Err(AppError::Validation("Seat count must be positive".into()));
        }
        let repo = &self.repo;
        self.retry.run("reserve_seats", move |_| repo.reserve(slot_id, seats)).await
    }

    pub async fn release(&self, slot_id: &str, seats: i64) -> Result<Slot, AppError> {
        if seats < 1 {
            return Err(AppError::Validation("Seat count must be positive".into()));
        }
        let repo = &self.repo;
        self.retry.run("release_seats", move |_| repo.release(slot_id, seats)).await
    }
}
