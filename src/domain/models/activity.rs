use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            created_at: Utc::now(),
        }
    }
}

/// A bookable, capacity-limited occurrence of an activity.
/// `0 <= seats_remaining <= seats_total` holds for every stored row.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Slot {
    pub id: String,
    pub activity_id: String,
    pub seats_total: i64,
    pub seats_remaining: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(activity_id: String, seats_total: i64, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_id,
            seats_total,
            seats_remaining: seats_total,
            start_time,
            end_time,
            created_at: Utc::now(),
        }
    }
}
