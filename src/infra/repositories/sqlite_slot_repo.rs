use crate::domain::{models::activity::{Activity, Slot}, ports::SlotRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

/// Takes `seats` from the slot in one conditional update. `None` means the
/// slot is unknown or does not have that many seats left.
pub(crate) async fn reserve_seats(conn: &mut SqliteConnection, slot_id: &str, seats: i64) -> Result<Option<Slot>, AppError> {
    sqlx::query_as::<_, Slot>(
        "UPDATE slots SET seats_remaining = seats_remaining - ? WHERE id = ? AND seats_remaining >= ? RETURNING *"
    )
        .bind(seats)
        .bind(slot_id)
        .bind(seats)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
}

/// Gives seats back, never above `seats_total`.
pub(crate) async fn release_seats(conn: &mut SqliteConnection, slot_id: &str, seats: i64) -> Result<Option<Slot>, AppError> {
    sqlx::query_as::<_, Slot>(
        "UPDATE slots SET seats_remaining = MIN(seats_total, seats_remaining + ?) WHERE id = ? RETURNING *"
    )
        .bind(seats)
        .bind(slot_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
}

pub struct SqliteSlotRepo {
    pool: SqlitePool,
}

impl SqliteSlotRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }
}

#[async_trait]
impl SlotRepository for SqliteSlotRepo {
    async fn create_activity(&self, activity: &Activity) -> Result<Activity, AppError> {
        sqlx::query_as::<_, Activity>(
            "INSERT INTO activities (id, name, description, created_at) VALUES (?, ?, ?, ?) RETURNING *"
        )
            .bind(&activity.id)
            .bind(&activity.name)
            .bind(&activity.description)
            .bind(activity.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_activity(&self, id: &str) -> Result<Option<Activity>, AppError> {
        sqlx::query_as::<_, Activity>("SELECT * FROM activities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn create_slot(&self, slot: &Slot) -> Result<Slot, AppError> {
        sqlx::query_as::<_, Slot>(
            "INSERT INTO slots (id, activity_id, seats_total, seats_remaining, start_time, end_time, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING *"
        )
            .bind(&slot.id)
            .bind(&slot.activity_id)
            .bind(slot.seats_total)
            .bind(slot.seats_remaining)
            .bind(slot.start_time)
            .bind(slot.end_time)
            .bind(slot.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_slot(&self, id: &str) -> Result<Option<Slot>, AppError> {
        sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_slots(&self, activity_id: &str) -> Result<Vec<Slot>, AppError> {
        sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE activity_id = ? ORDER BY start_time ASC")
            .bind(activity_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn reserve(&self, slot_id: &str, seats: i64) -> Result<Slot, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        match reserve_seats(&mut conn, slot_id, seats).await? {
            Some(slot) => Ok(slot),
            None => match self.find_slot(slot_id).await? {
                Some(_) => Err(AppError::CapacityExceeded(slot_id.to_string())),
                None => Err(AppError::NotFound(format!("Slot {} not found", slot_id))),
            },
        }
    }

    async fn release(&self, slot_id: &str, seats: i64) -> Result<Slot, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        release_seats(&mut conn, slot_id, seats).await?
            .ok_or(AppError::NotFound(format!("Slot {} not found", slot_id)))
    }
}
