pub mod sqlite_account_repo;
pub mod sqlite_slot_repo;
pub mod sqlite_booking_repo;
pub mod sqlite_linking_repo;
pub mod sqlite_job_repo;

pub mod postgres_account_repo;
pub mod postgres_slot_repo;
pub mod postgres_booking_repo;
pub mod postgres_linking_repo;
pub mod postgres_job_repo;
