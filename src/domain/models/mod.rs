pub mod account;
pub mod activity;
pub mod auth;
pub mod booking;
pub mod idempotency;
pub mod job;
pub mod linking;
pub mod state;
