pub mod account;
pub mod activity;
pub mod booking;
pub mod health;
pub mod linking;
pub mod validation;
