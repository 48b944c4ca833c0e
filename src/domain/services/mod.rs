pub mod booking_workflow;
pub mod linking_service;
pub mod retry;
pub mod slot_store;
pub mod validation_gate;
