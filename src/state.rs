use std::sync::Arc;
use chrono::Duration;
use crate::domain::ports::{
    AccountRepository, BookingRepository, JobRepository, LinkingRepository,
    NotificationDispatcher, SlotRepository,
};
use crate::domain::services::{
    booking_workflow::BookingWorkflow,
    linking_service::{LinkingService, LinkingSettings},
    retry::RetryPolicy,
    slot_store::SlotAvailabilityStore,
    validation_gate::GuardianValidationGate,
};
use crate::config::Config;

/// Storage backends for one database, as built by the factory or a test harness.
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub slots: Arc<dyn SlotRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub linking: Arc<dyn LinkingRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub account_repo: Arc<dyn AccountRepository>,
    pub job_repo: Arc<dyn JobRepository>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub slot_store: Arc<SlotAvailabilityStore>,
    pub booking_workflow: Arc<BookingWorkflow>,
    pub linking_service: Arc<LinkingService>,
    pub validation_gate: Arc<GuardianValidationGate>,
}

impl AppState {
    pub fn assemble(config: Config, repos: Repositories, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        let retry = RetryPolicy::for_store(config.store_retry_attempts);

        let slot_store = Arc::new(SlotAvailabilityStore::new(repos.slots.clone(), retry.clone()));
        let booking_workflow = Arc::new(BookingWorkflow::new(
            repos.bookings.clone(),
            repos.slots.clone(),
            repos.accounts.clone(),
            retry.clone(),
            config.capacity_policy,
            config.waitlist_auto_promote,
            Duration::hours(config.idempotency_ttl_hours),
        ));
        let linking_service = Arc::new(LinkingService::new(
            repos.linking.clone(),
            repos.accounts.clone(),
            repos.slots.clone(),
            retry.clone(),
            LinkingSettings {
                code_length: config.linking_code_length,
                max_code_attempts: config.linking_code_max_attempts,
                ttl: Duration::hours(config.linking_code_ttl_hours),
            },
        ));
        let validation_gate = Arc::new(GuardianValidationGate::new(
            repos.linking.clone(),
            repos.slots.clone(),
            linking_service.clone(),
            booking_workflow.clone(),
            retry,
        ));

        Self {
            config,
            account_repo: repos.accounts,
            job_repo: repos.jobs,
            notifier,
            slot_store,
            booking_workflow,
            linking_service,
            validation_gate,
        }
    }
}
