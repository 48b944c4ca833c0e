use std::sync::Arc;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::models::{
    account::AccountKind,
    auth::Identity,
    linking::{generate_linking_code, normalize_linking_code, LinkingAction, LinkingRequest},
    state::Transition,
};
use crate::domain::ports::{AccountRepository, LinkingRepository, SlotRepository};
use crate::domain::services::retry::RetryPolicy;
use crate::error::AppError;

const EXPIRY_BATCH: i64 = 100;

pub struct LinkingSettings {
    pub code_length: usize,
    pub max_code_attempts: usize,
    pub ttl: Duration,
}

/// Issues linking codes for minors and binds them to the guardian who redeems them.
pub struct LinkingService {
    linking: Arc<dyn LinkingRepository>,
    accounts: Arc<dyn AccountRepository>,
    slots: Arc<dyn SlotRepository>,
    retry: RetryPolicy,
    settings: LinkingSettings,
}

impl LinkingService {
    pub fn new(
        linking: Arc<dyn LinkingRepository>,
        accounts: Arc<dyn AccountRepository>,
        slots: Arc<dyn SlotRepository>,
        retry: RetryPolicy,
        settings: LinkingSettings,
    ) -> Self {
        Self { linking, accounts, slots, retry, settings }
    }

    pub fn generate_linking_code(&self) -> String {
        generate_linking_code(self.settings.code_length)
    }

    pub async fn create_child_request(
        &self,
        activity_id: &str,
        minor_id: &str,
        slot_id: Option<String>,
    ) -> Result<LinkingRequest, AppError> {
        let minor = self.accounts.find_by_id(minor_id).await?
            .ok_or(AppError::NotFound(format!("Account {} not found", minor_id)))?;
        if !minor.is_minor() {
            return Err(AppError::Unauthorized("Only minor accounts can ask for guardian approval".into()));
        }
        if minor.guardian_id.is_some() {
            return Err(AppError::AlreadyLinked(
                "This account already has a guardian; the guardian can book directly".into(),
            ));
        }

        self.slots.find_activity(activity_id).await?
            .ok_or(AppError::NotFound(format!("Activity {} not found", activity_id)))?;
        if let Some(slot_id) = &slot_id {
            let slot = self.slots.find_slot(slot_id).await?
                .ok_or(AppError::NotFound(format!("Slot {} not found", slot_id)))?;
            if slot.activity_id != activity_id {
                return Err(AppError::Validation("Slot does not belong to the requested activity".into()));
            }
        }

        for attempt in 1..=self.settings.max_code_attempts {
            let request = LinkingRequest::new(
                activity_id.to_string(),
                minor_id.to_string(),
                slot_id.clone(),
                self.generate_linking_code(),
                self.settings.ttl,
            );
            let linking = &self.linking;
            let request_ref = &request;
            match self.retry.run("create_linking_request", move |_| linking.create(request_ref)).await {
                Ok(created) => {
                    info!(request_id = %created.id, minor_id, activity_id, "Linking request created");
                    return Ok(created);
                }
                Err(e) if e.is_unique_violation() => {
                    warn!(attempt, "Linking code collided with an active code, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::ServiceUnavailable)
    }

    /// Binds the request behind `code` to `guardian_id`. Fails with
    /// `InvalidCode`, `ExpiredCode` or `AlreadyLinked`, checked in that order.
    pub async fn link_parent_to_minor(&self, code: &str, guardian_id: &str) -> Result<LinkingRequest, AppError> {
        let guardian = self.accounts.find_by_id(guardian_id).await?
            .ok_or(AppError::NotFound(format!("Account {} not found", guardian_id)))?;
        if guardian.kind != AccountKind::Guardian {
            return Err(AppError::Unauthorized("Only guardian accounts can redeem a linking code".into()));
        }

        let code = normalize_linking_code(code);
        if code.is_empty() {
            return Err(AppError::InvalidCode);
        }

        let code_ref = code.as_str();
        let linked = self.retry
            .run("link_parent_to_minor", move |_| self.redeem_once(code_ref, guardian_id))
            .await?;
        info!(request_id = %linked.id, guardian_id, "Guardian linked to request");
        Ok(linked)
    }

    async fn redeem_once(&self, code: &str, guardian_id: &str) -> Result<LinkingRequest, AppError> {
        let request = self.linking.find_latest_by_code(code).await?
            .ok_or(AppError::InvalidCode)?;

        let now = Utc::now();
        if request.is_past_expiry(now) {
            if request.needs_expiry(now) {
                self.expire_request(&request).await?;
            }
            return Err(AppError::ExpiredCode);
        }

        let Transition::To(status) = request.status.apply(LinkingAction::Link)? else {
            return Err(AppError::AlreadyLinked("This linking code has already been used by a guardian".into()));
        };

        let mut linked = request.clone();
        linked.status = status;
        linked.guardian_id = Some(guardian_id.to_string());
        linked.linked_at = Some(now);
        self.linking.link_guardian(&linked).await
    }

    /// Moves an open request to `expired`. Returns the stored row, which may
    /// come from a concurrent writer that got there first.
    pub async fn expire_request(&self, request: &LinkingRequest) -> Result<LinkingRequest, AppError> {
        let Transition::To(status) = request.status.apply(LinkingAction::Expire)? else {
            return Ok(request.clone());
        };

        let mut expired = request.clone();
        expired.status = status;
        expired.expired_at = Some(Utc::now());

        match self.linking.expire(&expired).await? {
            Some(stored) => {
                info!(request_id = %stored.id, "Linking request expired");
                Ok(stored)
            }
            None => self.linking.find_by_id(&request.id).await?
                .ok_or(AppError::NotFound(format!("Linking request {} not found", request.id))),
        }
    }

    pub async fn expire_stale_requests(&self) -> Result<Vec<LinkingRequest>, AppError> {
        let mut expired = Vec::new();
        loop {
            let batch = self.linking.expire_stale(Utc::now(), EXPIRY_BATCH).await?;
            let done = (batch.len() as i64) < EXPIRY_BATCH;
            expired.extend(batch);
            if done {
                break;
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale linking requests");
        }
        Ok(expired)
    }

    /// Reads never hand out a request that is past its expiry but still open.
    async fn refresh(&self, request: LinkingRequest) -> Result<LinkingRequest, AppError> {
        if request.needs_expiry(Utc::now()) {
            self.expire_request(&request).await
        } else {
            Ok(request)
        }
    }

    pub async fn get_request(&self, request_id: &str, caller: &Identity) -> Result<LinkingRequest, AppError> {
        let request = self.linking.find_by_id(request_id).await?
            .ok_or(AppError::NotFound(format!("Linking request {} not found", request_id)))?;

        let involved = request.minor_id == caller.account_id
            || request.guardian_id.as_deref() == Some(caller.account_id.as_str());
        if !involved && !caller.is_admin() {
            return Err(AppError::Unauthorized("You are not part of this request".into()));
        }
        self.refresh(request).await
    }

    pub async fn list_requests_for_account(&self, account_id: &str) -> Result<Vec<LinkingRequest>, AppError> {
        let mut requests = Vec::new();
        for request in self.linking.list_by_account(account_id).await? {
            requests.push(self.refresh(request).await?);
        }
        Ok(requests)
    }
}
