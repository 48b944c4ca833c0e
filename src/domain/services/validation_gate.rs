use std::sync::Arc;
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::domain::models::{
    auth::Identity,
    booking::CapacityPolicy,
    linking::{DecisionAction, DecisionOverride, DecisionStatus, LinkingAction, LinkingRequest, LinkingStatus, ValidationDecision},
    state::Transition,
};
use crate::domain::ports::{LinkingRepository, SlotRepository};
use crate::domain::services::booking_workflow::{BookingWorkflow, CreateBooking};
use crate::domain::services::linking_service::LinkingService;
use crate::domain::services::retry::RetryPolicy;
use crate::error::AppError;

const RECONCILE_BATCH: i64 = 50;

#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub action: DecisionAction,
    pub reason: Option<String>,
    /// Required when approving a request made without a slot.
    pub slot_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub request: LinkingRequest,
    pub booking_id: Option<String>,
}

/// Guardian approval of linked requests. An approval turns the request into
/// exactly one booking; a recorded decision only changes through an audited
/// override.
pub struct GuardianValidationGate {
    linking: Arc<dyn LinkingRepository>,
    slots: Arc<dyn SlotRepository>,
    linking_service: Arc<LinkingService>,
    bookings: Arc<BookingWorkflow>,
    retry: RetryPolicy,
}

impl GuardianValidationGate {
    pub fn new(
        linking: Arc<dyn LinkingRepository>,
        slots: Arc<dyn SlotRepository>,
        linking_service: Arc<LinkingService>,
        bookings: Arc<BookingWorkflow>,
        retry: RetryPolicy,
    ) -> Self {
        Self { linking, slots, linking_service, bookings, retry }
    }

    pub async fn decide(&self, request_id: &str, guardian_id: &str, input: DecisionInput) -> Result<DecisionOutcome, AppError> {
        let input_ref = &input;
        let decided = self.retry
            .run("decide", move |_| self.decide_once(request_id, guardian_id, input_ref))
            .await?;
        info!(request_id, guardian_id, status = decided.status.as_str(), "Guardian decision recorded");

        if decided.status != LinkingStatus::Validated {
            return Ok(DecisionOutcome { request: decided, booking_id: None });
        }
        let (request, booking_id) = self.book_validated(&decided).await?;
        Ok(DecisionOutcome { request, booking_id: Some(booking_id) })
    }

    async fn decide_once(&self, request_id: &str, guardian_id: &str, input: &DecisionInput) -> Result<LinkingRequest, AppError> {
        let request = self.linking.find_by_id(request_id).await?
            .ok_or(AppError::NotFound(format!("Linking request {} not found", request_id)))?;

        if request.guardian_id.as_deref() != Some(guardian_id) {
            return Err(AppError::Unauthorized("Only the linked guardian can decide on this request".into()));
        }

        let now = Utc::now();
        if request.needs_expiry(now) {
            self.linking_service.expire_request(&request).await?;
            return Err(AppError::InvalidStateTransition("This request has expired".into()));
        }

        let Transition::To(status) = request.status.apply(input.action.linking_action())? else {
            return Err(AppError::InvalidStateTransition("A decision has already been recorded for this request".into()));
        };

        let mut decided = request.clone();
        decided.status = status;
        match input.action {
            DecisionAction::Approve => {
                decided.slot_id = Some(self.resolve_slot(&request, input.slot_id.as_deref()).await?);
                decided.validated_at = Some(now);
            }
            DecisionAction::Reject => {
                decided.rejected_at = Some(now);
                decided.rejection_reason = input.reason.clone();
            }
        }

        let decision = ValidationDecision::new(
            request.id.clone(),
            guardian_id.to_string(),
            input.action.outcome(),
            input.reason.clone(),
        );
        self.linking.record_decision(&decided, &decision).await
    }

    /// The slot an approval books: the one the minor asked for, otherwise the
    /// one chosen at approval time.
    async fn resolve_slot(&self, request: &LinkingRequest, chosen: Option<&str>) -> Result<String, AppError> {
        if let Some(slot_id) = &request.slot_id {
            return Ok(slot_id.clone());
        }
        let slot_id = chosen
            .ok_or(AppError::Validation("Choose a slot before approving this request".into()))?;
        let slot = self.slots.find_slot(slot_id).await?
            .ok_or(AppError::NotFound(format!("Slot {} not found", slot_id)))?;
        if slot.activity_id != request.activity_id {
            return Err(AppError::Validation("Slot does not belong to the requested activity".into()));
        }
        Ok(slot.id)
    }

    /// Books the slot of a validated request on behalf of its guardian. The
    /// idempotency key is derived from the decision, so repeating this for the
    /// same decision always lands on the same booking.
    async fn book_validated(&self, request: &LinkingRequest) -> Result<(LinkingRequest, String), AppError> {
        let decision = self.linking.find_decision(&request.id).await?
            .ok_or(AppError::InternalWithMsg(format!("Validated request {} has no decision", request.id)))?;
        let slot_id = request.slot_id.clone()
            .ok_or(AppError::InternalWithMsg(format!("Validated request {} has no slot", request.id)))?;
        let guardian_id = request.guardian_id.clone()
            .ok_or(AppError::InternalWithMsg(format!("Validated request {} has no guardian", request.id)))?;

        let response = self.bookings.create_booking(CreateBooking {
            activity_id: request.activity_id.clone(),
            slot_id,
            child_id: request.minor_id.clone(),
            account_id: guardian_id,
            idempotency_key: format!("linking-request:{}:{}", request.id, decision.version),
            express: true,
            linking_request_id: Some(request.id.clone()),
            on_full: Some(CapacityPolicy::Waitlist),
        }).await?;

        let attached = self.linking.attach_booking(&request.id, &response.booking_id).await?;
        Ok((attached, response.booking_id))
    }

    /// Administrative reversal of a recorded decision, written to the audit
    /// trail. Reversing an approval cancels the booking it produced.
    pub async fn override_decision(
        &self,
        request_id: &str,
        actor: &Identity,
        action: DecisionAction,
        reason: String,
        slot_id: Option<String>,
    ) -> Result<DecisionOutcome, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Unauthorized("Only administrators can override a decision".into()));
        }
        if reason.trim().is_empty() {
            return Err(AppError::Validation("An override needs a reason".into()));
        }

        let actor_id = actor.account_id.as_str();
        let reason_ref = reason.as_str();
        let slot_ref = slot_id.as_deref();
        let (request, previous_booking) = self.retry
            .run("override_decision", move |_| self.override_once(request_id, actor_id, action, reason_ref, slot_ref))
            .await?;
        warn!(request_id, actor_id, status = request.status.as_str(), "Guardian decision overridden");

        match action {
            DecisionAction::Approve => {
                let (request, booking_id) = self.book_validated(&request).await?;
                Ok(DecisionOutcome { request, booking_id: Some(booking_id) })
            }
            DecisionAction::Reject => {
                if let Some(booking_id) = previous_booking {
                    self.bookings.cancel_booking(&booking_id, Some("Guardian approval overridden".into())).await?;
                }
                Ok(DecisionOutcome { request, booking_id: None })
            }
        }
    }

    async fn override_once(
        &self,
        request_id: &str,
        actor_id: &str,
        action: DecisionAction,
        reason: &str,
        slot_id: Option<&str>,
    ) -> Result<(LinkingRequest, Option<String>), AppError> {
        let request = self.linking.find_by_id(request_id).await?
            .ok_or(AppError::NotFound(format!("Linking request {} not found", request_id)))?;
        let decision = self.linking.find_decision(request_id).await?
            .ok_or(AppError::InvalidStateTransition("No decision has been recorded for this request".into()))?;

        let target = action.outcome();
        if decision.status == target {
            return Err(AppError::InvalidStateTransition(format!("The decision is already {}", target.as_str())));
        }
        let Transition::To(status) = request.status.apply(LinkingAction::Reverse)? else {
            return Err(AppError::InvalidStateTransition("Only a recorded decision can be overridden".into()));
        };

        let now = Utc::now();
        let previous_booking = request.booking_id.clone();
        let mut reversed = request.clone();
        reversed.status = status;
        match target {
            DecisionStatus::Approved => {
                reversed.slot_id = Some(self.resolve_slot(&request, slot_id).await?);
                reversed.validated_at = Some(now);
                reversed.rejection_reason = None;
            }
            DecisionStatus::Rejected => {
                reversed.rejected_at = Some(now);
                reversed.rejection_reason = Some(reason.to_string());
                reversed.booking_id = None;
            }
        }

        let audit = DecisionOverride::new(&decision, actor_id.to_string(), target, reason.to_string());
        let mut revised = decision.clone();
        revised.status = target;
        revised.reason = Some(reason.to_string());
        revised.decided_at = now;

        let (stored, _) = self.linking.override_decision(&reversed, &revised, &audit).await?;
        Ok((stored, previous_booking))
    }

    pub async fn list_overrides(&self, request_id: &str) -> Result<Vec<DecisionOverride>, AppError> {
        self.linking.list_overrides(request_id).await
    }

    /// Books validated requests whose booking step never completed.
    pub async fn reconcile_validated(&self) -> Result<usize, AppError> {
        let cutoff = Utc::now() - Duration::seconds(30);
        let pending = self.linking.find_unbooked_validated(cutoff, RECONCILE_BATCH).await?;
        let mut booked = 0;
        for request in pending {
            match self.book_validated(&request).await {
                Ok((_, booking_id)) => {
                    info!(request_id = %request.id, booking_id = %booking_id, "Reconciled validated request");
                    booked += 1;
                }
                Err(e) => error!(request_id = %request.id, "Reconciliation failed: {}", e),
            }
        }
        Ok(booked)
    }
}
