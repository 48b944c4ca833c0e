use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use rand::Rng;

use super::state::{Transition, UnknownVariant};
use crate::error::AppError;

/// Crockford-style alphabet: no 0/O or 1/I look-alikes.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

pub fn generate_linking_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are typed by people; accept any case and stray whitespace.
pub fn normalize_linking_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkingStatus {
    WaitingParentLink,
    ParentLinked,
    Validated,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkingAction {
    Link,
    Validate,
    Reject,
    Expire,
    /// Administrative reversal of a recorded decision.
    Reverse,
}

impl LinkingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkingStatus::WaitingParentLink => "waiting_parent_link",
            LinkingStatus::ParentLinked => "parent_linked",
            LinkingStatus::Validated => "validated",
            LinkingStatus::Rejected => "rejected",
            LinkingStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkingStatus::Validated | LinkingStatus::Rejected | LinkingStatus::Expired)
    }

    pub fn apply(self, action: LinkingAction) -> Result<Transition<Self>, AppError> {
        use LinkingAction::*;
        use LinkingStatus::*;

        match (self, action) {
            (WaitingParentLink, Link) => Ok(Transition::To(ParentLinked)),
            (ParentLinked | Validated | Rejected, Link) => Err(AppError::AlreadyLinked(
                "This linking code has already been used by a guardian".into(),
            )),
            (Expired, Link) => Err(AppError::ExpiredCode),

            (ParentLinked, Validate) => Ok(Transition::To(Validated)),
            (ParentLinked, Reject) => Ok(Transition::To(Rejected)),
            (WaitingParentLink, Validate | Reject) => Err(AppError::InvalidStateTransition(
                "No guardian has redeemed this request yet".into(),
            )),
            (Validated | Rejected, Validate | Reject) => Err(AppError::InvalidStateTransition(
                "A decision has already been recorded for this request".into(),
            )),
            (Expired, Validate | Reject) => Err(AppError::InvalidStateTransition(
                "This request has expired".into(),
            )),

            (WaitingParentLink | ParentLinked, Expire) => Ok(Transition::To(Expired)),
            (Validated | Rejected | Expired, Expire) => Ok(Transition::Unchanged),

            (Validated, Reverse) => Ok(Transition::To(Rejected)),
            (Rejected, Reverse) => Ok(Transition::To(Validated)),
            (WaitingParentLink | ParentLinked | Expired, Reverse) => Err(AppError::InvalidStateTransition(
                "Only a recorded decision can be overridden".into(),
            )),
        }
    }
}

impl TryFrom<String> for LinkingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "waiting_parent_link" => Ok(LinkingStatus::WaitingParentLink),
            "parent_linked" => Ok(LinkingStatus::ParentLinked),
            "validated" => Ok(LinkingStatus::Validated),
            "rejected" => Ok(LinkingStatus::Rejected),
            "expired" => Ok(LinkingStatus::Expired),
            _ => Err(UnknownVariant::new("linking status", value)),
        }
    }
}

/// A minor's activity request waiting for a guardian to claim and decide it.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct LinkingRequest {
    pub id: String,
    pub activity_id: String,
    pub slot_id: Option<String>,
    pub minor_id: String,
    pub linking_code: String,
    #[sqlx(try_from = "String")]
    pub status: LinkingStatus,
    pub guardian_id: Option<String>,
    pub booking_id: Option<String>,
    pub rejection_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub linked_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl LinkingRequest {
    pub fn new(activity_id: String, minor_id: String, slot_id: Option<String>, linking_code: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            activity_id,
            slot_id,
            minor_id,
            linking_code,
            status: LinkingStatus::WaitingParentLink,
            guardian_id: None,
            booking_id: None,
            rejection_reason: None,
            expires_at: now + ttl,
            linked_at: None,
            validated_at: None,
            rejected_at: None,
            expired_at: None,
            version: 1,
            created_at: now,
        }
    }

    /// True once the validity window has closed on a request that never
    /// reached a decision.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn needs_expiry(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.is_past_expiry(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
}

impl DecisionAction {
    pub fn outcome(&self) -> DecisionStatus {
        match self {
            DecisionAction::Approve => DecisionStatus::Approved,
            DecisionAction::Reject => DecisionStatus::Rejected,
        }
    }

    pub fn linking_action(&self) -> LinkingAction {
        match self {
            DecisionAction::Approve => LinkingAction::Validate,
            DecisionAction::Reject => LinkingAction::Reject,
        }
    }
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
        }
    }
}

impl TryFrom<String> for DecisionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "approved" => Ok(DecisionStatus::Approved),
            "rejected" => Ok(DecisionStatus::Rejected),
            _ => Err(UnknownVariant::new("decision status", value)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct ValidationDecision {
    pub id: String,
    pub request_id: String,
    pub guardian_id: String,
    #[sqlx(try_from = "String")]
    pub status: DecisionStatus,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub version: i64,
}

impl ValidationDecision {
    pub fn new(request_id: String, guardian_id: String, status: DecisionStatus, reason: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            guardian_id,
            status,
            reason,
            decided_at: Utc::now(),
            version: 1,
        }
    }
}

/// Audit trail entry for an explicit reversal of a guardian decision.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct DecisionOverride {
    pub id: String,
    pub decision_id: String,
    pub request_id: String,
    pub actor_id: String,
    pub previous_status: String,
    pub new_status: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl DecisionOverride {
    pub fn new(decision: &ValidationDecision, actor_id: String, new_status: DecisionStatus, reason: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            decision_id: decision.id.clone(),
            request_id: decision.request_id.clone(),
            actor_id,
            previous_status: decision.status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
            reason,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_use_unambiguous_alphabet() {
        let code = generate_linking_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert!(!code.contains('0') && !code.contains('O') && !code.contains('I') && !code.contains('1'));
    }

    #[test]
    fn normalization_is_case_insensitive() {
        assert_eq!(normalize_linking_code(" ab12-cd "), "AB12CD");
    }

    #[test]
    fn linking_lifecycle_happy_path() {
        let linked = LinkingStatus::WaitingParentLink.apply(LinkingAction::Link).unwrap();
        assert_eq!(linked, Transition::To(LinkingStatus::ParentLinked));
        let validated = LinkingStatus::ParentLinked.apply(LinkingAction::Validate).unwrap();
        assert_eq!(validated, Transition::To(LinkingStatus::Validated));
    }

    #[test]
    fn second_link_reports_already_linked() {
        assert!(matches!(LinkingStatus::ParentLinked.apply(LinkingAction::Link), Err(AppError::AlreadyLinked(_))));
        assert!(matches!(LinkingStatus::Validated.apply(LinkingAction::Link), Err(AppError::AlreadyLinked(_))));
        assert!(matches!(LinkingStatus::Expired.apply(LinkingAction::Link), Err(AppError::ExpiredCode)));
    }

    #[test]
    fn decisions_are_final_without_reversal() {
        assert!(matches!(
            LinkingStatus::Validated.apply(LinkingAction::Reject),
            Err(AppError::InvalidStateTransition(_))
        ));
        assert_eq!(LinkingStatus::Validated.apply(LinkingAction::Reverse).unwrap(), Transition::To(LinkingStatus::Rejected));
        assert!(LinkingStatus::ParentLinked.apply(LinkingAction::Reverse).is_err());
    }

    #[test]
    fn terminal_requests_do_not_expire_again() {
        assert_eq!(LinkingStatus::Rejected.apply(LinkingAction::Expire).unwrap(), Transition::Unchanged);
        assert_eq!(LinkingStatus::ParentLinked.apply(LinkingAction::Expire).unwrap(), Transition::To(LinkingStatus::Expired));
    }

    #[test]
    fn expiry_only_applies_to_open_requests() {
        let mut request = LinkingRequest::new("a".into(), "m".into(), None, "ABCDEFGH".into(), Duration::hours(1));
        let later = Utc::now() + Duration::hours(2);
        assert!(request.needs_expiry(later));
        request.status = LinkingStatus::Validated;
        assert!(!request.needs_expiry(later));
        assert!(request.is_past_expiry(later));
    }
}
