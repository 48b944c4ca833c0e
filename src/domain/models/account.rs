use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::state::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Guardian,
    Minor,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Guardian => "guardian",
            AccountKind::Minor => "minor",
        }
    }
}

impl TryFrom<String> for AccountKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "guardian" => Ok(AccountKind::Guardian),
            "minor" => Ok(AccountKind::Minor),
            _ => Err(UnknownVariant::new("account kind", value)),
        }
    }
}

/// A family member known to the service. Minors point at their guardian once
/// the family relationship is established.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    #[sqlx(try_from = "String")]
    pub kind: AccountKind,
    pub guardian_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(display_name: String, kind: AccountKind, guardian_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name,
            kind,
            guardian_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_minor(&self) -> bool {
        self.kind == AccountKind::Minor
    }

    pub fn is_guarded_by(&self, guardian_id: &str) -> bool {
        self.guardian_id.as_deref() == Some(guardian_id)
    }
}
