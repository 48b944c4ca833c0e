use serde::{Deserialize, Serialize};

/// Access-token claims as issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    pub jti: String,

    #[serde(rename = "https://booking.com/claims/role")]
    pub role: String,

    #[serde(rename = "https://booking.com/claims/csrf")]
    pub csrf_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Guardian,
    Minor,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "GUARDIAN" => Some(Role::Guardian),
            "MINOR" => Some(Role::Minor),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The verified caller of a request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub account_id: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
