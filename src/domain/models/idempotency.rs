use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub account_id: String,
    pub request_hash: String,
    pub booking_id: String,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(idempotency_key: String, account_id: String, request_hash: String, booking_id: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            idempotency_key,
            account_id,
            request_hash,
            booking_id,
            response_body: String::new(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Fingerprint of the parts of a creation request that must match on replay.
pub fn request_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_separates_fields() {
        assert_ne!(request_fingerprint(&["ab", "c"]), request_fingerprint(&["a", "bc"]));
        assert_eq!(request_fingerprint(&["a", "b"]), request_fingerprint(&["a", "b"]));
    }

    #[test]
    fn record_is_live_until_expiry() {
        let record = IdempotencyRecord::new("k".into(), "acc".into(), "h".into(), "b".into(), Duration::hours(1));
        assert!(record.is_live(Utc::now()));
        assert!(!record.is_live(Utc::now() + Duration::hours(2)));
    }
}
