use std::env;
use std::str::FromStr;

use crate::domain::models::booking::CapacityPolicy;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_public_key: String, // Public key (PEM) of the identity provider
    pub notification_service_url: String,
    pub notification_service_token: String,
    pub linking_code_ttl_hours: i64,
    pub linking_code_length: usize,
    pub linking_code_max_attempts: usize,
    pub idempotency_ttl_hours: i64,
    pub capacity_policy: CapacityPolicy,
    pub waitlist_auto_promote: bool,
    pub store_retry_attempts: usize,
    pub worker_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: parse_or("PORT", 3000),
            jwt_public_key: env::var("JWT_PUBLIC_KEY").expect("JWT_PUBLIC_KEY must be set (Ed25519 Public Key)"),
            notification_service_url: env::var("NOTIFICATION_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8000/api/v1/notify".to_string()),
            notification_service_token: env::var("NOTIFICATION_SERVICE_TOKEN").unwrap_or_else(|_| "test-token-1".to_string()),
            linking_code_ttl_hours: parse_or("LINKING_CODE_TTL_HOURS", 7 * 24),
            linking_code_length: parse_or::<usize>("LINKING_CODE_LENGTH", 8).max(6),
            linking_code_max_attempts: parse_or::<usize>("LINKING_CODE_MAX_ATTEMPTS", 5).max(1),
            idempotency_ttl_hours: parse_or("IDEMPOTENCY_TTL_HOURS", 24),
            capacity_policy: parse_or("CAPACITY_POLICY", CapacityPolicy::Waitlist),
            waitlist_auto_promote: parse_or("WAITLIST_AUTO_PROMOTE", true),
            store_retry_attempts: parse_or::<usize>("STORE_RETRY_ATTEMPTS", 3).max(1),
            worker_interval_secs: parse_or("WORKER_INTERVAL_SECS", 5),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{} has an invalid value: {}", key, raw)),
        Err(_) => default,
    }
}
