use activity_booking_backend::{
    api::router::create_router,
    config::Config,
    domain::models::{auth::Claims, booking::CapacityPolicy},
    domain::ports::NotificationDispatcher,
    error::AppError,
    infra::factory::{run_sqlite_migrations, sqlite_repositories},
    state::AppState,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use sqlx::{sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}, Pool, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub event_type: String,
    pub recipient: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct MockNotificationDispatcher {
    pub sent: Mutex<Vec<SentNotification>>,
    pub failing: AtomicBool,
}

#[allow(dead_code)]
impl MockNotificationDispatcher {
    pub fn events(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.event_type.clone()).collect()
    }

    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationDispatcher for MockNotificationDispatcher {
    async fn notify(&self, event_type: &str, recipient: &str, payload: &Value) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::InternalWithMsg("notification service down".into()));
        }
        self.sent.lock().unwrap().push(SentNotification {
            event_type: event_type.to_string(),
            recipient: recipient.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

pub struct AuthHeaders {
    pub account_id: String,
    pub access_token: String,
    pub csrf_token: String,
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub state: Arc<AppState>,
    pub notifier: Arc<MockNotificationDispatcher>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(CapacityPolicy::Waitlist, true).await
    }

    pub async fn with_settings(capacity_policy: CapacityPolicy, waitlist_auto_promote: bool) -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        run_sqlite_migrations(&pool).await;

        let config = Config {
            database_url: db_url,
            port: 0,
            jwt_public_key: include_str!("../tests/keys/test_public.pem").to_string(),
            notification_service_url: "http://localhost".to_string(),
            notification_service_token: "token".to_string(),
            linking_code_ttl_hours: 24,
            linking_code_length: 8,
            linking_code_max_attempts: 5,
            idempotency_ttl_hours: 24,
            capacity_policy,
            waitlist_auto_promote,
            store_retry_attempts: 5,
            worker_interval_secs: 1,
        };

        let notifier = Arc::new(MockNotificationDispatcher::default());
        let state = Arc::new(AppState::assemble(config, sqlite_repositories(pool.clone()), notifier.clone()));
        let router = create_router(state.clone());

        Self { router, pool, db_filename, state, notifier }
    }

    /// Signs an access token the way the identity provider would.
    pub fn login_as(&self, account_id: &str, role: &str) -> AuthHeaders {
        let now = Utc::now();
        let csrf_token = Uuid::new_v4().to_string();
        let claims = Claims {
            iss: "test-issuer".to_string(),
            sub: account_id.to_string(),
            aud: "booking-frontend".to_string(),
            exp: (now + Duration::minutes(15)).timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4().to_string(),
            role: role.to_string(),
            csrf_token: csrf_token.clone(),
        };
        let key = EncodingKey::from_ed_pem(include_bytes!("../tests/keys/test_private.pem")).unwrap();
        let access_token = encode(&Header::new(Algorithm::EdDSA), &claims, &key).unwrap();

        AuthHeaders { account_id: account_id.to_string(), access_token, csrf_token }
    }

    pub fn admin(&self) -> AuthHeaders {
        self.login_as("admin-1", "ADMIN")
    }

    pub async fn send(&self, method: &str, uri: &str, auth: Option<&AuthHeaders>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder
                .header(header::COOKIE, format!("access_token={}", auth.access_token))
                .header("X-CSRF-Token", &auth.csrf_token);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    pub async fn post(&self, uri: &str, auth: &AuthHeaders, body: Value) -> Response {
        self.send("POST", uri, Some(auth), Some(body)).await
    }

    pub async fn get(&self, uri: &str, auth: &AuthHeaders) -> Response {
        self.send("GET", uri, Some(auth), None).await
    }

    pub async fn create_account(&self, kind: &str, guardian_id: Option<&str>) -> String {
        let res = self.post("/api/v1/accounts", &self.admin(), json!({
            "display_name": format!("{} {}", kind, &Uuid::new_v4().to_string()[..8]),
            "kind": kind,
            "guardian_id": guardian_id,
        })).await;
        assert_eq!(res.status(), 201, "account creation failed");
        parse_body(res).await["id"].as_str().unwrap().to_string()
    }

    /// Returns `(activity_id, slot_id)` for a fresh activity with one slot.
    pub async fn create_activity_with_slot(&self, seats: i64) -> (String, String) {
        let admin = self.admin();
        let res = self.post("/api/v1/activities", &admin, json!({
            "name": "Climbing",
            "description": "Indoor wall, beginners welcome"
        })).await;
        assert_eq!(res.status(), 201, "activity creation failed");
        let activity_id = parse_body(res).await["id"].as_str().unwrap().to_string();

        let start = Utc::now() + Duration::days(7);
        let res = self.post(&format!("/api/v1/activities/{}/slots", activity_id), &admin, json!({
            "seats_total": seats,
            "start_time": start.to_rfc3339(),
            "end_time": (start + Duration::hours(2)).to_rfc3339(),
        })).await;
        assert_eq!(res.status(), 201, "slot creation failed");
        let slot_id = parse_body(res).await["id"].as_str().unwrap().to_string();

        (activity_id, slot_id)
    }

    pub async fn seats_remaining(&self, slot_id: &str) -> i64 {
        let res = self.get(&format!("/api/v1/slots/{}", slot_id), &self.admin()).await;
        parse_body(res).await["seats_remaining"].as_i64().unwrap()
    }

    pub async fn pending_job_types(&self) -> Vec<String> {
        sqlx::query_scalar::<_, String>("SELECT job_type FROM jobs WHERE status = 'PENDING' ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_filename));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_filename));
    }
}

#[allow(dead_code)]
pub async fn parse_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
