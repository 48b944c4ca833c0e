use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use sqlx::{postgres::{PgPoolOptions, PgConnectOptions}, sqlite::{SqlitePoolOptions, SqliteJournalMode, SqliteConnectOptions}};
use sqlx::{PgPool, SqlitePool, ConnectOptions};
use tracing::info;
use tracing::log::LevelFilter;

use crate::config::Config;
use crate::state::{AppState, Repositories};
use crate::infra::notifications::http_notification_dispatcher::HttpNotificationDispatcher;
use crate::infra::repositories::{
    postgres_account_repo::PostgresAccountRepo, postgres_booking_repo::PostgresBookingRepo,
    postgres_job_repo::PostgresJobRepo, postgres_linking_repo::PostgresLinkingRepo,
    postgres_slot_repo::PostgresSlotRepo,
    sqlite_account_repo::SqliteAccountRepo, sqlite_booking_repo::SqliteBookingRepo,
    sqlite_job_repo::SqliteJobRepo, sqlite_linking_repo::SqliteLinkingRepo,
    sqlite_slot_repo::SqliteSlotRepo,
};

pub async fn bootstrap_state(config: &Config) -> AppState {
    let database_url = &config.database_url;
    let notifier = Arc::new(HttpNotificationDispatcher::new(
        config.notification_service_url.clone(),
        config.notification_service_token.clone(),
    ));

    let repos = if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        info!("Initializing PostgreSQL connection...");

        let mut opts: PgConnectOptions = database_url.parse().expect("Invalid Postgres URL");
        opts = opts.log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .expect("Failed to connect to Postgres");

        run_postgres_migrations(&pool).await;
        postgres_repositories(pool)
    } else {
        info!("Initializing SQLite connection with WAL Mode...");

        let opts = SqliteConnectOptions::from_str(database_url)
            .expect("Invalid SQLite connection string")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .expect("Failed to connect to SQLite");

        run_sqlite_migrations(&pool).await;
        sqlite_repositories(pool)
    };

    AppState::assemble(config.clone(), repos, notifier)
}

pub fn sqlite_repositories(pool: SqlitePool) -> Repositories {
    Repositories {
        accounts: Arc::new(SqliteAccountRepo::new(pool.clone())),
        slots: Arc::new(SqliteSlotRepo::new(pool.clone())),
        bookings: Arc::new(SqliteBookingRepo::new(pool.clone())),
        linking: Arc::new(SqliteLinkingRepo::new(pool.clone())),
        jobs: Arc::new(SqliteJobRepo::new(pool)),
    }
}

pub fn postgres_repositories(pool: PgPool) -> Repositories {
    Repositories {
        accounts: Arc::new(PostgresAccountRepo::new(pool.clone())),
        slots: Arc::new(PostgresSlotRepo::new(pool.clone())),
        bookings: Arc::new(PostgresBookingRepo::new(pool.clone())),
        linking: Arc::new(PostgresLinkingRepo::new(pool.clone())),
        jobs: Arc::new(PostgresJobRepo::new(pool)),
    }
}

pub async fn run_postgres_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .expect("Failed to run Postgres migrations");
}

pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}
