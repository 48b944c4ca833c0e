mod common;

use activity_booking_backend::background::run_once;
use chrono::{Duration, Utc};
use common::{parse_body, TestApp};
use serde_json::json;

async fn linked_request(app: &TestApp, slot: Option<(&str, &str)>) -> (String, String, String) {
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = match slot {
        Some((activity_id, slot_id)) => (activity_id.to_string(), slot_id.to_string()),
        None => app.create_activity_with_slot(2).await,
    };

    let res = app.post("/api/v1/linking-requests", &app.login_as(&minor_id, "MINOR"), json!({
        "activity_id": activity_id, "slot_id": slot_id
    })).await;
    let body = parse_body(res).await;
    let request_id = body["request_id"].as_str().unwrap().to_string();
    let code = body["linking_code"].as_str().unwrap().to_string();

    app.post("/api/v1/linking-requests/redeem", &app.login_as(&guardian_id, "GUARDIAN"), json!({
        "linking_code": code
    })).await;

    (request_id, minor_id, guardian_id)
}

#[tokio::test]
async fn test_worker_dispatches_outbox_to_recipients() {
    let app = TestApp::new().await;
    let (request_id, _, guardian_id) = linked_request(&app, None).await;
    let res = app.post(
        &format!("/api/v1/linking-requests/{}/decision", request_id),
        &app.login_as(&guardian_id, "GUARDIAN"),
        json!({ "action": "approve" }),
    ).await;
    assert_eq!(res.status(), 200);

    let report = run_once(&app.state).await;
    assert_eq!(report.failed, 0);
    assert_eq!(report.dispatched, 3);

    let events = app.notifier.events();
    assert!(events.contains(&"REQUEST_LINKED".to_string()));
    assert!(events.contains(&"REQUEST_VALIDATED".to_string()));
    assert!(events.contains(&"BOOKING_CONFIRMED".to_string()));
    assert!(app.notifier.sent.lock().unwrap().iter().all(|n| n.recipient == guardian_id));

    // Nothing is sent twice.
    let report = run_once(&app.state).await;
    assert_eq!(report.dispatched, 0);
    assert!(app.pending_job_types().await.is_empty());
}

#[tokio::test]
async fn test_failed_delivery_marks_job_failed() {
    let app = TestApp::new().await;
    linked_request(&app, None).await;
    app.notifier.fail_deliveries(true);

    let report = run_once(&app.state).await;
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.failed, 1);

    let (status, error): (String, Option<String>) = sqlx::query_as("SELECT status, error_message FROM jobs LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(status, "FAILED");
    assert!(error.unwrap().contains("notification service down"));
}

#[tokio::test]
async fn test_sweep_expires_stale_requests() {
    let app = TestApp::new().await;
    let (linked_id, _, _) = linked_request(&app, None).await;
    let minor_id = app.create_account("minor", None).await;
    let (activity_id, _) = app.create_activity_with_slot(1).await;
    let res = app.post("/api/v1/linking-requests", &app.login_as(&minor_id, "MINOR"), json!({
        "activity_id": activity_id
    })).await;
    let open_id = parse_body(res).await["request_id"].as_str().unwrap().to_string();

    sqlx::query("UPDATE linking_requests SET expires_at = ?")
        .bind(Utc::now() - Duration::hours(1))
        .execute(&app.pool)
        .await
        .unwrap();

    let report = run_once(&app.state).await;
    assert_eq!(report.expired_requests, 2);

    for id in [&linked_id, &open_id] {
        let status: String = sqlx::query_scalar("SELECT status FROM linking_requests WHERE id = ?")
            .bind(id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
        assert_eq!(status, "expired");
    }
    assert_eq!(app.notifier.events().iter().filter(|e| *e == "REQUEST_EXPIRED").count(), 2);

    let report = run_once(&app.state).await;
    assert_eq!(report.expired_requests, 0);
}

#[tokio::test]
async fn test_validated_request_without_booking_is_reconciled() {
    let app = TestApp::new().await;
    let (request_id, _, guardian_id) = linked_request(&app, None).await;
    let res = app.post(
        &format!("/api/v1/linking-requests/{}/decision", request_id),
        &app.login_as(&guardian_id, "GUARDIAN"),
        json!({ "action": "approve" }),
    ).await;
    let booking_id = parse_body(res).await["booking_id"].as_str().unwrap().to_string();

    // Simulate a crash between the decision and attaching its booking.
    sqlx::query("UPDATE linking_requests SET booking_id = NULL, validated_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(5))
        .bind(&request_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let report = run_once(&app.state).await;
    assert_eq!(report.reconciled, 1);

    let attached: Option<String> = sqlx::query_scalar("SELECT booking_id FROM linking_requests WHERE id = ?")
        .bind(&request_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(attached.as_deref(), Some(booking_id.as_str()), "reconcile replays the same booking");

    let bookings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE linking_request_id = ?")
        .bind(&request_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(bookings, 1);
}

#[tokio::test]
async fn test_expired_idempotency_records_are_purged() {
    let app = TestApp::new().await;
    let guardian_id = app.create_account("guardian", None).await;
    let child_id = app.create_account("minor", Some(&guardian_id)).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;
    let guardian = app.login_as(&guardian_id, "GUARDIAN");
    let payload = json!({
        "activity_id": activity_id, "slot_id": slot_id, "child_id": child_id, "idempotency_key": "old"
    });

    let res = app.post("/api/v1/bookings", &guardian, payload.clone()).await;
    let booking_id = parse_body(res).await["booking_id"].as_str().unwrap().to_string();

    sqlx::query("UPDATE idempotency_keys SET expires_at = ?")
        .bind(Utc::now() - Duration::minutes(1))
        .execute(&app.pool)
        .await
        .unwrap();

    let report = run_once(&app.state).await;
    assert_eq!(report.purged_keys, 1);

    // The booking still owns the key, so a late retry is answered from it.
    let res = app.post("/api/v1/bookings", &guardian, payload).await;
    assert_eq!(res.status(), 200);
    assert_eq!(parse_body(res).await["booking_id"], booking_id.as_str());
    assert_eq!(app.seats_remaining(&slot_id).await, 1);
}
