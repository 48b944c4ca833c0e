mod common;

use chrono::{Duration, Utc};
use common::{parse_body, TestApp};
use serde_json::{json, Value};

/// Minor asks for a slot; returns `(request_id, linking_code)`.
async fn open_request(app: &TestApp, minor_id: &str, activity_id: &str, slot_id: Option<&str>) -> (String, String) {
    let res = app.post("/api/v1/linking-requests", &app.login_as(minor_id, "MINOR"), json!({
        "activity_id": activity_id,
        "slot_id": slot_id,
    })).await;
    assert_eq!(res.status(), 201);
    let body = parse_body(res).await;
    assert_eq!(body["status"], "waiting_parent_link");
    (
        body["request_id"].as_str().unwrap().to_string(),
        body["linking_code"].as_str().unwrap().to_string(),
    )
}

async fn redeem(app: &TestApp, guardian_id: &str, code: &str) -> axum::response::Response {
    app.post("/api/v1/linking-requests/redeem", &app.login_as(guardian_id, "GUARDIAN"), json!({
        "linking_code": code
    })).await
}

async fn decide(app: &TestApp, guardian_id: &str, request_id: &str, body: Value) -> axum::response::Response {
    app.post(
        &format!("/api/v1/linking-requests/{}/decision", request_id),
        &app.login_as(guardian_id, "GUARDIAN"),
        body,
    ).await
}

#[tokio::test]
async fn test_full_approval_flow_books_the_slot() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;
    assert_eq!(code.len(), 8);

    // Codes are accepted in any case.
    let res = redeem(&app, &guardian_id, &code.to_lowercase()).await;
    assert_eq!(res.status(), 200);
    let body = parse_body(res).await;
    assert_eq!(body["request_id"], request_id.as_str());
    assert_eq!(body["status"], "parent_linked");

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve" })).await;
    assert_eq!(res.status(), 200);
    let body = parse_body(res).await;
    assert_eq!(body["status"], "validated");
    let booking_id = body["booking_id"].as_str().unwrap().to_string();

    let guardian = app.login_as(&guardian_id, "GUARDIAN");
    let res = app.get(&format!("/api/v1/bookings/{}", booking_id), &guardian).await;
    let booking = parse_body(res).await;
    assert_eq!(booking["status"], "confirmed");
    assert_eq!(booking["child_id"], minor_id.as_str());
    assert_eq!(booking["linking_request_id"], request_id.as_str());
    assert_eq!(app.seats_remaining(&slot_id).await, 1);

    let res = app.get(&format!("/api/v1/linking-requests/{}", request_id), &app.login_as(&minor_id, "MINOR")).await;
    let request = parse_body(res).await;
    assert_eq!(request["booking_id"], booking_id.as_str());
    assert_eq!(request["guardian_id"], guardian_id.as_str());

    // The family relationship is now on record.
    let res = app.post("/api/v1/bookings", &guardian, json!({
        "activity_id": activity_id, "slot_id": slot_id, "child_id": minor_id, "idempotency_key": "direct"
    })).await;
    assert_eq!(res.status(), 201);
}

#[tokio::test]
async fn test_second_decision_is_rejected() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;
    redeem(&app, &guardian_id, &code).await;

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve" })).await;
    assert_eq!(res.status(), 200);

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "reject", "reason": "changed my mind" })).await;
    assert_eq!(res.status(), 409);
    assert_eq!(parse_body(res).await["code"], "INVALID_STATE_TRANSITION");

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve" })).await;
    assert_eq!(res.status(), 409);
    assert_eq!(app.seats_remaining(&slot_id).await, 1, "only one booking per approval");
}

#[tokio::test]
async fn test_rejection_records_reason_and_books_nothing() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;
    redeem(&app, &guardian_id, &code).await;

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "reject", "reason": "school night" })).await;
    assert_eq!(res.status(), 200);
    let body = parse_body(res).await;
    assert_eq!(body["status"], "rejected");
    assert!(body["booking_id"].is_null());

    let res = app.get(&format!("/api/v1/linking-requests/{}", request_id), &app.login_as(&minor_id, "MINOR")).await;
    assert_eq!(parse_body(res).await["rejection_reason"], "school night");
    assert_eq!(app.seats_remaining(&slot_id).await, 2);
}

#[tokio::test]
async fn test_decision_requires_linked_guardian_and_slot() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let other_guardian = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, None).await;

    // Nobody has redeemed the code yet.
    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve", "slot_id": slot_id })).await;
    assert_eq!(res.status(), 403);

    redeem(&app, &guardian_id, &code).await;

    let res = decide(&app, &other_guardian, &request_id, json!({ "action": "approve", "slot_id": slot_id })).await;
    assert_eq!(res.status(), 403);

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve" })).await;
    assert_eq!(res.status(), 400);

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve", "slot_id": slot_id })).await;
    assert_eq!(res.status(), 200);
    assert!(parse_body(res).await["booking_id"].is_string());
}

#[tokio::test]
async fn test_second_guardian_gets_already_linked() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let first_guardian = app.create_account("guardian", None).await;
    let second_guardian = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (_, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;

    let res = redeem(&app, &first_guardian, &code).await;
    assert_eq!(res.status(), 200);

    let res = redeem(&app, &second_guardian, &code).await;
    assert_eq!(res.status(), 409);
    assert_eq!(parse_body(res).await["code"], "ALREADY_LINKED");

    let res = redeem(&app, &first_guardian, &code).await;
    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn test_unknown_code_is_invalid() {
    let app = TestApp::new().await;
    let guardian_id = app.create_account("guardian", None).await;

    let res = redeem(&app, &guardian_id, "ZZZZ9999").await;
    assert_eq!(res.status(), 404);
    assert_eq!(parse_body(res).await["code"], "INVALID_CODE");
}

#[tokio::test]
async fn test_expired_code_tells_minor_to_ask_again() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;

    sqlx::query("UPDATE linking_requests SET expires_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(1))
        .bind(&request_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let res = redeem(&app, &guardian_id, &code).await;
    assert_eq!(res.status(), 410);
    let body = parse_body(res).await;
    assert_eq!(body["code"], "EXPIRED_CODE");
    assert!(body["error"].as_str().unwrap().contains("ask for a new code"));

    let res = app.get(&format!("/api/v1/linking-requests/{}", request_id), &app.login_as(&minor_id, "MINOR")).await;
    assert_eq!(parse_body(res).await["status"], "expired");

    // A fresh request gets a fresh code.
    let (_, new_code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;
    let res = redeem(&app, &guardian_id, &new_code).await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_minor_with_guardian_cannot_open_request() {
    let app = TestApp::new().await;
    let guardian_id = app.create_account("guardian", None).await;
    let minor_id = app.create_account("minor", Some(&guardian_id)).await;
    let (activity_id, _) = app.create_activity_with_slot(2).await;

    let res = app.post("/api/v1/linking-requests", &app.login_as(&minor_id, "MINOR"), json!({
        "activity_id": activity_id
    })).await;
    assert_eq!(res.status(), 409);
    assert_eq!(parse_body(res).await["code"], "ALREADY_LINKED");
}

#[tokio::test]
async fn test_guardian_cannot_open_request_and_minor_cannot_redeem() {
    let app = TestApp::new().await;
    let guardian_id = app.create_account("guardian", None).await;
    let minor_id = app.create_account("minor", None).await;
    let other_minor = app.create_account("minor", None).await;
    let (activity_id, _) = app.create_activity_with_slot(2).await;

    let res = app.post("/api/v1/linking-requests", &app.login_as(&guardian_id, "GUARDIAN"), json!({
        "activity_id": activity_id
    })).await;
    assert_eq!(res.status(), 403);

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, None).await;
    let res = app.post("/api/v1/linking-requests/redeem", &app.login_as(&other_minor, "MINOR"), json!({
        "linking_code": code
    })).await;
    assert_eq!(res.status(), 403);

    let res = app.get(&format!("/api/v1/linking-requests/{}", request_id), &app.login_as(&other_minor, "MINOR")).await;
    assert_eq!(res.status(), 403);
}

#[tokio::test]
async fn test_list_requests_for_both_sides() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(2).await;

    let (_, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;
    open_request(&app, &minor_id, &activity_id, None).await;
    redeem(&app, &guardian_id, &code).await;

    let res = app.get("/api/v1/linking-requests", &app.login_as(&minor_id, "MINOR")).await;
    assert_eq!(parse_body(res).await.as_array().unwrap().len(), 2);

    let res = app.get("/api/v1/linking-requests", &app.login_as(&guardian_id, "GUARDIAN")).await;
    assert_eq!(parse_body(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_approval_on_full_slot_waitlists() {
    let app = TestApp::new().await;
    let minor_id = app.create_account("minor", None).await;
    let guardian_id = app.create_account("guardian", None).await;
    let (activity_id, slot_id) = app.create_activity_with_slot(1).await;
    app.state.slot_store.reserve(&slot_id, 1).await.unwrap();

    let (request_id, code) = open_request(&app, &minor_id, &activity_id, Some(&slot_id)).await;
    redeem(&app, &guardian_id, &code).await;

    let res = decide(&app, &guardian_id, &request_id, json!({ "action": "approve" })).await;
    assert_eq!(res.status(), 200);
    let booking_id = parse_body(res).await["booking_id"].as_str().unwrap().to_string();

    let res = app.get(&format!("/api/v1/bookings/{}", booking_id), &app.login_as(&guardian_id, "GUARDIAN")).await;
    assert_eq!(parse_body(res).await["status"], "waiting_list");
}
