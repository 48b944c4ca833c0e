use axum::{
    body::Body,
    extract::Request,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use crate::state::AppState;
use crate::api::handlers::{account, activity, booking, health, linking, validation};
use tower_http::{
    trace::TraceLayer,
    classify::ServerErrorsFailureClass,
};
use tower_cookies::CookieManagerLayer;
use tracing::{info_span, Span, error, info};
use uuid::Uuid;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))

        // Accounts & catalogue (admin)
        .route("/api/v1/accounts", post(account::create_account))
        .route("/api/v1/activities", post(activity::create_activity))
        .route("/api/v1/activities/{activity_id}/slots", post(activity::create_slot).get(activity::list_slots))
        .route("/api/v1/slots/{slot_id}", get(activity::get_slot))
        .route("/api/v1/slots/{slot_id}/bookings", get(booking::list_slot_bookings))

        // Bookings
        .route("/api/v1/bookings", post(booking::create_booking).get(booking::list_bookings))
        .route("/api/v1/bookings/{booking_id}", get(booking::get_booking))
        .route("/api/v1/bookings/{booking_id}/confirm", post(booking::confirm_booking))
        .route("/api/v1/bookings/{booking_id}/cancel", post(booking::cancel_booking))

        // Guardian linking & validation
        .route("/api/v1/linking-requests", post(linking::create_request).get(linking::list_requests))
        .route("/api/v1/linking-requests/redeem", post(linking::redeem_code))
        .route("/api/v1/linking-requests/{request_id}", get(linking::get_request))
        .route("/api/v1/linking-requests/{request_id}/decision", post(validation::decide))
        .route("/api/v1/linking-requests/{request_id}/override", post(validation::override_decision))
        .route("/api/v1/linking-requests/{request_id}/overrides", get(validation::list_overrides))

        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = Uuid::new_v4().to_string();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        version = ?request.version(),
                        account_id = tracing::field::Empty,
                    )
                })
                .on_request(|request: &Request<Body>, _span: &Span| {
                    info!("started processing request: {} {}", request.method(), request.uri().path());
                })
                .on_response(|response: &axum::http::Response<Body>, latency: Duration, _span: &Span| {
                    info!(
                        status = response.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "finished processing request"
                    );
                })
                .on_failure(|error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                    error!("request failed: {:?}", error);
                })
        )
        .layer(CookieManagerLayer::new())
        .with_state(state)
}
