//! HTTP surface.

pub mod coupons;
pub mod error;
pub mod extract;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::orders::OrderServices;
use crate::payment::PaymentGateway;

pub use error::{ApiError, ApiResponse};

#[derive(Clone)]
pub struct AppState {
    pub services: OrderServices,
    pub gateway: Arc<dyn PaymentGateway>,
}

pub fn router(state: AppState, expose_error_detail: bool) -> Router {
    error::expose_error_detail(expose_error_detail);
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", put(orders::update_status))
        .route("/api/v1/orders/:id/payment-status", put(orders::update_payment_status))
        .route("/api/v1/orders/:id/cancel-request", post(orders::request_cancel))
        .route("/api/v1/orders/:id/cancel-request/review", put(orders::review_cancel))
        .route("/api/v1/cancel-requests", get(orders::list_cancel_requests))
        .route("/api/v1/coupons/validate", post(coupons::validate_coupon))
        .route("/api/v1/payments/callback", post(payments::payment_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(s): State<AppState>) -> impl IntoResponse {
    match s.services.store().ping().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "healthy", "service": "opensase-orders"}))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"status": "unhealthy", "service": "opensase-orders"})))
        }
    }
}
