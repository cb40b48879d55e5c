use axum::body::Bytes;
use axum::extract::State;

use super::error::{ApiError, ApiResponse};
use super::AppState;
use crate::domain::aggregates::Order;

pub async fn payment_callback(State(s): State<AppState>, body: Bytes) -> Result<ApiResponse<Order>, ApiError> {
    let order = s.services.handle_payment_callback(s.gateway.as_ref(), &body).await?;
    Ok(ApiResponse::with_message(order, "Payment recorded"))
}
