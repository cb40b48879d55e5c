use axum::extract::State;
use serde::Deserialize;

use super::error::{ApiError, ApiResponse};
use super::extract::ApiJson;
use super::AppState;
use crate::coupons::CouponCheck;
use crate::domain::value_objects::{Actor, Money};

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_value: Money,
}

/// Checkout preview; a rejected coupon is still a 200 with `valid: false`.
pub async fn validate_coupon(
    State(s): State<AppState>, actor: Actor, ApiJson(r): ApiJson<ValidateCouponRequest>,
) -> Result<ApiResponse<CouponCheck>, ApiError> {
    let check = s.services.preview_coupon(actor, &r.code, r.order_value).await?;
    let message = check.message.clone().unwrap_or_else(|| "Coupon applied".to_string());
    Ok(ApiResponse::with_message(check, message))
}
