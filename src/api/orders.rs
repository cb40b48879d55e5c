use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use super::error::{ApiError, ApiResponse};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::AppState;
use crate::domain::aggregates::{CancelRequest, CancelRequestStatus, Order, OrderStatus};
use crate::domain::value_objects::Actor;
use crate::orders::{CancelRequestInput, CancelReview, CreateOrder, Page, PaymentUpdate, StatusUpdate};

type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CancelListParams {
    pub status: Option<CancelRequestStatus>,
}

pub async fn create_order(State(s): State<AppState>, actor: Actor, ApiJson(r): ApiJson<CreateOrder>) -> ApiResult<Order> {
    let order = s.services.create_order(actor, r).await?;
    Ok(ApiResponse::created(order, "Order placed"))
}

pub async fn list_orders(State(s): State<AppState>, actor: Actor, ApiQuery(p): ApiQuery<ListParams>) -> ApiResult<Page<Order>> {
    let page = s.services.list_orders(actor, p.status, p.page.unwrap_or(1), p.per_page.unwrap_or(20)).await?;
    Ok(ApiResponse::ok(page))
}

pub async fn get_order(State(s): State<AppState>, actor: Actor, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Order> {
    Ok(ApiResponse::ok(s.services.get_order(actor, id).await?))
}

pub async fn update_status(
    State(s): State<AppState>, actor: Actor, ApiPath(id): ApiPath<Uuid>, ApiJson(r): ApiJson<StatusUpdate>,
) -> ApiResult<Order> {
    let order = s.services.update_status(actor, id, r).await?;
    Ok(ApiResponse::with_message(order, "Order status updated"))
}

pub async fn update_payment_status(
    State(s): State<AppState>, actor: Actor, ApiPath(id): ApiPath<Uuid>, ApiJson(r): ApiJson<PaymentUpdate>,
) -> ApiResult<Order> {
    let order = s.services.update_payment_status(actor, id, r).await?;
    Ok(ApiResponse::with_message(order, "Payment status updated"))
}

pub async fn request_cancel(
    State(s): State<AppState>, actor: Actor, ApiPath(id): ApiPath<Uuid>, ApiJson(r): ApiJson<CancelRequestInput>,
) -> ApiResult<CancelRequest> {
    let request = s.services.request_cancel(actor, id, &r.reason).await?;
    Ok(ApiResponse::created(request, "Cancellation request submitted"))
}

pub async fn review_cancel(
    State(s): State<AppState>, actor: Actor, ApiPath(id): ApiPath<Uuid>, ApiJson(r): ApiJson<CancelReview>,
) -> ApiResult<serde_json::Value> {
    let (request, order) = s.services.review_cancel(actor, id, r).await?;
    Ok(ApiResponse::with_message(serde_json::json!({ "request": request, "order": order }), "Cancellation request reviewed"))
}

pub async fn list_cancel_requests(
    State(s): State<AppState>, actor: Actor, ApiQuery(p): ApiQuery<CancelListParams>,
) -> ApiResult<Vec<CancelRequest>> {
    Ok(ApiResponse::ok(s.services.list_cancel_requests(actor, p.status).await?))
}
