mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::Fixture;
use opensase_orders::api::{self, AppState};
use opensase_orders::domain::value_objects::{Actor, Money};
use opensase_orders::payment::JsonCallbackGateway;
use opensase_orders::store::SizeKey;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(fx: &Fixture) -> Router {
    let state = AppState { services: fx.services.clone(), gateway: Arc::new(JsonCallbackGateway) };
    api::router(state, true)
}

fn request(method: Method, uri: &str, actor: Option<Actor>, body: Option<String>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder
            .header("x-user-id", actor.id.unwrap().to_string())
            .header("x-user-role", if actor.is_admin() { "admin" } else { "customer" });
    }
    match body {
        Some(body) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(body)).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn order_body(key: &SizeKey, quantity: i64) -> String {
    json!({
        "items": [{"product_id": key.product_id, "variant_id": key.variant_id, "size_id": key.size_id, "quantity": quantity}],
        "address": {
            "type": "inline",
            "address": {
                "full_name": "Tran Thi B", "phone": "0987654321", "street": "12 Nguyen Hue",
                "ward": "Ben Nghe", "district": "District 1", "city": "Ho Chi Minh City"
            }
        },
        "payment_method": "cash_on_delivery"
    }).to_string()
}

#[tokio::test]
async fn test_health() {
    let fx = Fixture::new();
    let (status, body) = send(app(&fx), request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_create_and_fetch_order() {
    let fx = Fixture::new();
    let key = fx.seed_size("Field Jacket", 3, 650_000).await;

    let (status, body) = send(app(&fx), request(Method::POST, "/api/v1/orders", Some(fx.customer), Some(order_body(&key, 1)))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    let total: Money = serde_json::from_value(body["data"]["total_amount"].clone()).unwrap();
    assert_eq!(total, Money::from_major(650_000));
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/v1/orders/{id}");
    let (status, body) = send(app(&fx), request(Method::GET, &uri, Some(fx.customer), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let stranger = Actor::customer(Uuid::now_v7());
    let (status, body) = send(app(&fx), request(Method::GET, &uri, Some(stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "authorization");

    let (status, body) = send(app(&fx), request(Method::GET, "/api/v1/orders?per_page=5", Some(fx.admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["per_page"], 5);
}

#[tokio::test]
async fn test_missing_identity_is_forbidden() {
    let fx = Fixture::new();
    let key = fx.seed_size("Utility Vest", 3, 350_000).await;
    let (status, body) = send(app(&fx), request(Method::POST, "/api/v1/orders", None, Some(order_body(&key, 1)))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "authorization");
    assert_eq!(fx.quantity(&key).await, 3);
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let fx = Fixture::new();
    let (status, body) = send(
        app(&fx), request(Method::POST, "/api/v1/orders", Some(fx.customer), Some("{\"items\": 3}".into())),
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, _) = send(app(&fx), request(Method::GET, "/api/v1/orders/not-a-uuid", Some(fx.customer), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_insufficient_stock_is_a_conflict() {
    let fx = Fixture::new();
    let key = fx.seed_size("Pea Coat", 1, 1_500_000).await;
    let (status, body) = send(app(&fx), request(Method::POST, "/api/v1/orders", Some(fx.customer), Some(order_body(&key, 2)))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
    assert!(body["message"].as_str().unwrap().contains("Pea Coat"));
}

#[tokio::test]
async fn test_coupon_preview() {
    let fx = Fixture::new();
    fx.seed_welcome10().await;

    let valid = json!({"code": "welcome10", "order_value": "500000"}).to_string();
    let (status, body) = send(app(&fx), request(Method::POST, "/api/v1/coupons/validate", Some(fx.customer), Some(valid))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["code"], "WELCOME10");
    let discount: Money = serde_json::from_value(body["data"]["discount_amount"].clone()).unwrap();
    assert_eq!(discount, Money::from_major(50_000));

    let small = json!({"code": "WELCOME10", "order_value": "100000"}).to_string();
    let (status, body) = send(app(&fx), request(Method::POST, "/api/v1/coupons/validate", Some(fx.customer), Some(small))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["reason"], "below_minimum");
}

#[tokio::test]
async fn test_admin_status_update_and_callback() {
    let fx = Fixture::new();
    let key = fx.seed_size("Duffel Bag", 2, 480_000).await;
    let (_, body) = send(app(&fx), request(Method::POST, "/api/v1/orders", Some(fx.customer), Some(order_body(&key, 1)))).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let confirm = json!({"status": "confirmed"}).to_string();
    let uri = format!("/api/v1/orders/{id}/status");
    let (status, _) = send(app(&fx), request(Method::PUT, &uri, Some(fx.customer), Some(confirm.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(app(&fx), request(Method::PUT, &uri, Some(fx.admin), Some(confirm))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");

    let callback = json!({"order_ref": id, "success": true, "transaction_id": "TX-42"}).to_string();
    let (status, body) = send(app(&fx), request(Method::POST, "/api/v1/payments/callback", None, Some(callback))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment_status"], "paid");
}
