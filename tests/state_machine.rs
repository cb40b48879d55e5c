mod common;

use common::{line, order_of, Fixture};
use opensase_orders::domain::aggregates::{Order, OrderStatus, PaymentMethod, PaymentStatus, TrackingInfo};
use opensase_orders::domain::value_objects::{Actor, Money};
use opensase_orders::orders::{PaymentUpdate, StatusUpdate};
use opensase_orders::payment::JsonCallbackGateway;
use opensase_orders::store::SizeKey;
use opensase_orders::{EcommerceError, ErrorKind};

fn to(status: OrderStatus) -> StatusUpdate {
    StatusUpdate { status, note: None, tracking: None }
}

fn cancel(reason: &str) -> StatusUpdate {
    StatusUpdate { status: OrderStatus::Cancelled, note: Some(reason.into()), tracking: None }
}

async fn placed(fx: &Fixture, key: &SizeKey, quantity: i64) -> Order {
    fx.services.create_order(fx.customer, order_of(vec![line(key, quantity)])).await.unwrap()
}

#[tokio::test]
async fn test_full_lifecycle_to_delivered() {
    let fx = Fixture::new();
    let key = fx.seed_size("Oxford Shirt", 5, 250_000).await;
    let order = placed(&fx, &key, 2).await;
    assert_eq!(order.payment_method, PaymentMethod::CashOnDelivery);

    fx.services.update_status(fx.admin, order.id, to(OrderStatus::Confirmed)).await.unwrap();
    let shipping = StatusUpdate {
        status: OrderStatus::Shipping, note: Some("handed to carrier".into()),
        tracking: Some(TrackingInfo { carrier: Some("GHN".into()), tracking_number: Some("GHN123".into()), tracking_url: None }),
    };
    let order = fx.services.update_status(fx.admin, order.id, shipping).await.unwrap();
    let tracking = order.tracking.clone().unwrap();
    assert_eq!(tracking.carrier.as_deref(), Some("GHN"));
    assert_eq!(tracking.tracking_number.as_deref(), Some("GHN123"));

    let order = fx.services.update_status(fx.admin, order.id, to(OrderStatus::Delivered)).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Delivered);
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.status_history().len(), 4);
    assert_eq!(order.status_history()[2].note.as_deref(), Some("handed to carrier"));
    assert_eq!(fx.store.product(key.product_id).await.unwrap().total_sold(), 2);
    assert_eq!(fx.quantity(&key).await, 3);
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected() {
    let fx = Fixture::new();
    let key = fx.seed_size("Cargo Pants", 5, 300_000).await;
    let order = placed(&fx, &key, 1).await;

    let err = fx.services.update_status(fx.admin, order.id, to(OrderStatus::Delivered)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let unchanged = fx.services.update_status(fx.admin, order.id, to(OrderStatus::Pending)).await.unwrap();
    assert_eq!(unchanged.status_history().len(), 1);

    fx.services.update_status(fx.admin, order.id, cancel("customer changed mind")).await.unwrap();
    let err = fx.services.update_status(fx.admin, order.id, to(OrderStatus::Confirmed)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = fx.services.update_status(fx.admin, uuid::Uuid::now_v7(), to(OrderStatus::Confirmed)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_only_admins_change_status() {
    let fx = Fixture::new();
    let key = fx.seed_size("Loafers", 5, 700_000).await;
    let order = placed(&fx, &key, 1).await;

    let err = fx.services.update_status(fx.customer, order.id, to(OrderStatus::Confirmed)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let update = PaymentUpdate { payment_status: PaymentStatus::Paid, note: None, force: false };
    let err = fx.services.update_payment_status(fx.customer, order.id, update).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_cancel_restocks_and_releases_coupon() {
    let fx = Fixture::new();
    let coupon_id = fx.seed_welcome10().await;
    let key = fx.seed_size("Cashmere Sweater", 3, 600_000).await;

    let mut request = order_of(vec![line(&key, 3)]);
    request.coupon_code = Some("WELCOME10".into());
    let order = fx.services.create_order(fx.customer, request).await.unwrap();
    assert!(!fx.is_available(&key).await);
    assert_eq!(fx.store.coupon(coupon_id).await.unwrap().used_count(), 1);

    let err = fx.services.update_status(fx.admin, order.id, cancel("  ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fx.quantity(&key).await, 0);

    fx.services.update_status(fx.admin, order.id, to(OrderStatus::Confirmed)).await.unwrap();
    let order = fx.services.update_status(fx.admin, order.id, cancel("out of packaging")).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(order.cancel_reason.as_deref(), Some("out of packaging"));
    assert_eq!(fx.quantity(&key).await, 3);
    assert!(fx.is_available(&key).await);

    let coupon = fx.store.coupon(coupon_id).await.unwrap();
    assert_eq!(coupon.used_count(), 0);
    assert!(!coupon.used_by().contains(&fx.customer_id()));

    let mut again = order_of(vec![line(&key, 1)]);
    again.coupon_code = Some("WELCOME10".into());
    let reordered = fx.services.create_order(fx.customer, again).await.unwrap();
    assert_eq!(reordered.discount_amount(), Money::from_major(50_000));
}

#[tokio::test]
async fn test_payment_confirms_pending_order() {
    let fx = Fixture::new();
    let key = fx.seed_size("Suede Boots", 2, 1_200_000).await;
    let order = placed(&fx, &key, 1).await;

    let update = PaymentUpdate { payment_status: PaymentStatus::Paid, note: None, force: false };
    let order = fx.services.update_payment_status(fx.admin, order.id, update).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert_eq!(order.status_history().last().unwrap().actor, Actor::system());
}

#[tokio::test]
async fn test_paid_cannot_go_back_without_override() {
    let fx = Fixture::new();
    let key = fx.seed_size("Wool Scarf", 2, 180_000).await;
    let order = placed(&fx, &key, 1).await;
    fx.services.record_payment(fx.admin, order.id, PaymentStatus::Paid).await.unwrap();

    let back = PaymentUpdate { payment_status: PaymentStatus::Pending, note: None, force: false };
    let err = fx.services.update_payment_status(fx.admin, order.id, back).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidPaymentTransition { from: PaymentStatus::Paid, to: PaymentStatus::Pending }));

    let forced = PaymentUpdate { payment_status: PaymentStatus::Pending, note: None, force: true };
    let err = fx.services.update_payment_status(fx.admin, order.id, forced).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = fx.services
        .override_payment_status(fx.customer, order.id, PaymentStatus::Pending, "bounced".into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let forced = PaymentUpdate { payment_status: PaymentStatus::Pending, note: Some("transfer bounced".into()), force: true };
    let order = fx.services.update_payment_status(fx.admin, order.id, forced).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Pending);
    assert!(order.paid_at.is_none());
    let note = order.status_history().last().unwrap().note.clone().unwrap();
    assert!(note.contains("transfer bounced"));
}

#[tokio::test]
async fn test_payment_callback_records_verdict() {
    let fx = Fixture::new();
    let key = fx.seed_size("Tweed Cap", 4, 150_000).await;
    let paid = placed(&fx, &key, 1).await;
    let failed = placed(&fx, &key, 1).await;

    let body = format!(r#"{{"order_ref":"{}","success":true,"transaction_id":"TX-9"}}"#, paid.id);
    let order = fx.services.handle_payment_callback(&JsonCallbackGateway, body.as_bytes()).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
    assert_eq!(order.status(), OrderStatus::Confirmed);

    let body = format!(r#"{{"order_ref":"{}","success":false}}"#, failed.id);
    let order = fx.services.handle_payment_callback(&JsonCallbackGateway, body.as_bytes()).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Failed);
    assert_eq!(order.status(), OrderStatus::Pending);

    let err = fx.services.handle_payment_callback(&JsonCallbackGateway, b"{}").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_late_payment_on_cancelled_order_keeps_it_cancelled() {
    let fx = Fixture::new();
    let key = fx.seed_size("Rain Boots", 2, 400_000).await;
    let order = placed(&fx, &key, 1).await;
    fx.services.update_status(fx.admin, order.id, cancel("duplicate order")).await.unwrap();

    let order = fx.services.record_payment(Actor::system(), order.id, PaymentStatus::Paid).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
    assert_eq!(fx.quantity(&key).await, 2);
}

async fn order_in(fx: &Fixture, key: &SizeKey, status: OrderStatus) -> Order {
    let order = placed(fx, key, 1).await;
    let path: &[OrderStatus] = match status {
        OrderStatus::Pending => &[],
        OrderStatus::Confirmed => &[OrderStatus::Confirmed],
        OrderStatus::Shipping => &[OrderStatus::Confirmed, OrderStatus::Shipping],
        OrderStatus::Delivered => &[OrderStatus::Confirmed, OrderStatus::Shipping, OrderStatus::Delivered],
        OrderStatus::Cancelled => &[OrderStatus::Cancelled],
    };
    let mut order = order;
    for &next in path {
        let note = (next == OrderStatus::Cancelled).then(|| "setup".to_string());
        order = fx.services.update_status(fx.admin, order.id, StatusUpdate { status: next, note, tracking: None }).await.unwrap();
    }
    order
}

#[tokio::test]
async fn test_every_transition_outside_the_table_is_rejected() {
    let fx = Fixture::new();
    let key = fx.seed_size("Pleated Skirt", 50, 200_000).await;

    for from in OrderStatus::ALL {
        for to in OrderStatus::ALL {
            if from == to || from.can_transition_to(to) { continue; }
            let order = order_in(&fx, &key, from).await;
            let update = StatusUpdate { status: to, note: Some("attempt".into()), tracking: None };
            let err = fx.services.update_status(fx.admin, order.id, update).await.unwrap_err();
            assert!(
                matches!(err, EcommerceError::InvalidTransition { from: f, to: t } if f == from && t == to),
                "{from} -> {to} gave {err:?}"
            );
            let stored = fx.services.get_order(fx.admin, order.id).await.unwrap();
            assert_eq!(stored.status(), from, "{from} -> {to} changed the stored status");
            assert_eq!(stored.status_history().len(), order.status_history().len());
        }
    }
}

#[tokio::test]
async fn test_cancel_on_archived_product_keeps_size_available() {
    let fx = Fixture::new();
    let key = fx.seed_size("Archived Parka", 2, 700_000).await;
    let order = placed(&fx, &key, 2).await;
    assert!(!fx.is_available(&key).await);

    let mut product = fx.store.product(key.product_id).await.unwrap();
    product.archive();
    fx.store.insert_product(product).await;

    fx.services.update_status(fx.admin, order.id, cancel("warehouse error")).await.unwrap();
    assert_eq!(fx.quantity(&key).await, 2);
    assert!(fx.is_available(&key).await);
}
