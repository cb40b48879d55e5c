#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opensase_orders::config::{EngineConfig, ShippingPolicy};
use opensase_orders::domain::aggregates::{Coupon, Gender, NewAddress, Product, ProductVariant, SizeEntry};
use opensase_orders::domain::value_objects::{Actor, CouponCode, Money, Sku};
use opensase_orders::notify::RecordingNotifier;
use opensase_orders::orders::{AddressInput, CartLine, CreateOrder};
use opensase_orders::store::retry::RetryPolicy;
use opensase_orders::store::{MemoryStore, SizeKey};
use opensase_orders::OrderServices;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct Fixture {
    pub store: MemoryStore,
    pub services: OrderServices,
    pub notifier: Arc<RecordingNotifier>,
    pub customer: Actor,
    pub admin: Actor,
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        shipping: ShippingPolicy { flat_fee: Money::from_major(30_000), free_threshold: Some(Money::from_major(500_000)) },
        total_tolerance: Money::new(Decimal::new(1, 2)),
        retry: RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) },
    }
}

impl Fixture {
    pub fn new() -> Self { Self::with_notifier(RecordingNotifier::new()) }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let store = MemoryStore::new();
        let notifier = Arc::new(notifier);
        let services = OrderServices::new(Arc::new(store.clone()), notifier.clone(), engine_config());
        Self {
            store, services, notifier,
            customer: Actor::customer(Uuid::now_v7()),
            admin: Actor::admin(Uuid::now_v7()),
        }
    }

    pub fn customer_id(&self) -> Uuid { self.customer.id.unwrap() }

    /// One active product with one variant holding a single size.
    pub async fn seed_size(&self, name: &str, quantity: u32, price: i64) -> SizeKey {
        let mut product = Product::create(name);
        product.publish().unwrap();
        let sku = format!("{}-M", name.replace(' ', "").to_uppercase());
        let variant = ProductVariant::new(product.id, "Black", Gender::Unisex)
            .with_size(SizeEntry::new("M", Sku::new(sku).unwrap(), quantity, Money::from_major(price), Money::from_major(price / 2)));
        let key = SizeKey { product_id: product.id, variant_id: variant.id(), size_id: variant.sizes[0].size_id };
        self.store.insert_product(product).await;
        self.store.insert_variant(variant).await;
        key
    }

    pub async fn quantity(&self, key: &SizeKey) -> u32 {
        self.store.variant(key.variant_id).await.unwrap().size(key.size_id).unwrap().quantity()
    }

    pub async fn is_available(&self, key: &SizeKey) -> bool {
        self.store.variant(key.variant_id).await.unwrap().size(key.size_id).unwrap().is_available()
    }

    /// WELCOME10: 10% off, capped at 50,000, minimum order 300,000.
    pub async fn seed_welcome10(&self) -> Uuid {
        let coupon = Coupon::percentage(CouponCode::new("WELCOME10").unwrap(), Decimal::TEN, Utc::now() + chrono::Duration::days(30))
            .with_max_discount(Money::from_major(50_000))
            .with_min_order(Money::from_major(300_000));
        let id = coupon.id;
        self.store.insert_coupon(coupon).await;
        id
    }
}

pub fn inline_address() -> AddressInput {
    AddressInput::Inline {
        address: NewAddress {
            full_name: "Nguyen Van A".into(), phone: "0912345678".into(), street: "1 Le Loi".into(),
            ward: "Ben Nghe".into(), district: "District 1".into(), city: "Ho Chi Minh City".into(),
        },
        save_address: false,
    }
}

pub fn line(key: &SizeKey, quantity: i64) -> CartLine {
    CartLine { product_id: key.product_id, variant_id: key.variant_id, size_id: key.size_id, quantity }
}

pub fn order_of(lines: Vec<CartLine>) -> CreateOrder {
    CreateOrder {
        items: lines, address: inline_address(), payment_method: Default::default(),
        coupon_code: None, note: None, expected_total: None,
    }
}
