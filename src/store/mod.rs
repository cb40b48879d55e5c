//! Persistence boundary.
//!
//! Every write the order engine performs happens inside a [`StoreTx`]. A
//! transaction that is dropped without [`StoreTx::commit`] leaves no trace.
//! Rows read through `lock_*` stay locked against concurrent writers until
//! the transaction ends, and the `write_*` methods are compare-and-set so a
//! lost update surfaces as [`StoreError::SerializationFailure`] instead of
//! silently succeeding.

pub mod memory;
pub mod postgres;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{
    CancelRequest, CancelRequestStatus, Coupon, Order, OrderStatus, Product, SavedAddress, SizeEntry,
    VariantHeader,
};
use crate::domain::value_objects::CouponCode;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Soft-deleted products and variants are hidden unless asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility { ActiveOnly, IncludeDeleted }

impl Visibility {
    pub fn admits(&self, is_deleted: bool) -> bool { matches!(self, Self::IncludeDeleted) || !is_deleted }
}

/// (product, variant, size) reference as submitted in a cart line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeKey {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub size_id: Uuid,
}

/// One size row together with its owning variant and product.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub product: Product,
    pub variant: VariantHeader,
    pub size: SizeEntry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CouponUsageChange { Recorded(Uuid), Released(Uuid) }

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub limit: u32,
    pub offset: u32,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<(Vec<Order>, u64)>;
    async fn find_coupon(&self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
    async fn list_cancel_requests(&self, status: Option<CancelRequestStatus>) -> StoreResult<Vec<CancelRequest>>;
    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait StoreTx: Send {
    // catalog / inventory
    async fn lock_catalog_entry(&mut self, key: &SizeKey, visibility: Visibility) -> StoreResult<Option<CatalogEntry>>;
    /// Writes quantity and derived fields if the stored quantity still equals `expected_quantity`.
    async fn write_size_entry(&mut self, variant_id: Uuid, entry: &SizeEntry, expected_quantity: u32) -> StoreResult<bool>;
    async fn lock_product(&mut self, product_id: Uuid, visibility: Visibility) -> StoreResult<Option<Product>>;
    async fn write_product_sold(&mut self, product: &Product) -> StoreResult<()>;

    // coupons
    async fn lock_coupon(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
    async fn lock_coupon_by_id(&mut self, coupon_id: Uuid) -> StoreResult<Option<Coupon>>;
    /// Applies the usage change if the stored count still equals `expected_used_count`.
    async fn write_coupon_usage(&mut self, coupon: &Coupon, expected_used_count: u32, change: CouponUsageChange) -> StoreResult<bool>;

    // address book
    async fn find_address(&mut self, user_id: Uuid, address_id: Uuid) -> StoreResult<Option<SavedAddress>>;
    async fn count_addresses(&mut self, user_id: Uuid) -> StoreResult<u64>;
    async fn insert_address(&mut self, address: &SavedAddress) -> StoreResult<()>;

    // orders
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
    async fn lock_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>>;
    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;

    // cancel requests
    async fn lock_pending_cancel_request(&mut self, order_id: Uuid) -> StoreResult<Option<CancelRequest>>;
    async fn insert_cancel_request(&mut self, request: &CancelRequest) -> StoreResult<()>;
    async fn update_cancel_request(&mut self, request: &CancelRequest) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
