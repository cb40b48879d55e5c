//! In-memory store.
//!
//! Transactions are serialized behind one async mutex and work on a private
//! copy of the state; `commit` swaps the copy in, dropping discards it. Used
//! by the test-suite and by the binary when no `DATABASE_URL` is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    CatalogEntry, CouponUsageChange, OrderFilter, SizeKey, Store, StoreError, StoreResult, StoreTx, Visibility,
};
use crate::domain::aggregates::{
    CancelRequest, CancelRequestStatus, Coupon, Order, Product, ProductVariant, SavedAddress, SizeEntry,
};
use crate::domain::value_objects::CouponCode;

#[derive(Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    variants: HashMap<Uuid, ProductVariant>,
    coupons: HashMap<Uuid, Coupon>,
    addresses: Vec<SavedAddress>,
    orders: HashMap<Uuid, Order>,
    cancel_requests: Vec<CancelRequest>,
}

/// Thread-safe in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_product(&self, product: Product) { self.state.lock().await.products.insert(product.id, product); }

    pub async fn insert_variant(&self, mut variant: ProductVariant) {
        variant.recompute_derived_fields();
        self.state.lock().await.variants.insert(variant.id(), variant);
    }

    pub async fn insert_coupon(&self, coupon: Coupon) { self.state.lock().await.coupons.insert(coupon.id, coupon); }

    pub async fn insert_address(&self, address: SavedAddress) { self.state.lock().await.addresses.push(address); }

    pub async fn product(&self, id: Uuid) -> Option<Product> { self.state.lock().await.products.get(&id).cloned() }

    pub async fn variant(&self, id: Uuid) -> Option<ProductVariant> { self.state.lock().await.variants.get(&id).cloned() }

    pub async fn coupon(&self, id: Uuid) -> Option<Coupon> { self.state.lock().await.coupons.get(&id).cloned() }

    pub async fn addresses_of(&self, user_id: Uuid) -> Vec<SavedAddress> {
        self.state.lock().await.addresses.iter().filter(|a| a.user_id == user_id).cloned().collect()
    }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }

    /// Make the next `n` commits fail as if the database reported a
    /// serialization conflict.
    pub fn fail_next_commits(&self, n: u32) { self.injected_conflicts.store(n, Ordering::SeqCst); }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working, injected_conflicts: self.injected_conflicts.clone() }))
    }

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<(Vec<Order>, u64)> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == u))
            .filter(|o| filter.status.map_or(true, |s| o.status() == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = orders.len() as u64;
        let page = orders.into_iter().skip(filter.offset as usize).take(filter.limit as usize).collect();
        Ok((page, total))
    }

    async fn find_coupon(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.values().find(|c| &c.code == code).cloned())
    }

    async fn list_cancel_requests(&self, status: Option<CancelRequestStatus>) -> StoreResult<Vec<CancelRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<CancelRequest> = state.cancel_requests.iter()
            .filter(|r| status.map_or(true, |s| r.status() == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn ping(&self) -> StoreResult<()> { Ok(()) }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    injected_conflicts: Arc<AtomicU32>,
}

impl MemoryTx {
    fn size_mut(&mut self, variant_id: Uuid, size_id: Uuid) -> Option<&mut SizeEntry> {
        self.working.variants.get_mut(&variant_id)?.sizes.iter_mut().find(|s| s.size_id == size_id)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_catalog_entry(&mut self, key: &SizeKey, visibility: Visibility) -> StoreResult<Option<CatalogEntry>> {
        let Some(product) = self.working.products.get(&key.product_id) else { return Ok(None) };
        let Some(variant) = self.working.variants.get(&key.variant_id) else { return Ok(None) };
        if variant.header.product_id != key.product_id
            || !visibility.admits(product.is_deleted)
            || !visibility.admits(variant.header.is_deleted)
        {
            return Ok(None);
        }
        Ok(variant.size(key.size_id).map(|size| CatalogEntry {
            product: product.clone(), variant: variant.header.clone(), size: size.clone(),
        }))
    }

    async fn write_size_entry(&mut self, variant_id: Uuid, entry: &SizeEntry, expected_quantity: u32) -> StoreResult<bool> {
        let Some(size) = self.size_mut(variant_id, entry.size_id) else {
            return Err(StoreError::Corrupt(format!("size {} vanished from variant {variant_id}", entry.size_id)));
        };
        if size.quantity() != expected_quantity { return Ok(false); }
        *size = entry.clone();
        Ok(true)
    }

    async fn lock_product(&mut self, product_id: Uuid, visibility: Visibility) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&product_id).filter(|p| visibility.admits(p.is_deleted)).cloned())
    }

    async fn write_product_sold(&mut self, product: &Product) -> StoreResult<()> {
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn lock_coupon(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        Ok(self.working.coupons.values().find(|c| &c.code == code).cloned())
    }

    async fn lock_coupon_by_id(&mut self, coupon_id: Uuid) -> StoreResult<Option<Coupon>> {
        Ok(self.working.coupons.get(&coupon_id).cloned())
    }

    async fn write_coupon_usage(&mut self, coupon: &Coupon, expected_used_count: u32, _change: CouponUsageChange) -> StoreResult<bool> {
        match self.working.coupons.get_mut(&coupon.id) {
            Some(stored) if stored.used_count() == expected_used_count => {
                *stored = coupon.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::Corrupt(format!("coupon {} vanished", coupon.id))),
        }
    }

    async fn find_address(&mut self, user_id: Uuid, address_id: Uuid) -> StoreResult<Option<SavedAddress>> {
        Ok(self.working.addresses.iter().find(|a| a.id == address_id && a.user_id == user_id).cloned())
    }

    async fn count_addresses(&mut self, user_id: Uuid) -> StoreResult<u64> {
        Ok(self.working.addresses.iter().filter(|a| a.user_id == user_id).count() as u64)
    }

    async fn insert_address(&mut self, address: &SavedAddress) -> StoreResult<()> {
        self.working.addresses.push(address.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        match self.working.orders.get_mut(&order.id) {
            Some(stored) => { *stored = order.clone(); Ok(()) }
            None => Err(StoreError::Corrupt(format!("order {} vanished", order.id))),
        }
    }

    async fn lock_pending_cancel_request(&mut self, order_id: Uuid) -> StoreResult<Option<CancelRequest>> {
        Ok(self.working.cancel_requests.iter().find(|r| r.order_id == order_id && r.is_pending()).cloned())
    }

    async fn insert_cancel_request(&mut self, request: &CancelRequest) -> StoreResult<()> {
        if request.is_pending() && self.working.cancel_requests.iter().any(|r| r.order_id == request.order_id && r.is_pending()) {
            return Err(StoreError::SerializationFailure(format!("order {} already has a pending cancel request", request.order_id)));
        }
        self.working.cancel_requests.push(request.clone());
        Ok(())
    }

    async fn update_cancel_request(&mut self, request: &CancelRequest) -> StoreResult<()> {
        match self.working.cancel_requests.iter_mut().find(|r| r.id == request.id) {
            Some(stored) => { *stored = request.clone(); Ok(()) }
            None => Err(StoreError::Corrupt(format!("cancel request {} vanished", request.id))),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let injected = self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::SerializationFailure("could not serialize access due to concurrent update".into()));
        }
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Gender, SizeEntry};
    use crate::domain::value_objects::{Money, Sku};

    async fn seeded() -> (MemoryStore, SizeKey) {
        let store = MemoryStore::new();
        let mut product = Product::create("Tee");
        product.publish().unwrap();
        let variant = ProductVariant::new(product.id, "White", Gender::Unisex)
            .with_size(SizeEntry::new("L", Sku::new("TEE-L").unwrap(), 3, Money::from_major(10), Money::from_major(4)));
        let key = SizeKey { product_id: product.id, variant_id: variant.id(), size_id: variant.sizes[0].size_id };
        store.insert_product(product).await;
        store.insert_variant(variant).await;
        (store, key)
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, key) = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            let mut entry = tx.lock_catalog_entry(&key, Visibility::ActiveOnly).await.unwrap().unwrap();
            entry.size.take(2, true).unwrap();
            assert!(tx.write_size_entry(key.variant_id, &entry.size, 3).await.unwrap());
        }
        assert_eq!(store.variant(key.variant_id).await.unwrap().sizes[0].quantity(), 3);
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_quantity() {
        let (store, key) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let mut entry = tx.lock_catalog_entry(&key, Visibility::ActiveOnly).await.unwrap().unwrap();
        entry.size.take(1, true).unwrap();
        assert!(!tx.write_size_entry(key.variant_id, &entry.size, 7).await.unwrap());
        assert!(tx.write_size_entry(key.variant_id, &entry.size, 3).await.unwrap());
        tx.commit().await.unwrap();
        assert_eq!(store.variant(key.variant_id).await.unwrap().sizes[0].quantity(), 2);
    }

    #[tokio::test]
    async fn test_soft_deleted_hidden_unless_requested() {
        let (store, key) = seeded().await;
        let mut variant = store.variant(key.variant_id).await.unwrap();
        variant.soft_delete();
        store.insert_variant(variant).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_catalog_entry(&key, Visibility::ActiveOnly).await.unwrap().is_none());
        assert!(tx.lock_catalog_entry(&key, Visibility::IncludeDeleted).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_injected_conflict_fails_commit() {
        let (store, _) = seeded().await;
        store.fail_next_commits(1);
        let tx = store.begin().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::SerializationFailure(_))));
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }
}
