//! Product Aggregate
//!
//! A product groups colour/gender variants; each variant owns its size entries.
//! Size quantity is the sellable stock. It is mutated only through
//! `crate::inventory::InventoryLedger`, which is why the mutators here are
//! crate-private.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub status: ProductStatus,
    pub is_deleted: bool,
    total_sold: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus { #[default] Active, Inactive }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender { Male, Female, #[default] Unisex }

/// Variant row without its sizes; what the catalog reader hands back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariantHeader {
    pub id: Uuid,
    pub product_id: Uuid,
    pub color: String,
    pub gender: Gender,
    pub status: VariantStatus,
    pub is_deleted: bool,
}

impl VariantHeader {
    pub fn is_sellable(&self) -> bool { self.status == VariantStatus::Active && !self.is_deleted }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductVariant {
    pub header: VariantHeader,
    pub sizes: Vec<SizeEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub size_id: Uuid,
    pub size_label: String,
    pub sku: Sku,
    quantity: Quantity,
    is_available: bool,
    pub price: Money,
    pub cost_price: Money,
    pub discount_percent: Decimal,
    price_final: Money,
    profit: Money,
    pub discontinued: bool,
}

impl Product {
    pub fn create(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), status: ProductStatus::Draft, is_deleted: false,
            total_sold: 0, created_at: now, updated_at: now,
        }
    }

    /// Rehydrate from storage.
    pub fn restore(
        id: Uuid, name: String, status: ProductStatus, is_deleted: bool, total_sold: u64,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, name, status, is_deleted, total_sold, created_at, updated_at }
    }

    pub fn total_sold(&self) -> u64 { self.total_sold }
    pub fn is_sellable(&self) -> bool { self.status == ProductStatus::Active && !self.is_deleted }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        self.status = ProductStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    /// Products referenced by orders are only ever soft-deleted.
    pub fn soft_delete(&mut self) { self.is_deleted = true; self.touch(); }

    pub(crate) fn record_sale(&mut self, qty: u32) {
        self.total_sold = self.total_sold.saturating_add(u64::from(qty));
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl ProductVariant {
    pub fn new(product_id: Uuid, color: impl Into<String>, gender: Gender) -> Self {
        Self {
            header: VariantHeader {
                id: Uuid::now_v7(), product_id, color: color.into(), gender,
                status: VariantStatus::Active, is_deleted: false,
            },
            sizes: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.header.id }

    pub fn with_size(mut self, size: SizeEntry) -> Self {
        self.sizes.push(size);
        self.recompute_derived_fields();
        self
    }

    pub fn size(&self, size_id: Uuid) -> Option<&SizeEntry> { self.sizes.iter().find(|s| s.size_id == size_id) }

    pub fn set_status(&mut self, status: VariantStatus) {
        self.header.status = status;
        self.recompute_derived_fields();
    }

    pub fn soft_delete(&mut self) {
        self.header.is_deleted = true;
        self.recompute_derived_fields();
    }

    /// Re-derive every size's final price, profit and availability.
    pub fn recompute_derived_fields(&mut self) {
        let sellable = self.header.is_sellable();
        for size in &mut self.sizes { size.recompute_derived_fields(sellable); }
    }
}

impl SizeEntry {
    pub fn new(size_label: impl Into<String>, sku: Sku, quantity: u32, price: Money, cost_price: Money) -> Self {
        let mut entry = Self {
            size_id: Uuid::now_v7(), size_label: size_label.into(), sku,
            quantity: Quantity::new(quantity), is_available: false, price, cost_price,
            discount_percent: Decimal::ZERO, price_final: price, profit: Money::ZERO, discontinued: false,
        };
        entry.recompute_derived_fields(true);
        entry
    }

    /// Rehydrate from storage; derived fields are recomputed, not trusted.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        size_id: Uuid, size_label: String, sku: Sku, quantity: u32, price: Money, cost_price: Money,
        discount_percent: Decimal, discontinued: bool, variant_sellable: bool,
    ) -> Self {
        let mut entry = Self {
            size_id, size_label, sku, quantity: Quantity::new(quantity), is_available: false,
            price, cost_price, discount_percent, price_final: price, profit: Money::ZERO, discontinued,
        };
        entry.recompute_derived_fields(variant_sellable);
        entry
    }

    pub fn with_discount(mut self, percent: Decimal) -> Self {
        self.discount_percent = percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        self.recompute_pricing();
        self
    }

    pub fn quantity(&self) -> u32 { self.quantity.value() }
    pub fn is_available(&self) -> bool { self.is_available }
    pub fn price_final(&self) -> Money { self.price_final }
    pub fn profit(&self) -> Money { self.profit }

    pub(crate) fn take(&mut self, qty: u32, variant_sellable: bool) -> Result<(), ProductError> {
        self.quantity = self.quantity.subtract(qty).ok_or(ProductError::InsufficientInventory {
            requested: qty, remaining: self.quantity.value(),
        })?;
        self.recompute_derived_fields(variant_sellable);
        Ok(())
    }

    pub(crate) fn put_back(&mut self, qty: u32, variant_sellable: bool) {
        self.quantity = self.quantity.add(qty);
        self.recompute_derived_fields(variant_sellable);
    }

    /// Final price, per-unit profit and the availability flag all follow from
    /// the stored inputs; call after any mutation and before persisting.
    pub fn recompute_derived_fields(&mut self, variant_sellable: bool) {
        self.recompute_pricing();
        self.is_available = !self.quantity.is_zero() && variant_sellable && !self.discontinued;
    }

    fn recompute_pricing(&mut self) {
        let off = self.price.percent(self.discount_percent);
        self.price_final = (self.price - off).rounded();
        self.profit = self.price_final - self.cost_price;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error("Insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: u32, remaining: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(qty: u32) -> SizeEntry {
        SizeEntry::new("M", Sku::new("TEE-M").unwrap(), qty, Money::from_major(200_000), Money::from_major(120_000))
    }

    #[test]
    fn test_product_publish() {
        let mut p = Product::create("Linen Shirt");
        assert!(!p.is_sellable());
        p.publish().unwrap();
        assert!(p.is_sellable());
        p.soft_delete();
        assert!(!p.is_sellable());
    }

    #[test]
    fn test_derived_price_and_profit() {
        let s = size(5).with_discount(Decimal::new(25, 0));
        assert_eq!(s.price_final(), Money::from_major(150_000));
        assert_eq!(s.profit(), Money::from_major(30_000));
    }

    #[test]
    fn test_availability_follows_quantity() {
        let mut s = size(2);
        assert!(s.is_available());
        s.take(2, true).unwrap();
        assert_eq!(s.quantity(), 0);
        assert!(!s.is_available());
        s.put_back(1, true);
        assert!(s.is_available());
        assert_eq!(s.take(5, true), Err(ProductError::InsufficientInventory { requested: 5, remaining: 1 }));
    }

    #[test]
    fn test_inactive_variant_never_available() {
        let mut v = ProductVariant::new(Uuid::now_v7(), "Black", Gender::Unisex).with_size(size(4));
        assert!(v.sizes[0].is_available());
        v.set_status(VariantStatus::Inactive);
        assert!(!v.sizes[0].is_available());
        assert_eq!(v.sizes[0].quantity(), 4);
    }
}
