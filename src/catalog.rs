//! Catalog snapshot reader.
//!
//! Resolves a cart line's (product, variant, size) reference to the live
//! price, cost and stock, through the caller's transaction so the row stays
//! locked until the inventory ledger writes it back.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{Money, Sku};
use crate::store::{CatalogEntry, SizeKey, StoreTx, Visibility};
use crate::{EcommerceError, Result};

/// Price and stock of one size as seen inside the current transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SizeSnapshot {
    pub key: SizeKey,
    pub product_name: String,
    pub size_label: String,
    pub sku: Sku,
    pub unit_price: Money,
    pub unit_cost: Money,
    pub discount_percent: Decimal,
    pub quantity_available: u32,
}

impl CatalogEntry {
    pub fn snapshot(&self) -> SizeSnapshot {
        SizeSnapshot {
            key: SizeKey { product_id: self.product.id, variant_id: self.variant.id, size_id: self.size.size_id },
            product_name: self.product.name.clone(),
            size_label: self.size.size_label.clone(),
            sku: self.size.sku.clone(),
            unit_price: self.size.price_final(),
            unit_cost: self.size.cost_price,
            discount_percent: self.size.discount_percent,
            quantity_available: self.size.quantity(),
        }
    }
}

/// Look up a size for sale. Missing references are `NotFound`; inactive,
/// soft-deleted or discontinued ones are `Unavailable` and name the product.
pub async fn resolve_for_sale(tx: &mut dyn StoreTx, key: &SizeKey) -> Result<CatalogEntry> {
    let entry = tx.lock_catalog_entry(key, Visibility::IncludeDeleted).await?
        .ok_or_else(|| EcommerceError::not_found("product size", describe(key)))?;
    if !entry.product.is_sellable() {
        return Err(EcommerceError::Unavailable(format!("{} is no longer available", entry.product.name)));
    }
    if !entry.variant.is_sellable() {
        return Err(EcommerceError::Unavailable(format!(
            "{} in {} is no longer available", entry.product.name, entry.variant.color
        )));
    }
    if entry.size.discontinued {
        return Err(EcommerceError::Unavailable(format!(
            "{} size {} has been discontinued", entry.product.name, entry.size.size_label
        )));
    }
    Ok(entry)
}

/// Look up a size referenced by an existing order, deleted or not.
pub async fn resolve_for_restock(tx: &mut dyn StoreTx, key: &SizeKey) -> Result<CatalogEntry> {
    tx.lock_catalog_entry(key, Visibility::IncludeDeleted).await?
        .ok_or_else(|| EcommerceError::not_found("product size", describe(key)))
}

fn describe(key: &SizeKey) -> String {
    format!("{}/{}/{}", key.product_id, key.variant_id, key.size_id)
}

pub(crate) fn key_of(product_id: Uuid, variant_id: Uuid, size_id: Uuid) -> SizeKey {
    SizeKey { product_id, variant_id, size_id }
}
