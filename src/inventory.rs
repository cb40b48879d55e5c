//! Inventory ledger.
//!
//! The only code path that writes a size's quantity. Every write is made
//! against the row locked by [`crate::catalog`] and is compare-and-set on the
//! quantity read, so two transactions can never both spend the same unit.

use tracing::{debug, warn};

use crate::catalog::{self, SizeSnapshot};
use crate::domain::aggregates::{LineItem, ProductError};
use crate::store::{SizeKey, StoreTx, Visibility};
use crate::{EcommerceError, Result};

pub struct InventoryLedger;

impl InventoryLedger {
    /// Take `quantity` units of a size for a new order. Returns the snapshot
    /// the line item should capture (price and cost as of this instant).
    pub async fn reserve(tx: &mut dyn StoreTx, key: &SizeKey, quantity: u32) -> Result<SizeSnapshot> {
        let mut entry = catalog::resolve_for_sale(tx, key).await?;
        let snapshot = entry.snapshot();
        let before = entry.size.quantity();
        let sellable = entry.variant.is_sellable();
        entry.size.take(quantity, sellable).map_err(|e| match e {
            ProductError::InsufficientInventory { requested, remaining } => EcommerceError::InsufficientStock {
                product: entry.product.name.clone(), size: entry.size.size_label.clone(), requested, remaining,
            },
            other => EcommerceError::Internal(other.to_string()),
        })?;
        if !tx.write_size_entry(key.variant_id, &entry.size, before).await? {
            return Err(EcommerceError::TransactionAborted(format!("stock for size {} changed underneath", key.size_id)));
        }
        debug!(size_id = %key.size_id, before, after = entry.size.quantity(), "stock reserved");
        Ok(snapshot)
    }

    /// Put a cancelled line's units back. Soft-deleted variants are restocked
    /// too; they simply stay unavailable.
    pub async fn restock(tx: &mut dyn StoreTx, item: &LineItem) -> Result<()> {
        let key = catalog::key_of(item.product_id, item.variant_id, item.size_id);
        let mut entry = catalog::resolve_for_restock(tx, &key).await?;
        let before = entry.size.quantity();
        let sellable = entry.variant.is_sellable();
        entry.size.put_back(item.quantity, sellable);
        if !tx.write_size_entry(key.variant_id, &entry.size, before).await? {
            return Err(EcommerceError::TransactionAborted(format!("stock for size {} changed underneath", key.size_id)));
        }
        debug!(size_id = %key.size_id, before, after = entry.size.quantity(), "stock restored");
        Ok(())
    }

    /// Bump each product's lifetime sold counter once the order is delivered.
    pub async fn record_delivery(tx: &mut dyn StoreTx, items: &[LineItem]) -> Result<()> {
        for item in items {
            match tx.lock_product(item.product_id, Visibility::IncludeDeleted).await? {
                Some(mut product) => {
                    product.record_sale(item.quantity);
                    tx.write_product_sold(&product).await?;
                }
                None => warn!(product_id = %item.product_id, "delivered product no longer exists"),
            }
        }
        Ok(())
    }
}
