//! Postgres store.
//!
//! Rows the order engine mutates are read `FOR UPDATE` and every counter
//! write carries the value it was read with in its `WHERE` clause, so a lost
//! race shows up as zero affected rows rather than a silent overwrite.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::{
    CatalogEntry, CouponUsageChange, OrderFilter, SizeKey, Store, StoreError, StoreResult, StoreTx, Visibility,
};
use crate::domain::aggregates::{
    AppliedCoupon, CancelRequest, CancelRequestStatus, Coupon, DiscountType, LineItem, Order, OrderStatus,
    PaymentMethod, PaymentStatus, Product, SavedAddress, ShippingAddress, SizeEntry, StatusHistoryEntry,
    TrackingInfo, VariantHeader,
};
use crate::domain::value_objects::{CouponCode, Money, Sku};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // serialization_failure, deadlock_detected, unique_violation
            if matches!(db.code().as_deref(), Some("40001" | "40P01" | "23505")) {
                return StoreError::SerializationFailure(db.message().to_string());
            }
        }
        StoreError::Database(e.to_string())
    }
}

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StoreError::Database(e.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }
}

pub struct PgTx { tx: Transaction<'static, Postgres> }

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct CatalogRow {
    product_id: Uuid, product_name: String, product_status: String, product_deleted: bool, total_sold: i64,
    product_created_at: DateTime<Utc>, product_updated_at: DateTime<Utc>,
    variant_id: Uuid, color: String, gender: String, variant_status: String, variant_deleted: bool,
    size_id: Uuid, size_label: String, sku: String, quantity: i32, price: Decimal, cost_price: Decimal,
    discount_percent: Decimal, discontinued: bool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, status: String, is_deleted: bool, total_sold: i64,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, discount_type: String, discount_value: Decimal,
    max_discount_amount: Option<Decimal>, min_order_value: Option<Decimal>, expires_at: DateTime<Utc>,
    max_uses: Option<i32>, is_active: bool, used_count: i32,
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid, user_id: Uuid, full_name: String, phone: String, street: String, ward: String,
    district: String, city: String, is_default: bool, created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Uuid, shipping_address: Json<ShippingAddress>,
    coupon_id: Option<Uuid>, coupon_code: Option<String>, sub_total: Decimal, discount_amount: Decimal,
    shipping_price: Decimal, total_amount: Decimal, status: String, payment_status: String,
    payment_method: String, status_history: Json<Vec<StatusHistoryEntry>>, note: Option<String>,
    cancel_reason: Option<String>, tracking: Option<Json<TrackingInfo>>, paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid, product_id: Uuid, variant_id: Uuid, size_id: Uuid, product_name: String,
    size_label: String, sku: String, quantity: i32, unit_price: Decimal, unit_cost: Decimal,
}

#[derive(sqlx::FromRow)]
struct CancelRequestRow {
    id: Uuid, order_id: Uuid, requested_by: Uuid, reason: String, status: String,
    reviewer_id: Option<Uuid>, review_note: Option<String>, created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

const CATALOG_SELECT: &str = "SELECT p.id AS product_id, p.name AS product_name, p.status AS product_status, \
    p.is_deleted AS product_deleted, p.total_sold, p.created_at AS product_created_at, p.updated_at AS product_updated_at, \
    v.id AS variant_id, v.color, v.gender, v.status AS variant_status, v.is_deleted AS variant_deleted, \
    s.size_id, s.size_label, s.sku, s.quantity, s.price, s.cost_price, s.discount_percent, s.discontinued \
    FROM variant_sizes s JOIN product_variants v ON v.id = s.variant_id JOIN products p ON p.id = v.product_id";

const PRODUCT_SELECT: &str = "SELECT id, name, status, is_deleted, total_sold, created_at, updated_at FROM products";

const COUPON_SELECT: &str = "SELECT id, code, discount_type, discount_value, max_discount_amount, min_order_value, \
    expires_at, max_uses, is_active, used_count FROM coupons";

const ADDRESS_SELECT: &str = "SELECT id, user_id, full_name, phone, street, ward, district, city, is_default, created_at FROM addresses";

const ORDER_SELECT: &str = "SELECT id, order_number, user_id, shipping_address, coupon_id, coupon_code, sub_total, \
    discount_amount, shipping_price, total_amount, status, payment_status, payment_method, status_history, note, \
    cancel_reason, tracking, paid_at, created_at, updated_at FROM orders";

const CANCEL_SELECT: &str = "SELECT id, order_id, requested_by, reason, status, reviewer_id, review_note, created_at, \
    resolved_at FROM cancel_requests";

fn decode_enum<T: DeserializeOwned>(column: &str, value: &str) -> StoreResult<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| StoreError::Corrupt(format!("{column}: unexpected value {value:?}")))
}

fn corrupt(column: &str) -> impl Fn(String) -> StoreError + '_ {
    move |detail| StoreError::Corrupt(format!("{column}: {detail}"))
}

fn to_u32(column: &str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column}: negative value {value}")))
}

fn db_int(value: u32) -> i32 { i32::try_from(value).unwrap_or(i32::MAX) }

impl CatalogRow {
    fn into_entry(self) -> StoreResult<CatalogEntry> {
        let product = Product::restore(
            self.product_id, self.product_name, decode_enum("products.status", &self.product_status)?,
            self.product_deleted, u64::try_from(self.total_sold).unwrap_or(0),
            self.product_created_at, self.product_updated_at,
        );
        let variant = VariantHeader {
            id: self.variant_id, product_id: product.id, color: self.color,
            gender: decode_enum("product_variants.gender", &self.gender)?,
            status: decode_enum("product_variants.status", &self.variant_status)?,
            is_deleted: self.variant_deleted,
        };
        let size = SizeEntry::restore(
            self.size_id, self.size_label, Sku::new(self.sku).map_err(|e| corrupt("variant_sizes.sku")(e.to_string()))?,
            to_u32("variant_sizes.quantity", self.quantity)?, Money::new(self.price), Money::new(self.cost_price),
            self.discount_percent, self.discontinued, variant.is_sellable(),
        );
        Ok(CatalogEntry { product, variant, size })
    }
}

impl ProductRow {
    fn into_product(self) -> StoreResult<Product> {
        Ok(Product::restore(
            self.id, self.name, decode_enum("products.status", &self.status)?, self.is_deleted,
            u64::try_from(self.total_sold).unwrap_or(0), self.created_at, self.updated_at,
        ))
    }
}

impl AddressRow {
    fn into_address(self) -> SavedAddress {
        SavedAddress {
            id: self.id, user_id: self.user_id,
            address: ShippingAddress {
                full_name: self.full_name, phone: self.phone, street: self.street, ward: self.ward,
                district: self.district, city: self.city,
            },
            is_default: self.is_default, created_at: self.created_at,
        }
    }
}

impl OrderItemRow {
    fn into_item(self) -> StoreResult<LineItem> {
        Ok(LineItem {
            product_id: self.product_id, variant_id: self.variant_id, size_id: self.size_id,
            product_name: self.product_name, size_label: self.size_label,
            sku: Sku::new(self.sku).map_err(|e| corrupt("order_items.sku")(e.to_string()))?,
            quantity: to_u32("order_items.quantity", self.quantity)?,
            unit_price: Money::new(self.unit_price), unit_cost: Money::new(self.unit_cost),
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<LineItem>) -> StoreResult<Order> {
        let coupon = match (self.coupon_id, self.coupon_code) {
            (Some(coupon_id), Some(code)) => Some(AppliedCoupon { coupon_id, code }),
            _ => None,
        };
        Ok(Order::restore(
            self.id, self.order_number, self.user_id, items, self.shipping_address.0, coupon,
            Money::new(self.sub_total), Money::new(self.discount_amount), Money::new(self.shipping_price),
            Money::new(self.total_amount),
            self.status.parse::<OrderStatus>().map_err(|e| corrupt("orders.status")(e.to_string()))?,
            self.payment_status.parse::<PaymentStatus>().map_err(|e| corrupt("orders.payment_status")(e.to_string()))?,
            self.payment_method.parse::<PaymentMethod>().map_err(|e| corrupt("orders.payment_method")(e.to_string()))?,
            self.status_history.0, self.note, self.cancel_reason, self.tracking.map(|t| t.0), self.paid_at,
            self.created_at, self.updated_at,
        ))
    }
}

impl CancelRequestRow {
    fn into_request(self) -> StoreResult<CancelRequest> {
        let status: CancelRequestStatus = self.status.parse().map_err(corrupt("cancel_requests.status"))?;
        Ok(CancelRequest::restore(
            self.id, self.order_id, self.requested_by, self.reason, status, self.reviewer_id, self.review_note,
            self.created_at, self.resolved_at,
        ))
    }
}

// =============================================================================
// Shared reads
// =============================================================================

async fn fetch_items(conn: &mut PgConnection, order_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<LineItem>>> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        "SELECT order_id, product_id, variant_id, size_id, product_name, size_label, sku, quantity, unit_price, unit_cost \
         FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
    )
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
    for row in rows {
        grouped.entry(row.order_id).or_default().push(row.into_item()?);
    }
    Ok(grouped)
}

async fn fetch_order(conn: &mut PgConnection, order_id: Uuid, for_update: bool) -> StoreResult<Option<Order>> {
    let sql = if for_update { format!("{ORDER_SELECT} WHERE id = $1 FOR UPDATE") } else { format!("{ORDER_SELECT} WHERE id = $1") };
    let Some(row) = sqlx::query_as::<_, OrderRow>(&sql).bind(order_id).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let items = fetch_items(conn, &[order_id]).await?.remove(&order_id).unwrap_or_default();
    row.into_order(items).map(Some)
}

async fn attach_usages(conn: &mut PgConnection, row: CouponRow) -> StoreResult<Coupon> {
    let used_by: Vec<(Uuid,)> = sqlx::query_as("SELECT user_id FROM coupon_usages WHERE coupon_id = $1")
        .bind(row.id)
        .fetch_all(&mut *conn)
        .await?;
    let max_uses = row.max_uses.map(|m| to_u32("coupons.max_uses", m)).transpose()?;
    Ok(Coupon::restore(
        row.id, CouponCode::new(row.code).map_err(|e| corrupt("coupons.code")(e.to_string()))?,
        row.discount_type.parse::<DiscountType>().map_err(corrupt("coupons.discount_type"))?, row.discount_value,
        row.max_discount_amount.map(Money::new), row.min_order_value.map(Money::new), row.expires_at, max_uses,
        row.is_active, to_u32("coupons.used_count", row.used_count)?,
        used_by.into_iter().map(|(u,)| u).collect::<BTreeSet<_>>(),
    ))
}

async fn fetch_coupon_by_code(conn: &mut PgConnection, code: &CouponCode, for_update: bool) -> StoreResult<Option<Coupon>> {
    let sql = if for_update { format!("{COUPON_SELECT} WHERE code = $1 FOR UPDATE") } else { format!("{COUPON_SELECT} WHERE code = $1") };
    match sqlx::query_as::<_, CouponRow>(&sql).bind(code.as_str()).fetch_optional(&mut *conn).await? {
        Some(row) => attach_usages(conn, row).await.map(Some),
        None => Ok(None),
    }
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id, false).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<(Vec<Order>, u64)> {
        let mut conn = self.pool.acquire().await?;
        let status = filter.status.map(|s| s.as_str());
        let clause = "WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2)";
        let sql = format!("{ORDER_SELECT} {clause} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4");
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(filter.user_id).bind(status).bind(i64::from(filter.limit)).bind(i64::from(filter.offset))
            .fetch_all(&mut *conn)
            .await?;
        let count_sql = format!("SELECT COUNT(*) FROM orders {clause}");
        let (total,): (i64,) = sqlx::query_as(&count_sql).bind(filter.user_id).bind(status).fetch_one(&mut *conn).await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = fetch_items(&mut conn, &ids).await?;
        let orders = rows.into_iter()
            .map(|row| { let id = row.id; row.into_order(items.remove(&id).unwrap_or_default()) })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((orders, u64::try_from(total).unwrap_or(0)))
    }

    async fn find_coupon(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        fetch_coupon_by_code(&mut conn, code, false).await
    }

    async fn list_cancel_requests(&self, status: Option<CancelRequestStatus>) -> StoreResult<Vec<CancelRequest>> {
        let sql = format!("{CANCEL_SELECT} WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC");
        sqlx::query_as::<_, CancelRequestRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CancelRequestRow::into_request)
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_catalog_entry(&mut self, key: &SizeKey, visibility: Visibility) -> StoreResult<Option<CatalogEntry>> {
        let sql = format!(
            "{CATALOG_SELECT} WHERE s.size_id = $1 AND v.id = $2 AND p.id = $3 \
             AND ($4 OR (NOT p.is_deleted AND NOT v.is_deleted)) FOR UPDATE OF s"
        );
        sqlx::query_as::<_, CatalogRow>(&sql)
            .bind(key.size_id).bind(key.variant_id).bind(key.product_id)
            .bind(visibility == Visibility::IncludeDeleted)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(CatalogRow::into_entry)
            .transpose()
    }

    async fn write_size_entry(&mut self, variant_id: Uuid, entry: &SizeEntry, expected_quantity: u32) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE variant_sizes SET quantity = $3, is_available = $4, price_final = $5, profit = $6 \
             WHERE variant_id = $1 AND size_id = $2 AND quantity = $7",
        )
        .bind(variant_id).bind(entry.size_id).bind(db_int(entry.quantity())).bind(entry.is_available())
        .bind(entry.price_final().amount()).bind(entry.profit().amount()).bind(db_int(expected_quantity))
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn lock_product(&mut self, product_id: Uuid, visibility: Visibility) -> StoreResult<Option<Product>> {
        let sql = format!("{PRODUCT_SELECT} WHERE id = $1 AND ($2 OR NOT is_deleted) FOR UPDATE");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product_id).bind(visibility == Visibility::IncludeDeleted)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(ProductRow::into_product)
            .transpose()
    }

    async fn write_product_sold(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query("UPDATE products SET total_sold = $2, updated_at = $3 WHERE id = $1")
            .bind(product.id).bind(i64::try_from(product.total_sold()).unwrap_or(i64::MAX)).bind(product.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_coupon(&mut self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        fetch_coupon_by_code(&mut self.tx, code, true).await
    }

    async fn lock_coupon_by_id(&mut self, coupon_id: Uuid) -> StoreResult<Option<Coupon>> {
        let sql = format!("{COUPON_SELECT} WHERE id = $1 FOR UPDATE");
        match sqlx::query_as::<_, CouponRow>(&sql).bind(coupon_id).fetch_optional(&mut *self.tx).await? {
            Some(row) => attach_usages(&mut self.tx, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn write_coupon_usage(&mut self, coupon: &Coupon, expected_used_count: u32, change: CouponUsageChange) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE coupons SET used_count = $2 WHERE id = $1 AND used_count = $3")
            .bind(coupon.id).bind(db_int(coupon.used_count())).bind(db_int(expected_used_count))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() != 1 { return Ok(false); }
        match change {
            CouponUsageChange::Recorded(user_id) => {
                sqlx::query("INSERT INTO coupon_usages (coupon_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                    .bind(coupon.id).bind(user_id).execute(&mut *self.tx).await?;
            }
            CouponUsageChange::Released(user_id) => {
                sqlx::query("DELETE FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2")
                    .bind(coupon.id).bind(user_id).execute(&mut *self.tx).await?;
            }
        }
        Ok(true)
    }

    async fn find_address(&mut self, user_id: Uuid, address_id: Uuid) -> StoreResult<Option<SavedAddress>> {
        let sql = format!("{ADDRESS_SELECT} WHERE id = $1 AND user_id = $2");
        Ok(sqlx::query_as::<_, AddressRow>(&sql)
            .bind(address_id).bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(AddressRow::into_address))
    }

    async fn count_addresses(&mut self, user_id: Uuid) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM addresses WHERE user_id = $1")
            .bind(user_id).fetch_one(&mut *self.tx).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_address(&mut self, address: &SavedAddress) -> StoreResult<()> {
        let a = &address.address;
        sqlx::query(
            "INSERT INTO addresses (id, user_id, full_name, phone, street, ward, district, city, is_default, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(address.id).bind(address.user_id).bind(&a.full_name).bind(&a.phone).bind(&a.street).bind(&a.ward)
        .bind(&a.district).bind(&a.city).bind(address.is_default).bind(address.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, shipping_address, coupon_id, coupon_code, sub_total, \
             discount_amount, shipping_price, total_amount, status, payment_status, payment_method, status_history, \
             note, cancel_reason, tracking, paid_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(order.id).bind(&order.order_number).bind(order.user_id).bind(Json(order.shipping_address()))
        .bind(order.coupon().map(|c| c.coupon_id)).bind(order.coupon().map(|c| c.code.clone()))
        .bind(order.sub_total().amount()).bind(order.discount_amount().amount()).bind(order.shipping_price().amount())
        .bind(order.total_amount().amount()).bind(order.status().as_str()).bind(order.payment_status().as_str())
        .bind(order.payment_method.as_str()).bind(Json(order.status_history())).bind(&order.note)
        .bind(&order.cancel_reason).bind(order.tracking.as_ref().map(Json)).bind(order.paid_at)
        .bind(order.created_at).bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, variant_id, size_id, product_name, size_label, \
                 sku, quantity, unit_price, unit_cost) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(order.id).bind(i32::try_from(position).unwrap_or(i32::MAX)).bind(item.product_id)
            .bind(item.variant_id).bind(item.size_id).bind(&item.product_name).bind(&item.size_label)
            .bind(item.sku.as_str()).bind(db_int(item.quantity)).bind(item.unit_price.amount())
            .bind(item.unit_cost.amount())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn lock_order(&mut self, order_id: Uuid) -> StoreResult<Option<Order>> {
        fetch_order(&mut self.tx, order_id, true).await
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, status_history = $4, cancel_reason = $5, \
             tracking = $6, paid_at = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(order.id).bind(order.status().as_str()).bind(order.payment_status().as_str())
        .bind(Json(order.status_history())).bind(&order.cancel_reason).bind(order.tracking.as_ref().map(Json))
        .bind(order.paid_at).bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Corrupt(format!("order {} vanished", order.id)));
        }
        Ok(())
    }

    async fn lock_pending_cancel_request(&mut self, order_id: Uuid) -> StoreResult<Option<CancelRequest>> {
        let sql = format!("{CANCEL_SELECT} WHERE order_id = $1 AND status = 'pending' FOR UPDATE");
        sqlx::query_as::<_, CancelRequestRow>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(CancelRequestRow::into_request)
            .transpose()
    }

    async fn insert_cancel_request(&mut self, request: &CancelRequest) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO cancel_requests (id, order_id, requested_by, reason, status, reviewer_id, review_note, \
             created_at, resolved_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(request.id).bind(request.order_id).bind(request.requested_by).bind(&request.reason)
        .bind(request.status().as_str()).bind(request.reviewer_id).bind(&request.review_note)
        .bind(request.created_at).bind(request.resolved_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_cancel_request(&mut self, request: &CancelRequest) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE cancel_requests SET status = $2, reviewer_id = $3, review_note = $4, resolved_at = $5 WHERE id = $1",
        )
        .bind(request.id).bind(request.status().as_str()).bind(request.reviewer_id).bind(&request.review_note)
        .bind(request.resolved_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Corrupt(format!("cancel request {} vanished", request.id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
