//! Coupon validation and usage bookkeeping.
//!
//! Checkout preview and order creation both go through
//! [`CouponValidator::check`], which wraps [`Coupon::evaluate`]. The usage
//! counter and the set of users who redeemed a coupon are only written by
//! [`CouponLedger`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{AppliedCoupon, Coupon, CouponRejection};
use crate::domain::value_objects::{CouponCode, Money};
use crate::store::{CouponUsageChange, Store, StoreTx};
use crate::{EcommerceError, Result};

/// Outcome of a coupon preview.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CouponCheck {
    pub code: String,
    pub valid: bool,
    pub discount_amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CouponRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct CouponValidator;

impl CouponValidator {
    /// A missing coupon reads the same as an expired or inactive one.
    pub fn check(coupon: Option<&Coupon>, order_value: Money, user_id: Uuid, now: DateTime<Utc>) -> std::result::Result<Money, CouponRejection> {
        coupon.ok_or(CouponRejection::NotFound)?.evaluate(order_value, user_id, now)
    }

    /// Read-only preview for the checkout page. Nothing is locked or written.
    #[instrument(skip(store), fields(%user_id))]
    pub async fn preview(store: &dyn Store, code: &str, order_value: Money, user_id: Uuid) -> Result<CouponCheck> {
        if order_value.is_negative() {
            return Err(EcommerceError::Validation("order value must not be negative".into()));
        }
        let coupon = match CouponCode::new(code) {
            Ok(code) => store.find_coupon(&code).await?,
            Err(_) => None,
        };
        let code = code.trim().to_uppercase();
        Ok(match Self::check(coupon.as_ref(), order_value, user_id, Utc::now()) {
            Ok(discount_amount) => CouponCheck { code, valid: true, discount_amount, reason: None, message: None },
            Err(reason) => CouponCheck {
                code, valid: false, discount_amount: Money::ZERO, reason: Some(reason), message: Some(reason.to_string()),
            },
        })
    }
}

pub struct CouponLedger;

impl CouponLedger {
    /// Validate and redeem a coupon inside the order transaction.
    pub async fn apply(tx: &mut dyn StoreTx, code: &CouponCode, order_value: Money, user_id: Uuid) -> Result<(AppliedCoupon, Money)> {
        let reject = |reason| EcommerceError::Coupon { code: code.to_string(), reason };
        let mut coupon = tx.lock_coupon(code).await?.ok_or_else(|| reject(CouponRejection::NotFound))?;
        let discount = CouponValidator::check(Some(&coupon), order_value, user_id, Utc::now()).map_err(reject)?;
        let before = coupon.used_count();
        coupon.record_use(user_id);
        if !tx.write_coupon_usage(&coupon, before, CouponUsageChange::Recorded(user_id)).await? {
            return Err(EcommerceError::TransactionAborted(format!("usage of coupon {code} changed underneath")));
        }
        debug!(coupon = %code, %discount, used_count = coupon.used_count(), "coupon redeemed");
        Ok((AppliedCoupon { coupon_id: coupon.id, code: code.to_string() }, discount))
    }

    /// Undo a redemption. Releasing a coupon the user no longer holds is a no-op.
    pub async fn release(tx: &mut dyn StoreTx, applied: &AppliedCoupon, user_id: Uuid) -> Result<()> {
        let Some(mut coupon) = tx.lock_coupon_by_id(applied.coupon_id).await? else {
            warn!(coupon = %applied.code, "coupon to release no longer exists");
            return Ok(());
        };
        if !coupon.used_by().contains(&user_id) {
            debug!(coupon = %applied.code, %user_id, "coupon already released");
            return Ok(());
        }
        let before = coupon.used_count();
        coupon.release_use(user_id);
        if !tx.write_coupon_usage(&coupon, before, CouponUsageChange::Released(user_id)).await? {
            return Err(EcommerceError::TransactionAborted(format!("usage of coupon {} changed underneath", applied.code)));
        }
        debug!(coupon = %applied.code, used_count = coupon.used_count(), "coupon released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn welcome10() -> Coupon {
        Coupon::percentage(CouponCode::new("WELCOME10").unwrap(), Decimal::TEN, Utc::now() + Duration::days(30))
            .with_max_discount(Money::from_major(50_000))
    }

    #[tokio::test]
    async fn test_preview_is_case_insensitive_and_read_only() {
        let store = MemoryStore::new();
        let coupon = welcome10();
        let id = coupon.id;
        store.insert_coupon(coupon).await;
        let check = CouponValidator::preview(&store, "welcome10", Money::from_major(500_000), Uuid::now_v7()).await.unwrap();
        assert!(check.valid);
        assert_eq!(check.discount_amount, Money::from_major(50_000));
        assert_eq!(store.coupon(id).await.unwrap().used_count(), 0);
    }

    #[tokio::test]
    async fn test_preview_unknown_code() {
        let store = MemoryStore::new();
        let check = CouponValidator::preview(&store, "NOPE", Money::from_major(1), Uuid::now_v7()).await.unwrap();
        assert!(!check.valid);
        assert_eq!(check.reason, Some(CouponRejection::NotFound));
    }

    #[tokio::test]
    async fn test_apply_then_release_restores_usage() {
        let store = MemoryStore::new();
        let coupon = welcome10();
        let id = coupon.id;
        store.insert_coupon(coupon).await;
        let user = Uuid::now_v7();
        let code = CouponCode::new("WELCOME10").unwrap();

        let mut tx = store.begin().await.unwrap();
        let (applied, discount) = CouponLedger::apply(tx.as_mut(), &code, Money::from_major(200_000), user).await.unwrap();
        assert_eq!(discount, Money::from_major(20_000));
        tx.commit().await.unwrap();
        assert_eq!(store.coupon(id).await.unwrap().used_count(), 1);

        let mut tx = store.begin().await.unwrap();
        CouponLedger::release(tx.as_mut(), &applied, user).await.unwrap();
        CouponLedger::release(tx.as_mut(), &applied, user).await.unwrap();
        tx.commit().await.unwrap();
        let after = store.coupon(id).await.unwrap();
        assert_eq!(after.used_count(), 0);
        assert!(!after.used_by().contains(&user));
    }

    #[tokio::test]
    async fn test_second_use_by_same_user_rejected() {
        let store = MemoryStore::new();
        store.insert_coupon(welcome10()).await;
        let user = Uuid::now_v7();
        let code = CouponCode::new("WELCOME10").unwrap();
        let mut tx = store.begin().await.unwrap();
        CouponLedger::apply(tx.as_mut(), &code, Money::from_major(100), user).await.unwrap();
        let err = CouponLedger::apply(tx.as_mut(), &code, Money::from_major(100), user).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Coupon { reason: CouponRejection::AlreadyUsed, .. }));
    }
}
