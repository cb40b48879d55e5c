//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount_amount: Option<Money>,
    pub min_order_value: Option<Money>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: Option<u32>,
    pub is_active: bool,
    used_count: u32,
    used_by: BTreeSet<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType { Percentage, Fixed }

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::Fixed => "fixed" }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown discount type {other}")),
        }
    }
}

/// Why a coupon was turned down. Checked in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection { NotFound, AlreadyUsed, LimitReached, BelowMinimum }

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "coupon does not exist or has expired",
            Self::AlreadyUsed => "coupon has already been used by this account",
            Self::LimitReached => "coupon usage limit reached",
            Self::BelowMinimum => "order value is below the coupon minimum",
        })
    }
}

impl Coupon {
    pub fn percentage(code: CouponCode, percent: Decimal, expires_at: DateTime<Utc>) -> Self {
        Self::new(code, DiscountType::Percentage, percent, expires_at)
    }

    pub fn fixed(code: CouponCode, amount: Money, expires_at: DateTime<Utc>) -> Self {
        Self::new(code, DiscountType::Fixed, amount.amount(), expires_at)
    }

    fn new(code: CouponCode, discount_type: DiscountType, discount_value: Decimal, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), code, discount_type, discount_value, max_discount_amount: None,
            min_order_value: None, expires_at, max_uses: None, is_active: true, used_count: 0,
            used_by: BTreeSet::new(),
        }
    }

    /// Rehydrate from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, code: CouponCode, discount_type: DiscountType, discount_value: Decimal,
        max_discount_amount: Option<Money>, min_order_value: Option<Money>, expires_at: DateTime<Utc>,
        max_uses: Option<u32>, is_active: bool, used_count: u32, used_by: BTreeSet<Uuid>,
    ) -> Self {
        Self {
            id, code, discount_type, discount_value, max_discount_amount, min_order_value, expires_at,
            max_uses, is_active, used_count, used_by,
        }
    }

    pub fn with_max_discount(mut self, cap: Money) -> Self { self.max_discount_amount = Some(cap); self }
    pub fn with_min_order(mut self, min: Money) -> Self { self.min_order_value = Some(min); self }
    pub fn with_max_uses(mut self, max: u32) -> Self { self.max_uses = Some(max); self }

    pub fn used_count(&self) -> u32 { self.used_count }
    pub fn used_by(&self) -> &BTreeSet<Uuid> { &self.used_by }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool { self.is_active && now < self.expires_at }

    /// The single coupon rule set, shared by checkout preview and order creation.
    pub fn evaluate(&self, order_value: Money, user_id: Uuid, now: DateTime<Utc>) -> Result<Money, CouponRejection> {
        if !self.is_live(now) { return Err(CouponRejection::NotFound); }
        if self.used_by.contains(&user_id) { return Err(CouponRejection::AlreadyUsed); }
        if self.max_uses.is_some_and(|max| self.used_count >= max) { return Err(CouponRejection::LimitReached); }
        if self.min_order_value.is_some_and(|min| order_value < min) { return Err(CouponRejection::BelowMinimum); }
        Ok(self.discount_for(order_value))
    }

    pub fn discount_for(&self, order_value: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let d = order_value.percent(self.discount_value);
                self.max_discount_amount.map_or(d, |cap| d.min(cap))
            }
            DiscountType::Fixed => Money::new(self.discount_value).min(order_value),
        };
        raw.max(Money::ZERO).rounded()
    }

    pub(crate) fn record_use(&mut self, user_id: Uuid) {
        self.used_count = self.used_count.saturating_add(1);
        self.used_by.insert(user_id);
    }

    pub(crate) fn release_use(&mut self, user_id: Uuid) {
        self.used_count = self.used_count.saturating_sub(1);
        self.used_by.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn welcome10() -> Coupon {
        Coupon::percentage(CouponCode::new("WELCOME10").unwrap(), Decimal::TEN, Utc::now() + Duration::days(7))
            .with_max_discount(Money::from_major(50_000))
            .with_min_order(Money::from_major(300_000))
    }

    #[test]
    fn test_percentage_is_capped() {
        let c = welcome10();
        let d = c.evaluate(Money::from_major(500_000), Uuid::now_v7(), Utc::now()).unwrap();
        assert_eq!(d, Money::from_major(50_000));
        assert!(d.amount().fract().is_zero());
    }

    #[test]
    fn test_percentage_under_cap() {
        let d = welcome10().evaluate(Money::from_major(400_000), Uuid::now_v7(), Utc::now()).unwrap();
        assert_eq!(d, Money::from_major(40_000));
    }

    #[test]
    fn test_fixed_never_exceeds_order_value() {
        let c = Coupon::fixed(CouponCode::new("FLAT100K").unwrap(), Money::from_major(100_000), Utc::now() + Duration::days(1));
        assert_eq!(c.discount_for(Money::from_major(60_000)), Money::from_major(60_000));
        assert_eq!(c.discount_for(Money::from_major(260_000)), Money::from_major(100_000));
    }

    #[test]
    fn test_rules_short_circuit_in_order() {
        let user = Uuid::now_v7();
        let now = Utc::now();
        let mut c = welcome10().with_max_uses(1);
        assert_eq!(c.evaluate(Money::from_major(100), user, now), Err(CouponRejection::BelowMinimum));
        c.record_use(user);
        assert_eq!(c.evaluate(Money::from_major(100), user, now), Err(CouponRejection::AlreadyUsed));
        assert_eq!(c.evaluate(Money::from_major(100), Uuid::now_v7(), now), Err(CouponRejection::LimitReached));
        c.is_active = false;
        assert_eq!(c.evaluate(Money::from_major(500_000), user, now), Err(CouponRejection::NotFound));
    }

    #[test]
    fn test_expired_coupon_reads_as_not_found() {
        let c = welcome10();
        let later = c.expires_at + Duration::seconds(1);
        assert_eq!(c.evaluate(Money::from_major(500_000), Uuid::now_v7(), later), Err(CouponRejection::NotFound));
    }

    #[test]
    fn test_release_reverses_use() {
        let user = Uuid::now_v7();
        let mut c = welcome10();
        let before = c.clone();
        c.record_use(user);
        assert_eq!(c.used_count(), 1);
        c.release_use(user);
        assert_eq!(c, before);
    }
}
