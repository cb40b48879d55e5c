//! Value Objects for the order engine

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::sync::LazyLock;

/// Monetary amounts carry two decimal places.
pub const MONEY_SCALE: u32 = 2;

/// National mobile format: 0 or +84 prefix, carrier digit, eight digits.
pub static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0|\+84)(3|5|7|8|9)[0-9]{8}$").expect("static phone pattern"));

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(ValueError::EmptySku); }
        if value.len() > 50 { return Err(ValueError::SkuTooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Sku {
    type Error = ValueError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Coupon codes compare case-insensitively; stored upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(ValueError::EmptyCouponCode); }
        if value.len() > 32 || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ValueError::MalformedCouponCode(value));
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for CouponCode {
    type Error = ValueError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Money value object.
///
/// The store runs in a single currency, so amounts are bare decimals rounded to
/// [`MONEY_SCALE`] places whenever a value is derived rather than entered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn from_major(units: i64) -> Self { Self(Decimal::from(units)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    /// Half-away-from-zero rounding to two places.
    pub fn rounded(self) -> Self {
        Self(self.0.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    /// `self * percent / 100`, rounded.
    pub fn percent(self, percent: Decimal) -> Self {
        Self(self.0 * percent / Decimal::ONE_HUNDRED).rounded()
    }

    pub fn abs_diff(self, other: Money) -> Money { Money((self.0 - other.0).abs()) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) { self.0 += rhs.0; }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Mul<u32> for Money {
    type Output = Money;
    fn mul(self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Who performed an action. Identity is established upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<uuid::Uuid>,
    pub role: Role,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { Customer, Admin, System }

impl Actor {
    pub fn customer(id: uuid::Uuid) -> Self { Self { id: Some(id), role: Role::Customer } }
    pub fn admin(id: uuid::Uuid) -> Self { Self { id: Some(id), role: Role::Admin } }
    pub fn system() -> Self { Self { id: None, role: Role::System } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn is_user(&self, user_id: uuid::Uuid) -> bool { self.id == Some(user_id) }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.role, self.id) {
            (Role::System, _) | (_, None) => write!(f, "system"),
            (Role::Admin, Some(id)) => write!(f, "admin:{id}"),
            (Role::Customer, Some(id)) => write!(f, "customer:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("SKU empty")]
    EmptySku,
    #[error("SKU too long")]
    SkuTooLong,
    #[error("Coupon code empty")]
    EmptyCouponCode,
    #[error("Malformed coupon code: {0}")]
    MalformedCouponCode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_coupon_code_normalised() {
        assert_eq!(CouponCode::new(" save10 ").unwrap().as_str(), "SAVE10");
        assert!(CouponCode::new("bad code").is_err());
    }
    #[test]
    fn test_money_rounding() {
        let m = Money::new(Decimal::new(100005, 3));
        assert_eq!(m.rounded().amount(), Decimal::new(10001, 2));
        assert_eq!(Money::from_major(500_000).percent(Decimal::TEN), Money::from_major(50_000));
    }
    #[test]
    fn test_quantity_subtract() {
        assert_eq!(Quantity::new(3).subtract(3), Some(Quantity::new(0)));
        assert_eq!(Quantity::new(1).subtract(2), None);
    }
}
