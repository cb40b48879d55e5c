//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Actor, Money, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    items: Vec<LineItem>,
    shipping_address: ShippingAddress,
    coupon: Option<AppliedCoupon>,
    sub_total: Money,
    discount_amount: Money,
    shipping_price: Money,
    total_amount: Money,
    status: OrderStatus,
    payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    status_history: Vec<StatusHistoryEntry>,
    pub note: Option<String>,
    pub cancel_reason: Option<String>,
    pub tracking: Option<TrackingInfo>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Price and cost are captured when the order is placed and never re-read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub size_id: Uuid,
    pub product_name: String,
    pub size_label: String,
    pub sku: Sku,
    pub quantity: u32,
    pub unit_price: Money,
    pub unit_cost: Money,
}

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price * self.quantity }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub street: String,
    pub ward: String,
    pub district: String,
    pub city: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon { pub coupon_id: Uuid, pub code: String }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

impl TrackingInfo {
    /// Fields present in `other` win.
    pub fn merge(&mut self, other: TrackingInfo) {
        if other.carrier.is_some() { self.carrier = other.carrier; }
        if other.tracking_number.is_some() { self.tracking_number = other.tracking_number; }
        if other.tracking_url.is_some() { self.tracking_url = other.tracking_url; }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Shipping, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[default] CashOnDelivery, BankTransfer, OnlineGateway }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Confirmed, Self::Shipping, Self::Delivered, Self::Cancelled];

    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Shipping, Self::Cancelled],
            Self::Shipping => &[Self::Delivered],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool { self.allowed_next().contains(&next) }
    pub fn is_terminal(&self) -> bool { self.allowed_next().is_empty() }
    pub fn is_cancellable(&self) -> bool { matches!(self, Self::Pending | Self::Confirmed) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Shipping => "shipping",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }
}

impl PaymentStatus {
    /// Guarded moves only; reversals go through the admin override.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!((self, next), (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed))
    }

    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Failed => "failed" }
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cash_on_delivery", Self::BankTransfer => "bank_transfer",
            Self::OnlineGateway => "online_gateway",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pending, Self::Paid, Self::Failed].into_iter()
            .find(|st| st.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl FromStr for PaymentMethod {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::CashOnDelivery, Self::BankTransfer, Self::OnlineGateway].into_iter()
            .find(|m| m.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Everything needed to place an order once pricing has been settled.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub coupon: Option<AppliedCoupon>,
    pub discount_amount: Money,
    pub shipping_price: Money,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
}

/// Outcome of a status or payment change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition { Applied, Unchanged }

impl Order {
    pub fn place(order_number: String, draft: OrderDraft, actor: Actor) -> Result<Self, OrderError> {
        if draft.items.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        let sub_total = draft.items.iter().fold(Money::ZERO, |acc, i| acc + i.line_total());
        let total_amount = sub_total + draft.shipping_price - draft.discount_amount;
        let mut order = Self {
            id: Uuid::now_v7(), order_number, user_id: draft.user_id, items: draft.items,
            shipping_address: draft.shipping_address, coupon: draft.coupon, sub_total,
            discount_amount: draft.discount_amount, shipping_price: draft.shipping_price, total_amount,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            payment_method: draft.payment_method,
            status_history: vec![StatusHistoryEntry { status: OrderStatus::Pending, timestamp: now, actor, note: None }],
            note: draft.note, cancel_reason: None, tracking: None, paid_at: None,
            created_at: now, updated_at: now, events: vec![],
        };
        order.verify_totals()?;
        order.raise_event(DomainEvent::Order(OrderEvent::Created {
            order_id: order.id, order_number: order.order_number.clone(), user_id: order.user_id, total: order.total_amount,
        }));
        Ok(order)
    }

    /// Rehydrate from storage. No events are raised.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, order_number: String, user_id: Uuid, items: Vec<LineItem>, shipping_address: ShippingAddress,
        coupon: Option<AppliedCoupon>, sub_total: Money, discount_amount: Money, shipping_price: Money,
        total_amount: Money, status: OrderStatus, payment_status: PaymentStatus, payment_method: PaymentMethod,
        status_history: Vec<StatusHistoryEntry>, note: Option<String>, cancel_reason: Option<String>,
        tracking: Option<TrackingInfo>, paid_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, order_number, user_id, items, shipping_address, coupon, sub_total, discount_amount,
            shipping_price, total_amount, status, payment_status, payment_method, status_history, note,
            cancel_reason, tracking, paid_at, created_at, updated_at, events: vec![],
        }
    }

    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status_history(&self) -> &[StatusHistoryEntry] { &self.status_history }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn coupon(&self) -> Option<&AppliedCoupon> { self.coupon.as_ref() }
    pub fn sub_total(&self) -> Money { self.sub_total }
    pub fn discount_amount(&self) -> Money { self.discount_amount }
    pub fn shipping_price(&self) -> Money { self.shipping_price }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    /// `total == sub_total + shipping - discount`, and no component is negative.
    pub fn verify_totals(&self) -> Result<(), OrderError> {
        let expected = self.sub_total + self.shipping_price - self.discount_amount;
        if self.total_amount != expected
            || self.total_amount.is_negative()
            || self.discount_amount.is_negative()
            || self.discount_amount > self.sub_total
        {
            return Err(OrderError::TotalMismatch { expected, actual: self.total_amount });
        }
        Ok(())
    }

    /// Status write plus history entry. Side effects on stock and coupons are
    /// the caller's job and must happen in the same transaction.
    pub(crate) fn transition_to(&mut self, next: OrderStatus, actor: Actor, note: Option<String>) -> Result<Transition, OrderError> {
        if next == self.status { return Ok(Transition::Unchanged); }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        if next == OrderStatus::Cancelled {
            let reason = note.as_deref().map(str::trim).filter(|r| !r.is_empty())
                .ok_or(OrderError::CancelReasonRequired)?;
            self.cancel_reason = Some(reason.to_string());
        }
        let from = self.status;
        self.status = next;
        self.push_history(actor, note);
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: self.id, order_number: self.order_number.clone(), user_id: self.user_id, from, to: next,
        }));
        Ok(Transition::Applied)
    }

    pub(crate) fn set_payment_status(&mut self, next: PaymentStatus) -> Result<Transition, OrderError> {
        if next == self.payment_status { return Ok(Transition::Unchanged); }
        if !self.payment_status.can_transition_to(next) {
            return Err(OrderError::InvalidPaymentTransition { from: self.payment_status, to: next });
        }
        self.write_payment_status(next);
        Ok(Transition::Applied)
    }

    /// Unguarded payment write used by the admin override.
    pub(crate) fn override_payment_status(&mut self, next: PaymentStatus, actor: Actor, note: String) -> Transition {
        if next == self.payment_status { return Transition::Unchanged; }
        let from = self.payment_status;
        self.write_payment_status(next);
        if next != PaymentStatus::Paid { self.paid_at = None; }
        self.push_history(actor, Some(format!("payment status overridden {from} -> {next}: {note}")));
        Transition::Applied
    }

    pub(crate) fn merge_tracking(&mut self, tracking: TrackingInfo) {
        self.tracking.get_or_insert_with(TrackingInfo::default).merge(tracking);
        self.touch();
    }

    fn write_payment_status(&mut self, next: PaymentStatus) {
        let from = self.payment_status;
        self.payment_status = next;
        if next == PaymentStatus::Paid { self.paid_at = Some(Utc::now()); }
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentStatusChanged {
            order_id: self.id, order_number: self.order_number.clone(), user_id: self.user_id, from, to: next,
        }));
    }

    fn push_history(&mut self, actor: Actor, note: Option<String>) {
        let now = Utc::now();
        self.status_history.push(StatusHistoryEntry { status: self.status, timestamp: now, actor, note });
        self.updated_at = now;
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Order totals are inconsistent: expected {expected}, got {actual}")]
    TotalMismatch { expected: Money, actual: Money },
    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Cannot change payment status from {from} to {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("A cancellation reason is required")]
    CancelReasonRequired,
    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}
