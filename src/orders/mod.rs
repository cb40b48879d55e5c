//! Order services.
//!
//! Every mutating operation runs as one store transaction wrapped in
//! [`with_retry`](crate::store::retry::with_retry). Domain events collected
//! during the transaction are dispatched only after it commits.

pub mod cancellation;
pub mod engine;
pub mod state_machine;

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::coupons::{CouponCheck, CouponValidator};
use crate::domain::aggregates::{CancelRequest, CancelRequestStatus, Order, OrderStatus};
use crate::domain::value_objects::{Actor, Money};
use crate::notify::{NotificationDispatcher, Notifier};
use crate::store::{OrderFilter, Store};
use crate::{EcommerceError, Result};

pub use cancellation::{CancelRequestInput, CancelReview};
pub use engine::{AddressInput, CartLine, CreateOrder};
pub use state_machine::{PaymentUpdate, StatusUpdate};

#[derive(Clone)]
pub struct OrderServices {
    store: Arc<dyn Store>,
    dispatcher: NotificationDispatcher,
    config: EngineConfig,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl OrderServices {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: EngineConfig) -> Self {
        Self { store, dispatcher: NotificationDispatcher::new(notifier), config }
    }

    pub fn store(&self) -> &dyn Store { self.store.as_ref() }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Owners see their own orders; admins see everything.
    #[instrument(skip(self), fields(actor = %actor))]
    pub async fn get_order(&self, actor: Actor, order_id: Uuid) -> Result<Order> {
        let order = self.store.get_order(order_id).await?.ok_or_else(|| EcommerceError::not_found("order", order_id))?;
        if !actor.is_admin() && !actor.is_user(order.user_id) {
            return Err(EcommerceError::Forbidden("order belongs to another account".into()));
        }
        Ok(order)
    }

    pub async fn list_orders(&self, actor: Actor, status: Option<OrderStatus>, page: u32, per_page: u32) -> Result<Page<Order>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let user_id = if actor.is_admin() {
            None
        } else {
            Some(actor.id.ok_or_else(|| EcommerceError::Forbidden("sign in to view orders".into()))?)
        };
        let filter = OrderFilter { user_id, status, limit: per_page, offset: (page - 1).saturating_mul(per_page) };
        let (data, total) = self.store.list_orders(&filter).await?;
        Ok(Page { data, total, page, per_page })
    }

    pub async fn list_cancel_requests(&self, actor: Actor, status: Option<CancelRequestStatus>) -> Result<Vec<CancelRequest>> {
        require_admin(actor, "list cancellation requests")?;
        Ok(self.store.list_cancel_requests(status).await?)
    }

    pub async fn preview_coupon(&self, actor: Actor, code: &str, order_value: Money) -> Result<CouponCheck> {
        let user_id = actor.id.ok_or_else(|| EcommerceError::Forbidden("sign in to use coupons".into()))?;
        CouponValidator::preview(self.store.as_ref(), code, order_value, user_id).await
    }
}

pub(crate) fn require_admin(actor: Actor, action: &str) -> Result<()> {
    if actor.is_admin() { Ok(()) } else { Err(EcommerceError::Forbidden(format!("only admins may {action}"))) }
}

pub(crate) fn require_user(actor: Actor) -> Result<Uuid> {
    actor.id.ok_or_else(|| EcommerceError::Forbidden("a signed-in user is required".into()))
}
