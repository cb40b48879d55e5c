//! Order status and payment status changes, with their side effects.

use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{require_admin, require_user, OrderServices};
use crate::coupons::CouponLedger;
use crate::domain::aggregates::{
    Order, OrderStatus, PaymentMethod, PaymentStatus, ReviewAction, TrackingInfo, Transition,
};
use crate::domain::events::{CancellationEvent, DomainEvent};
use crate::domain::value_objects::Actor;
use crate::inventory::InventoryLedger;
use crate::payment::PaymentGateway;
use crate::store::retry::with_retry;
use crate::store::StoreTx;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tracking: Option<TrackingInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentUpdate {
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub note: Option<String>,
    /// Admin-only escape hatch for moves the payment machine forbids.
    #[serde(default)]
    pub force: bool,
}

/// Move `order` to `next` and run the side effects tied to the move, all
/// through the caller's transaction. A same-status request does nothing.
pub(crate) async fn apply_transition(
    tx: &mut dyn StoreTx, order: &mut Order, next: OrderStatus, actor: Actor, note: Option<String>,
    tracking: Option<TrackingInfo>,
) -> Result<Transition> {
    let from = order.status();
    if order.transition_to(next, actor, note)? == Transition::Unchanged {
        return Ok(Transition::Unchanged);
    }
    match next {
        OrderStatus::Cancelled => {
            for item in order.items() {
                InventoryLedger::restock(tx, item).await?;
            }
            if let Some(applied) = order.coupon().cloned() {
                CouponLedger::release(tx, &applied, order.user_id).await?;
            }
        }
        OrderStatus::Shipping => {
            if let Some(tracking) = tracking { order.merge_tracking(tracking); }
        }
        OrderStatus::Delivered => {
            InventoryLedger::record_delivery(tx, order.items()).await?;
            if order.payment_method == PaymentMethod::CashOnDelivery && order.payment_status() == PaymentStatus::Pending {
                order.set_payment_status(PaymentStatus::Paid)?;
            }
        }
        OrderStatus::Pending | OrderStatus::Confirmed => {}
    }
    info!(order_id = %order.id, %from, to = %next, %actor, "order status changed");
    Ok(Transition::Applied)
}

/// Payment just became paid: a pending order moves on to confirmed, a
/// cancelled one stays cancelled and someone has to refund by hand.
async fn after_paid(tx: &mut dyn StoreTx, order: &mut Order) -> Result<()> {
    match order.status() {
        OrderStatus::Pending => {
            apply_transition(tx, order, OrderStatus::Confirmed, Actor::system(), Some("payment received".into()), None).await?;
        }
        OrderStatus::Cancelled => {
            warn!(order_id = %order.id, order_number = %order.order_number, "payment received for a cancelled order");
        }
        _ => {}
    }
    Ok(())
}

impl OrderServices {
    #[instrument(skip(self, update), fields(actor = %actor, to = %update.status))]
    pub async fn update_status(&self, actor: Actor, order_id: Uuid, update: StatusUpdate) -> Result<Order> {
        require_admin(actor, "change order status")?;
        let admin_id = require_user(actor)?;
        let update = &update;
        let (order, events) = with_retry(&self.config.retry, "update_status", move || {
            self.try_update_status(actor, admin_id, order_id, update)
        }).await?;
        self.dispatcher.dispatch(events);
        Ok(order)
    }

    async fn try_update_status(
        &self, actor: Actor, admin_id: Uuid, order_id: Uuid, update: &StatusUpdate,
    ) -> Result<(Order, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_id).await?.ok_or_else(|| EcommerceError::not_found("order", order_id))?;
        let transition = apply_transition(
            tx.as_mut(), &mut order, update.status, actor, update.note.clone(), update.tracking.clone(),
        ).await?;
        if transition == Transition::Unchanged {
            return Ok((order, vec![]));
        }
        tx.update_order(&order).await?;

        // A direct cancel settles any open customer request along with it.
        let mut settled = None;
        if update.status == OrderStatus::Cancelled {
            if let Some(mut request) = tx.lock_pending_cancel_request(order_id).await? {
                let note = Some("order cancelled by an administrator".to_string());
                request.resolve(ReviewAction::Approve, admin_id, note.clone())?;
                tx.update_cancel_request(&request).await?;
                settled = Some((request, note));
            }
        }
        tx.commit().await?;

        let mut events = order.take_events();
        if let Some((request, note)) = settled {
            info!(request_id = %request.id, %order_id, "pending cancellation request settled by direct cancel");
            events.push(DomainEvent::Cancellation(CancellationEvent::Reviewed {
                request_id: request.id, order_id, order_number: order.order_number.clone(),
                user_id: request.requested_by, approved: true, note,
            }));
        }
        Ok((order, events))
    }

    /// Guarded payment update by an admin. With `force` the guard is bypassed
    /// through [`Self::override_payment_status`].
    #[instrument(skip(self, update), fields(actor = %actor, to = %update.payment_status))]
    pub async fn update_payment_status(&self, actor: Actor, order_id: Uuid, update: PaymentUpdate) -> Result<Order> {
        if update.force {
            let note = update.note.unwrap_or_default();
            return self.override_payment_status(actor, order_id, update.payment_status, note).await;
        }
        require_admin(actor, "change payment status")?;
        self.record_payment(actor, order_id, update.payment_status).await
    }

    pub async fn record_payment(&self, actor: Actor, order_id: Uuid, next: PaymentStatus) -> Result<Order> {
        let (order, events) = with_retry(&self.config.retry, "record_payment", move || {
            self.try_record_payment(actor, order_id, next)
        }).await?;
        self.dispatcher.dispatch(events);
        Ok(order)
    }

    async fn try_record_payment(&self, actor: Actor, order_id: Uuid, next: PaymentStatus) -> Result<(Order, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_id).await?.ok_or_else(|| EcommerceError::not_found("order", order_id))?;
        if order.set_payment_status(next)? == Transition::Unchanged {
            return Ok((order, vec![]));
        }
        if next == PaymentStatus::Paid {
            after_paid(tx.as_mut(), &mut order).await?;
        }
        tx.update_order(&order).await?;
        tx.commit().await?;
        info!(order_id = %order.id, payment_status = %next, %actor, "payment status recorded");
        let events = order.take_events();
        Ok((order, events))
    }

    /// Verify a gateway callback and record its verdict.
    pub async fn handle_payment_callback(&self, gateway: &dyn PaymentGateway, raw_payload: &[u8]) -> Result<Order> {
        let callback = gateway.verify_callback(raw_payload)?;
        let order_id = callback.order_id()?;
        let next = if callback.success { PaymentStatus::Paid } else { PaymentStatus::Failed };
        info!(%order_id, success = callback.success, transaction_id = ?callback.transaction_id, "payment callback");
        self.record_payment(Actor::system(), order_id, next).await
    }

    /// Unguarded payment change (e.g. paid back to pending after a bounced
    /// transfer). Admin only, needs a note, and always leaves a history entry.
    #[instrument(skip(self, note), fields(actor = %actor))]
    pub async fn override_payment_status(&self, actor: Actor, order_id: Uuid, next: PaymentStatus, note: String) -> Result<Order> {
        require_admin(actor, "override payment status")?;
        let note = note.trim().to_string();
        if note.is_empty() {
            return Err(EcommerceError::Validation("a note is required to override payment status".into()));
        }
        let note = &note;
        let (order, events) = with_retry(&self.config.retry, "override_payment_status", move || {
            self.try_override_payment(actor, order_id, next, note)
        }).await?;
        self.dispatcher.dispatch(events);
        Ok(order)
    }

    async fn try_override_payment(
        &self, actor: Actor, order_id: Uuid, next: PaymentStatus, note: &str,
    ) -> Result<(Order, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_id).await?.ok_or_else(|| EcommerceError::not_found("order", order_id))?;
        let from = order.payment_status();
        if order.override_payment_status(next, actor, note.to_string()) == Transition::Unchanged {
            return Ok((order, vec![]));
        }
        if next == PaymentStatus::Paid {
            after_paid(tx.as_mut(), &mut order).await?;
        }
        tx.update_order(&order).await?;
        tx.commit().await?;
        warn!(order_id = %order.id, %from, to = %next, %actor, note, "payment status overridden");
        let events = order.take_events();
        Ok((order, events))
    }
}
