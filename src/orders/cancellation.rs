//! Customer cancellation requests and their admin review.

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::state_machine::apply_transition;
use super::{require_admin, require_user, OrderServices};
use crate::domain::aggregates::{CancelRequest, Order, OrderStatus, ReviewAction};
use crate::domain::events::{CancellationEvent, DomainEvent};
use crate::domain::value_objects::Actor;
use crate::store::retry::with_retry;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct CancelRequestInput {
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CancelReview {
    pub action: ReviewAction,
    #[serde(default)]
    pub note: Option<String>,
}

fn ensure_cancellable(order: &Order) -> Result<()> {
    if order.status().is_cancellable() { return Ok(()); }
    Err(EcommerceError::Conflict(format!(
        "Order {} can no longer be cancelled (status {})", order.order_number, order.status()
    )))
}

impl OrderServices {
    #[instrument(skip(self, reason), fields(actor = %actor))]
    pub async fn request_cancel(&self, actor: Actor, order_id: Uuid, reason: &str) -> Result<CancelRequest> {
        let user_id = require_user(actor)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EcommerceError::Validation("a cancellation reason is required".into()));
        }
        let (request, events) = with_retry(&self.config.retry, "request_cancel", move || {
            self.try_request_cancel(user_id, order_id, reason)
        }).await?;
        self.dispatcher.dispatch(events);
        Ok(request)
    }

    async fn try_request_cancel(&self, user_id: Uuid, order_id: Uuid, reason: &str) -> Result<(CancelRequest, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        let order = tx.lock_order(order_id).await?.ok_or_else(|| EcommerceError::not_found("order", order_id))?;
        if !order.is_owned_by(user_id) {
            return Err(EcommerceError::Forbidden("only the customer who placed the order may cancel it".into()));
        }
        ensure_cancellable(&order)?;
        if tx.lock_pending_cancel_request(order_id).await?.is_some() {
            return Err(EcommerceError::Conflict(format!(
                "Order {} already has a pending cancellation request", order.order_number
            )));
        }

        let request = CancelRequest::open(order_id, user_id, reason);
        tx.insert_cancel_request(&request).await?;
        tx.commit().await?;
        info!(request_id = %request.id, %order_id, %user_id, "cancellation requested");
        let event = DomainEvent::Cancellation(CancellationEvent::Requested {
            request_id: request.id, order_id, order_number: order.order_number, user_id, reason: request.reason.clone(),
        });
        Ok((request, vec![event]))
    }

    /// Approving cancels the order (restock, coupon release) in the same
    /// transaction that resolves the request.
    #[instrument(skip(self, review), fields(actor = %actor, action = ?review.action))]
    pub async fn review_cancel(&self, actor: Actor, order_id: Uuid, review: CancelReview) -> Result<(CancelRequest, Order)> {
        require_admin(actor, "review cancellation requests")?;
        let reviewer_id = require_user(actor)?;
        let review = &review;
        let (request, order, events) = with_retry(&self.config.retry, "review_cancel", move || {
            self.try_review_cancel(actor, reviewer_id, order_id, review)
        }).await?;
        self.dispatcher.dispatch(events);
        Ok((request, order))
    }

    async fn try_review_cancel(
        &self, actor: Actor, reviewer_id: Uuid, order_id: Uuid, review: &CancelReview,
    ) -> Result<(CancelRequest, Order, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_id).await?.ok_or_else(|| EcommerceError::not_found("order", order_id))?;
        let mut request = tx.lock_pending_cancel_request(order_id).await?
            .ok_or_else(|| EcommerceError::not_found("pending cancel request for order", order_id))?;
        ensure_cancellable(&order)?;

        let note = review.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        if review.action == ReviewAction::Approve {
            apply_transition(tx.as_mut(), &mut order, OrderStatus::Cancelled, actor, Some(request.reason.clone()), None).await?;
            tx.update_order(&order).await?;
        }
        request.resolve(review.action, reviewer_id, note.clone())?;
        tx.update_cancel_request(&request).await?;
        tx.commit().await?;
        info!(request_id = %request.id, %order_id, action = ?review.action, "cancellation reviewed");

        let mut events = order.take_events();
        events.push(DomainEvent::Cancellation(CancellationEvent::Reviewed {
            request_id: request.id, order_id, order_number: order.order_number.clone(), user_id: request.requested_by,
            approved: review.action == ReviewAction::Approve, note,
        }));
        Ok((request, order, events))
    }
}
