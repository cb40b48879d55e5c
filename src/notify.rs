//! Post-commit notifications.
//!
//! Domain events collected during a transaction are turned into
//! notifications after commit and handed to a [`Notifier`] on a spawned task.
//! Delivery is best effort: a failure is logged and never reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::events::{CancellationEvent, DomainEvent, OrderEvent};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish notification: {0}")]
    Publish(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum Recipient { User(Uuid), Admins }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind { OrderCreated, OrderStatus, PaymentStatus, CancelRequest }

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::OrderStatus => "order_status",
            Self::PaymentStatus => "payment_status",
            Self::CancelRequest => "cancel_request",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Uuid,
}

impl Notification {
    fn new(recipient: Recipient, kind: NotificationKind, related_id: Uuid, title: &str, message: String) -> Self {
        Self { recipient, title: title.to_string(), message, kind, related_id }
    }

    /// Who hears about an event, and what they are told.
    pub fn for_event(event: &DomainEvent) -> Vec<Notification> {
        use NotificationKind::*;
        match event {
            DomainEvent::Order(OrderEvent::Created { order_id, order_number, user_id, total }) => vec![
                Self::new(Recipient::User(*user_id), OrderCreated, *order_id, "Order placed",
                    format!("Your order {order_number} has been placed. Total: {total}")),
                Self::new(Recipient::Admins, OrderCreated, *order_id, "New order",
                    format!("Order {order_number} was placed for {total}")),
            ],
            DomainEvent::Order(OrderEvent::StatusChanged { order_id, order_number, user_id, to, .. }) => vec![
                Self::new(Recipient::User(*user_id), OrderStatus, *order_id, "Order updated",
                    format!("Your order {order_number} is now {to}")),
            ],
            DomainEvent::Order(OrderEvent::PaymentStatusChanged { order_id, order_number, user_id, to, .. }) => vec![
                Self::new(Recipient::User(*user_id), PaymentStatus, *order_id, "Payment updated",
                    format!("Payment for order {order_number} is {to}")),
            ],
            DomainEvent::Cancellation(CancellationEvent::Requested { order_id, order_number, user_id, reason, .. }) => vec![
                Self::new(Recipient::User(*user_id), CancelRequest, *order_id, "Cancellation requested",
                    format!("We received your request to cancel order {order_number}")),
                Self::new(Recipient::Admins, CancelRequest, *order_id, "Cancellation request",
                    format!("Order {order_number} cancellation requested: {reason}")),
            ],
            DomainEvent::Cancellation(CancellationEvent::Reviewed { order_id, order_number, user_id, approved, note, .. }) => {
                let verdict = if *approved { "approved" } else { "rejected" };
                let message = match note {
                    Some(note) => format!("Your cancellation request for order {order_number} was {verdict}: {note}"),
                    None => format!("Your cancellation request for order {order_number} was {verdict}"),
                };
                vec![Self::new(Recipient::User(*user_id), CancelRequest, *order_id, "Cancellation reviewed", message)]
            }
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Publishes each notification as JSON on `<prefix>.<kind>`.
pub struct NatsNotifier {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client, subject_prefix: "opensase.orders.notifications".to_string() }
    }

    pub async fn connect(url: &str) -> Result<Self, NotifyError> {
        let client = async_nats::connect(url).await.map_err(|e| NotifyError::Publish(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let subject = format!("{}.{}", self.subject_prefix, notification.kind.as_str());
        let payload = serde_json::to_vec(notification)?;
        self.client.publish(subject, payload.into()).await.map_err(|e| NotifyError::Publish(e.to_string()))
    }
}

/// Writes notifications to the log; used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        info!(recipient = ?n.recipient, kind = n.kind.as_str(), related_id = %n.related_id, title = %n.title, "{}", n.message);
        Ok(())
    }
}

/// Keeps every notification in memory. Can be told to fail every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }

    pub fn failing() -> Self { Self { sent: Mutex::default(), fail: true } }

    pub async fn sent(&self) -> Vec<Notification> { self.sent.lock().await.clone() }

    /// Wait up to a second for at least `count` notifications.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = self.sent().await;
            if sent.len() >= count { return sent; }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent().await
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail { return Err(NotifyError::Publish("broker unavailable".into())); }
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self { Self { notifier } }

    /// Fire and forget. Must only be called after the transaction committed.
    pub fn dispatch(&self, events: Vec<DomainEvent>) {
        let notifications: Vec<Notification> = events.iter().flat_map(Notification::for_event).collect();
        if notifications.is_empty() { return; }
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            for n in notifications {
                if let Err(e) = notifier.notify(&n).await {
                    warn!(error = %e, kind = n.kind.as_str(), related_id = %n.related_id, "notification not delivered");
                }
            }
        });
    }
}
