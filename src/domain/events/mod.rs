//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use crate::domain::value_objects::Money;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    Order(OrderEvent),
    Cancellation(CancellationEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, user_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, order_number: String, user_id: Uuid, from: OrderStatus, to: OrderStatus },
    PaymentStatusChanged { order_id: Uuid, order_number: String, user_id: Uuid, from: PaymentStatus, to: PaymentStatus },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CancellationEvent {
    Requested { request_id: Uuid, order_id: Uuid, order_number: String, user_id: Uuid, reason: String },
    Reviewed { request_id: Uuid, order_id: Uuid, order_number: String, user_id: Uuid, approved: bool, note: Option<String> },
}
