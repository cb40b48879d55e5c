//! OpenSASE Orders
//!
//! Transactional order engine for the OpenSASE e-commerce platform.
//!
//! ## Features
//! - Per-size inventory reservation with no oversell under concurrency
//! - Single-coupon discounts with usage caps and per-user limits
//! - Order status state machine with restock and coupon release on cancellation
//! - Customer cancellation requests with admin review
//! - Payment callbacks and cash-on-delivery settlement

pub mod api;
pub mod catalog;
pub mod config;
pub mod coupons;
pub mod domain;
pub mod inventory;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod store;

use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{CancelRequestError, CouponRejection, OrderError, OrderStatus, PaymentStatus};
use crate::domain::value_objects::{Money, ValueError};
use crate::store::StoreError;

pub use crate::config::Config;
pub use crate::orders::OrderServices;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Unavailable(String),

    #[error("Not enough stock for {product} (size {size}): requested {requested}, remaining {remaining}")]
    InsufficientStock { product: String, size: String, requested: u32, remaining: u32 },

    #[error("Coupon {code}: {reason}")]
    Coupon { code: String, reason: CouponRejection },

    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot change payment status from {from} to {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("Order total has changed: expected {expected}, submitted {submitted}")]
    TotalMismatch { expected: Money, submitted: Money },

    #[error("{0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("{operation} could not be completed after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error class carried in every error response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind { Validation, NotFound, Conflict, Authorization, TransactionAbort, Internal }

impl EcommerceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Coupon { reason: CouponRejection::NotFound, .. } => ErrorKind::NotFound,
            Self::Unavailable(_)
            | Self::InsufficientStock { .. }
            | Self::Coupon { .. }
            | Self::InvalidTransition { .. }
            | Self::InvalidPaymentTransition { .. }
            | Self::TotalMismatch { .. }
            | Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Authorization,
            Self::TransactionAborted(_) | Self::RetriesExhausted { .. } => ErrorKind::TransactionAbort,
            Self::StorageError(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::TransactionAbort | ErrorKind::Internal)
    }
}

impl From<StoreError> for EcommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SerializationFailure(msg) => Self::TransactionAborted(msg),
            other => Self::StorageError(other.to_string()),
        }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::InvalidPaymentTransition { from, to } => Self::InvalidPaymentTransition { from, to },
            OrderError::NoItems | OrderError::CancelReasonRequired | OrderError::UnknownStatus(_) => {
                Self::Validation(e.to_string())
            }
            OrderError::TotalMismatch { .. } => Self::Internal(e.to_string()),
        }
    }
}

impl From<ValueError> for EcommerceError {
    fn from(e: ValueError) -> Self { Self::Validation(e.to_string()) }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

impl From<CancelRequestError> for EcommerceError {
    fn from(e: CancelRequestError) -> Self { Self::Conflict(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
