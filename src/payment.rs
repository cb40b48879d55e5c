//! Payment gateway callbacks.
//!
//! Signature checking belongs to the gateway adapter in front of this
//! service; what arrives here is already authenticated.

use serde::Deserialize;
use uuid::Uuid;

use crate::{EcommerceError, Result};

/// Gateway verdict for one order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PaymentCallback {
    /// Order id the payment was initiated for.
    pub order_ref: String,
    pub success: bool,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl PaymentCallback {
    pub fn order_id(&self) -> Result<Uuid> {
        Uuid::parse_str(self.order_ref.trim())
            .map_err(|_| EcommerceError::Validation(format!("unknown order reference {:?}", self.order_ref)))
    }
}

pub trait PaymentGateway: Send + Sync {
    fn verify_callback(&self, raw_payload: &[u8]) -> Result<PaymentCallback>;
}

/// Decodes the JSON body forwarded by the gateway adapter.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCallbackGateway;

impl PaymentGateway for JsonCallbackGateway {
    fn verify_callback(&self, raw_payload: &[u8]) -> Result<PaymentCallback> {
        serde_json::from_slice(raw_payload)
            .map_err(|e| EcommerceError::Validation(format!("malformed payment callback: {e}")))
    }
}
