//! Address book entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::order::ShippingAddress;
use crate::domain::value_objects::PHONE_PATTERN;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: ShippingAddress,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Inline address submitted at checkout; every field is required.
#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
pub struct NewAddress {
    #[validate(length(min = 1, max = 120, message = "recipient name is required"))]
    pub full_name: String,
    #[validate(regex(path = "PHONE_PATTERN", message = "phone number does not match the national format"))]
    pub phone: String,
    #[validate(length(min = 1, max = 255, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, max = 120, message = "ward is required"))]
    pub ward: String,
    #[validate(length(min = 1, max = 120, message = "district is required"))]
    pub district: String,
    #[validate(length(min = 1, max = 120, message = "city is required"))]
    pub city: String,
}

impl NewAddress {
    /// Trim every field and strip spaces from the phone before validation.
    pub fn normalised(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.chars().filter(|c| !c.is_whitespace()).collect(),
            street: self.street.trim().to_string(),
            ward: self.ward.trim().to_string(),
            district: self.district.trim().to_string(),
            city: self.city.trim().to_string(),
        }
    }

    pub fn to_shipping_address(&self) -> ShippingAddress {
        ShippingAddress {
            full_name: self.full_name.clone(), phone: self.phone.clone(), street: self.street.clone(),
            ward: self.ward.clone(), district: self.district.clone(), city: self.city.clone(),
        }
    }
}

impl SavedAddress {
    pub fn new(user_id: Uuid, address: ShippingAddress, is_default: bool) -> Self {
        Self { id: Uuid::now_v7(), user_id, address, is_default, created_at: Utc::now() }
    }
}
