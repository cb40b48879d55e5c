//! Order creation.
//!
//! One transaction covers address resolution, stock reservation, coupon
//! redemption and the order insert. Any error drops the transaction, which
//! rolls every earlier step back.

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{require_user, OrderServices};
use crate::catalog;
use crate::coupons::CouponLedger;
use crate::domain::aggregates::{
    CouponRejection, LineItem, NewAddress, Order, OrderDraft, PaymentMethod, SavedAddress, ShippingAddress,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Actor, CouponCode, Money};
use crate::inventory::InventoryLedger;
use crate::store::retry::with_retry;
use crate::store::StoreTx;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub size_id: Uuid,
    /// Signed so that a negative quantity is a validation error, not a decode error.
    pub quantity: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressInput {
    Saved { address_id: Uuid },
    Inline {
        address: NewAddress,
        #[serde(default)]
        save_address: bool,
    },
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateOrder {
    pub items: Vec<CartLine>,
    pub address: AddressInput,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Total the client displayed; checked against ours.
    #[serde(default)]
    pub expected_total: Option<Money>,
}

impl CreateOrder {
    fn validated_quantities(&self) -> Result<Vec<u32>> {
        if self.items.is_empty() {
            return Err(EcommerceError::Validation("order must contain at least one item".into()));
        }
        self.items.iter().enumerate().map(|(i, line)| {
            u32::try_from(line.quantity).ok().filter(|q| *q > 0).ok_or_else(|| {
                EcommerceError::Validation(format!("item {}: quantity must be a positive integer", i + 1))
            })
        }).collect()
    }
}

impl OrderServices {
    #[instrument(skip(self, input), fields(actor = %actor, items = input.items.len()))]
    pub async fn create_order(&self, actor: Actor, input: CreateOrder) -> Result<Order> {
        let user_id = require_user(actor)?;
        let quantities = input.validated_quantities()?;
        let input = &input;
        let quantities = &quantities;
        let (order, events) = with_retry(&self.config.retry, "create_order", move || {
            self.try_create_order(actor, user_id, input, quantities)
        }).await?;
        self.dispatcher.dispatch(events);
        Ok(order)
    }

    async fn try_create_order(
        &self, actor: Actor, user_id: Uuid, input: &CreateOrder, quantities: &[u32],
    ) -> Result<(Order, Vec<DomainEvent>)> {
        let mut tx = self.store.begin().await?;
        let shipping_address = resolve_address(tx.as_mut(), user_id, &input.address).await?;

        let mut items = Vec::with_capacity(input.items.len());
        for (line, &quantity) in input.items.iter().zip(quantities) {
            let key = catalog::key_of(line.product_id, line.variant_id, line.size_id);
            let snapshot = InventoryLedger::reserve(tx.as_mut(), &key, quantity).await?;
            items.push(LineItem {
                product_id: key.product_id, variant_id: key.variant_id, size_id: key.size_id,
                product_name: snapshot.product_name, size_label: snapshot.size_label, sku: snapshot.sku,
                quantity, unit_price: snapshot.unit_price, unit_cost: snapshot.unit_cost,
            });
        }
        let sub_total = items.iter().fold(Money::ZERO, |acc, i| acc + i.line_total());

        let (coupon, discount_amount) = match input.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => {
                let code = CouponCode::new(raw).map_err(|_| EcommerceError::Coupon {
                    code: raw.to_uppercase(), reason: CouponRejection::NotFound,
                })?;
                let (applied, discount) = CouponLedger::apply(tx.as_mut(), &code, sub_total, user_id).await?;
                (Some(applied), discount)
            }
            None => (None, Money::ZERO),
        };

        let draft = OrderDraft {
            user_id, items, shipping_address, coupon, discount_amount,
            shipping_price: self.config.shipping.price_for(sub_total),
            payment_method: input.payment_method,
            note: input.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        };
        let mut order = Order::place(generate_order_number(), draft, actor)?;

        if let Some(expected) = input.expected_total {
            if order.total_amount().abs_diff(expected) > self.config.total_tolerance {
                return Err(EcommerceError::TotalMismatch { expected: order.total_amount(), submitted: expected });
            }
        }

        tx.insert_order(&order).await?;
        tx.commit().await?;
        info!(order_id = %order.id, order_number = %order.order_number, %user_id, total = %order.total_amount(), "order created");
        let events = order.take_events();
        Ok((order, events))
    }
}

async fn resolve_address(tx: &mut dyn StoreTx, user_id: Uuid, input: &AddressInput) -> Result<ShippingAddress> {
    match input {
        AddressInput::Saved { address_id } => tx.find_address(user_id, *address_id).await?
            .map(|saved| saved.address)
            .ok_or_else(|| EcommerceError::not_found("address", address_id)),
        AddressInput::Inline { address, save_address } => {
            let address = address.normalised();
            address.validate()?;
            let shipping = address.to_shipping_address();
            if *save_address {
                let first = tx.count_addresses(user_id).await? == 0;
                tx.insert_address(&SavedAddress::new(user_id, shipping.clone(), first)).await?;
            }
            Ok(shipping)
        }
    }
}

fn generate_order_number() -> String {
    format!("ORD-{:08}", rand::random::<u32>() % 100_000_000)
}
