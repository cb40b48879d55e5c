//! Aggregates module
pub mod product;
pub mod order;
pub mod coupon;
pub mod cancel_request;
pub mod address;

pub use product::{Gender, Product, ProductError, ProductStatus, ProductVariant, SizeEntry, VariantHeader, VariantStatus};
pub use order::{
    AppliedCoupon, LineItem, Order, OrderDraft, OrderError, OrderStatus, PaymentMethod, PaymentStatus,
    ShippingAddress, StatusHistoryEntry, TrackingInfo, Transition,
};
pub use coupon::{Coupon, CouponRejection, DiscountType};
pub use cancel_request::{CancelRequest, CancelRequestError, CancelRequestStatus, ReviewAction};
pub use address::{NewAddress, SavedAddress};
