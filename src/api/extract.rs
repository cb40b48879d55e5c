//! Request extractors.
//!
//! Authentication happens upstream; the gateway forwards the caller's
//! identity as `x-user-id` and `x-user-role` headers.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use uuid::Uuid;

use super::error::ApiError;
use crate::domain::value_objects::{Actor, Role};
use crate::EcommerceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// `Json` whose rejections use the service's error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        let Some(raw_id) = header(USER_ID_HEADER) else {
            tracing::warn!(uri = %parts.uri, "request without caller identity");
            return Err(EcommerceError::Forbidden("missing caller identity".into()).into());
        };
        let id = Uuid::parse_str(raw_id)
            .map_err(|_| EcommerceError::Forbidden(format!("malformed caller identity {raw_id:?}")))?;
        let role = match header(USER_ROLE_HEADER) {
            None | Some("customer") | Some("user") => Role::Customer,
            Some("admin") => Role::Admin,
            Some(other) => return Err(EcommerceError::Forbidden(format!("unknown role {other:?}")).into()),
        };
        Ok(Actor { id: Some(id), role })
    }
}
