//! Caller identity forwarded by the gateway

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::domain::value_objects::{Caller, Role};
use crate::OrderError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Reads `x-user-id` and `x-user-role`. A missing role means a regular user.
#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = OrderError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        let user_id = header(USER_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(OrderError::Unauthenticated)?;
        let role = match header(USER_ROLE_HEADER) {
            None | Some("") => Role::User,
            Some(raw) => raw.parse::<Role>().map_err(|e| {
                tracing::warn!(%user_id, error = %e, "Rejected caller role");
                OrderError::Unauthenticated
            })?,
        };
        Ok(Caller { user_id, role })
    }
}
