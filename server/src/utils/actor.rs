//! Acting identity, set by the auth gateway in front of this service.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::utils::error::AppError;

pub const ACTOR_HEADER: &str = "x-user-id";

/// The user on whose behalf a request runs. Handlers pass it on explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::AuthError(format!("Missing {ACTOR_HEADER} header")))?;
        let raw = value
            .to_str()
            .map_err(|_| AppError::AuthError(format!("Unreadable {ACTOR_HEADER} header")))?;
        Uuid::parse_str(raw.trim())
            .map(Actor)
            .map_err(|_| AppError::AuthError(format!("Invalid {ACTOR_HEADER} header")))
    }
}
