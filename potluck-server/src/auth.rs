use async_trait::async_trait;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::WebError;

/// Header the upstream auth provider sets on every request it lets through
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The user making the request, as vouched for by the auth provider in front of us.
/// Use this as a request guard to get the caller's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

impl CurrentUser {
    fn from_parts(parts: &Parts) -> Result<Self, WebError> {
        let no = |msg: &str| WebError::Auth(msg.into());
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(no("No user id"))?
            .to_str()
            .map_err(|_| no("Invalid user id header"))?;
        let user_id = value
            .trim()
            .parse::<i64>()
            .map_err(|_| no("User id must be an integer"))?;
        Ok(Self(user_id))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}
