use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Internal Server Error: {0:#}")]
    Internal(#[from] anyhow::Error),
    #[error("{0}")]
    Publish(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not allowed to modify this recipe")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    TooLarge(String),
}

impl WebError {
    pub fn status(&self) -> http::StatusCode {
        match self {
            WebError::Internal(_) | WebError::Publish(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            WebError::InvalidInput(_) => http::StatusCode::BAD_REQUEST,
            WebError::Auth(_) => http::StatusCode::UNAUTHORIZED,
            WebError::Forbidden => http::StatusCode::FORBIDDEN,
            WebError::NotFound(_) => http::StatusCode::NOT_FOUND,
            WebError::TooLarge(_) => http::StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        // Messages go back to the client verbatim, including internal ones
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == http::StatusCode::PAYLOAD_TOO_LARGE {
            WebError::TooLarge(rejection.body_text())
        } else {
            WebError::InvalidInput(rejection.body_text())
        }
    }
}

/// Like [`Json`], but a body that cannot be read or parsed is answered
/// the same way as every other error.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(WebError::InvalidInput("x".into()).status(), 400);
        assert_eq!(WebError::Auth("x".into()).status(), 401);
        assert_eq!(WebError::Forbidden.status(), 403);
        assert_eq!(WebError::NotFound("x".into()).status(), 404);
        assert_eq!(WebError::Publish("x".into()).status(), 500);
        assert_eq!(WebError::TooLarge("x".into()).status(), 413);
        assert_eq!(
            WebError::from(anyhow::anyhow!("disk on fire")).status(),
            500
        );
    }

    #[test]
    fn publish_message_is_passed_through() {
        let err = WebError::Publish("copy failed: bucket gone".into());
        assert_eq!(err.to_string(), "copy failed: bucket gone");
        assert_eq!(err.into_response().status(), 500);
    }
}
