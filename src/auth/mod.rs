pub mod cipher;
pub mod session;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue},
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use crate::error::AppError;

pub use cipher::PasswordCipher;
pub use session::{SessionToken, SessionTokenError};

/// ERP session presented by the client as `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct ErpSession(pub SessionToken);

#[async_trait]
impl<S> FromRequestParts<S> for ErpSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let token = SessionToken::decode(bearer.token()).map_err(|err| {
            tracing::debug!(error = %err, "rejected malformed session token");
            AppError::unauthorized()
        })?;

        // The CSRF token and cookie are replayed as outbound headers.
        if HeaderValue::from_str(&token.csrf_token).is_err()
            || HeaderValue::from_str(&token.cookie).is_err()
        {
            tracing::debug!("rejected session token with unusable header values");
            return Err(AppError::unauthorized());
        }

        Ok(ErpSession(token))
    }
}
