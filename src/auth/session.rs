//! Session token handed to clients after an ERP login.
//!
//! The token is `base64("{personnel}:{csrf}:{basic}:{cookie}")`. It is never
//! stored server-side; clients present it again on ERP-bound calls.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

const SEGMENTS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionTokenError {
    #[error("session token is not valid base64")]
    Encoding,
    #[error("session token is not valid UTF-8")]
    Utf8,
    #[error("session token has {0} segments, expected 4")]
    Segments(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub personnel_number: String,
    pub csrf_token: String,
    pub basic_auth: String,
    pub cookie: String,
}

impl SessionToken {
    pub fn new(
        personnel_number: impl Into<String>,
        csrf_token: impl Into<String>,
        basic_auth: impl Into<String>,
        cookie: impl Into<String>,
    ) -> Self {
        Self {
            personnel_number: personnel_number.into(),
            csrf_token: csrf_token.into(),
            basic_auth: basic_auth.into(),
            cookie: cookie.into(),
        }
    }

    pub fn encode(&self) -> String {
        let raw = format!(
            "{}:{}:{}:{}",
            self.personnel_number, self.csrf_token, self.basic_auth, self.cookie
        );
        BASE64.encode(raw)
    }

    pub fn decode(token: &str) -> Result<Self, SessionTokenError> {
        let bytes = BASE64
            .decode(token.trim())
            .map_err(|_| SessionTokenError::Encoding)?;
        let raw = String::from_utf8(bytes).map_err(|_| SessionTokenError::Utf8)?;

        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != SEGMENTS {
            return Err(SessionTokenError::Segments(parts.len()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

/// Basic credential value (without the `Basic ` prefix) for a user/secret pair.
pub fn basic_credentials(user: &str, secret: &str) -> String {
    BASE64.encode(format!("{user}:{secret}"))
}
