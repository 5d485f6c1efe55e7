//! Trigger authentication

use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};

use crate::utils::constant_time_eq;

/// Dedicated header carrying the shared secret
pub const SECRET_HEADER: &str = "x-shiphook-secret";

/// Admits or rejects triggers based on the configured shared secret.
///
/// The secret may arrive as `Authorization: Bearer <secret>` or in the
/// `X-Shiphook-Secret` header; the bearer token wins when both are sent.
#[derive(Debug)]
pub struct AuthGuard {
    secret: Option<SecretString>,
}

impl AuthGuard {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Every request is admitted when no secret is configured.
    pub fn admit(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        match presented_secret(headers) {
            Some(token) => constant_time_eq(token.as_bytes(), secret.expose_secret().as_bytes()),
            None => false,
        }
    }
}

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    bearer.or_else(|| headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()))
}
