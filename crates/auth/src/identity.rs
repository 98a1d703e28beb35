use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobgate_core::UserId;

/// An authenticated caller, as resolved by an [`IdentityVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingCredential,

    #[error("malformed authorization header")]
    MalformedCredential,

    /// The identity provider looked at the credential and said no.
    #[error("{0}")]
    Rejected(String),

    /// The identity provider could not be asked (transport failure, 5xx).
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Exchanges a bearer credential for a user identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<Identity, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedCredential)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MalformedCredential);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_after_scheme() {
        assert_eq!(extract_bearer(Some("Bearer abc.def")), Ok("abc.def"));
    }

    #[test]
    fn missing_header_is_distinguished_from_malformed() {
        assert_eq!(extract_bearer(None), Err(AuthError::MissingCredential));
        assert_eq!(
            extract_bearer(Some("Basic dXNlcg==")),
            Err(AuthError::MalformedCredential)
        );
        assert_eq!(
            extract_bearer(Some("Bearer   ")),
            Err(AuthError::MalformedCredential)
        );
    }
}
