//! Token exchange against an external identity provider.
//!
//! The provider exposes `GET {base}/auth/v1/user`, which answers with the user
//! object for a valid access token and 401/403 otherwise.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use jobgate_core::UserId;

use crate::identity::{AuthError, Identity, IdentityVerifier};

const USER_PATH: &str = "/auth/v1/user";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default, alias = "msg", alias = "error_description")]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteIdentityVerifier {
    http: reqwest::Client,
    user_url: String,
    api_key: Option<String>,
}

impl RemoteIdentityVerifier {
    pub fn new(base_url: impl AsRef<str>, api_key: Option<String>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            user_url: format!("{}{}", base_url.as_ref().trim_end_matches('/'), USER_PATH),
            api_key,
        })
    }

    pub fn user_url(&self) -> &str {
        &self.user_url
    }
}

#[async_trait]
impl IdentityVerifier for RemoteIdentityVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<Identity, AuthError> {
        let mut request = self.http.get(&self.user_url).bearer_auth(bearer_token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, url = %self.user_url, "identity provider request failed");
            AuthError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        identity_from_response(status, &body)
    }
}

fn identity_from_response(status: StatusCode, body: &str) -> Result<Identity, AuthError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let reason = serde_json::from_str::<ProviderError>(body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| "User not found".to_string());
        return Err(AuthError::Rejected(reason));
    }

    if !status.is_success() {
        return Err(AuthError::Unavailable(format!("provider answered {status}")));
    }

    let user: ProviderUser = serde_json::from_str(body)
        .map_err(|e| AuthError::Unavailable(format!("unexpected user payload: {e}")))?;

    let user_id: UserId = user
        .id
        .parse()
        .map_err(|_| AuthError::rejected("User not found"))?;

    Ok(Identity {
        user_id,
        email: user.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_user_url_without_double_slash() {
        let verifier = RemoteIdentityVerifier::new("http://auth.local/", None).unwrap();
        assert_eq!(verifier.user_url(), "http://auth.local/auth/v1/user");
    }

    #[test]
    fn parses_user_object() {
        let user = UserId::new();
        let body = format!(r#"{{"id":"{user}","email":"a@b.c","aud":"authenticated"}}"#);

        let identity = identity_from_response(StatusCode::OK, &body).unwrap();
        assert_eq!(identity.user_id, user);
        assert_eq!(identity.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn unauthorized_carries_provider_message() {
        let err = identity_from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"msg":"invalid JWT: token is expired"}"#,
        )
        .unwrap_err();
        assert_eq!(err, AuthError::Rejected("invalid JWT: token is expired".into()));
    }

    #[test]
    fn server_errors_are_unavailability_not_rejection() {
        let err = identity_from_response(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
    }
}
