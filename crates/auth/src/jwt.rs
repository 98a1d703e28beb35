//! Local HS256 token verification.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::claims::{JwtClaims, validate_claims};
use crate::identity::{AuthError, Identity, IdentityVerifier};

/// Verifies HS256-signed JWTs against a shared secret.
///
/// Used when tokens are minted by a provider that shares its signing secret
/// with this service (or by tests).
pub struct Hs256Verifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256Verifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        // Audience is provider-specific; not checked here.
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl std::fmt::Debug for Hs256Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hs256Verifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityVerifier for Hs256Verifier {
    async fn verify(&self, bearer_token: &str) -> Result<Identity, AuthError> {
        let data = decode::<JwtClaims>(bearer_token, &self.key, &self.validation)
            .map_err(|e| AuthError::rejected(format!("invalid token: {e}")))?;

        validate_claims(&data.claims, Utc::now()).map_err(|e| AuthError::rejected(e.to_string()))?;

        Ok(Identity {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}
