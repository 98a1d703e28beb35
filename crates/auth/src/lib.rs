//! `jobgate-auth` — the identity boundary consumed by job submission.
//!
//! Turns a bearer credential into an [`Identity`]. This crate knows nothing
//! about HTTP routing or storage; callers hand it the raw header value.

pub mod claims;
pub mod identity;
pub mod jwt;
pub mod remote;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use identity::{AuthError, Identity, IdentityVerifier, extract_bearer};
pub use jwt::Hs256Verifier;
pub use remote::RemoteIdentityVerifier;
