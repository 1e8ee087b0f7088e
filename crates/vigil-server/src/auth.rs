//! Token verification for HTTP and WebSocket entry points.
//!
//! Clients authenticate with a signed bearer token carrying their user id
//! and role. HTTP requests present it in the `Authorization` header; the
//! WebSocket handshake passes it as a `token` query parameter because
//! browsers cannot attach headers to an upgrade request.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use vigil_core::errors::DomainError;
use vigil_core::ids::UserId;
use vigil_core::session::Role;

/// The authenticated caller extracted from a verified token.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

/// Verifies a bearer token and produces the caller's identity.
///
/// A trait so tests and embedded deployments can swap in their own
/// verification without standing up a token issuer.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, DomainError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: String,
    role: Role,
}

/// HS256 verifier over a shared secret.
///
/// Expiry is enforced by the decoder; `leeway_secs` absorbs clock skew
/// between the issuer and this process.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, DomainError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|error| DomainError::forbidden(format!("invalid token: {error}")))?;
        Ok(Identity {
            user_id: UserId::from_string(data.claims.user_id),
            role: data.claims.role,
        })
    }
}
