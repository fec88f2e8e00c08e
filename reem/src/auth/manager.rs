//! Token verification.
//!
//! Tokens are issued by the external auth service; this server only checks
//! the HS256 signature and that the signed subject matches the user id the
//! connection claims to be.

use super::{
    errors::{AuthError, AuthResult},
    models::AccessClaims,
};
use crate::ledger::UserId;
use jsonwebtoken::{decode, DecodingKey, Validation};

#[derive(Clone)]
pub struct AuthVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    pub fn new(token_secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(token_secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Verify a token and bind it to the claimed user id. A mismatch means
    /// the caller presented someone else's token; the connection is closed
    /// without detail.
    pub fn verify(&self, token: &str, claimed_user: UserId) -> AuthResult<AccessClaims> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)?;
        if data.claims.sub != claimed_user {
            return Err(AuthError::SubjectMismatch);
        }
        Ok(data.claims)
    }
}
