//! Authentication models.

use serde::{Deserialize, Serialize};

use crate::ledger::UserId;

/// Claims carried by an access token issued by the external auth service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccessClaims {
    /// Subject: the user id the token was issued for.
    pub sub: UserId,
    pub username: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
}
