//! Authentication errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token subject does not match the claimed user")]
    SubjectMismatch,
}

pub type AuthResult<T> = Result<T, AuthError>;
