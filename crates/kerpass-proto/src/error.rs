//! Unified protocol error taxonomy. This is the error kind every enrollment
//! state function, store call, and transport operation ultimately surfaces
//! as — not a type, a set of kinds, per the external interface contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid authorization: {0}")]
    InvalidAuthorization(String),

    #[error("card mutation rejected: {0}")]
    CardMutation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtoError {
    /// True for errors that should never leak internal detail over HTTP.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ProtoError::Validation(_) | ProtoError::NotFound(_) | ProtoError::InvalidAuthorization(_) | ProtoError::CardMutation(_)
        )
    }
}

impl From<kerpass_store::StoreError> for ProtoError {
    fn from(e: kerpass_store::StoreError) -> Self {
        use kerpass_store::StoreError as S;
        match e {
            S::Validation(m) => ProtoError::Validation(m),
            S::NotFound(m) => ProtoError::NotFound(m),
            S::InvalidAuthorization(m) => ProtoError::InvalidAuthorization(m),
            S::CardMutation(m) => ProtoError::CardMutation(m),
            S::Crypto(c) => ProtoError::Crypto(c.to_string()),
            S::Internal(m) => ProtoError::Internal(m),
        }
    }
}

impl From<kerpass_crypto::CryptoError> for ProtoError {
    fn from(e: kerpass_crypto::CryptoError) -> Self {
        ProtoError::Crypto(e.to_string())
    }
}

impl From<kerpass_noise::NoiseError> for ProtoError {
    fn from(e: kerpass_noise::NoiseError) -> Self {
        ProtoError::Crypto(e.to_string())
    }
}

impl From<serde_cbor::Error> for ProtoError {
    fn from(e: serde_cbor::Error) -> Self {
        ProtoError::Validation(format!("malformed cbor: {e}"))
    }
}

impl From<std::io::Error> for ProtoError {
    fn from(e: std::io::Error) -> Self {
        ProtoError::Transport(e.to_string())
    }
}
