use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid realm id: {0}")]
    InvalidRealmId(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("card id generator misconfigured: {0}")]
    Generator(String),

    #[error("context unavailable: {0}")]
    Context(String),
}
