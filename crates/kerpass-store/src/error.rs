use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid authorization: {0}")]
    InvalidAuthorization(String),

    #[error("card mutation rejected: realm_id and id_token are frozen once a card is stored ({0})")]
    CardMutation(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] kerpass_crypto::CryptoError),

    #[error("internal store error: {0}")]
    Internal(String),
}
