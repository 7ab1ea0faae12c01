use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("handshake called out of order: expected step {expected}, at step {actual}")]
    OutOfOrder { expected: u8, actual: u8 },

    #[error("handshake already complete")]
    AlreadyComplete,

    #[error("message authentication failed (possible tampering)")]
    Decrypt,

    #[error("message encryption failed")]
    Encrypt,

    #[error("invalid public key material")]
    InvalidKey,

    #[error("remote static key not yet known at this step")]
    RemoteStaticUnknown,
}
