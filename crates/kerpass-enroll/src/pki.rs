//! The certificate check the client runs against the server's static key
//! and the certificate bytes carried in handshake message 2.
//!
//! This is a pluggable policy boundary, not a detail: [`StubPkiCheck`]
//! rejects only empty inputs and MUST be replaced with real chain
//! validation against the realm's CA Merkle tree before production use.

use kerpass_proto::ProtoError;

pub trait PkiCheck: Send + Sync {
    fn check(&self, server_static_key: &[u8], certificate: &[u8]) -> Result<(), ProtoError>;
}

pub struct StubPkiCheck;

impl PkiCheck for StubPkiCheck {
    fn check(&self, server_static_key: &[u8], certificate: &[u8]) -> Result<(), ProtoError> {
        if server_static_key.is_empty() || certificate.is_empty() {
            return Err(ProtoError::Validation("server static key or certificate missing".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_rejects_only_empty_inputs() {
        let pki = StubPkiCheck;
        assert!(pki.check(&[1, 2, 3], b"cert").is_ok());
        assert!(pki.check(&[], b"cert").is_err());
        assert!(pki.check(&[1, 2, 3], b"").is_err());
    }
}
