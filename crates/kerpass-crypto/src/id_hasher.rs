//! `IdHasher` — seeded HKDF/SHA-256 derivation engine.
//!
//! Construction performs a single HKDF-Extract over the seed to obtain a
//! PRK, then three independent HKDF-Expand calls produce the per-context
//! salts used by every other derivation in this crate. The three info
//! strings below are a wire-visible contract shared with every other
//! KerPass implementation — never change them.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::keys::{EnrollAccess, EnrollAccessKind, ServerCardAccess, ServerCardAccessKind};

const SALT_USER_ID_IDTOKEN: &[u8] = b"salt:card:UserId/IdToken";
const SALT_IDTOKEN_DERIVATION: &[u8] = b"salt:card:IdToken/Derivation";
const SALT_ENROLLTOKEN_DERIVATION: &[u8] = b"salt:authorization:EnrollToken/Derivation";

/// Seed used when the caller does not supply one. Stable across versions.
const DEFAULT_SEED: &[u8] = b"kerpass/id-hasher/default-seed/v1";

/// Output of deriving access keys from a card or enrollment token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessKeys {
    pub id_key: [u8; 32],
    pub storage_key: [u8; 32],
}

/// Immutable, thread-safe derivation engine. All state is fixed at
/// construction time, so a single instance may be shared across sessions.
pub struct IdHasher {
    salt_user_id_idtoken: [u8; 32],
    salt_idtoken_derivation: [u8; 32],
    salt_enrolltoken_derivation: [u8; 32],
}

impl IdHasher {
    /// Build an `IdHasher` from a seed. An empty seed falls back to the
    /// built-in default seed constant.
    pub fn new(seed: &[u8]) -> Self {
        let seed = if seed.is_empty() { DEFAULT_SEED } else { seed };
        let (prk, _) = Hkdf::<Sha256>::extract(None, seed);
        let hk = Hkdf::<Sha256>::from_prk(&prk).expect("extracted PRK is always valid length");

        let mut salt_user_id_idtoken = [0u8; 32];
        let mut salt_idtoken_derivation = [0u8; 32];
        let mut salt_enrolltoken_derivation = [0u8; 32];
        hk.expand(SALT_USER_ID_IDTOKEN, &mut salt_user_id_idtoken)
            .expect("32 bytes is within HKDF-SHA256 expand limits");
        hk.expand(SALT_IDTOKEN_DERIVATION, &mut salt_idtoken_derivation)
            .expect("32 bytes is within HKDF-SHA256 expand limits");
        hk.expand(SALT_ENROLLTOKEN_DERIVATION, &mut salt_enrolltoken_derivation)
            .expect("32 bytes is within HKDF-SHA256 expand limits");

        Self {
            salt_user_id_idtoken,
            salt_idtoken_derivation,
            salt_enrolltoken_derivation,
        }
    }

    /// Build an `IdHasher` with the default seed.
    pub fn default_seeded() -> Self {
        Self::new(&[])
    }

    /// Deterministic 32-byte IdToken for (realmId, userId).
    pub fn id_token_of_user_id(&self, realm_id: &[u8], user_id: &[u8]) -> Result<[u8; 32], CryptoError> {
        if realm_id.len() != 32 {
            return Err(CryptoError::InvalidRealmId(format!(
                "realm id must be 32 bytes, got {}",
                realm_id.len()
            )));
        }
        if user_id.is_empty() || user_id.len() > 255 {
            return Err(CryptoError::InvalidUserId(format!(
                "user id must be 1..=255 bytes, got {}",
                user_id.len()
            )));
        }

        const LABEL: &[u8] = b"UserId/IdToken";
        let mut info = Vec::with_capacity(2 + LABEL.len() + 2 + realm_id.len());
        info.push(b'I');
        info.push(LABEL.len() as u8);
        info.extend_from_slice(LABEL);
        info.push(b'R');
        info.push(realm_id.len() as u8);
        info.extend_from_slice(realm_id);

        let hk = Hkdf::<Sha256>::new(Some(&self.salt_user_id_idtoken), user_id);
        let mut out = [0u8; 32];
        hk.expand(&info, &mut out)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(out)
    }

    /// Derive `AccessKeys` from a card-side access key (`IdToken` or
    /// `OtpId`). Both paths produce bit-identical results for equivalent
    /// inputs, since `OtpId` is resolved to an `IdToken` first.
    pub fn derive_from_card_access(&self, access: &ServerCardAccess) -> Result<AccessKeys, CryptoError> {
        let id_token = match &access.0 {
            ServerCardAccessKind::IdToken(token) => *token,
            ServerCardAccessKind::OtpId { realm, username } => {
                self.id_token_of_user_id(realm, username.as_bytes())?
            }
        };

        let hk = Hkdf::<Sha256>::new(Some(&self.salt_idtoken_derivation), &id_token);
        let mut id_key = [0u8; 32];
        let mut storage_key = [0u8; 32];
        hk.expand(b"IdToken/IdKey", &mut id_key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        hk.expand(b"IdToken/StorageKey", &mut storage_key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(AccessKeys { id_key, storage_key })
    }

    /// Derive `AccessKeys` from a single-use enrollment token.
    pub fn derive_from_enroll_access(&self, access: &EnrollAccess) -> Result<AccessKeys, CryptoError> {
        let EnrollAccessKind::EnrollToken(token) = &access.0;

        let hk = Hkdf::<Sha256>::new(Some(&self.salt_enrolltoken_derivation), token);
        let mut id_key = [0u8; 32];
        let mut storage_key = [0u8; 32];
        hk.expand(b"EnrollToken/IdKey", &mut id_key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        hk.expand(b"EnrollToken/StorageKey", &mut storage_key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(AccessKeys { id_key, storage_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm() -> [u8; 32] {
        [1u8; 32]
    }

    #[test]
    fn id_token_of_user_id_is_deterministic() {
        let h = IdHasher::default_seeded();
        let a = h.id_token_of_user_id(&realm(), b"alice").unwrap();
        let b = h.id_token_of_user_id(&realm(), b"alice").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn rejects_bad_realm_and_user_id_lengths() {
        let h = IdHasher::default_seeded();
        assert!(h.id_token_of_user_id(&[0u8; 31], b"alice").is_err());
        assert!(h.id_token_of_user_id(&realm(), b"").is_err());
        let long = vec![b'a'; 256];
        assert!(h.id_token_of_user_id(&realm(), &long).is_err());
    }

    #[test]
    fn id_token_and_otp_id_paths_agree() {
        let h = IdHasher::default_seeded();
        let token = h.id_token_of_user_id(&realm(), b"alice").unwrap();

        let via_token = h.derive_from_card_access(&ServerCardAccess::id_token(&token).unwrap()).unwrap();
        let via_otp = h
            .derive_from_card_access(&ServerCardAccess::otp_id(realm(), "alice"))
            .unwrap();

        assert_eq!(via_token.id_key, via_otp.id_key);
        assert_eq!(via_token.storage_key, via_otp.storage_key);
    }

    #[test]
    fn id_key_and_storage_key_are_distinct_and_nonzero() {
        let h = IdHasher::default_seeded();
        let token = h.id_token_of_user_id(&realm(), b"alice").unwrap();
        let keys = h.derive_from_card_access(&ServerCardAccess::id_token(&token).unwrap()).unwrap();
        assert_ne!(keys.id_key, keys.storage_key);
        assert_ne!(keys.id_key, [0u8; 32]);
        assert_ne!(keys.storage_key, [0u8; 32]);
    }

    #[test]
    fn different_seeds_diverge() {
        let h1 = IdHasher::new(b"seed-one");
        let h2 = IdHasher::new(b"seed-two");
        let a = h1.id_token_of_user_id(&realm(), b"alice").unwrap();
        let b = h2.id_token_of_user_id(&realm(), b"alice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn card_and_enroll_salts_are_isolated() {
        let h = IdHasher::default_seeded();
        let raw = [7u8; 32];
        let card = h.derive_from_card_access(&ServerCardAccess::id_token(&raw).unwrap()).unwrap();
        let enroll = h.derive_from_enroll_access(&EnrollAccess::enroll_token(&raw).unwrap()).unwrap();
        assert_ne!(card.id_key, enroll.id_key);
    }
}
