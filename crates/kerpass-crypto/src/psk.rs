//! Post-handshake PSK derivation, shared by both enrollment state machines.
//!
//! ```text
//! salt = 'R' || len(realmId) || realmId || 'P' || len("card-psk") || "card-psk"
//! ikm  = handshakeHash
//! info = cardId
//! psk  = HKDF(SHA-512, ikm, salt, info, 32)
//! ```

use hkdf::Hkdf;
use sha2::Sha512;

use crate::error::CryptoError;

const LABEL: &[u8] = b"card-psk";

/// Derive the 32-byte card PSK from the realm id, the post-handshake
/// transcript hash, and the freshly-assigned card id. Both enrollment
/// peers call this with the same three inputs and must agree bit-for-bit.
pub fn derive_card_psk(
    realm_id: &[u8],
    handshake_hash: &[u8],
    card_id: &[u8],
) -> Result<[u8; 32], CryptoError> {
    if realm_id.len() > 255 {
        return Err(CryptoError::InvalidRealmId(format!(
            "realm id too long for PSK salt encoding: {} bytes",
            realm_id.len()
        )));
    }

    let mut salt = Vec::with_capacity(2 + realm_id.len() + 2 + LABEL.len());
    salt.push(b'R');
    salt.push(realm_id.len() as u8);
    salt.extend_from_slice(realm_id);
    salt.push(b'P');
    salt.push(LABEL.len() as u8);
    salt.extend_from_slice(LABEL);

    let hk = Hkdf::<Sha512>::new(Some(&salt), handshake_hash);
    let mut psk = [0u8; 32];
    hk.expand(card_id, &mut psk)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(psk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_psk() {
        let a = derive_card_psk(&[1u8; 32], b"hh", b"card-1").unwrap();
        let b = derive_card_psk(&[1u8; 32], b"hh", b"card-1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differing_inputs_differ() {
        let base = derive_card_psk(&[1u8; 32], b"hh", b"card-1").unwrap();
        assert_ne!(base, derive_card_psk(&[2u8; 32], b"hh", b"card-1").unwrap());
        assert_ne!(base, derive_card_psk(&[1u8; 32], b"hh2", b"card-1").unwrap());
        assert_ne!(base, derive_card_psk(&[1u8; 32], b"hh", b"card-2").unwrap());
    }

    #[test]
    fn rejects_oversized_realm_id() {
        let oversized = vec![0u8; 256];
        assert!(derive_card_psk(&oversized, b"hh", b"card-1").is_err());
    }
}
