//! The Noise `SymmetricState` primitive: chaining key + transcript hash +
//! (optional) cipher key, mixed deterministically as the handshake
//! progresses. Mirrors the hand-rolled HKDF chaining in
//! `dl_crypto::kdf::ratchet_keys` / `chain_step`, applied to a single
//! running transcript instead of a ratchet tree.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::NoiseError;

const PROTOCOL_NAME: &[u8] = b"Noise_KerPassEnroll_25519_ChaChaPoly_SHA256";

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricState {
    h: [u8; 32],
    ck: [u8; 32],
    k: Option<[u8; 32]>,
    #[zeroize(skip)]
    n: u64,
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn nonce_from_counter(n: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&n.to_le_bytes());
    Nonce::clone_from_slice(&bytes)
}

impl SymmetricState {
    pub fn new(prologue: &[u8]) -> Self {
        let h = sha256(PROTOCOL_NAME);
        let mut s = Self { h, ck: h, k: None, n: 0 };
        s.mix_hash(prologue);
        s
    }

    pub fn hash(&self) -> [u8; 32] {
        self.h
    }

    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.h);
        hasher.update(data);
        self.h = hasher.finalize().into();
    }

    /// DH ratchet step: mix `ikm` (a Diffie-Hellman output) into the
    /// chaining key and derive a fresh cipher key.
    pub fn mix_key(&mut self, ikm: &[u8]) {
        let hk = Hkdf::<Sha256>::new(Some(&self.ck), ikm);
        let mut ck = [0u8; 32];
        let mut k = [0u8; 32];
        hk.expand(b"noise-ck", &mut ck).expect("32 bytes is a valid HKDF length");
        hk.expand(b"noise-k", &mut k).expect("32 bytes is a valid HKDF length");
        self.ck = ck;
        self.k = Some(k);
        self.n = 0;
    }

    /// The inert `psk` token: mixes `ikm` into both the chaining key and
    /// the transcript hash, and rekeys. The dummy PSK installed at
    /// initialization flows through here; the *real* card PSK is derived
    /// separately post-handshake (see `kerpass_crypto::psk`) and never
    /// touches this cipher state.
    pub fn mix_key_and_hash(&mut self, ikm: &[u8]) {
        let hk = Hkdf::<Sha256>::new(Some(&self.ck), ikm);
        let mut ck = [0u8; 32];
        let mut temp_h = [0u8; 32];
        let mut k = [0u8; 32];
        hk.expand(b"noise-ck", &mut ck).expect("32 bytes is a valid HKDF length");
        hk.expand(b"noise-h", &mut temp_h).expect("32 bytes is a valid HKDF length");
        hk.expand(b"noise-k", &mut k).expect("32 bytes is a valid HKDF length");
        self.ck = ck;
        self.mix_hash(&temp_h);
        self.k = Some(k);
        self.n = 0;
    }

    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let ct = match self.k {
            Some(k) => {
                let cipher = ChaCha20Poly1305::new_from_slice(&k).map_err(|_| NoiseError::Encrypt)?;
                let nonce = nonce_from_counter(self.n);
                self.n += 1;
                cipher
                    .encrypt(&nonce, Payload { msg: plaintext, aad: &self.h })
                    .map_err(|_| NoiseError::Encrypt)?
            }
            None => plaintext.to_vec(),
        };
        self.mix_hash(&ct);
        Ok(ct)
    }

    pub fn decrypt_and_hash(&mut self, data: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let pt = match self.k {
            Some(k) => {
                let cipher = ChaCha20Poly1305::new_from_slice(&k).map_err(|_| NoiseError::Decrypt)?;
                let nonce = nonce_from_counter(self.n);
                self.n += 1;
                cipher
                    .decrypt(&nonce, Payload { msg: data, aad: &self.h })
                    .map_err(|_| NoiseError::Decrypt)?
            }
            None => data.to_vec(),
        };
        self.mix_hash(data);
        Ok(pt)
    }
}
