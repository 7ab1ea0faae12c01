//! Thin wrapper over `SymmetricState` exposing the five-message KerPass
//! enrollment handshake: `e / e,ee,s,es / s,se / psk / psk`.
//!
//! Message 1 (initiator → responder): `e`
//! Message 2 (responder → initiator): `e, ee, s, es` + certificate payload
//! Message 3 (initiator → responder): `s, se` + enrollment-authorization payload
//! Message 4 (responder → initiator): `psk` + card-create-response payload
//! Message 5 (initiator → responder): `psk` + empty confirmation payload
//!
//! A dummy PSK is installed at `initialize`; the real per-card PSK is
//! derived separately from `handshake_hash()` after the handshake
//! completes (`kerpass_crypto::psk::derive_card_psk`) and never enters
//! this cipher state. The whole state is plain, `Clone`-able data, so a
//! state function can snapshot it before mutating and restore it on any
//! error return — there is no opaque library handle to work around.

use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::NoiseError;
use crate::symmetric::SymmetricState;

/// Dummy PSK mixed in at both `psk` steps. Never derived from or mixed
/// into any secret — purely a structural placeholder for the token.
const DUMMY_PSK: [u8; 32] = [0u8; 32];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Clone)]
pub struct HandshakeState {
    role: Role,
    step: u8,
    symmetric: SymmetricState,
    local_static: StaticSecret,
    local_ephemeral: Option<StaticSecret>,
    remote_static: Option<PublicKey>,
    remote_ephemeral: Option<PublicKey>,
}

impl HandshakeState {
    /// `local_static` is the caller's long-term X25519 keypair: for the
    /// client a freshly generated one-shot key, for the server its loaded
    /// `ServerKey`. `prologue` is mixed into the transcript before any
    /// message (KerPass uses the RealmId).
    pub fn initialize(role: Role, local_static: StaticSecret, prologue: &[u8]) -> Self {
        let mut symmetric = SymmetricState::new(prologue);
        symmetric.mix_key_and_hash(&DUMMY_PSK);
        Self {
            role,
            step: 1,
            symmetric,
            local_static,
            local_ephemeral: None,
            remote_static: None,
            remote_ephemeral: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.step > 5
    }

    pub fn handshake_hash(&self) -> [u8; 32] {
        self.symmetric.hash()
    }

    pub fn remote_static_key(&self) -> Result<PublicKey, NoiseError> {
        self.remote_static.ok_or(NoiseError::RemoteStaticUnknown)
    }

    pub fn static_keypair(&self) -> &StaticSecret {
        &self.local_static
    }

    fn expect_step(&self, expected: u8) -> Result<(), NoiseError> {
        if self.is_complete() {
            return Err(NoiseError::AlreadyComplete);
        }
        if self.step != expected {
            return Err(NoiseError::OutOfOrder { expected, actual: self.step });
        }
        Ok(())
    }

    /// Produce the next outgoing handshake message for this role.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        match (self.role, self.step) {
            (Role::Initiator, 1) => self.write_msg1(),
            (Role::Initiator, 3) => self.write_msg3(payload),
            (Role::Initiator, 5) => self.write_msg5(payload),
            (Role::Responder, 2) => self.write_msg2(payload),
            (Role::Responder, 4) => self.write_msg4(payload),
            (role, step) => Err(NoiseError::OutOfOrder {
                expected: next_write_step(role, self.is_complete()),
                actual: step,
            }),
        }
    }

    /// Consume the next incoming handshake message for this role,
    /// returning its decrypted payload.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        match (self.role, self.step) {
            (Role::Responder, 1) => self.read_msg1(message),
            (Role::Initiator, 2) => self.read_msg2(message),
            (Role::Responder, 3) => self.read_msg3(message),
            (Role::Initiator, 4) => self.read_msg4(message),
            (Role::Responder, 5) => self.read_msg5(message),
            (role, step) => Err(NoiseError::OutOfOrder {
                expected: next_read_step(role, self.is_complete()),
                actual: step,
            }),
        }
    }

    // ── message 1: initiator → responder, token `e` ──────────────────────

    fn write_msg1(&mut self) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(1)?;
        let e = StaticSecret::random_from_rng(OsRng);
        let e_pub = PublicKey::from(&e);
        self.symmetric.mix_hash(e_pub.as_bytes());
        self.local_ephemeral = Some(e);
        self.step = 2;
        Ok(e_pub.as_bytes().to_vec())
    }

    fn read_msg1(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(1)?;
        let e_pub = decode_pubkey(message)?;
        self.symmetric.mix_hash(e_pub.as_bytes());
        self.remote_ephemeral = Some(e_pub);
        self.step = 2;
        Ok(Vec::new())
    }

    // ── message 2: responder → initiator, tokens `e, ee, s, es` ───────────

    fn write_msg2(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(2)?;
        let remote_e = self.remote_ephemeral.ok_or(NoiseError::RemoteStaticUnknown)?;

        let e = StaticSecret::random_from_rng(OsRng);
        let e_pub = PublicKey::from(&e);
        self.symmetric.mix_hash(e_pub.as_bytes());
        self.symmetric.mix_key(e.diffie_hellman(&remote_e).as_bytes());

        let s_pub = PublicKey::from(&self.local_static);
        let s_ct = self.symmetric.encrypt_and_hash(s_pub.as_bytes())?;
        self.symmetric.mix_key(self.local_static.diffie_hellman(&remote_e).as_bytes());

        let payload_ct = self.symmetric.encrypt_and_hash(payload)?;

        self.local_ephemeral = Some(e);
        self.step = 3;

        let mut out = Vec::with_capacity(32 + s_ct.len() + payload_ct.len());
        out.extend_from_slice(e_pub.as_bytes());
        out.extend_from_slice(&s_ct);
        out.extend_from_slice(&payload_ct);
        Ok(out)
    }

    fn read_msg2(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(2)?;
        if message.len() < 32 {
            return Err(NoiseError::InvalidKey);
        }
        let (e_bytes, rest) = message.split_at(32);
        let remote_e = decode_pubkey(e_bytes)?;
        self.symmetric.mix_hash(e_bytes);
        let local_e = self.local_ephemeral.as_ref().expect("set in write_msg1");
        self.symmetric.mix_key(local_e.diffie_hellman(&remote_e).as_bytes());

        // static key ciphertext is exactly 32 bytes + 16-byte AEAD tag
        if rest.len() < 48 {
            return Err(NoiseError::Decrypt);
        }
        let (s_ct, payload_ct) = rest.split_at(48);
        let s_pt = self.symmetric.decrypt_and_hash(s_ct)?;
        let remote_s = decode_pubkey(&s_pt)?;
        self.symmetric.mix_key(local_e.diffie_hellman(&remote_s).as_bytes());

        let payload = self.symmetric.decrypt_and_hash(payload_ct)?;

        self.remote_ephemeral = Some(remote_e);
        self.remote_static = Some(remote_s);
        self.step = 3;
        Ok(payload)
    }

    // ── message 3: initiator → responder, tokens `s, se` ──────────────────

    fn write_msg3(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(3)?;
        let remote_e = self.remote_ephemeral.ok_or(NoiseError::RemoteStaticUnknown)?;

        let s_pub = PublicKey::from(&self.local_static);
        let s_ct = self.symmetric.encrypt_and_hash(s_pub.as_bytes())?;
        self.symmetric.mix_key(self.local_static.diffie_hellman(&remote_e).as_bytes());

        let payload_ct = self.symmetric.encrypt_and_hash(payload)?;
        self.step = 4;

        let mut out = Vec::with_capacity(s_ct.len() + payload_ct.len());
        out.extend_from_slice(&s_ct);
        out.extend_from_slice(&payload_ct);
        Ok(out)
    }

    fn read_msg3(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(3)?;
        if message.len() < 48 {
            return Err(NoiseError::Decrypt);
        }
        let (s_ct, payload_ct) = message.split_at(48);
        let s_pt = self.symmetric.decrypt_and_hash(s_ct)?;
        let remote_s = decode_pubkey(&s_pt)?;
        let local_e = self.local_ephemeral.clone().expect("set in read_msg1");
        self.symmetric.mix_key(local_e.diffie_hellman(&remote_s).as_bytes());

        let payload = self.symmetric.decrypt_and_hash(payload_ct)?;
        self.remote_static = Some(remote_s);
        self.step = 4;
        Ok(payload)
    }

    // ── message 4: responder → initiator, token `psk` ────────────────────

    fn write_msg4(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(4)?;
        self.symmetric.mix_key_and_hash(&DUMMY_PSK);
        let out = self.symmetric.encrypt_and_hash(payload)?;
        self.step = 5;
        Ok(out)
    }

    fn read_msg4(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(4)?;
        self.symmetric.mix_key_and_hash(&DUMMY_PSK);
        let payload = self.symmetric.decrypt_and_hash(message)?;
        self.step = 5;
        Ok(payload)
    }

    // ── message 5: initiator → responder, token `psk` (completion) ───────

    fn write_msg5(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(5)?;
        self.symmetric.mix_key_and_hash(&DUMMY_PSK);
        let out = self.symmetric.encrypt_and_hash(payload)?;
        self.step = 6;
        Ok(out)
    }

    fn read_msg5(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.expect_step(5)?;
        self.symmetric.mix_key_and_hash(&DUMMY_PSK);
        let payload = self.symmetric.decrypt_and_hash(message)?;
        self.step = 6;
        Ok(payload)
    }
}

fn decode_pubkey(bytes: &[u8]) -> Result<PublicKey, NoiseError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| NoiseError::InvalidKey)?;
    Ok(PublicKey::from(arr))
}

fn next_write_step(role: Role, complete: bool) -> u8 {
    if complete {
        return 0;
    }
    match role {
        Role::Initiator => 1,
        Role::Responder => 2,
    }
}

fn next_read_step(role: Role, complete: bool) -> u8 {
    if complete {
        return 0;
    }
    match role {
        Role::Initiator => 2,
        Role::Responder => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_handshake() -> (HandshakeState, HandshakeState) {
        let client_static = StaticSecret::random_from_rng(OsRng);
        let server_static = StaticSecret::random_from_rng(OsRng);
        let realm_id = [1u8; 32];

        let mut client = HandshakeState::initialize(Role::Initiator, client_static, &realm_id);
        let mut server = HandshakeState::initialize(Role::Responder, server_static, &realm_id);

        let m1 = client.write_message(&[]).unwrap();
        server.read_message(&m1).unwrap();

        let m2 = server.write_message(b"certificate").unwrap();
        let p2 = client.read_message(&m2).unwrap();
        assert_eq!(p2, b"certificate");

        let m3 = client.write_message(b"enroll-auth").unwrap();
        let p3 = server.read_message(&m3).unwrap();
        assert_eq!(p3, b"enroll-auth");

        let m4 = server.write_message(b"card-create-resp").unwrap();
        let p4 = client.read_message(&m4).unwrap();
        assert_eq!(p4, b"card-create-resp");

        let m5 = client.write_message(&[]).unwrap();
        let p5 = server.read_message(&m5).unwrap();
        assert_eq!(p5, Vec::<u8>::new());

        (client, server)
    }

    #[test]
    fn handshake_hashes_match_after_full_run() {
        let (client, server) = full_handshake();
        assert_eq!(client.handshake_hash(), server.handshake_hash());
        assert!(client.is_complete());
        assert!(server.is_complete());
    }

    #[test]
    fn remote_static_keys_are_learned() {
        let (client, server) = full_handshake();
        assert_eq!(
            client.remote_static_key().unwrap().as_bytes(),
            PublicKey::from(server.static_keypair()).as_bytes()
        );
        assert_eq!(
            server.remote_static_key().unwrap().as_bytes(),
            PublicKey::from(client.static_keypair()).as_bytes()
        );
    }

    #[test]
    fn snapshot_restore_replays_identical_ciphertext() {
        let client_static = StaticSecret::random_from_rng(OsRng);
        let server_static = StaticSecret::random_from_rng(OsRng);
        let realm_id = [1u8; 32];

        let mut server = HandshakeState::initialize(Role::Responder, server_static, &realm_id);
        let mut client = HandshakeState::initialize(Role::Initiator, client_static, &realm_id);
        let m1 = client.write_message(&[]).unwrap();
        server.read_message(&m1).unwrap();

        let snapshot = server.clone();
        let first = server.write_message(b"cert").unwrap();

        // Simulate a failed transport round: restore and retry.
        server = snapshot;
        let retried = server.write_message(b"cert").unwrap();
        assert_eq!(first, retried);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let client_static = StaticSecret::random_from_rng(OsRng);
        let server_static = StaticSecret::random_from_rng(OsRng);
        let realm_id = [1u8; 32];

        let mut client = HandshakeState::initialize(Role::Initiator, client_static, &realm_id);
        let mut server = HandshakeState::initialize(Role::Responder, server_static, &realm_id);

        let m1 = client.write_message(&[]).unwrap();
        server.read_message(&m1).unwrap();
        let mut m2 = server.write_message(b"certificate").unwrap();
        *m2.last_mut().unwrap() ^= 0xFF;
        assert!(client.read_message(&m2).is_err());
    }
}
