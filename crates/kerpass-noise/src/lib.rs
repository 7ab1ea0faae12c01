//! kerpass-noise — Noise-framework handshake driver for KerPass enrollment.
//!
//! Wraps a hand-rolled `SymmetricState` (the same HKDF-chaining technique
//! `dl_crypto` uses for its Double Ratchet) instead of an opaque library
//! handle, so the whole handshake state is a plain `Clone`-able struct:
//! every enrollment state can snapshot it before mutating and restore it
//! verbatim on error, reproducing identical outgoing ciphertext on retry.
//!
//! # Module layout
//! - `symmetric`  — the Noise `SymmetricState` primitive (mix_hash / mix_key / AEAD)
//! - `handshake`  — the five-message KerPass handshake (`HandshakeState`, `Role`)
//! - `error`      — unified error type

pub mod error;
pub mod handshake;
pub mod symmetric;

pub use error::NoiseError;
pub use handshake::{HandshakeState, Role};
