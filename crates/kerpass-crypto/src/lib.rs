//! kerpass-crypto — KerPass key-derivation engine
//!
//! # Module layout
//! - `id_hasher`  — seeded HKDF/SHA-256 salts and access-key derivation (`IdHasher`)
//! - `keys`       — sealed card/enroll key sum types (`ServerCardKey`, `EnrollKey`, …)
//! - `card_id`    — `CardIdGenerator`, producing the client-side `CardRef` triple
//! - `psk`        — post-handshake card PSK derivation (HKDF-SHA512)
//! - `error`      — unified error type

pub mod card_id;
pub mod context;
pub mod error;
pub mod id_hasher;
pub mod keys;
pub mod psk;

pub use card_id::{CardIdGenerator, CardRef, UserIdFactory};
pub use context::Context;
pub use error::CryptoError;
pub use id_hasher::{AccessKeys, IdHasher};
pub use keys::{EnrollAccess, EnrollKey, ServerCardAccess, ServerCardKey};
