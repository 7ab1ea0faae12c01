//! kerpass-store — credential store contracts and in-memory reference
//! implementation.
//!
//! # Module layout
//! - `models`  — realm, key, authorization, and card entities (§3 of the
//!   KerPass data model)
//! - `traits`  — the `KeyStore` / `ServerCredStore` / `ClientCredStore`
//!   abstract contracts
//! - `memory`  — in-memory reference implementations, including the
//!   client-side mutation guard and atomic authorization pop
//! - `error`   — unified store error type

pub mod error;
pub mod memory;
pub mod models;
pub mod traits;

pub use error::StoreError;
pub use memory::{MemoryClientCredStore, MemoryKeyStore, MemoryServerCredStore};
pub use models::{Card, CardInfo, CardQuery, EnrollAuthorization, Realm, RealmId, RealmInfo, ServerCard, ServerKey};
pub use traits::{ClientCredStore, KeyStore, ServerCredStore};
