//! kerpass-enroll — client and server enrollment state machines.
//!
//! # Module layout
//! - `client` — `ClientInit` / `ClientReceiveServerKey` / `ClientCardCreate`
//!   / `ClientExit`
//! - `server` — `ServerInit` / `ServerCheckEnrollAuthorization` /
//!   `ServerCardSave` / `ServerExit`
//! - `pki`    — the pluggable certificate-check boundary

pub mod client;
pub mod pki;
pub mod server;

pub use client::{ClientExit, ClientMachine};
pub use pki::{PkiCheck, StubPkiCheck};
pub use server::{ServerExit, ServerMachine};
