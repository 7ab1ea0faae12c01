//! kerpass-proto — wire message shapes, framing, and the transport-neutral
//! protocol FSM runtime.
//!
//! # Module layout
//! - `wire`    — CBOR integer-keyed message shapes (`EnrollReq`, …)
//! - `framing` — length-prefixed (`u32` LE) transport framing, plus the
//!   in-memory transports used by tests
//! - `fsm`     — the `State` / `StepOutcome` / `run` protocol driver
//! - `error`   — the shared `ProtoError` kind taxonomy

pub mod error;
pub mod framing;
pub mod fsm;
pub mod wire;

pub use error::ProtoError;
pub use framing::{ChannelTransport, FlakyTransport, FramedIo, LimitedTransport, Transport};
pub use fsm::{run, BoxState, ExitHandler, NoopExit, State, StepOutcome};
pub use wire::{EnrollAuthorizationWire, EnrollCardCreateResp, EnrollReq, SessionEnvelope};
