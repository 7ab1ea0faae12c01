//! Session-carrier state: maps an opaque session id to the server-side
//! enrollment machine paused between HTTP round trips.
//!
//! A session id is valid for exactly one POST. Advancing a session always
//! issues a fresh id and discards the old one — the lookup is an atomic
//! pop, mirroring the credential store's single-use authorization pop — so
//! replaying an already-consumed POST finds nothing and fails closed
//! instead of re-running a step.

use std::collections::HashMap;

use kerpass_enroll::ServerMachine;
use kerpass_proto::fsm::BoxState;
use rand::RngCore;
use rand_core::OsRng;
use tokio::sync::Mutex;

/// A paused session: the server machine plus the exact state object the
/// FSM runtime itself produced via `StepOutcome::Next`, so resuming a
/// session can never drift from the state graph `kerpass-enroll` defines.
pub struct SessionEntry {
    pub state: BoxState<ServerMachine>,
    pub machine: ServerMachine,
}

#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<Vec<u8>, SessionEntry>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh 32-byte session id, vanishingly unlikely to collide
    /// with a live session.
    pub fn new_session_id() -> Vec<u8> {
        let mut id = vec![0u8; 32];
        OsRng.fill_bytes(&mut id);
        id
    }

    /// Removes and returns the entry for `session_id`, if any is live.
    pub async fn pop(&self, session_id: &[u8]) -> Option<SessionEntry> {
        self.sessions.lock().await.remove(session_id)
    }

    /// Registers a new session id for an in-progress entry.
    pub async fn insert(&self, session_id: Vec<u8>, entry: SessionEntry) {
        self.sessions.lock().await.insert(session_id, entry);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
