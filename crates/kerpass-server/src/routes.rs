//! The single enrollment endpoint: one POST per protocol step.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{self, IntoResponse};

use kerpass_crypto::Context;
use kerpass_enroll::server::ServerInit;
use kerpass_enroll::{ServerExit, ServerMachine};
use kerpass_proto::fsm::{BoxState, ExitHandler, StepOutcome};
use kerpass_proto::wire::SessionEnvelope;
use kerpass_proto::ProtoError;

use crate::error::HttpError;
use crate::session::{SessionEntry, SessionTable};
use crate::AppState;

fn cbor_response(status: StatusCode, envelope: SessionEnvelope) -> response::Response {
    (status, [(header::CONTENT_TYPE, "application/cbor")], envelope.to_cbor()).into_response()
}

/// Liveness probe; does not touch the session table or the stores.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Handles one step of the enrollment protocol. An empty `session_id` in
/// the request envelope starts a new session.
#[tracing::instrument(skip(state, body))]
pub async fn enroll_step(State(state): State<Arc<AppState>>, body: Bytes) -> Result<response::Response, HttpError> {
    let envelope = SessionEnvelope::from_cbor(&body)?;
    let ctx = Context::background();

    let (state_obj, mut machine) = if envelope.session_id.is_empty() {
        (
            Box::new(ServerInit) as BoxState<ServerMachine>,
            ServerMachine::new(state.key_store.clone(), state.cred_store.clone(), state.key_name.clone()),
        )
    } else {
        let entry = state
            .sessions
            .pop(&envelope.session_id)
            .await
            .ok_or_else(|| HttpError(ProtoError::NotFound("unknown or already-consumed session".into())))?;
        (entry.state, entry.machine)
    };

    tracing::debug!(session_id = %hex::encode(&envelope.session_id), "stepping enrollment session");

    let outcome = state_obj.step(&ctx, &mut machine, Some(envelope.msg)).await;

    match outcome {
        StepOutcome::Next { state: next_state, outgoing } => {
            let new_session_id = SessionTable::new_session_id();
            state.sessions.insert(new_session_id.clone(), SessionEntry { state: next_state, machine }).await;
            Ok(cbor_response(StatusCode::OK, SessionEnvelope::new(new_session_id, outgoing.unwrap_or_default())))
        }
        StepOutcome::Done { outgoing } => {
            Ok(cbor_response(StatusCode::CREATED, SessionEnvelope::new(Vec::new(), outgoing.unwrap_or_default())))
        }
        StepOutcome::Fail(e) => {
            let result: Result<(), ProtoError> = Err(e);
            ServerExit.on_exit(&ctx, &mut machine, &result).await;
            Err(HttpError(result.unwrap_err()))
        }
    }
}
