//! Server-side enrollment: `ServerInit → ServerCheckEnrollAuthorization →
//! ServerCardSave`, with `ServerExit` restoring a popped authorization
//! and/or removing a saved card on any failure.

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use rand_core::OsRng;

use kerpass_crypto::psk::derive_card_psk;
use kerpass_crypto::{Context, ServerCardKey};
use kerpass_noise::{HandshakeState, Role};
use kerpass_proto::fsm::{BoxState, ExitHandler, State, StepOutcome};
use kerpass_proto::wire::{EnrollAuthorizationWire, EnrollCardCreateResp, EnrollReq};
use kerpass_proto::ProtoError;
use kerpass_store::{KeyStore, RealmId, ServerCard, ServerCredStore};

pub struct ServerMachine {
    pub key_store: Arc<dyn KeyStore>,
    pub cred_store: Arc<dyn ServerCredStore>,
    pub key_name: String,
    realm_id: Vec<u8>,
    handshake: Option<HandshakeState>,
    pending_card: Option<ServerCard>,
    restore_authorization: Option<kerpass_store::EnrollAuthorization>,
    saved_card_id: Option<[u8; 32]>,
}

impl ServerMachine {
    pub fn new(key_store: Arc<dyn KeyStore>, cred_store: Arc<dyn ServerCredStore>, key_name: impl Into<String>) -> Self {
        Self {
            key_store,
            cred_store,
            key_name: key_name.into(),
            realm_id: Vec::new(),
            handshake: None,
            pending_card: None,
            restore_authorization: None,
            saved_card_id: None,
        }
    }

    fn handshake_mut(&mut self) -> &mut HandshakeState {
        self.handshake.as_mut().expect("handshake initialized by ServerInit")
    }
}

pub struct ServerInit;

#[async_trait]
impl State<ServerMachine> for ServerInit {
    #[tracing::instrument(name = "server_init", skip_all)]
    async fn step(self: Box<Self>, ctx: &Context, machine: &mut ServerMachine, incoming: Option<Vec<u8>>) -> StepOutcome<ServerMachine> {
        let incoming = incoming.expect("Run reads the opening frame before the responder's first state");

        let req = match EnrollReq::from_cbor(&incoming) {
            Ok(r) => r,
            Err(e) => return StepOutcome::Fail(e),
        };
        machine.realm_id = req.realm_id.clone();

        let realm_id = match RealmId::new(req.realm_id.clone()) {
            Ok(r) => r,
            Err(e) => return StepOutcome::Fail(e.into()),
        };

        let server_key = match machine.key_store.get_server_key(ctx, &realm_id, &machine.key_name).await {
            Ok(Some(k)) => k,
            Ok(None) => return StepOutcome::Fail(ProtoError::NotFound(format!("no server key for realm {}", hex::encode(&req.realm_id)))),
            Err(e) => return StepOutcome::Fail(e.into()),
        };

        let mut handshake = HandshakeState::initialize(Role::Responder, server_key.private_key.clone(), &req.realm_id);
        if let Err(e) = handshake.read_message(&req.noise_msg) {
            return StepOutcome::Fail(e.into());
        }

        let outgoing = match handshake.write_message(&server_key.certificate) {
            Ok(bytes) => bytes,
            Err(e) => return StepOutcome::Fail(e.into()),
        };
        machine.handshake = Some(handshake);

        StepOutcome::next_with(Box::new(ServerCheckEnrollAuthorization), outgoing)
    }
}

pub struct ServerCheckEnrollAuthorization;

#[async_trait]
impl State<ServerMachine> for ServerCheckEnrollAuthorization {
    #[tracing::instrument(name = "server_check_enroll_authorization", skip_all)]
    async fn step(self: Box<Self>, ctx: &Context, machine: &mut ServerMachine, incoming: Option<Vec<u8>>) -> StepOutcome<ServerMachine> {
        let snapshot = machine.handshake.clone();
        let incoming = incoming.expect("client always replies before this state runs");

        let payload = match machine.handshake_mut().read_message(&incoming) {
            Ok(p) => p,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        let auth_wire = match EnrollAuthorizationWire::from_cbor(&payload) {
            Ok(w) => w,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e);
            }
        };

        // NotFound on the atomic pop is translated to InvalidAuthorization,
        // joined with the original cause.
        let auth = match machine.cred_store.pop_enroll_authorization(ctx, &auth_wire.authorization_id).await {
            Ok(a) => a,
            Err(kerpass_store::StoreError::NotFound(reason)) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(ProtoError::InvalidAuthorization(format!("authorization not found: {reason}")));
            }
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };
        machine.restore_authorization = Some(auth.clone());

        if auth.realm_id.as_bytes() != machine.realm_id.as_slice() {
            machine.handshake = snapshot;
            return StepOutcome::Fail(ProtoError::InvalidAuthorization("authorization realm does not match session realm".into()));
        }

        let mut card_id = [0u8; 32];
        OsRng.fill_bytes(&mut card_id);

        let user_id = auth
            .user_data
            .as_ref()
            .and_then(|v| v.get("sub"))
            .and_then(|s| s.as_str())
            .map(String::from);

        let resp = match EnrollCardCreateResp::new(card_id.to_vec(), user_id, auth.app_name.clone(), None, auth.app_logo.clone()) {
            Ok(r) => r,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e);
            }
        };

        let outgoing = match machine.handshake_mut().write_message(&resp.to_cbor()) {
            Ok(bytes) => bytes,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        let handshake_hash = machine.handshake_mut().handshake_hash();
        let remote_static = match machine.handshake_mut().remote_static_key() {
            Ok(k) => k,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };
        let psk = match derive_card_psk(&machine.realm_id, &handshake_hash, &card_id) {
            Ok(p) => p,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };
        let realm_id = match RealmId::new(machine.realm_id.clone()) {
            Ok(r) => r,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        machine.pending_card = Some(ServerCard { card_id, realm_id, remote_static_key: *remote_static.as_bytes(), psk });

        StepOutcome::next_with(Box::new(ServerCardSave), outgoing)
    }
}

pub struct ServerCardSave;

#[async_trait]
impl State<ServerMachine> for ServerCardSave {
    #[tracing::instrument(name = "server_card_save", skip_all)]
    async fn step(self: Box<Self>, ctx: &Context, machine: &mut ServerMachine, incoming: Option<Vec<u8>>) -> StepOutcome<ServerMachine> {
        let snapshot = machine.handshake.clone();
        let incoming = incoming.expect("client always sends the final confirmation before this state runs");

        if let Err(e) = machine.handshake_mut().read_message(&incoming) {
            machine.handshake = snapshot;
            return StepOutcome::Fail(e.into());
        }

        let pending = machine.pending_card.take().expect("set by ServerCheckEnrollAuthorization");
        let card_id = pending.card_id;

        if let Err(e) = machine.cred_store.save_card(ctx, pending).await {
            machine.handshake = snapshot;
            return StepOutcome::Fail(e.into());
        }

        machine.saved_card_id = Some(card_id);
        machine.restore_authorization = None;

        StepOutcome::done()
    }
}

/// Restores the popped authorization and/or removes the saved card on
/// any failure; both actions are best-effort.
pub struct ServerExit;

#[async_trait]
impl ExitHandler<ServerMachine> for ServerExit {
    async fn on_exit(&self, ctx: &Context, machine: &mut ServerMachine, result: &Result<(), ProtoError>) {
        if result.is_ok() {
            return;
        }
        if let Some(auth) = machine.restore_authorization.take() {
            if let Err(e) = machine.cred_store.save_enroll_authorization(ctx, auth).await {
                tracing::warn!(error = %e, "best-effort authorization restore failed");
            }
        }
        if let Some(card_id) = machine.saved_card_id.take() {
            if let Err(e) = machine.cred_store.remove_card(ctx, &ServerCardKey::CardIdKey(card_id)).await {
                tracing::warn!(error = %e, "best-effort card rollback failed");
            }
        }
    }
}

pub fn initial_state() -> BoxState<ServerMachine> {
    Box::new(ServerInit)
}
