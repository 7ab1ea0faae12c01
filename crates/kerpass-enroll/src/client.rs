//! Client-side enrollment: `ClientInit → ClientReceiveServerKey →
//! ClientCardCreate`, with `ClientExit` compensating for a card saved just
//! before the final confirmation write fails.

use std::sync::Arc;

use async_trait::async_trait;
use rand_core::OsRng;
use x25519_dalek::StaticSecret;

use kerpass_crypto::Context;
use kerpass_crypto::psk::derive_card_psk;
use kerpass_noise::{HandshakeState, Role};
use kerpass_proto::fsm::{BoxState, ExitHandler, State, StepOutcome};
use kerpass_proto::wire::{EnrollAuthorizationWire, EnrollCardCreateResp, EnrollReq};
use kerpass_proto::ProtoError;
use kerpass_store::{Card, ClientCredStore, RealmId};

use crate::pki::PkiCheck;

/// Shared mutable context threaded through every client enrollment state.
pub struct ClientMachine {
    pub realm_id: Vec<u8>,
    pub authorization_id: Vec<u8>,
    pub store: Arc<dyn ClientCredStore>,
    pub pki: Arc<dyn PkiCheck>,
    handshake: Option<HandshakeState>,
    saved_card_id: Option<i64>,
}

impl ClientMachine {
    pub fn new(
        realm_id: Vec<u8>,
        authorization_id: Vec<u8>,
        store: Arc<dyn ClientCredStore>,
        pki: Arc<dyn PkiCheck>,
    ) -> Self {
        Self { realm_id, authorization_id, store, pki, handshake: None, saved_card_id: None }
    }

    fn handshake_mut(&mut self) -> &mut HandshakeState {
        self.handshake.as_mut().expect("handshake initialized by ClientInit")
    }
}

pub struct ClientInit;

#[async_trait]
impl State<ClientMachine> for ClientInit {
    #[tracing::instrument(name = "client_init", skip_all)]
    async fn step(self: Box<Self>, _ctx: &Context, machine: &mut ClientMachine, _incoming: Option<Vec<u8>>) -> StepOutcome<ClientMachine> {
        let static_key = StaticSecret::random_from_rng(OsRng);
        let mut handshake = HandshakeState::initialize(Role::Initiator, static_key, &machine.realm_id);

        let msg1 = match handshake.write_message(&[]) {
            Ok(m) => m,
            Err(e) => return StepOutcome::Fail(e.into()),
        };
        machine.handshake = Some(handshake);

        let req = match EnrollReq::new(machine.realm_id.clone(), msg1) {
            Ok(r) => r,
            Err(e) => return StepOutcome::Fail(e),
        };

        StepOutcome::next_with(Box::new(ClientReceiveServerKey), req.to_cbor())
    }
}

pub struct ClientReceiveServerKey;

#[async_trait]
impl State<ClientMachine> for ClientReceiveServerKey {
    #[tracing::instrument(name = "client_receive_server_key", skip_all)]
    async fn step(self: Box<Self>, _ctx: &Context, machine: &mut ClientMachine, incoming: Option<Vec<u8>>) -> StepOutcome<ClientMachine> {
        let snapshot = machine.handshake.clone();
        let incoming = incoming.expect("responder always replies before this state runs");

        let certificate = match machine.handshake_mut().read_message(&incoming) {
            Ok(payload) => payload,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        let remote_static = match machine.handshake_mut().remote_static_key() {
            Ok(k) => k,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        if let Err(e) = machine.pki.check(remote_static.as_bytes(), &certificate) {
            machine.handshake = snapshot;
            return StepOutcome::Fail(e);
        }

        let auth_wire = match EnrollAuthorizationWire::new(machine.authorization_id.clone()) {
            Ok(w) => w,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e);
            }
        };

        let outgoing = match machine.handshake_mut().write_message(&auth_wire.to_cbor()) {
            Ok(bytes) => bytes,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        StepOutcome::next_with(Box::new(ClientCardCreate), outgoing)
    }
}

pub struct ClientCardCreate;

#[async_trait]
impl State<ClientMachine> for ClientCardCreate {
    #[tracing::instrument(name = "client_card_create", skip_all)]
    async fn step(self: Box<Self>, ctx: &Context, machine: &mut ClientMachine, incoming: Option<Vec<u8>>) -> StepOutcome<ClientMachine> {
        let snapshot = machine.handshake.clone();
        let incoming = incoming.expect("server always replies before this state runs");

        let payload = match machine.handshake_mut().read_message(&incoming) {
            Ok(p) => p,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        let resp = match EnrollCardCreateResp::from_cbor(&payload) {
            Ok(r) => r,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e);
            }
        };

        let id_token: [u8; 32] = match resp.card_id.as_slice().try_into() {
            Ok(t) => t,
            Err(_) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(ProtoError::Validation("card id must be 32 bytes".into()));
            }
        };

        let handshake_hash = machine.handshake_mut().handshake_hash();
        let psk = match derive_card_psk(&machine.realm_id, &handshake_hash, &resp.card_id) {
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

        let card = Card {
            id: None,
            realm_id,
            id_token,
            static_private_key: machine.handshake_mut().static_keypair().to_bytes(),
            psk,
            app_name: resp.app_name,
            app_logo: resp.app_logo,
        };

        let saved_id = match machine.store.save_card(ctx, card).await {
            Ok(id) => id,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };
        machine.saved_card_id = Some(saved_id);

        let outgoing = match machine.handshake_mut().write_message(&[]) {
            Ok(bytes) => bytes,
            Err(e) => {
                machine.handshake = snapshot;
                return StepOutcome::Fail(e.into());
            }
        };

        StepOutcome::done_with(outgoing)
    }
}

/// Removes the just-saved card if the overall run did not succeed.
pub struct ClientExit;

#[async_trait]
impl ExitHandler<ClientMachine> for ClientExit {
    async fn on_exit(&self, ctx: &Context, machine: &mut ClientMachine, result: &Result<(), ProtoError>) {
        if result.is_err() {
            if let Some(id) = machine.saved_card_id.take() {
                if let Err(e) = machine.store.remove_card(ctx, id).await {
                    tracing::warn!(card_id = id, error = %e, "best-effort card rollback failed");
                }
            }
        }
    }
}

pub fn initial_state() -> BoxState<ClientMachine> {
    Box::new(ClientInit)
}
