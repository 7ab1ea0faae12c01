//! End-to-end enrollment scenarios run over an in-memory duplex transport.

use std::sync::Arc;

use rand_core::OsRng;
use x25519_dalek::StaticSecret;

use kerpass_crypto::Context;
use kerpass_enroll::{ClientExit, ClientMachine, ServerExit, ServerMachine, StubPkiCheck};
use kerpass_proto::fsm::{BoxState, ExitHandler};
use kerpass_proto::framing::{ChannelTransport, FlakyTransport, Transport};
use kerpass_proto::{run, ProtoError};
use kerpass_store::{
    ClientCredStore, EnrollAuthorization, KeyStore, MemoryClientCredStore, MemoryKeyStore, MemoryServerCredStore,
    RealmId, ServerCredStore, ServerKey,
};

const REALM_ID: [u8; 32] = [1u8; 32];
const AUTHORIZATION_ID: [u8; 32] = [0x10u8; 32];

struct Fixture {
    key_store: Arc<MemoryKeyStore>,
    server_store: Arc<MemoryServerCredStore>,
    client_store: Arc<MemoryClientCredStore>,
}

async fn fixture() -> Fixture {
    let ctx = Context::background();
    let key_store = Arc::new(MemoryKeyStore::new());
    let server_store = Arc::new(MemoryServerCredStore::new(Arc::new(kerpass_crypto::IdHasher::default_seeded())));
    let client_store = Arc::new(MemoryClientCredStore::new());

    let realm_id = RealmId::new(REALM_ID.to_vec()).unwrap();
    let server_key = ServerKey::new(realm_id, StaticSecret::random_from_rng(OsRng), b"test-certificate".to_vec()).unwrap();
    key_store.save_server_key(&ctx, "default", server_key).await.unwrap();

    Fixture { key_store, server_store, client_store }
}

async fn issue_authorization(f: &Fixture, authorization_id: [u8; 32]) {
    let ctx = Context::background();
    let auth = EnrollAuthorization::new(
        authorization_id,
        RealmId::new(REALM_ID.to_vec()).unwrap(),
        "demo-app".to_string(),
        None,
        None,
    )
    .unwrap();
    f.server_store.save_enroll_authorization(&ctx, auth).await.unwrap();
}

fn client_machine(f: &Fixture, authorization_id: [u8; 32]) -> ClientMachine {
    ClientMachine::new(REALM_ID.to_vec(), authorization_id.to_vec(), f.client_store.clone(), Arc::new(StubPkiCheck))
}

fn server_machine(f: &Fixture) -> ServerMachine {
    ServerMachine::new(f.key_store.clone(), f.server_store.clone(), "default")
}

/// Runs one side of a session to completion, taking ownership of its
/// transport so it is dropped the moment this side finishes — otherwise
/// a peer blocked on a read would wait forever for a frame that a failed
/// run will never send.
async fn drive<M, T, E>(machine: &mut M, initial: BoxState<M>, mut transport: T, is_responder: bool, exit: &E) -> Result<(), ProtoError>
where
    M: Send,
    T: Transport,
    E: ExitHandler<M>,
{
    let ctx = Context::background();
    let result = run(&ctx, machine, initial, &mut transport, is_responder, exit).await;
    drop(transport);
    result
}

#[tokio::test]
async fn happy_path_enrolls_exactly_one_card_and_consumes_the_authorization() {
    let f = fixture().await;
    issue_authorization(&f, AUTHORIZATION_ID).await;

    let (client_transport, server_transport) = ChannelTransport::pair();
    let mut client_machine = client_machine(&f, AUTHORIZATION_ID);
    let mut server_machine = server_machine(&f);

    let (client_result, server_result) = tokio::join!(
        drive(&mut client_machine, kerpass_enroll::client::initial_state(), client_transport, false, &ClientExit),
        drive(&mut server_machine, kerpass_enroll::server::initial_state(), server_transport, true, &ServerExit),
    );

    client_result.unwrap();
    server_result.unwrap();

    let ctx = Context::background();
    assert_eq!(f.client_store.card_count(&ctx).await.unwrap(), 1);
    assert_eq!(f.server_store.card_count(&ctx).await.unwrap(), 1);
    assert_eq!(f.server_store.authorization_count(&ctx).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_authorization_leaves_both_stores_untouched() {
    let f = fixture().await;
    issue_authorization(&f, AUTHORIZATION_ID).await;

    let wrong_authorization_id = [0x20u8; 32];
    let (client_transport, server_transport) = ChannelTransport::pair();
    let mut client_machine = client_machine(&f, wrong_authorization_id);
    let mut server_machine = server_machine(&f);

    let (client_result, server_result) = tokio::join!(
        drive(&mut client_machine, kerpass_enroll::client::initial_state(), client_transport, false, &ClientExit),
        drive(&mut server_machine, kerpass_enroll::server::initial_state(), server_transport, true, &ServerExit),
    );

    assert!(client_result.is_err());
    assert!(matches!(server_result, Err(ProtoError::InvalidAuthorization(_))));

    let ctx = Context::background();
    assert_eq!(f.client_store.card_count(&ctx).await.unwrap(), 0);
    assert_eq!(f.server_store.card_count(&ctx).await.unwrap(), 0);
    assert_eq!(f.server_store.authorization_count(&ctx).await.unwrap(), 1);
}

#[tokio::test]
async fn server_read_failure_on_final_confirmation_restores_the_authorization() {
    let f = fixture().await;
    issue_authorization(&f, AUTHORIZATION_ID).await;

    let (client_transport, server_transport) = ChannelTransport::pair();
    // Server's third read is the final (empty-payload) client confirmation.
    let server_transport = FlakyTransport::new(server_transport).fail_read_at(3);

    let mut client_machine = client_machine(&f, AUTHORIZATION_ID);
    let mut server_machine = server_machine(&f);

    let (_client_result, server_result) = tokio::join!(
        drive(&mut client_machine, kerpass_enroll::client::initial_state(), client_transport, false, &ClientExit),
        drive(&mut server_machine, kerpass_enroll::server::initial_state(), server_transport, true, &ServerExit),
    );

    assert!(server_result.is_err());

    let ctx = Context::background();
    assert_eq!(f.server_store.authorization_count(&ctx).await.unwrap(), 1);
    assert_eq!(f.server_store.card_count(&ctx).await.unwrap(), 0);
}

#[tokio::test]
async fn client_write_failure_on_final_confirmation_rolls_back_both_sides() {
    let f = fixture().await;
    issue_authorization(&f, AUTHORIZATION_ID).await;

    let (client_transport, server_transport) = ChannelTransport::pair();
    // Client's third write is the final (empty-payload) confirmation.
    let client_transport = FlakyTransport::new(client_transport).fail_write_at(3);

    let mut client_machine = client_machine(&f, AUTHORIZATION_ID);
    let mut server_machine = server_machine(&f);

    let (client_result, server_result) = tokio::join!(
        drive(&mut client_machine, kerpass_enroll::client::initial_state(), client_transport, false, &ClientExit),
        drive(&mut server_machine, kerpass_enroll::server::initial_state(), server_transport, true, &ServerExit),
    );

    assert!(client_result.is_err());
    assert!(server_result.is_err());

    let ctx = Context::background();
    assert_eq!(f.client_store.card_count(&ctx).await.unwrap(), 0);
    assert_eq!(f.server_store.card_count(&ctx).await.unwrap(), 0);
    assert_eq!(f.server_store.authorization_count(&ctx).await.unwrap(), 1);
}
