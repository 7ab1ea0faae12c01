use std::sync::Arc;

use anyhow::Result;
use rand::RngCore;
use rand_core::OsRng;
use tracing_subscriber::EnvFilter;
use x25519_dalek::StaticSecret;

use kerpass_crypto::{Context, IdHasher};
use kerpass_server::{app, AppState, ServerConfig};
use kerpass_store::{KeyStore, MemoryKeyStore, MemoryServerCredStore, RealmId, ServerKey};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = ServerConfig::from_env()?;
    let ctx = Context::background();

    let key_store = Arc::new(MemoryKeyStore::new());
    let realm_id = RealmId::new(config.realm_id.clone())?;

    // Demo-grade bootstrap: a fresh static keypair and a placeholder
    // certificate blob every start. A real deployment loads a persisted
    // keypair and a certificate issued by the realm's PKI instead.
    let mut certificate = vec![0u8; 64];
    OsRng.fill_bytes(&mut certificate);
    let server_key = ServerKey::new(realm_id, StaticSecret::random_from_rng(OsRng), certificate)?;
    key_store.save_server_key(&ctx, &config.key_name, server_key).await?;

    let cred_store = Arc::new(MemoryServerCredStore::new(Arc::new(IdHasher::default_seeded())));
    let state = Arc::new(AppState::new(key_store, cred_store, config.key_name.clone()));

    tracing::info!(bind_address = %config.bind_address, "starting kerpass-server");
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
