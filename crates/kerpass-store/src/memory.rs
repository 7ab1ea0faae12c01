//! In-memory reference implementations of the three store contracts.
//!
//! These back the test-suite and the single-process server binary; a
//! production deployment swaps them for a relational or embedded-file
//! backend behind the same trait objects.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use blake2::{Blake2s256, Digest};
use kerpass_crypto::{Context, IdHasher, ServerCardAccess, ServerCardKey};
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::models::{Card, CardInfo, CardQuery, EnrollAuthorization, Realm, RealmId, ServerCard, ServerKey};
use crate::traits::{ClientCredStore, KeyStore, ServerCredStore};

fn check(ctx: &Context) -> Result<(), StoreError> {
    ctx.check().map_err(StoreError::from)
}

/// Read-mostly static keypair store, single mutex per the concurrency
/// model's note that key stores are read-mostly.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<(Vec<u8>, String), ServerKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_server_key(&self, ctx: &Context, realm_id: &RealmId, name: &str) -> Result<Option<ServerKey>, StoreError> {
        check(ctx)?;
        let keys = self.keys.lock().await;
        Ok(keys.get(&(realm_id.0.clone(), name.to_string())).cloned())
    }

    async fn save_server_key(&self, ctx: &Context, name: &str, key: ServerKey) -> Result<(), StoreError> {
        check(ctx)?;
        let mut keys = self.keys.lock().await;
        keys.insert((key.realm_id.0.clone(), name.to_string()), key);
        Ok(())
    }
}

#[derive(Default)]
struct ServerCards {
    by_card_id: HashMap<[u8; 32], ServerCard>,
    by_access_key: HashMap<[u8; 32], [u8; 32]>,
    surrogate: HashMap<i64, [u8; 32]>,
    next_surrogate: i64,
}

/// Server-side credential store: realms, single-use enrollment
/// authorizations, and server card rows.
pub struct MemoryServerCredStore {
    realms: RwLock<HashMap<Vec<u8>, Realm>>,
    authorizations: RwLock<HashMap<[u8; 32], EnrollAuthorization>>,
    cards: RwLock<ServerCards>,
    id_hasher: Arc<IdHasher>,
}

impl MemoryServerCredStore {
    pub fn new(id_hasher: Arc<IdHasher>) -> Self {
        Self {
            realms: RwLock::new(HashMap::new()),
            authorizations: RwLock::new(HashMap::new()),
            cards: RwLock::new(ServerCards::default()),
            id_hasher,
        }
    }
}

#[async_trait]
impl ServerCredStore for MemoryServerCredStore {
    async fn list_realm(&self, ctx: &Context) -> Result<Vec<Realm>, StoreError> {
        check(ctx)?;
        Ok(self.realms.read().await.values().cloned().collect())
    }

    async fn load_realm(&self, ctx: &Context, realm_id: &RealmId) -> Result<Realm, StoreError> {
        check(ctx)?;
        self.realms
            .read()
            .await
            .get(&realm_id.0)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("realm {}", hex::encode(&realm_id.0))))
    }

    async fn save_realm(&self, ctx: &Context, realm: Realm) -> Result<(), StoreError> {
        check(ctx)?;
        self.realms.write().await.insert(realm.realm_id.0.clone(), realm);
        Ok(())
    }

    async fn remove_realm(&self, ctx: &Context, realm_id: &RealmId) -> Result<(), StoreError> {
        check(ctx)?;
        self.realms.write().await.remove(&realm_id.0);
        Ok(())
    }

    async fn pop_enroll_authorization(&self, ctx: &Context, authorization_id: &[u8]) -> Result<EnrollAuthorization, StoreError> {
        check(ctx)?;
        let key: [u8; 32] = authorization_id
            .try_into()
            .map_err(|_| StoreError::Validation("authorization id must be 32 bytes".into()))?;
        let mut authorizations = self.authorizations.write().await;
        authorizations
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(format!("enroll authorization {}", hex::encode(key))))
    }

    async fn save_enroll_authorization(&self, ctx: &Context, auth: EnrollAuthorization) -> Result<(), StoreError> {
        check(ctx)?;
        self.authorizations.write().await.insert(auth.authorization_id, auth);
        Ok(())
    }

    async fn authorization_count(&self, ctx: &Context) -> Result<usize, StoreError> {
        check(ctx)?;
        Ok(self.authorizations.read().await.len())
    }

    async fn load_card(&self, ctx: &Context, access: &ServerCardAccess) -> Result<ServerCard, StoreError> {
        check(ctx)?;
        let id_key = self.id_hasher.derive_from_card_access(access)?.id_key;
        let cards = self.cards.read().await;
        let card_id = cards
            .by_access_key
            .get(&id_key)
            .ok_or_else(|| StoreError::NotFound("card".into()))?;
        cards
            .by_card_id
            .get(card_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("card".into()))
    }

    async fn save_card(&self, ctx: &Context, card: ServerCard) -> Result<(), StoreError> {
        check(ctx)?;
        let id_key = self
            .id_hasher
            .derive_from_card_access(&ServerCardAccess::id_token(&card.card_id)?)?
            .id_key;
        let mut cards = self.cards.write().await;
        let surrogate = cards.next_surrogate;
        cards.next_surrogate += 1;
        cards.surrogate.insert(surrogate, card.card_id);
        cards.by_access_key.insert(id_key, card.card_id);
        cards.by_card_id.insert(card.card_id, card);
        Ok(())
    }

    async fn remove_card(&self, ctx: &Context, key: &ServerCardKey) -> Result<(), StoreError> {
        check(ctx)?;
        let mut cards = self.cards.write().await;
        let card_id = match key {
            ServerCardKey::CardIdKey(k) => *k,
            ServerCardKey::CardId(surrogate) => *cards
                .surrogate
                .get(surrogate)
                .ok_or_else(|| StoreError::NotFound("card surrogate id".into()))?,
            ServerCardKey::IdToken(_) | ServerCardKey::OtpId { .. } => {
                let access = match key {
                    ServerCardKey::IdToken(t) => ServerCardAccess::id_token(t)?,
                    ServerCardKey::OtpId { realm, username } => ServerCardAccess::otp_id(*realm, username.clone()),
                    _ => unreachable!(),
                };
                let id_key = self.id_hasher.derive_from_card_access(&access)?.id_key;
                *cards
                    .by_access_key
                    .get(&id_key)
                    .ok_or_else(|| StoreError::NotFound("card".into()))?
            }
        };
        cards.by_card_id.remove(&card_id);
        cards.by_access_key.retain(|_, v| *v != card_id);
        cards.surrogate.retain(|_, v| *v != card_id);
        Ok(())
    }

    async fn card_count(&self, ctx: &Context) -> Result<usize, StoreError> {
        check(ctx)?;
        Ok(self.cards.read().await.by_card_id.len())
    }
}

fn id_token_hash(id_token: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    hasher.update(id_token);
    hasher.finalize().into()
}

#[derive(Default)]
struct ClientCards {
    by_id: HashMap<i64, Card>,
    by_id_token_hash: HashMap<[u8; 32], i64>,
    by_realm: HashMap<Vec<u8>, HashSet<i64>>,
}

/// Client-side credential store. Enforces the mutation guard: an IdToken's
/// realm is frozen at first save.
pub struct MemoryClientCredStore {
    cards: RwLock<ClientCards>,
    next_id: AtomicI64,
}

impl Default for MemoryClientCredStore {
    fn default() -> Self {
        Self { cards: RwLock::new(ClientCards::default()), next_id: AtomicI64::new(1) }
    }
}

impl MemoryClientCredStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientCredStore for MemoryClientCredStore {
    async fn save_card(&self, ctx: &Context, card: Card) -> Result<i64, StoreError> {
        check(ctx)?;
        let hash = id_token_hash(&card.id_token);
        let mut cards = self.cards.write().await;

        if let Some(&existing_id) = cards.by_id_token_hash.get(&hash) {
            let existing = cards.by_id.get(&existing_id).expect("index/store consistency");
            if existing.realm_id != card.realm_id {
                return Err(StoreError::CardMutation(format!(
                    "id_token already bound to realm {}",
                    hex::encode(existing.realm_id.as_bytes())
                )));
            }
            let mut updated = card;
            updated.id = Some(existing_id);
            cards.by_id.insert(existing_id, updated);
            return Ok(existing_id);
        }

        if let Some(id) = card.id {
            if cards.by_id.contains_key(&id) {
                return Err(StoreError::CardMutation(format!(
                    "card {id} exists under a different id_token"
                )));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let realm_key = card.realm_id.0.clone();
        let mut stored = card;
        stored.id = Some(id);
        cards.by_id.insert(id, stored);
        cards.by_id_token_hash.insert(hash, id);
        cards.by_realm.entry(realm_key).or_default().insert(id);
        Ok(id)
    }

    async fn remove_card(&self, ctx: &Context, id: i64) -> Result<(), StoreError> {
        check(ctx)?;
        let mut cards = self.cards.write().await;
        let Some(card) = cards.by_id.remove(&id) else {
            return Err(StoreError::NotFound(format!("card {id}")));
        };
        cards.by_id_token_hash.remove(&id_token_hash(&card.id_token));
        if let Some(set) = cards.by_realm.get_mut(&card.realm_id.0) {
            set.remove(&id);
        }
        Ok(())
    }

    async fn load_by_id(&self, ctx: &Context, id: i64) -> Result<Card, StoreError> {
        check(ctx)?;
        self.cards
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("card {id}")))
    }

    async fn list_info(&self, ctx: &Context, query: &CardQuery) -> Result<Vec<CardInfo>, StoreError> {
        check(ctx)?;
        let cards = self.cards.read().await;
        let ids: Box<dyn Iterator<Item = i64>> = match &query.realm_id {
            Some(realm_id) => Box::new(cards.by_realm.get(&realm_id.0).cloned().unwrap_or_default().into_iter()),
            None => Box::new(cards.by_id.keys().copied().collect::<Vec<_>>().into_iter()),
        };
        Ok(ids
            .filter_map(|id| cards.by_id.get(&id))
            .map(|card| CardInfo {
                id: card.id.expect("stored card always has an id"),
                realm_id: card.realm_id.clone(),
                app_name: card.app_name.clone(),
                app_logo: card.app_logo.clone(),
            })
            .collect())
    }

    async fn card_count(&self, ctx: &Context) -> Result<usize, StoreError> {
        check(ctx)?;
        Ok(self.cards.read().await.by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn realm(b: u8) -> RealmId {
        RealmId::new(vec![b; 32]).unwrap()
    }

    fn card(realm_id: RealmId, id_token: [u8; 32]) -> Card {
        Card {
            id: None,
            realm_id,
            id_token,
            static_private_key: [9u8; 32],
            psk: [8u8; 32],
            app_name: "demo".into(),
            app_logo: None,
        }
    }

    #[tokio::test]
    async fn client_store_rejects_realm_mutation_but_allows_same_realm_resave() {
        let store = MemoryClientCredStore::new();
        let ctx = Context::background();
        let token = [5u8; 32];

        let id1 = store.save_card(&ctx, card(realm(1), token)).await.unwrap();
        let id2 = store.save_card(&ctx, card(realm(1), token)).await.unwrap();
        assert_eq!(id1, id2);

        let err = store.save_card(&ctx, card(realm(2), token)).await.unwrap_err();
        assert!(matches!(err, StoreError::CardMutation(_)));
        assert_eq!(store.card_count(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn client_store_remove_and_list_info_scoped_by_realm() {
        let store = MemoryClientCredStore::new();
        let ctx = Context::background();
        let id_a = store.save_card(&ctx, card(realm(1), [1u8; 32])).await.unwrap();
        let _id_b = store.save_card(&ctx, card(realm(2), [2u8; 32])).await.unwrap();

        let query = CardQuery { realm_id: Some(realm(1)) };
        let info = store.list_info(&ctx, &query).await.unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].id, id_a);

        store.remove_card(&ctx, id_a).await.unwrap();
        assert_eq!(store.card_count(&ctx).await.unwrap(), 1);
        assert!(store.load_by_id(&ctx, id_a).await.is_err());
    }

    #[tokio::test]
    async fn server_store_pop_authorization_is_single_use() {
        let store = MemoryServerCredStore::new(Arc::new(IdHasher::default_seeded()));
        let ctx = Context::background();
        let auth = EnrollAuthorization::new([3u8; 32], realm(1), "demo".into(), None, None).unwrap();
        store.save_enroll_authorization(&ctx, auth).await.unwrap();
        assert_eq!(store.authorization_count(&ctx).await.unwrap(), 1);

        store.pop_enroll_authorization(&ctx, &[3u8; 32]).await.unwrap();
        assert_eq!(store.authorization_count(&ctx).await.unwrap(), 0);
        assert!(store.pop_enroll_authorization(&ctx, &[3u8; 32]).await.is_err());
    }

    #[tokio::test]
    async fn server_store_save_and_remove_card_by_card_id_key() {
        let store = MemoryServerCredStore::new(Arc::new(IdHasher::default_seeded()));
        let ctx = Context::background();
        let server_card = ServerCard {
            card_id: [4u8; 32],
            realm_id: realm(1),
            remote_static_key: [6u8; 32],
            psk: [7u8; 32],
        };
        store.save_card(&ctx, server_card).await.unwrap();
        assert_eq!(store.card_count(&ctx).await.unwrap(), 1);

        store.remove_card(&ctx, &ServerCardKey::CardIdKey([4u8; 32])).await.unwrap();
        assert_eq!(store.card_count(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn server_store_load_and_remove_card_by_id_token_access() {
        let store = MemoryServerCredStore::new(Arc::new(IdHasher::default_seeded()));
        let ctx = Context::background();
        let card_id = [4u8; 32];
        let server_card = ServerCard { card_id, realm_id: realm(1), remote_static_key: [6u8; 32], psk: [7u8; 32] };
        store.save_card(&ctx, server_card).await.unwrap();

        let access = ServerCardAccess::id_token(&card_id).unwrap();
        let loaded = store.load_card(&ctx, &access).await.unwrap();
        assert_eq!(loaded.card_id, card_id);

        store.remove_card(&ctx, &ServerCardKey::IdToken(card_id)).await.unwrap();
        assert_eq!(store.card_count(&ctx).await.unwrap(), 0);
        assert!(store.load_card(&ctx, &access).await.is_err());
    }
}
