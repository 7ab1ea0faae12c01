//! Abstract store contracts. All operations take an explicit [`Context`]
//! carrying deadline/cancellation — no implicit thread-local is assumed.

use async_trait::async_trait;
use kerpass_crypto::{Context, ServerCardAccess, ServerCardKey};

use crate::error::StoreError;
use crate::models::{Card, CardInfo, CardQuery, EnrollAuthorization, Realm, RealmId, ServerCard, ServerKey};

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_server_key(&self, ctx: &Context, realm_id: &RealmId, name: &str) -> Result<Option<ServerKey>, StoreError>;
    async fn save_server_key(&self, ctx: &Context, name: &str, key: ServerKey) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ServerCredStore: Send + Sync {
    async fn list_realm(&self, ctx: &Context) -> Result<Vec<Realm>, StoreError>;
    async fn load_realm(&self, ctx: &Context, realm_id: &RealmId) -> Result<Realm, StoreError>;
    async fn save_realm(&self, ctx: &Context, realm: Realm) -> Result<(), StoreError>;
    async fn remove_realm(&self, ctx: &Context, realm_id: &RealmId) -> Result<(), StoreError>;

    /// Atomic load-and-delete. Exactly one concurrent caller observes
    /// success for any given authorization id; all others observe
    /// [`StoreError::NotFound`].
    async fn pop_enroll_authorization(&self, ctx: &Context, authorization_id: &[u8]) -> Result<EnrollAuthorization, StoreError>;
    async fn save_enroll_authorization(&self, ctx: &Context, auth: EnrollAuthorization) -> Result<(), StoreError>;
    async fn authorization_count(&self, ctx: &Context) -> Result<usize, StoreError>;

    async fn load_card(&self, ctx: &Context, access: &ServerCardAccess) -> Result<ServerCard, StoreError>;
    async fn save_card(&self, ctx: &Context, card: ServerCard) -> Result<(), StoreError>;
    async fn remove_card(&self, ctx: &Context, key: &ServerCardKey) -> Result<(), StoreError>;
    async fn card_count(&self, ctx: &Context) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait ClientCredStore: Send + Sync {
    /// Assigns and returns an integer id on first save. Rejects any
    /// attempt to change `realm_id` or `id_token` on an existing id, and
    /// rejects `id_token` collisions across distinct realms.
    async fn save_card(&self, ctx: &Context, card: Card) -> Result<i64, StoreError>;
    async fn remove_card(&self, ctx: &Context, id: i64) -> Result<(), StoreError>;
    async fn load_by_id(&self, ctx: &Context, id: i64) -> Result<Card, StoreError>;
    async fn list_info(&self, ctx: &Context, query: &CardQuery) -> Result<Vec<CardInfo>, StoreError>;
    async fn card_count(&self, ctx: &Context) -> Result<usize, StoreError>;
}
