//! Data model entities from the credential store's domain: realms, server
//! keys, enrollment authorizations, and the card records held on each side
//! of an enrollment.

use base64::Engine;
use zeroize::Zeroize;

use crate::error::StoreError;

pub const REALM_ID_LEN_MIN: usize = 32;
pub const APP_LOGO_MAX_BYTES: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RealmId(pub Vec<u8>);

impl RealmId {
    pub fn new(bytes: Vec<u8>) -> Result<Self, StoreError> {
        if bytes.len() < REALM_ID_LEN_MIN {
            return Err(StoreError::Validation(format!(
                "realm id must be at least {REALM_ID_LEN_MIN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Operator-managed realm metadata.
#[derive(Debug, Clone)]
pub struct Realm {
    pub realm_id: RealmId,
    pub app_name: String,
    pub app_desc: Option<String>,
    pub app_logo: Option<Vec<u8>>,
}

impl Realm {
    pub fn new(
        realm_id: RealmId,
        app_name: String,
        app_desc: Option<String>,
        app_logo: Option<Vec<u8>>,
    ) -> Result<Self, StoreError> {
        if app_name.trim().is_empty() {
            return Err(StoreError::Validation("app_name must not be empty".into()));
        }
        if let Some(logo) = &app_logo {
            if logo.len() > APP_LOGO_MAX_BYTES {
                return Err(StoreError::Validation(format!(
                    "app_logo exceeds {APP_LOGO_MAX_BYTES} bytes"
                )));
            }
        }
        Ok(Self { realm_id, app_name, app_desc, app_logo })
    }
}

/// Static server keypair for a realm, loaded once at service start.
#[derive(Clone)]
pub struct ServerKey {
    pub realm_id: RealmId,
    pub private_key: x25519_dalek::StaticSecret,
    pub certificate: Vec<u8>,
}

impl ServerKey {
    pub fn new(
        realm_id: RealmId,
        private_key: x25519_dalek::StaticSecret,
        certificate: Vec<u8>,
    ) -> Result<Self, StoreError> {
        if certificate.is_empty() {
            return Err(StoreError::Validation("certificate must not be empty".into()));
        }
        Ok(Self { realm_id, private_key, certificate })
    }
}

/// Single-use grant to create a new card in a realm.
#[derive(Debug, Clone)]
pub struct EnrollAuthorization {
    pub authorization_id: [u8; 32],
    pub realm_id: RealmId,
    pub app_name: String,
    pub app_logo: Option<Vec<u8>>,
    pub user_data: Option<serde_json::Value>,
}

impl EnrollAuthorization {
    pub fn new(
        authorization_id: [u8; 32],
        realm_id: RealmId,
        app_name: String,
        app_logo: Option<Vec<u8>>,
        user_data: Option<serde_json::Value>,
    ) -> Result<Self, StoreError> {
        if app_name.trim().is_empty() {
            return Err(StoreError::Validation("app_name must not be empty".into()));
        }
        Ok(Self { authorization_id, realm_id, app_name, app_logo, user_data })
    }
}

/// Server-side persisted card record.
#[derive(Debug, Clone)]
pub struct ServerCard {
    pub card_id: [u8; 32],
    pub realm_id: RealmId,
    pub remote_static_key: [u8; 32],
    pub psk: [u8; 32],
}

impl Drop for ServerCard {
    fn drop(&mut self) {
        self.psk.zeroize();
    }
}

/// Client-side persisted card record. `realm_id` and `id_token` are frozen
/// once a card has been assigned an integer id — see [`CardMutation`].
///
/// [`CardMutation`]: crate::error::StoreError::CardMutation
#[derive(Debug, Clone)]
pub struct Card {
    pub id: Option<i64>,
    pub realm_id: RealmId,
    pub id_token: [u8; 32],
    pub static_private_key: [u8; 32],
    pub psk: [u8; 32],
    pub app_name: String,
    pub app_logo: Option<Vec<u8>>,
}

impl Drop for Card {
    fn drop(&mut self) {
        self.static_private_key.zeroize();
        self.psk.zeroize();
    }
}

/// Read-only wire counterpart of [`Realm`], hex-encoding the realm id and
/// base64-encoding the logo so the type is directly `serde`-serializable
/// for a realm-info response.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RealmInfo {
    pub realm_id: String,
    pub app_name: String,
    pub app_desc: Option<String>,
    pub app_logo: Option<String>,
}

impl From<&Realm> for RealmInfo {
    fn from(realm: &Realm) -> Self {
        Self {
            realm_id: hex::encode(realm.realm_id.as_bytes()),
            app_name: realm.app_name.clone(),
            app_desc: realm.app_desc.clone(),
            app_logo: realm.app_logo.as_deref().map(|logo| base64::engine::general_purpose::STANDARD.encode(logo)),
        }
    }
}

/// Filter applied to [`ClientCredStore::list_info`].
///
/// [`ClientCredStore::list_info`]: crate::traits::ClientCredStore::list_info
#[derive(Debug, Clone, Default)]
pub struct CardQuery {
    pub realm_id: Option<RealmId>,
}

/// Summary view returned by `list_info`, omitting secret material.
#[derive(Debug, Clone)]
pub struct CardInfo {
    pub id: i64,
    pub realm_id: RealmId,
    pub app_name: String,
    pub app_logo: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_info_hex_and_base64_encodes_realm_fields() {
        let realm = Realm::new(RealmId::new(vec![0xabu8; 32]).unwrap(), "demo".into(), None, Some(vec![1, 2, 3])).unwrap();
        let info = RealmInfo::from(&realm);
        assert_eq!(info.realm_id, "ab".repeat(32));
        assert_eq!(info.app_name, "demo");
        assert_eq!(info.app_logo.as_deref(), Some("AQID"));
    }
}
