//! `CardIdGenerator` — produces the client-side `CardRef` triple
//! (`ClientUserId`, `ClientIdToken`, `ServerCardId`) consumed by the
//! enrollment client state machine.
//!
//! Two modes:
//! - `random`: no configured user-id factory. `ClientIdToken` is fresh
//!   random entropy, not derived from any user id. This is the "default"
//!   generator — a distinct instance, not a null/no-op receiver.
//! - `with_factory`: a `UserIdFactory` extracts a stable user id out of
//!   caller-supplied JSON user-data (e.g. an OIDC `sub` claim), and
//!   `ClientIdToken` is derived deterministically via `IdHasher`.
//!
//! In both modes `ServerCardId` is always the HKDF-derived `IdKey` for the
//! resulting `ClientIdToken` — it is never a copy of the token.

use std::sync::Arc;

use rand::RngCore;
use serde_json::Value;

use crate::error::CryptoError;
use crate::id_hasher::IdHasher;
use crate::keys::ServerCardAccess;

/// Extracts a stable user id from JSON user-data. Boxed so callers can
/// plug in whatever claim-extraction policy their realm uses.
pub type UserIdFactory = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// The triple a `CardIdGenerator` produces for one enrollment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRef {
    pub client_id_token: [u8; 32],
    pub client_user_id: Option<String>,
    pub server_card_id: [u8; 32],
}

#[derive(Clone)]
pub struct CardIdGenerator {
    hasher: Arc<IdHasher>,
    factory: Option<UserIdFactory>,
}

impl CardIdGenerator {
    /// The default generator: produces random tokens, no HKDF over any
    /// user id. A `CardIdGenerator` still needs an `IdHasher` to derive
    /// `ServerCardId` from the random `ClientIdToken`.
    pub fn random(hasher: Arc<IdHasher>) -> Self {
        Self { hasher, factory: None }
    }

    /// A generator that derives `ClientIdToken` deterministically from a
    /// user id extracted by `factory`.
    pub fn with_factory(hasher: Arc<IdHasher>, factory: UserIdFactory) -> Self {
        Self { hasher, factory: Some(factory) }
    }

    /// Convenience factory extracting the `"sub"` string field.
    pub fn sub_claim_factory() -> UserIdFactory {
        Arc::new(|v: &Value| v.get("sub").and_then(|s| s.as_str()).map(str::to_owned))
    }

    pub fn generate(&self, realm_id: &[u8; 32], user_data: Option<&Value>) -> Result<CardRef, CryptoError> {
        match (&self.factory, user_data) {
            (Some(factory), Some(data)) => {
                let user_id = factory(data).ok_or_else(|| {
                    CryptoError::Generator("user-data factory produced no user id".into())
                })?;
                let client_id_token = self.hasher.id_token_of_user_id(realm_id, user_id.as_bytes())?;
                let server_card_id = self
                    .hasher
                    .derive_from_card_access(&ServerCardAccess::id_token(&client_id_token)?)?
                    .id_key;
                Ok(CardRef {
                    client_id_token,
                    client_user_id: Some(user_id),
                    server_card_id,
                })
            }
            _ => {
                let mut client_id_token = [0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut client_id_token);
                let server_card_id = self
                    .hasher
                    .derive_from_card_access(&ServerCardAccess::id_token(&client_id_token)?)?
                    .id_key;
                Ok(CardRef {
                    client_id_token,
                    client_user_id: None,
                    server_card_id,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn random_mode_never_repeats() {
        let gen = CardIdGenerator::random(Arc::new(IdHasher::default_seeded()));
        let a = gen.generate(&[1u8; 32], None).unwrap();
        let b = gen.generate(&[1u8; 32], None).unwrap();
        assert_ne!(a.client_id_token, b.client_id_token);
        assert!(a.client_user_id.is_none());
        assert_ne!(a.server_card_id, a.client_id_token);
    }

    #[test]
    fn factory_mode_is_deterministic_and_bound_to_realm_and_sub() {
        let hasher = Arc::new(IdHasher::default_seeded());
        let gen = CardIdGenerator::with_factory(hasher, CardIdGenerator::sub_claim_factory());
        let data = json!({"sub": "alice"});
        let realm = [1u8; 32];

        let a = gen.generate(&realm, Some(&data)).unwrap();
        let b = gen.generate(&realm, Some(&data)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.client_user_id.as_deref(), Some("alice"));
        assert_ne!(a.server_card_id, a.client_id_token);

        let other_sub = json!({"sub": "bob"});
        let c = gen.generate(&realm, Some(&other_sub)).unwrap();
        assert_ne!(c.client_id_token, a.client_id_token);
        assert_ne!(c.server_card_id, a.server_card_id);

        let other_realm = [2u8; 32];
        let d = gen.generate(&other_realm, Some(&data)).unwrap();
        assert_ne!(d.client_id_token, a.client_id_token);
        assert_ne!(d.server_card_id, a.server_card_id);
    }

    #[test]
    fn factory_missing_claim_is_an_error() {
        let hasher = Arc::new(IdHasher::default_seeded());
        let gen = CardIdGenerator::with_factory(hasher, CardIdGenerator::sub_claim_factory());
        let data = json!({"not_sub": "alice"});
        assert!(gen.generate(&[1u8; 32], Some(&data)).is_err());
    }
}
