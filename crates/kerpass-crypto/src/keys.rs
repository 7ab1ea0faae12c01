//! Typed key sum types.
//!
//! `ServerCardKey` covers every way a server-side card row can be looked
//! up; only its `ServerCardAccess` subset actually carries the entropy
//! needed to unlock the card's secrets. The enroll-side pair mirrors this
//! split for enrollment authorizations. Store implementations dispatch on
//! variant; operations that load secret material only accept the access
//! subset, so a plain integer-id lookup can never be mistaken for an
//! authorized read.
//!
//! `ServerCardAccess`/`EnrollAccess` wrap a private inner enum so the
//! access-bearing variants can't be built from outside this crate except
//! through the validated constructors (`id_token`/`otp_id`/`enroll_token`);
//! a sibling module may still match on the wrapped value via `.kind()`.

use crate::error::CryptoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCardKey {
    CardIdKey([u8; 32]),
    CardId(i64),
    IdToken([u8; 32]),
    OtpId { realm: [u8; 32], username: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ServerCardAccessKind {
    IdToken([u8; 32]),
    OtpId { realm: [u8; 32], username: String },
}

/// The subset of `ServerCardKey` that carries access (not just a lookup
/// handle). Constructible only through the validated constructors below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCardAccess(pub(crate) ServerCardAccessKind);

impl ServerCardAccess {
    pub fn id_token(token: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = token
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("IdToken must be 32 bytes".into()))?;
        Ok(Self(ServerCardAccessKind::IdToken(arr)))
    }

    pub fn otp_id(realm: [u8; 32], username: impl Into<String>) -> Self {
        Self(ServerCardAccessKind::OtpId { realm, username: username.into() })
    }
}

impl From<ServerCardAccess> for ServerCardKey {
    fn from(access: ServerCardAccess) -> Self {
        match access.0 {
            ServerCardAccessKind::IdToken(t) => ServerCardKey::IdToken(t),
            ServerCardAccessKind::OtpId { realm, username } => ServerCardKey::OtpId { realm, username },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollKey {
    EnrollIdKey([u8; 32]),
    EnrollId(i64),
    EnrollToken([u8; 32]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EnrollAccessKind {
    EnrollToken([u8; 32]),
}

/// The access-bearing subset of `EnrollKey`: only a raw enrollment token
/// unlocks an authorization. Constructible only via `enroll_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollAccess(pub(crate) EnrollAccessKind);

impl EnrollAccess {
    pub fn enroll_token(token: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = token
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("EnrollToken must be 32 bytes".into()))?;
        Ok(Self(EnrollAccessKind::EnrollToken(arr)))
    }
}

impl From<EnrollAccess> for EnrollKey {
    fn from(access: EnrollAccess) -> Self {
        let EnrollAccessKind::EnrollToken(t) = access.0;
        EnrollKey::EnrollToken(t)
    }
}
