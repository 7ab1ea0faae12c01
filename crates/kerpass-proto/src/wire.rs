//! CBOR integer-keyed wire message shapes.
//!
//! Every message is a top-level CBOR map with small-integer keys — the
//! same indexed-map convention CTAP2 authenticators use on the wire, kept
//! here by hand rather than through a derive macro so the key numbering
//! stays a visible, auditable contract.

use serde_cbor::Value;

use crate::error::ProtoError;

fn get<'a>(map: &'a std::collections::BTreeMap<Value, Value>, key: i64) -> Option<&'a Value> {
    map.get(&Value::Integer(key as i128))
}

fn require_bytes(map: &std::collections::BTreeMap<Value, Value>, key: i64, field: &str) -> Result<Vec<u8>, ProtoError> {
    match get(map, key) {
        Some(Value::Bytes(b)) => Ok(b.clone()),
        _ => Err(ProtoError::Validation(format!("missing or malformed field {field} ({key})"))),
    }
}

fn optional_bytes(map: &std::collections::BTreeMap<Value, Value>, key: i64) -> Option<Vec<u8>> {
    match get(map, key) {
        Some(Value::Bytes(b)) => Some(b.clone()),
        _ => None,
    }
}

fn require_text(map: &std::collections::BTreeMap<Value, Value>, key: i64, field: &str) -> Result<String, ProtoError> {
    match get(map, key) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(ProtoError::Validation(format!("missing or malformed field {field} ({key})"))),
    }
}

fn optional_text(map: &std::collections::BTreeMap<Value, Value>, key: i64) -> Option<String> {
    match get(map, key) {
        Some(Value::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn parse_map(bytes: &[u8]) -> Result<std::collections::BTreeMap<Value, Value>, ProtoError> {
    match serde_cbor::from_slice::<Value>(bytes)? {
        Value::Map(m) => Ok(m),
        _ => Err(ProtoError::Validation("expected a cbor map".into())),
    }
}

fn encode_map(pairs: Vec<(i64, Value)>) -> Vec<u8> {
    let map: std::collections::BTreeMap<Value, Value> =
        pairs.into_iter().map(|(k, v)| (Value::Integer(k as i128), v)).collect();
    serde_cbor::to_vec(&Value::Map(map)).expect("cbor map encoding never fails")
}

/// `{1: RealmId, 2: NoiseMsg}`. RealmId length in `[32, 64]`, NoiseMsg `>= 32`.
#[derive(Debug, Clone)]
pub struct EnrollReq {
    pub realm_id: Vec<u8>,
    pub noise_msg: Vec<u8>,
}

impl EnrollReq {
    pub fn new(realm_id: Vec<u8>, noise_msg: Vec<u8>) -> Result<Self, ProtoError> {
        if !(32..=64).contains(&realm_id.len()) {
            return Err(ProtoError::Validation(format!(
                "realm_id length must be in [32, 64], got {}",
                realm_id.len()
            )));
        }
        if noise_msg.len() < 32 {
            return Err(ProtoError::Validation(format!(
                "noise_msg must be at least 32 bytes, got {}",
                noise_msg.len()
            )));
        }
        Ok(Self { realm_id, noise_msg })
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        encode_map(vec![
            (1, Value::Bytes(self.realm_id.clone())),
            (2, Value::Bytes(self.noise_msg.clone())),
        ])
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ProtoError> {
        let map = parse_map(bytes)?;
        Self::new(require_bytes(&map, 1, "realm_id")?, require_bytes(&map, 2, "noise_msg")?)
    }
}

/// Wire shape of an enrollment authorization presentation: `{1: AuthorizationId}`.
#[derive(Debug, Clone)]
pub struct EnrollAuthorizationWire {
    pub authorization_id: Vec<u8>,
}

impl EnrollAuthorizationWire {
    pub fn new(authorization_id: Vec<u8>) -> Result<Self, ProtoError> {
        if authorization_id.len() < 32 {
            return Err(ProtoError::Validation(format!(
                "authorization_id must be at least 32 bytes, got {}",
                authorization_id.len()
            )));
        }
        Ok(Self { authorization_id })
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        encode_map(vec![(1, Value::Bytes(self.authorization_id.clone()))])
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ProtoError> {
        let map = parse_map(bytes)?;
        Self::new(require_bytes(&map, 1, "authorization_id")?)
    }
}

/// `{1: IdToken/CardId, 2?: UserId, 3: AppName, 4?: AppDesc, 5?: AppLogo}`.
#[derive(Debug, Clone)]
pub struct EnrollCardCreateResp {
    pub card_id: Vec<u8>,
    pub user_id: Option<String>,
    pub app_name: String,
    pub app_desc: Option<String>,
    pub app_logo: Option<Vec<u8>>,
}

impl EnrollCardCreateResp {
    pub fn new(
        card_id: Vec<u8>,
        user_id: Option<String>,
        app_name: String,
        app_desc: Option<String>,
        app_logo: Option<Vec<u8>>,
    ) -> Result<Self, ProtoError> {
        if card_id.len() < 32 {
            return Err(ProtoError::Validation(format!("card_id must be at least 32 bytes, got {}", card_id.len())));
        }
        Ok(Self { card_id, user_id, app_name, app_desc, app_logo })
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut pairs = vec![(1, Value::Bytes(self.card_id.clone())), (3, Value::Text(self.app_name.clone()))];
        if let Some(u) = &self.user_id {
            pairs.push((2, Value::Text(u.clone())));
        }
        if let Some(d) = &self.app_desc {
            pairs.push((4, Value::Text(d.clone())));
        }
        if let Some(l) = &self.app_logo {
            pairs.push((5, Value::Bytes(l.clone())));
        }
        encode_map(pairs)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ProtoError> {
        let map = parse_map(bytes)?;
        Self::new(
            require_bytes(&map, 1, "card_id")?,
            optional_text(&map, 2),
            require_text(&map, 3, "app_name")?,
            optional_text(&map, 4),
            optional_bytes(&map, 5),
        )
    }
}

/// HTTP session-carrier envelope: `{1: SessionId, 2: Msg}`.
#[derive(Debug, Clone)]
pub struct SessionEnvelope {
    pub session_id: Vec<u8>,
    pub msg: Vec<u8>,
}

impl SessionEnvelope {
    pub fn new(session_id: Vec<u8>, msg: Vec<u8>) -> Self {
        Self { session_id, msg }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        encode_map(vec![(1, Value::Bytes(self.session_id.clone())), (2, Value::Bytes(self.msg.clone()))])
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ProtoError> {
        let map = parse_map(bytes)?;
        Ok(Self::new(require_bytes(&map, 1, "session_id")?, require_bytes(&map, 2, "msg")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enroll_req_round_trips() {
        let req = EnrollReq::new(vec![1u8; 32], vec![2u8; 40]).unwrap();
        let bytes = req.to_cbor();
        let back = EnrollReq::from_cbor(&bytes).unwrap();
        assert_eq!(back.realm_id, req.realm_id);
        assert_eq!(back.noise_msg, req.noise_msg);
    }

    #[test]
    fn enroll_req_rejects_short_realm_and_msg() {
        assert!(EnrollReq::new(vec![1u8; 31], vec![2u8; 40]).is_err());
        assert!(EnrollReq::new(vec![1u8; 32], vec![2u8; 31]).is_err());
    }

    #[test]
    fn card_create_resp_round_trips_with_optional_fields_absent() {
        let resp = EnrollCardCreateResp::new(vec![3u8; 32], None, "demo".into(), None, None).unwrap();
        let back = EnrollCardCreateResp::from_cbor(&resp.to_cbor()).unwrap();
        assert_eq!(back.card_id, resp.card_id);
        assert_eq!(back.app_name, "demo");
        assert!(back.user_id.is_none());
        assert!(back.app_desc.is_none());
        assert!(back.app_logo.is_none());
    }

    #[test]
    fn card_create_resp_round_trips_with_optional_fields_present() {
        let resp = EnrollCardCreateResp::new(
            vec![3u8; 32],
            Some("alice".into()),
            "demo".into(),
            Some("a demo app".into()),
            Some(vec![9u8; 10]),
        )
        .unwrap();
        let back = EnrollCardCreateResp::from_cbor(&resp.to_cbor()).unwrap();
        assert_eq!(back.user_id.as_deref(), Some("alice"));
        assert_eq!(back.app_desc.as_deref(), Some("a demo app"));
        assert_eq!(back.app_logo, Some(vec![9u8; 10]));
    }

    #[test]
    fn session_envelope_round_trips() {
        let env = SessionEnvelope::new(vec![1, 2, 3], vec![4, 5, 6, 7]);
        let back = SessionEnvelope::from_cbor(&env.to_cbor()).unwrap();
        assert_eq!(back.session_id, env.session_id);
        assert_eq!(back.msg, env.msg);
    }

    #[test]
    fn malformed_cbor_is_rejected() {
        assert!(EnrollReq::from_cbor(&[0xff, 0x00]).is_err());
    }
}
