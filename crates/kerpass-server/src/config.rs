//! Server configuration, read from the process environment.

use anyhow::{anyhow, Context, Result};

/// Runtime configuration for the enrollment HTTP endpoint.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to, e.g. `0.0.0.0:8443`.
    pub bind_address: String,
    /// Realm id this server enrolls cards into.
    pub realm_id: Vec<u8>,
    /// Name under which the realm's static keypair is stored in the key store.
    pub key_name: String,
}

impl ServerConfig {
    /// Reads configuration from `KERPASS_BIND_ADDR`, `KERPASS_REALM_ID`
    /// (hex-encoded, at least 32 bytes) and `KERPASS_KEY_NAME`.
    pub fn from_env() -> Result<Self> {
        let bind_address = std::env::var("KERPASS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8443".to_string());

        let realm_id_hex = std::env::var("KERPASS_REALM_ID").context("KERPASS_REALM_ID must be set")?;
        let realm_id = hex::decode(realm_id_hex.trim()).map_err(|e| anyhow!("KERPASS_REALM_ID is not valid hex: {e}"))?;
        if realm_id.len() < 32 {
            return Err(anyhow!("KERPASS_REALM_ID must decode to at least 32 bytes, got {}", realm_id.len()));
        }

        let key_name = std::env::var("KERPASS_KEY_NAME").unwrap_or_else(|_| "default".to_string());

        Ok(Self { bind_address, realm_id, key_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_realm_id() {
        std::env::set_var("KERPASS_REALM_ID", "aabb");
        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
        std::env::remove_var("KERPASS_REALM_ID");
    }
}
