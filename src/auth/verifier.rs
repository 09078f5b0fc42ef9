use std::collections::HashMap;
use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{error, info};

use super::AuthError;
use crate::config::ConfigError;
use crate::store::is_valid_identifier;

/// Raw claims as issued by the realm. Only the fields this service reads are modelled.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(rename = "bdName")]
    db_name: Option<String>,
    #[serde(default)]
    resource_access: HashMap<String, ClientAccess>,
}

#[derive(Debug, Deserialize)]
struct ClientAccess {
    #[serde(default)]
    roles: Vec<String>,
}

/// Claims that survived signature, expiry and shape checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub tenant: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RealmInfo {
    public_key: String,
}

/// Validates RS256 bearer tokens against the issuer's public key
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    client_id: String,
}

impl TokenVerifier {
    pub fn new(key: DecodingKey, client_id: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        // Audience is not checked: issued tokens name the realm account, not this service
        validation.validate_aud = false;
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            key,
            validation,
            client_id: client_id.into(),
        }
    }

    pub fn from_rsa_pem(pem: &str, client_id: impl Into<String>) -> Result<Self, ConfigError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::new(key, client_id))
    }

    /// Verify signature and expiry, then decode tenant and client roles
    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let data = decode::<TokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            error!("Token rejected: {}", e);
            AuthError::Authentication(e.to_string())
        })?;
        let claims = data.claims;

        let tenant = claims.db_name.ok_or_else(|| {
            error!("Token rejected: missing bdName claim");
            AuthError::Authentication("missing bdName claim".to_string())
        })?;
        if !is_valid_identifier(&tenant) {
            error!("Token rejected: invalid tenant identifier '{}'", tenant);
            return Err(AuthError::Authentication(format!("invalid tenant identifier '{}'", tenant)));
        }

        let mut resource_access = claims.resource_access;
        let access = resource_access.remove(&self.client_id).ok_or_else(|| {
            error!("Token rejected: no resource_access entry for client '{}'", self.client_id);
            AuthError::Authentication(format!("no roles for client '{}'", self.client_id))
        })?;

        Ok(VerifiedClaims {
            tenant,
            roles: access.roles,
        })
    }
}

/// Wrap a bare base64 SPKI key in PEM armour
pub fn public_key_pem(base64_key: &str) -> String {
    format!(
        "-----BEGIN PUBLIC KEY-----\r\n{}\r\n-----END PUBLIC KEY-----",
        base64_key.trim()
    )
}

/// Fetch the realm's public key. Startup only; errors abort the process.
pub async fn fetch_realm_public_key(realm_url: &str) -> Result<String, ConfigError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| ConfigError::PublicKeyFetch(e.to_string()))?;

    let response = client
        .get(realm_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            error!("Failed to fetch realm public key from {}: {}", realm_url, e);
            ConfigError::PublicKeyFetch(e.to_string())
        })?;

    let realm: RealmInfo = response.json().await.map_err(|e| {
        error!("Realm response from {} has no public_key: {}", realm_url, e);
        ConfigError::PublicKeyFetch(e.to_string())
    })?;

    info!("Loaded realm public key from {}", realm_url);
    Ok(public_key_pem(&realm.public_key))
}
