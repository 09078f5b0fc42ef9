#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use tenant_gate::auth::{AccessGate, PermissionTable, TokenVerifier};
use tenant_gate::config::{AppConfig, StoreKind};
use tenant_gate::store::StoreManager;
use tenant_gate::AppState;

pub const CLIENT_ID: &str = "gate-client";
pub const ISSUER_PRIVATE_PEM: &str = include_str!("../fixtures/issuer_private.pem");
pub const ISSUER_PUBLIC_PEM: &str = include_str!("../fixtures/issuer_public.pem");
pub const ROGUE_PRIVATE_PEM: &str = include_str!("../fixtures/rogue_private.pem");

/// Permission table used by the scenario tests
pub const EDITOR_TABLE: &str = r#"{"editor": {"resource1": ["POST", "GET"]}}"#;

/// Grants every example2 method
pub const ADMIN_TABLE: &str = r#"{
    "admin": {"resource1": ["POST", "GET", "PUT", "DELETE"]},
    "editor": {"resource1": ["POST", "GET"]}
}"#;

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Start the API on a free port with an in-memory store and the given permission table
    pub async fn spawn(permissions: &str) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::from_env();
        config.server.port = port;
        config.database.backend = StoreKind::Memory;
        config.keycloak.client_id = CLIENT_ID.to_string();

        let verifier = TokenVerifier::from_rsa_pem(ISSUER_PUBLIC_PEM, CLIENT_ID)?;
        let permissions = PermissionTable::from_json_str(permissions)?;
        let gate = AccessGate::new(verifier, Arc::new(permissions), Arc::new(StoreManager::memory()));
        let app = tenant_gate::app(AppState::new(config, gate));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            port,
            base_url,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Sign a token the way the realm would, with roles under this client's resource_access entry
pub fn mint_token(tenant: &str, roles: &[&str], exp_offset_secs: i64) -> String {
    let claims = json!({
        "sub": "test-user",
        "aud": "account",
        "exp": chrono::Utc::now().timestamp() + exp_offset_secs,
        "bdName": tenant,
        "resource_access": { CLIENT_ID: { "roles": roles } }
    });
    sign_claims(&claims, ISSUER_PRIVATE_PEM)
}

pub fn sign_claims(claims: &Value, private_pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("valid fixture key");
    encode(&Header::new(Algorithm::RS256), claims, &key).expect("token signing")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
