use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreBackend;

/// Startup failures. None of these are recoverable at request time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid permission table: {0}")]
    InvalidPermissions(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Failed to fetch public key: {0}")]
    PublicKeyFetch(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub app: AppInfo,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub keycloak: KeycloakConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub roles_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreKind,
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

/// Token issuer settings. Either `public_key` or `url` must be set before the
/// verifier can be built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeycloakConfig {
    pub url: Option<String>,
    pub client_id: String,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // App overrides
        if let Ok(v) = env::var("APP_NAME") {
            self.app.name = v;
        }
        if let Ok(v) = env::var("APP_VERSION") {
            self.app.version = v;
        }
        if let Ok(v) = env::var("APP_DESCRIPTION") {
            self.app.description = v;
        }

        // Server overrides
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("ROLES_FILE") {
            self.server.roles_file = v;
        }

        // Database overrides
        if let Ok(v) = env::var("STORE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.database.backend = StoreKind::Memory,
                "postgres" => self.database.backend = StoreKind::Postgres,
                _ => {}
            }
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Keycloak overrides
        if let Ok(v) = env::var("KEYCLOAK_URL") {
            self.keycloak.url = Some(v);
        }
        if let Ok(v) = env::var("KEYCLOAK_CLIENT_ID") {
            self.keycloak.client_id = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_PUBLIC_KEY") {
            if !v.trim().is_empty() {
                self.keycloak.public_key = Some(v);
            }
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    /// Backend for the tenant store manager
    pub fn store_backend(&self) -> Result<StoreBackend, ConfigError> {
        match self.database.backend {
            StoreKind::Memory => Ok(StoreBackend::Memory),
            StoreKind::Postgres => {
                let database_url = self.database.url.clone().ok_or(ConfigError::Missing("DATABASE_URL"))?;
                Ok(StoreBackend::Postgres {
                    database_url,
                    max_connections: self.database.max_connections,
                    connect_timeout: Duration::from_secs(self.database.connection_timeout),
                })
            }
        }
    }

    fn app_info() -> AppInfo {
        AppInfo {
            name: "tenant-gate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Document CRUD API with token role gating".to_string(),
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            app: Self::app_info(),
            server: ServerConfig {
                port: 8000,
                roles_file: "roles.json".to_string(),
            },
            database: DatabaseConfig {
                backend: StoreKind::Postgres,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            keycloak: KeycloakConfig::default(),
            security: SecurityConfig {
                cors_origins: vec![
                    "http://localhost".to_string(),
                    "http://localhost:8080".to_string(),
                    "http://localhost:9000".to_string(),
                ],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                backend: StoreKind::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                backend: StoreKind::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            ..Self::development()
        }
    }
}
