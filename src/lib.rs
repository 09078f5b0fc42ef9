pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod store;

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{fetch_realm_public_key, public_key_pem, AccessGate, PermissionTable, TokenVerifier};
use crate::config::{AppConfig, ConfigError};
use crate::store::StoreManager;

/// Shared, read-only application state built once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AccessGate>,
}

impl AppState {
    pub fn new(config: AppConfig, gate: AccessGate) -> Self {
        Self {
            config: Arc::new(config),
            gate: Arc::new(gate),
        }
    }
}

/// Load the permission table, resolve the issuer key and build the store manager
pub async fn build_state(config: AppConfig) -> Result<AppState, ConfigError> {
    let permissions = PermissionTable::from_path(&config.server.roles_file)?;
    info!(
        "Loaded permission table from {} ({} roles)",
        config.server.roles_file,
        permissions.role_count()
    );

    if config.keycloak.client_id.is_empty() {
        return Err(ConfigError::Missing("KEYCLOAK_CLIENT_ID"));
    }

    let pem = match (&config.keycloak.public_key, &config.keycloak.url) {
        (Some(key), _) if key.contains("-----BEGIN") => key.clone(),
        (Some(key), _) => public_key_pem(key),
        (None, Some(url)) => fetch_realm_public_key(url).await?,
        (None, None) => return Err(ConfigError::Missing("KEYCLOAK_URL or KEYCLOAK_PUBLIC_KEY")),
    };
    let verifier = TokenVerifier::from_rsa_pem(&pem, config.keycloak.client_id.as_str())?;

    let stores = StoreManager::new(config.store_backend()?);
    let gate = AccessGate::new(verifier, Arc::new(permissions), Arc::new(stores));

    Ok(AppState::new(config, gate))
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .with_state(state.clone())
        // Token-gated resources
        .nest("/example", handlers::example::routes(state.gate.clone()))
        // Global middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::mirror_request())
}
