pub mod gate;
pub mod permissions;
pub mod verifier;

use thiserror::Error;

use crate::store::StoreError;

pub use gate::AccessGate;
pub use permissions::PermissionTable;
pub use verifier::{fetch_realm_public_key, public_key_pem, TokenVerifier, VerifiedClaims};

/// Failures of the access gate. Both auth variants surface as 401.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed, badly signed or expired token, or unusable claims
    #[error("Could not validate credentials: {0}")]
    Authentication(String),

    /// Valid token whose roles do not grant the method on the resource
    #[error("Not enough permissions for {roles:?} to access {resource} with method {method}")]
    Authorization {
        roles: Vec<String>,
        resource: String,
        method: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
