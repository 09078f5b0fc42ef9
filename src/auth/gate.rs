use std::sync::Arc;

use tracing::{debug, error};

use super::{AuthError, PermissionTable, TokenVerifier};
use crate::store::{StoreHandle, StoreManager};

/// Authorizes a bearer token for one (resource, method) pair and leases the
/// caller's tenant store. Holds no per-request state.
pub struct AccessGate {
    verifier: TokenVerifier,
    permissions: Arc<PermissionTable>,
    stores: Arc<StoreManager>,
}

impl AccessGate {
    pub fn new(verifier: TokenVerifier, permissions: Arc<PermissionTable>, stores: Arc<StoreManager>) -> Self {
        Self {
            verifier,
            permissions,
            stores,
        }
    }

    pub fn stores(&self) -> &Arc<StoreManager> {
        &self.stores
    }

    pub async fn authorize(&self, token: &str, resource: &str, method: &str) -> Result<StoreHandle, AuthError> {
        let claims = self.verifier.verify(token)?;

        if !self.permissions.has_permission(&claims.roles, resource, method) {
            error!(
                roles = ?claims.roles,
                resource,
                method,
                "Not enough permissions for {:?} to access {} with method {}",
                claims.roles,
                resource,
                method
            );
            return Err(AuthError::Authorization {
                roles: claims.roles,
                resource: resource.to_string(),
                method: method.to_string(),
            });
        }

        debug!(tenant = %claims.tenant, resource, method, "Access granted");
        Ok(self.stores.tenant(&claims.tenant).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter_eq;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/issuer_private.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/issuer_public.pem");

    fn gate() -> AccessGate {
        let verifier = TokenVerifier::from_rsa_pem(PUBLIC_PEM, "gate-client").unwrap();
        let permissions =
            PermissionTable::from_json_str(r#"{"editor": {"resource1": ["POST", "GET"]}}"#).unwrap();
        AccessGate::new(verifier, Arc::new(permissions), Arc::new(StoreManager::memory()))
    }

    fn token(tenant: &str, roles: &[&str], exp_offset: i64) -> String {
        let claims = json!({
            "exp": chrono::Utc::now().timestamp() + exp_offset,
            "bdName": tenant,
            "resource_access": {"gate-client": {"roles": roles}}
        });
        let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }

    #[tokio::test]
    async fn authorized_roles_get_tenant_store() {
        let gate = gate();
        let store = gate
            .authorize(&token("tenant_a", &["editor"], 300), "resource1", "POST")
            .await
            .unwrap();
        assert!(store.find_one("example", &filter_eq("name", "x")).await.unwrap().is_none());
        assert_eq!(gate.stores().cached_tenants().await, 1);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let gate = gate();
        let a = gate
            .authorize(&token("tenant_a", &["editor"], 300), "resource1", "POST")
            .await
            .unwrap();
        a.insert_one("example", filter_eq("name", "x")).await.unwrap();

        let b = gate
            .authorize(&token("tenant_b", &["editor"], 300), "resource1", "GET")
            .await
            .unwrap();
        assert!(b.find_one("example", &filter_eq("name", "x")).await.unwrap().is_none());

        let a_again = gate
            .authorize(&token("tenant_a", &["editor"], 300), "resource1", "GET")
            .await
            .unwrap();
        assert!(a_again.find_one("example", &filter_eq("name", "x")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_permission_is_authorization_error() {
        let gate = gate();
        let err = gate
            .authorize(&token("tenant_a", &["viewer"], 300), "resource1", "DELETE")
            .await
            .err()
            .unwrap();
        match err {
            AuthError::Authorization { roles, resource, method } => {
                assert_eq!(roles, vec!["viewer".to_string()]);
                assert_eq!(resource, "resource1");
                assert_eq!(method, "DELETE");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = gate
            .authorize(&token("tenant_a", &["editor"], 300), "resource1", "DELETE")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::Authorization { .. }));
    }

    #[tokio::test]
    async fn expired_token_is_authentication_error_before_permission_check() {
        let gate = gate();
        let err = gate
            .authorize(&token("tenant_a", &["editor"], -60), "resource1", "POST")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::Authentication(_)));
        assert_eq!(gate.stores().cached_tenants().await, 0);
    }

    #[tokio::test]
    async fn denied_requests_do_not_open_tenant_stores() {
        let gate = gate();
        let _ = gate
            .authorize(&token("tenant_a", &["viewer"], 300), "resource1", "GET")
            .await;
        assert_eq!(gate.stores().cached_tenants().await, 0);
    }
}
