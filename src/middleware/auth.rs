use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};

use crate::auth::AccessGate;
use crate::error::ApiError;
use crate::store::StoreHandle;

/// Tenant store leased to the current request, injected by [`access_gate_middleware`]
#[derive(Clone)]
pub struct TenantStore(pub StoreHandle);

/// Middleware state: the shared gate plus the resource a route group belongs to
#[derive(Clone)]
pub struct ResourceGuard {
    gate: Arc<AccessGate>,
    resource: &'static str,
}

impl ResourceGuard {
    pub fn new(gate: Arc<AccessGate>, resource: &'static str) -> Self {
        Self { gate, resource }
    }
}

/// Authorizes the bearer token for the guarded resource and the request's method,
/// then injects the caller's [`TenantStore`]
pub async fn access_gate_middleware(
    State(guard): State<ResourceGuard>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).map_err(|msg| {
        tracing::warn!("Rejected request to {}: {}", guard.resource, msg);
        ApiError::unauthorized("Not authenticated")
    })?;

    let method = permission_method(request.method()).to_owned();
    let store = guard.gate.authorize(token, guard.resource, &method).await?;

    request.extensions_mut().insert(TenantStore(store));
    Ok(next.run(request).await)
}

/// Method name checked against the permission table. HEAD is served by the
/// GET handler, so it needs the same grant.
fn permission_method(method: &Method) -> &str {
    if *method == Method::HEAD {
        "GET"
    } else {
        method.as_str()
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or("Missing Authorization header")?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    let (scheme, token) = auth_str
        .split_once(' ')
        .ok_or("Authorization header must use Bearer token format")?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err("Authorization header must use Bearer token format");
    }

    let token = token.trim();
    if token.is_empty() {
        return Err("Empty bearer token");
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers("bearer abc")), Ok("abc"));
    }

    #[test]
    fn head_is_checked_as_get() {
        assert_eq!(permission_method(&Method::HEAD), "GET");
        assert_eq!(permission_method(&Method::GET), "GET");
        assert_eq!(permission_method(&Method::DELETE), "DELETE");
    }

    #[test]
    fn rejects_missing_or_foreign_schemes() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
        assert!(extract_bearer_token(&headers("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_bearer_token(&headers("Bearer ")).is_err());
        assert!(extract_bearer_token(&headers("Bearer")).is_err());
    }
}
