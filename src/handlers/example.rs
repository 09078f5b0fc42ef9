use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::AccessGate;
use crate::error::ApiError;
use crate::middleware::{access_gate_middleware, ResourceGuard, TenantStore};
use crate::store::{filter_eq, Document, Filter, ID_FIELD};

/// Permission-table resource guarding the example2 endpoints
pub const RESOURCE: &str = "resource1";

const COLLECTION: &str = "example";
const PAGE_SIZE: usize = 100;

const NAME_FIELD: &str = "name";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// Routes mounted under `/example`
pub fn routes(gate: Arc<AccessGate>) -> Router {
    let guarded = Router::new()
        .route(
            "/example2",
            get(get_example2)
                .post(post_example2)
                .put(put_example2)
                .delete(delete_example2),
        )
        .route_layer(middleware::from_fn_with_state(
            ResourceGuard::new(gate, RESOURCE),
            access_gate_middleware,
        ));

    Router::new().route("/example1", get(example1)).merge(guarded)
}

/// Client payload: a `name` natural key plus arbitrary fields
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleModel {
    pub name: String,
    pub fields: Document,
}

impl ExampleModel {
    pub fn from_json(payload: Value) -> Result<Self, ApiError> {
        let Value::Object(mut fields) = payload else {
            return Err(ApiError::bad_request("Expected a JSON object"));
        };

        for system in [ID_FIELD, CREATED_AT, UPDATED_AT] {
            if fields.contains_key(system) {
                return Err(ApiError::bad_request(format!(
                    "System field '{}' cannot be set via API",
                    system
                )));
            }
        }

        let name = match fields.remove(NAME_FIELD) {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => {
                let mut field_errors = HashMap::new();
                field_errors.insert(NAME_FIELD.to_string(), "A non-empty string is required".to_string());
                return Err(ApiError::validation_error("Missing required fields", Some(field_errors)));
            }
        };

        Ok(Self { name, fields })
    }

    fn key(&self) -> Filter {
        filter_eq(NAME_FIELD, self.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub name: String,
}

/// GET /example/example1 - public liveness sample
pub async fn example1() -> Json<&'static str> {
    info!("Example1");
    Json("Example1")
}

/// POST /example/example2 - create a record unless its name is taken
pub async fn post_example2(
    Extension(TenantStore(store)): Extension<TenantStore>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<String>), ApiError> {
    let model = ExampleModel::from_json(payload)?;
    info!("post example with name: {}", model.name);

    if store.find_one(COLLECTION, &model.key()).await?.is_some() {
        return Err(ApiError::conflict("Data already exists"));
    }

    let now = json!(Utc::now());
    let mut document = model.fields;
    document.insert(NAME_FIELD.to_string(), Value::String(model.name));
    document.insert(CREATED_AT.to_string(), now.clone());
    document.insert(UPDATED_AT.to_string(), now);

    let id = store.insert_one(COLLECTION, document).await?;
    Ok((StatusCode::CREATED, Json(id)))
}

/// GET /example/example2[?name=] - one record by name, or the first page of all records
pub async fn get_example2(
    Extension(TenantStore(store)): Extension<TenantStore>,
    Query(query): Query<GetQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(name) = query.name else {
        info!("get all examples");
        let documents = store.find_many(COLLECTION, &Filter::new(), PAGE_SIZE).await?;
        return Ok(Json(Value::Array(documents.into_iter().map(Value::Object).collect())));
    };

    info!("get example with name: {}", name);
    match store.find_one(COLLECTION, &filter_eq(NAME_FIELD, name)).await? {
        Some(document) => Ok(Json(Value::Object(document))),
        None => Err(ApiError::not_found("Data not found")),
    }
}

/// PUT /example/example2 - merge fields into the record with the given name
pub async fn put_example2(
    Extension(TenantStore(store)): Extension<TenantStore>,
    Json(payload): Json<Value>,
) -> Result<Json<&'static str>, ApiError> {
    let model = ExampleModel::from_json(payload)?;
    info!("put example with name: {} and data: {:?}", model.name, model.fields);

    let key = model.key();
    let mut fields = model.fields;
    fields.insert(UPDATED_AT.to_string(), json!(Utc::now()));

    if !store.update_one(COLLECTION, &key, fields).await? {
        return Err(ApiError::not_found("Data not found"));
    }
    Ok(Json("Ok"))
}

/// DELETE /example/example2?name= - succeeds whether or not the record existed
pub async fn delete_example2(
    Extension(TenantStore(store)): Extension<TenantStore>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    info!("delete example with name: {}", query.name);

    let removed = store.delete_one(COLLECTION, &filter_eq(NAME_FIELD, query.name)).await?;
    if !removed {
        tracing::debug!("delete matched no record");
    }

    Ok(Json(json!({ "message": "Data deleted successfully" })))
}
