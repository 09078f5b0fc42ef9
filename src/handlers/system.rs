use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::AppState;

/// GET / - service description
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let app = &state.config.app;

    Json(json!({
        "success": true,
        "data": {
            "name": app.name,
            "version": app.version,
            "description": app.description,
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "example1": "/example/example1 (public)",
                "example2": "/example/example2 (bearer token, resource1)",
            }
        }
    }))
}

/// GET /health - store connectivity
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.gate.stores().health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database_error": e.to_string()
                    }
                })),
            )
        }
    }
}
