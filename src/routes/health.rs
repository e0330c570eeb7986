use axum::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({ "service": "boing-sentryd", "status": "ok" }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
