#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::{MockServer, ResponseTemplate};

use tillwise_client::{ApiClient, ClientConfig, MemorySessionStorage, SessionStore};

pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "OK",
        "data": data,
        "error": null,
        "meta": null,
        "timestamp": "2026-01-01T00:00:00Z",
    }))
}

pub fn ok_empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "OK",
        "data": null,
        "error": null,
    }))
}

pub fn fail(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "success": false,
        "message": message,
        "data": null,
        "error": { "code": code, "message": message },
    }))
}

pub fn tokens(access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 900,
    })
}

pub fn page(items: Value) -> Value {
    let total = items.as_array().map_or(0, Vec::len);
    json!({
        "items": items,
        "pagination": {
            "total": total,
            "page": 1,
            "size": 20,
            "total_pages": 1,
            "has_next": false,
            "has_prev": false,
        },
    })
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_secs(5),
        retry_count: 0,
        retry_backoff: Duration::from_millis(10),
        ..ClientConfig::new(server.uri())
    }
}

pub fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(config(server)).unwrap()
}

pub fn store(server: &MockServer) -> (SessionStore, Arc<MemorySessionStorage>) {
    let storage = Arc::new(MemorySessionStorage::new());
    let store = SessionStore::new(client(server), storage.clone());
    (store, storage)
}
