//! In-process mock Qryptic controller

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::net::TcpListener;

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";

/// Unsigned JWT valid for another hour
pub fn token() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + 3600;
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"alice","exp":{}}}"#, exp));
    format!("{}.{}.sig", header, payload)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t.split('.').count() == 3)
}

async fn health() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn login(Json(body): Json<Value>) -> Json<Value> {
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(json!({ "authToken": token() }))
    } else {
        Json(json!({ "authToken": "", "error": "invalid_credentials", "message": "wrong password" }))
    }
}

async fn sso_token(Query(params): Query<HashMap<String, String>>) -> Response {
    let verifier = params.get("code_verifier").map(String::as_str);
    let challenge = params.get("code_challenge").map(String::as_str);
    match (verifier, challenge) {
        (Some("pending"), Some(_)) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "authToken": "", "error": "" }))).into_response()
        }
        (Some("denied"), Some(_)) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "access_denied" })),
        )
            .into_response(),
        (Some(_), Some(_)) => Json(json!({ "authToken": token() })).into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

pub fn gateway_json(uuid: &str, name: &str) -> Value {
    json!({
        "uuid": uuid,
        "name": name,
        "domain": format!("{}.vpn.example.com", name.to_lowercase()),
        "ipAddress": "203.0.113.5",
        "port": 51820,
        "serverPublicKey": "c2VydmVyLXB1YmxpYy1rZXk="
    })
}

async fn gateway_list(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
    }
    Json(json!([
        gateway_json("gw-1", "Frankfurt"),
        gateway_json("gw-2", "Paris")
    ]))
    .into_response()
}

pub fn credential_json(uuid: &str) -> Value {
    json!({
        "clientUuid": format!("client-for-{}", uuid),
        "clientInterfaceConfig": {
            "privateKey": "cHJpdmF0ZS1rZXk=",
            "ipAddress": "10.0.0.2/32",
            "dnsServer": "1.1.1.1"
        },
        "clientPeerConfig": {
            "allowedIPs": ["0.0.0.0/0", "::/0"],
            "publicKey": "c2VydmVyLXB1YmxpYy1rZXk=",
            "presharedKey": "",
            "persistantAlive": 25,
            "vpnGatewayDomain": "frankfurt.vpn.example.com",
            "vpnGatewayIP": "203.0.113.5",
            "vpnGatewayPort": 51820
        },
        "expiryTime": (chrono::Utc::now() + chrono::Duration::hours(4)).to_rfc3339()
    })
}

async fn gateway_client(Path(uuid): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match uuid.as_str() {
        "gw-broken" => Json(json!({ "clientUuid": "x" })).into_response(),
        "gw-down" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => Json(credential_json(&uuid)).into_response(),
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/google/web/sso/token", get(sso_token))
        .route("/api/v1/gateway/list", get(gateway_list))
        .route("/api/v1/gateway/{uuid}/client", get(gateway_client))
}

/// Serve the mock controller and return its base URL
pub async fn spawn_controller() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });
    format!("http://{}", addr)
}
