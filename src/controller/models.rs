//! Wire types for the Qryptic controller API
//!
//! Response bodies are decoded into explicit reply enums. A body that does
//! not match its schema is a decode error, never a zeroed default.
//!
//! # Tunnel credential document
//!
//! ```json
//! {
//!   "clientUuid": "c0ffee00-...",
//!   "clientInterfaceConfig": {
//!     "privateKey": "...",
//!     "ipAddress": "10.0.0.2/32",
//!     "dnsServer": "1.1.1.1"
//!   },
//!   "clientPeerConfig": {
//!     "allowedIPs": ["0.0.0.0/0"],
//!     "publicKey": "...",
//!     "presharedKey": "...",
//!     "persistantAlive": 25,
//!     "vpnGatewayDomain": "gw1.example.com",
//!     "vpnGatewayIP": "203.0.113.5",
//!     "vpnGatewayPort": 51820
//!   },
//!   "expiryTime": "2025-01-15T10:30:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Raw auth body shared by the login and SSO token endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthBody {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Decoded auth response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// A non-empty token was issued
    Token(String),
    /// The controller reported an error
    Error {
        error: String,
        message: Option<String>,
    },
    /// Neither a token nor an error
    Empty,
}

impl From<AuthBody> for AuthReply {
    fn from(body: AuthBody) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());

        if let Some(token) = non_empty(body.auth_token) {
            return AuthReply::Token(token);
        }
        match non_empty(body.error) {
            Some(error) => AuthReply::Error {
                error,
                message: non_empty(body.message),
            },
            None => AuthReply::Empty,
        }
    }
}

/// Reply of the SSO token-exchange endpoint
///
/// The status code is kept because a 401 with an empty error means
/// "still waiting for the browser step".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoReply {
    pub status: StatusCode,
    pub reply: AuthReply,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HealthBody {
    pub success: bool,
}

/// Reply of `GET /health`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReply {
    pub status: StatusCode,
    pub success: bool,
}

impl HealthReply {
    pub fn is_healthy(&self) -> bool {
        self.status == StatusCode::OK && self.success
    }
}

/// A gateway the user is allowed to connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub uuid: String,
    pub name: String,
    pub domain: String,
    pub ip_address: String,
    pub port: u16,
    pub server_public_key: String,
}

/// Reply of `GET /gateway/list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayListReply {
    Gateways(Vec<Gateway>),
    Unauthorized,
    Failed(StatusCode),
}

/// Interface half of a tunnel credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "ipAddress")]
    pub local_address: String,
    #[serde(rename = "dnsServer")]
    pub dns_server: String,
}

/// Peer half of a tunnel credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
    #[serde(rename = "publicKey")]
    pub server_public_key: String,
    #[serde(rename = "presharedKey", default)]
    pub preshared_key: String,
    #[serde(rename = "persistantAlive")]
    pub keepalive_seconds: u32,
    #[serde(rename = "vpnGatewayDomain", default)]
    pub gateway_domain: String,
    #[serde(rename = "vpnGatewayIP")]
    pub gateway_ip: String,
    #[serde(rename = "vpnGatewayPort")]
    pub gateway_port: u16,
}

impl PeerConfig {
    /// `ip:port` of the gateway
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.gateway_ip, self.gateway_port)
    }
}

/// Everything needed to bring up one tunnel to one gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelCredential {
    #[serde(rename = "clientUuid")]
    pub client_uuid: String,
    #[serde(rename = "clientInterfaceConfig")]
    pub interface: InterfaceConfig,
    #[serde(rename = "clientPeerConfig")]
    pub peer: PeerConfig,
    #[serde(rename = "expiryTime")]
    pub expiry_time: DateTime<Utc>,
}

/// Reply of `GET /gateway/{uuid}/client`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialReply {
    Issued(TunnelCredential),
    Unauthorized,
    Failed(StatusCode),
}
