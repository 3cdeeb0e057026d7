//! Durable session store
//!
//! Holds the controller base URL, the auth token and the URL it was issued
//! for, the active gateway, the one-time setup flag and the per-gateway
//! tunnel credentials. Stored in `~/.qryptic/session.json` by default.
//!
//! Every mutation rewrites the whole document: it is serialized to a sibling
//! temporary file (mode 0600) which is then renamed over the target, so a
//! crash never leaves a half-written record behind.
//!
//! # Store File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "baseUrl": "https://qryptic.example.com",
//!   "authToken": "eyJhbGciOi...",
//!   "authTokenIssuerUrl": "https://qryptic.example.com",
//!   "activeGateway": {"uuid": "9b1d...", "name": "Frankfurt"},
//!   "setupCompleted": true,
//!   "tunnelCredentials": {
//!     "9b1d...": { "clientUuid": "...", "expiryTime": "..." }
//!   }
//! }
//! ```

use crate::controller::TunnelCredential;
use crate::secure_fs::{create_private_dir, write_private_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access session store: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse session store: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Gateway the tunnel was last brought up against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveGateway {
    pub uuid: String,
    pub name: String,
}

/// Persisted session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub version: u32,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub auth_token_issuer_url: Option<String>,
    #[serde(default)]
    pub active_gateway: Option<ActiveGateway>,
    #[serde(default)]
    pub setup_completed: bool,
    #[serde(default)]
    pub tunnel_credentials: BTreeMap<String, TunnelCredential>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            base_url: None,
            auth_token: None,
            auth_token_issuer_url: None,
            active_gateway: None,
            setup_completed: false,
            tunnel_credentials: BTreeMap::new(),
        }
    }
}

/// File-backed session store, shared between components as `Arc<Store>`
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl Store {
    /// Open the store at `path`, starting empty when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            debug!("No session store at {:?}, starting empty", path);
            SessionState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `change` to a copy, persist it, then publish it in memory
    fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.lock();
        let mut next = state.clone();
        change(&mut next);
        write_atomic(&self.path, &next)?;
        *state = next;
        Ok(())
    }

    pub fn base_url(&self) -> Option<String> {
        self.lock().base_url.clone()
    }

    pub fn set_base_url(&self, base_url: &str) -> Result<(), StoreError> {
        self.update(|s| s.base_url = Some(base_url.to_string()))
    }

    pub fn auth_token(&self) -> Option<String> {
        self.lock().auth_token.clone()
    }

    pub fn auth_token_issuer_url(&self) -> Option<String> {
        self.lock().auth_token_issuer_url.clone()
    }

    /// Store a token together with the base URL that issued it
    pub fn set_auth(&self, token: &str, issuer_url: &str) -> Result<(), StoreError> {
        self.update(|s| {
            s.auth_token = Some(token.to_string());
            s.auth_token_issuer_url = Some(issuer_url.to_string());
        })
    }

    pub fn clear_auth(&self) -> Result<(), StoreError> {
        self.update(|s| {
            s.auth_token = None;
            s.auth_token_issuer_url = None;
        })
    }

    /// Token issued for `base_url`, if any
    ///
    /// A token minted by a different controller is treated as absent.
    pub fn trusted_token(&self, base_url: &str) -> Option<String> {
        let state = self.lock();
        match (&state.auth_token, &state.auth_token_issuer_url) {
            (Some(token), Some(issuer)) if !token.is_empty() && issuer == base_url => {
                Some(token.clone())
            }
            _ => None,
        }
    }

    pub fn active_gateway(&self) -> Option<ActiveGateway> {
        self.lock().active_gateway.clone()
    }

    pub fn set_active_gateway(&self, uuid: &str, name: &str) -> Result<(), StoreError> {
        self.update(|s| {
            s.active_gateway = Some(ActiveGateway {
                uuid: uuid.to_string(),
                name: name.to_string(),
            })
        })
    }

    pub fn clear_active_gateway(&self) -> Result<(), StoreError> {
        self.update(|s| s.active_gateway = None)
    }

    pub fn tunnel_credential(&self, gateway_uuid: &str) -> Option<TunnelCredential> {
        self.lock().tunnel_credentials.get(gateway_uuid).cloned()
    }

    /// Replace the cached credential for `gateway_uuid`
    pub fn put_tunnel_credential(
        &self,
        gateway_uuid: &str,
        credential: &TunnelCredential,
    ) -> Result<(), StoreError> {
        self.update(|s| {
            s.tunnel_credentials
                .insert(gateway_uuid.to_string(), credential.clone());
        })
    }

    pub fn setup_completed(&self) -> bool {
        self.lock().setup_completed
    }

    pub fn set_setup_completed(&self, completed: bool) -> Result<(), StoreError> {
        self.update(|s| s.setup_completed = completed)
    }

    /// Delete the store file and forget everything (logout)
    pub fn erase(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        *state = SessionState::default();
        Ok(())
    }
}

fn write_atomic(path: &Path, state: &SessionState) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        create_private_dir(parent)?;
    }

    let content = serde_json::to_string_pretty(state)?;
    write_private_atomic(path, content.as_bytes())?;

    debug!("Session store written to {:?}", path);
    Ok(())
}
