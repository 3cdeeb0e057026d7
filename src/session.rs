//! Session orchestration
//!
//! Composes the authenticator, the credential cache and the tunnel manager
//! into the operations the CLI exposes. The active gateway is only recorded
//! after the tunnel is actually up, so a failed connect never leaves a
//! half-committed session behind.

use crate::auth::{AuthOutcome, Authenticator, LoginMethod, is_token_fresh};
use crate::cache::CredentialCache;
use crate::config::Config;
use crate::controller::{Controller, Gateway, GatewayListReply};
use crate::error::SessionError;
use crate::platform::{self, BrowserLauncher, TunnelEngine};
use crate::secure_fs::create_private_dir;
use crate::store::{ActiveGateway, Store};
use crate::tunnel::{EngineStatus, StopOutcome, TunnelError, TunnelManager};
use chrono::Utc;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub gateway_name: String,
    pub endpoint: String,
}

/// Snapshot reported by `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub base_url: Option<String>,
    pub authenticated: bool,
    pub active_gateway: Option<ActiveGateway>,
    /// Peer endpoint from the cached credential of the active gateway
    pub endpoint: Option<String>,
    /// Engine status or the reason it could not be queried, verbose mode only
    pub engine: Option<Result<EngineStatus, String>>,
}

/// Pick a gateway by UUID or by (case-insensitive) name
pub fn find_gateway<'a>(gateways: &'a [Gateway], selector: &str) -> Option<&'a Gateway> {
    gateways
        .iter()
        .find(|g| g.uuid == selector)
        .or_else(|| gateways.iter().find(|g| g.name.eq_ignore_ascii_case(selector)))
}

pub struct Session<C, B, E> {
    store: Arc<Store>,
    controller: C,
    auth: Authenticator<C, B>,
    cache: CredentialCache<C>,
    tunnel: TunnelManager<E>,
}

impl<C, B, E> Session<C, B, E>
where
    C: Controller + Clone + 'static,
    B: BrowserLauncher,
    E: TunnelEngine,
{
    pub fn new(config: &Config, store: Arc<Store>, controller: C, browser: B, engine: E) -> Self {
        let config_dir = config
            .tunnel
            .config_dir
            .clone()
            .unwrap_or_else(platform::default_config_dir);

        let auth = Authenticator::new(
            controller.clone(),
            store.clone(),
            browser,
            config.sso.clone(),
        );
        let cache = CredentialCache::new(
            controller.clone(),
            store.clone(),
            config.credentials.refetch_gap(),
        );
        let tunnel = TunnelManager::new(engine, config_dir, &config.tunnel.interface);

        Self {
            store,
            controller,
            auth,
            cache,
            tunnel,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn tunnel(&self) -> &TunnelManager<E> {
        &self.tunnel
    }

    pub async fn login<F>(
        &self,
        base_url: &str,
        force: bool,
        choose: F,
    ) -> Result<AuthOutcome, SessionError>
    where
        F: FnOnce() -> io::Result<LoginMethod>,
    {
        Ok(self.auth.ensure_authenticated(base_url, force, choose).await?)
    }

    /// Stored base URL and its token, if trusted and unexpired
    fn authenticated(&self) -> Result<(String, String), SessionError> {
        let base_url = self.store.base_url().ok_or(SessionError::NotAuthenticated)?;
        let token = self
            .store
            .trusted_token(&base_url)
            .filter(|token| is_token_fresh(token, Utc::now()))
            .ok_or(SessionError::NotAuthenticated)?;
        Ok((base_url, token))
    }

    pub async fn list_gateways(&self) -> Result<Vec<Gateway>, SessionError> {
        let (base_url, token) = self.authenticated()?;
        match self.controller.list_gateways(&base_url, &token).await? {
            GatewayListReply::Gateways(gateways) => {
                debug!("Controller lists {} gateways", gateways.len());
                Ok(gateways)
            }
            GatewayListReply::Unauthorized => Err(SessionError::NotAuthenticated),
            GatewayListReply::Failed(status) => Err(SessionError::Controller(
                crate::controller::ControllerError::StatusError(status),
            )),
        }
    }

    /// Bring the tunnel up against `gateway_uuid` and record it as active
    pub async fn connect(
        &mut self,
        gateway_uuid: &str,
        gateway_name: &str,
    ) -> Result<ConnectionInfo, SessionError> {
        self.authenticated()?;

        let credential = self.cache.get_credential(gateway_uuid).await?;
        self.tunnel.apply(&credential)?;
        self.store.set_active_gateway(gateway_uuid, gateway_name)?;

        info!("Connected to {}", gateway_name);
        Ok(ConnectionInfo {
            gateway_name: gateway_name.to_string(),
            endpoint: credential.peer.endpoint(),
        })
    }

    /// Stop the tunnel and forget the active gateway
    pub fn disconnect(&mut self) -> Result<StopOutcome, SessionError> {
        let outcome = self.tunnel.stop()?;
        if let Some(active) = self.store.active_gateway() {
            debug!("Clearing active gateway {}", active.name);
            self.store.clear_active_gateway()?;
        }
        Ok(outcome)
    }

    pub fn status(&self, verbose: bool) -> Result<SessionStatus, SessionError> {
        let base_url = self.store.base_url();
        let authenticated = self.authenticated().is_ok();
        let active_gateway = self.store.active_gateway();
        let endpoint = active_gateway
            .as_ref()
            .and_then(|g| self.store.tunnel_credential(&g.uuid))
            .map(|cred| cred.peer.endpoint());

        let engine = if !verbose {
            None
        } else if self.tunnel.config_path().exists() {
            Some(self.tunnel.status().map_err(|e| {
                warn!("{}", e);
                e.to_string()
            }))
        } else {
            Some(Ok(EngineStatus {
                running: false,
                output: String::new(),
            }))
        };

        Ok(SessionStatus {
            base_url,
            authenticated,
            active_gateway,
            endpoint,
            engine,
        })
    }

    /// Stop the tunnel, then erase every stored secret and the rendered config
    ///
    /// Nothing is erased if the tunnel cannot be stopped.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.tunnel.remove_config()?;
        self.store.erase()?;
        info!("Logged out and removed {:?}", self.store.path());
        Ok(())
    }

    /// Verify the engine tools and prepare the config directory
    pub fn setup(&self) -> Result<(), SessionError> {
        self.tunnel
            .engine()
            .check_installed()
            .map_err(SessionError::Setup)?;

        let dir = self.tunnel.config_dir();
        create_private_dir(dir).map_err(|source| TunnelError::ConfigWriteFailed {
            path: dir.to_path_buf(),
            source,
        })?;

        self.store.set_setup_completed(true)?;
        info!("Setup complete, tunnel configs go to {:?}", dir);
        Ok(())
    }
}
