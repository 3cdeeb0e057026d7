//! Per-gateway tunnel credential cache
//!
//! A cached credential is handed out only while its expiry is more than the
//! refetch gap away. Otherwise a new one is fetched from the controller and
//! replaces the stored entry wholesale.

use crate::controller::{Controller, ControllerError, CredentialReply, TunnelCredential};
use crate::store::{Store, StoreError};
use chrono::Utc;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Not authenticated with the controller; log in again")]
    Unauthenticated,

    #[error("Failed to fetch tunnel credential: {0}")]
    FetchFailed(#[source] FetchCause),
}

#[derive(Error, Debug)]
pub enum FetchCause {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("controller returned HTTP {0}")]
    Status(StatusCode),
    #[error("failed to cache credential: {0}")]
    Store(#[from] StoreError),
}

impl From<StoreError> for FetchError {
    fn from(e: StoreError) -> Self {
        FetchError::FetchFailed(e.into())
    }
}

pub struct CredentialCache<C> {
    controller: C,
    store: Arc<Store>,
    refetch_gap: chrono::Duration,
}

impl<C: Controller> CredentialCache<C> {
    pub fn new(controller: C, store: Arc<Store>, refetch_gap: chrono::Duration) -> Self {
        Self {
            controller,
            store,
            refetch_gap,
        }
    }

    /// Cached entry for `gateway_uuid` if it stays valid for the whole gap
    pub fn fresh_cached(&self, gateway_uuid: &str) -> Option<TunnelCredential> {
        self.store
            .tunnel_credential(gateway_uuid)
            .filter(|cred| cred.expiry_time > Utc::now() + self.refetch_gap)
    }

    /// Return a usable credential, fetching one only when the cache is stale
    pub async fn get_credential(&self, gateway_uuid: &str) -> Result<TunnelCredential, FetchError> {
        if let Some(cached) = self.fresh_cached(gateway_uuid) {
            debug!(
                "Using cached credential for gateway {} (expires {})",
                gateway_uuid, cached.expiry_time
            );
            return Ok(cached);
        }

        let base_url = self.store.base_url().ok_or(FetchError::Unauthenticated)?;
        let token = self
            .store
            .trusted_token(&base_url)
            .ok_or(FetchError::Unauthenticated)?;

        info!("Fetching tunnel credential for gateway {}", gateway_uuid);
        let reply = self
            .controller
            .gateway_credential(&base_url, &token, gateway_uuid)
            .await
            .map_err(|e| FetchError::FetchFailed(e.into()))?;

        match reply {
            CredentialReply::Issued(credential) => {
                self.store.put_tunnel_credential(gateway_uuid, &credential)?;
                debug!("Credential cached until {}", credential.expiry_time);
                Ok(credential)
            }
            CredentialReply::Unauthorized => Err(FetchError::Unauthenticated),
            CredentialReply::Failed(status) => {
                Err(FetchError::FetchFailed(FetchCause::Status(status)))
            }
        }
    }
}
