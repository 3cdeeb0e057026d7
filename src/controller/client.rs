//! HTTP client for the Qryptic controller
//!
//! Stateless request/response mapper: every call takes the normalized base
//! URL (and bearer token where the endpoint needs one) and turns the HTTP
//! exchange into one of the reply types in [`super::models`].

use super::models::{
    AuthBody, AuthReply, CredentialReply, Gateway, GatewayListReply, HealthBody, HealthReply,
    LoginRequest, SsoReply, TunnelCredential,
};
use crate::config::ControllerSettings;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Controller client errors
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid controller URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed to decode {endpoint} response: {source}")]
    DecodeError {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Controller returned HTTP {0}")]
    StatusError(StatusCode),
}

/// Operations the rest of the client needs from the controller
///
/// Implemented by [`ControllerClient`] for real traffic and by in-memory
/// fakes in tests.
pub trait Controller: Send + Sync {
    /// Browser URL for `GET /auth/{provider}/web/sso/initiate`
    fn sso_initiate_url(
        &self,
        base_url: &str,
        code_challenge: &str,
    ) -> Result<Url, ControllerError>;

    /// `GET /health`, unauthenticated
    fn health(
        &self,
        base_url: &str,
    ) -> impl Future<Output = Result<HealthReply, ControllerError>> + Send;

    /// `POST /auth/login`
    fn login(
        &self,
        base_url: &str,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<AuthReply, ControllerError>> + Send;

    /// `GET /auth/{provider}/web/sso/token`
    fn sso_token(
        &self,
        base_url: &str,
        code_verifier: &str,
        code_challenge: &str,
    ) -> impl Future<Output = Result<SsoReply, ControllerError>> + Send;

    /// `GET /gateway/list`
    fn list_gateways(
        &self,
        base_url: &str,
        token: &str,
    ) -> impl Future<Output = Result<GatewayListReply, ControllerError>> + Send;

    /// `GET /gateway/{uuid}/client`
    fn gateway_credential(
        &self,
        base_url: &str,
        token: &str,
        gateway_uuid: &str,
    ) -> impl Future<Output = Result<CredentialReply, ControllerError>> + Send;
}

/// reqwest-backed controller client
#[derive(Debug, Clone)]
pub struct ControllerClient {
    http: Client,
    api_prefix: String,
    sso_provider: String,
}

impl ControllerClient {
    pub fn new(settings: &ControllerSettings) -> Result<Self, ControllerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_prefix: settings.api_prefix.trim_end_matches('/').to_string(),
            sso_provider: settings.sso_provider.clone(),
        })
    }

    fn endpoint(&self, base_url: &str, path: &str) -> String {
        format!("{}{}{}", base_url, self.api_prefix, path)
    }

    fn sso_path(&self, step: &str) -> String {
        format!("/auth/{}/web/sso/{}", self.sso_provider, step)
    }

    async fn send(&self, request: RequestBuilder, token: Option<&str>) -> Result<Response, ControllerError> {
        let request = request.header("Content-Type", "application/json");
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        debug!("Controller responded with HTTP {}", response.status());
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    endpoint: &'static str,
) -> Result<T, ControllerError> {
    let body = response.bytes().await?;
    debug!("{} response received ({} bytes)", endpoint, body.len());
    serde_json::from_slice(&body).map_err(|source| ControllerError::DecodeError { endpoint, source })
}

impl Controller for ControllerClient {
    fn sso_initiate_url(
        &self,
        base_url: &str,
        code_challenge: &str,
    ) -> Result<Url, ControllerError> {
        let url = Url::parse_with_params(
            &self.endpoint(base_url, &self.sso_path("initiate")),
            &[("code_challenge", code_challenge)],
        )?;
        Ok(url)
    }

    async fn health(&self, base_url: &str) -> Result<HealthReply, ControllerError> {
        let url = self.endpoint(base_url, "/health");
        let response = self.send(self.http.get(&url), None).await?;
        let status = response.status();

        if status != StatusCode::OK {
            return Ok(HealthReply { status, success: false });
        }

        let body: HealthBody = decode(response, "health").await?;
        Ok(HealthReply {
            status,
            success: body.success,
        })
    }

    async fn login(
        &self,
        base_url: &str,
        request: &LoginRequest,
    ) -> Result<AuthReply, ControllerError> {
        let url = self.endpoint(base_url, "/auth/login");
        let response = self.send(self.http.post(&url).json(request), None).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ControllerError::StatusError(status));
        }

        let body: AuthBody = decode(response, "login").await?;
        Ok(body.into())
    }

    async fn sso_token(
        &self,
        base_url: &str,
        code_verifier: &str,
        code_challenge: &str,
    ) -> Result<SsoReply, ControllerError> {
        let url = Url::parse_with_params(
            &self.endpoint(base_url, &self.sso_path("token")),
            &[
                ("code_verifier", code_verifier),
                ("code_challenge", code_challenge),
            ],
        )?;
        let response = self.send(self.http.get(url), None).await?;
        let status = response.status();

        let reply = match status {
            StatusCode::OK | StatusCode::UNAUTHORIZED => {
                let body: AuthBody = decode(response, "sso token").await?;
                body.into()
            }
            _ => AuthReply::Empty,
        };

        Ok(SsoReply { status, reply })
    }

    async fn list_gateways(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<GatewayListReply, ControllerError> {
        let url = self.endpoint(base_url, "/gateway/list");
        let response = self.send(self.http.get(&url), Some(token)).await?;

        match response.status() {
            StatusCode::OK => {
                let gateways: Vec<Gateway> = decode(response, "gateway list").await?;
                Ok(GatewayListReply::Gateways(gateways))
            }
            StatusCode::UNAUTHORIZED => Ok(GatewayListReply::Unauthorized),
            other => Ok(GatewayListReply::Failed(other)),
        }
    }

    async fn gateway_credential(
        &self,
        base_url: &str,
        token: &str,
        gateway_uuid: &str,
    ) -> Result<CredentialReply, ControllerError> {
        let url = self.endpoint(base_url, &format!("/gateway/{}/client", gateway_uuid));
        let response = self.send(self.http.get(&url), Some(token)).await?;

        match response.status() {
            StatusCode::OK => {
                let credential: TunnelCredential = decode(response, "gateway client").await?;
                Ok(CredentialReply::Issued(credential))
            }
            StatusCode::UNAUTHORIZED => Ok(CredentialReply::Unauthorized),
            other => Ok(CredentialReply::Failed(other)),
        }
    }
}
