//! Scripted in-memory controller for unit tests

use super::client::{Controller, ControllerError};
use super::models::{
    AuthReply, CredentialReply, GatewayListReply, HealthReply, LoginRequest, SsoReply,
};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use url::Url;

pub(crate) struct FakeState {
    pub healthy: bool,
    /// `None` simulates a transport failure
    pub login: Option<AuthReply>,
    /// Replayed in order; once drained every poll is pending
    pub sso: VecDeque<Option<SsoReply>>,
    pub gateways: GatewayListReply,
    /// `None` simulates a transport failure
    pub credential: Option<CredentialReply>,
    pub calls: Vec<String>,
}

#[derive(Clone)]
pub(crate) struct FakeController {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                healthy: true,
                login: Some(AuthReply::Empty),
                sso: VecDeque::new(),
                gateways: GatewayListReply::Gateways(Vec::new()),
                credential: Some(CredentialReply::Unauthorized),
                calls: Vec::new(),
            })),
        }
    }

    pub fn with(&self, change: impl FnOnce(&mut FakeState)) {
        change(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: &str) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(name.to_string());
        state
    }
}

pub(crate) fn pending() -> Option<SsoReply> {
    Some(SsoReply {
        status: StatusCode::UNAUTHORIZED,
        reply: AuthReply::Empty,
    })
}

pub(crate) fn issued(token: &str) -> Option<SsoReply> {
    Some(SsoReply {
        status: StatusCode::OK,
        reply: AuthReply::Token(token.to_string()),
    })
}

fn transport_error() -> ControllerError {
    ControllerError::StatusError(StatusCode::SERVICE_UNAVAILABLE)
}

impl Controller for FakeController {
    fn sso_initiate_url(
        &self,
        base_url: &str,
        code_challenge: &str,
    ) -> Result<Url, ControllerError> {
        let url = Url::parse_with_params(
            &format!("{}/sso/initiate", base_url),
            &[("code_challenge", code_challenge)],
        )?;
        Ok(url)
    }

    async fn health(&self, _base_url: &str) -> Result<HealthReply, ControllerError> {
        let state = self.record("health");
        Ok(HealthReply {
            status: StatusCode::OK,
            success: state.healthy,
        })
    }

    async fn login(
        &self,
        _base_url: &str,
        _request: &LoginRequest,
    ) -> Result<AuthReply, ControllerError> {
        let state = self.record("login");
        state.login.clone().ok_or_else(transport_error)
    }

    async fn sso_token(
        &self,
        _base_url: &str,
        _code_verifier: &str,
        _code_challenge: &str,
    ) -> Result<SsoReply, ControllerError> {
        let mut state = self.record("sso_token");
        match state.sso.pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(transport_error()),
            None => pending().ok_or_else(transport_error),
        }
    }

    async fn list_gateways(
        &self,
        _base_url: &str,
        _token: &str,
    ) -> Result<GatewayListReply, ControllerError> {
        let state = self.record("list_gateways");
        Ok(state.gateways.clone())
    }

    async fn gateway_credential(
        &self,
        _base_url: &str,
        _token: &str,
        _gateway_uuid: &str,
    ) -> Result<CredentialReply, ControllerError> {
        let state = self.record("gateway_credential");
        state.credential.clone().ok_or_else(transport_error)
    }
}
