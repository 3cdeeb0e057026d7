//! Top-level error and the operator hint attached to it

use crate::auth::AuthError;
use crate::cache::{FetchCause, FetchError};
use crate::controller::ControllerError;
use crate::platform::PlatformError;
use crate::store::StoreError;
use crate::tunnel::TunnelError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not logged in (run `qryptic login --url <URL>` first)")]
    NotAuthenticated,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Controller request failed: {0}")]
    Controller(#[from] ControllerError),

    #[error("No gateway matches {0:?}")]
    GatewayNotFound(String),

    #[error("Tunnel tools are not usable: {0}")]
    Setup(#[source] PlatformError),
}

/// Which remediation applies to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Controller,
    Tunnel,
    Storage,
}

impl ErrorCategory {
    pub fn remediation(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "Log in again with `qryptic login --url <URL>`.",
            ErrorCategory::Controller => {
                "Check the controller URL and that the controller is reachable."
            }
            ErrorCategory::Tunnel => {
                "Check that WireGuard is installed (`qryptic setup`) and that you are running as root/Administrator."
            }
            ErrorCategory::Storage => "Check permissions of the session store and config files.",
        }
    }
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::NotAuthenticated => ErrorCategory::Authentication,
            SessionError::Auth(e) => match e {
                AuthError::LoginFailed(ControllerError::StatusError(status))
                    if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
                {
                    ErrorCategory::Authentication
                }
                AuthError::InvalidCredentials(_)
                | AuthError::AuthTimeout(_)
                | AuthError::SsoRejected(_)
                | AuthError::PromptFailed(_) => ErrorCategory::Authentication,
                AuthError::InvalidUrl { .. }
                | AuthError::ControllerUnhealthy { .. }
                | AuthError::LoginFailed(_) => ErrorCategory::Controller,
                AuthError::Store(_) => ErrorCategory::Storage,
            },
            SessionError::Fetch(e) => match e {
                FetchError::Unauthenticated => ErrorCategory::Authentication,
                FetchError::FetchFailed(FetchCause::Store(_)) => ErrorCategory::Storage,
                FetchError::FetchFailed(_) => ErrorCategory::Controller,
            },
            SessionError::Tunnel(_) | SessionError::Setup(_) => ErrorCategory::Tunnel,
            SessionError::Store(_) => ErrorCategory::Storage,
            SessionError::Controller(_) | SessionError::GatewayNotFound(_) => {
                ErrorCategory::Controller
            }
        }
    }
}
