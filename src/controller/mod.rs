//! Qryptic controller API
//!
//! - `models`: wire types and decoded reply enums
//! - `client`: the [`Controller`] trait and its reqwest implementation

pub mod client;
pub mod models;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{Controller, ControllerClient, ControllerError};
pub use models::{
    AuthReply, CredentialReply, Gateway, GatewayListReply, HealthReply, InterfaceConfig,
    LoginRequest, PeerConfig, SsoReply, TunnelCredential,
};
