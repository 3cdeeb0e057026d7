//! Qryptic VPN - session and tunnel client for Qryptic controllers

pub mod auth;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod platform;
pub mod secure_fs;
pub mod session;
pub mod store;
pub mod tunnel;

pub use config::Config;
pub use error::{ErrorCategory, SessionError};
pub use session::Session;
pub use store::Store;
