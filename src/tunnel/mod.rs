//! Tunnel lifecycle
//!
//! Drives the external engine through a single local tunnel:
//!
//! ```text
//!   Down --render_config--> Configured --start--> Up
//!    ^                                            |
//!    +------------------- stop -------------------+
//! ```
//!
//! `stop` never fails just because nothing is running, and `apply` always
//! tears the previous tunnel down before writing a new config, so two
//! configs are never active at once.

pub mod render;

pub use render::render_config;

use crate::controller::TunnelCredential;
use crate::platform::{EngineOutput, PlatformError, TunnelEngine};
use crate::secure_fs::{create_private_dir, write_private};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Why an engine call did not succeed
#[derive(Error, Debug)]
pub enum EngineFailure {
    #[error("engine exited with an error: {0}")]
    Exit(String),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl EngineFailure {
    fn from_output(output: &EngineOutput) -> Self {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        EngineFailure::Exit(detail.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Failed to write tunnel config {path:?}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to remove tunnel config {path:?}: {source}")]
    ConfigRemoveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start tunnel: {0}")]
    EngineStartFailed(#[source] EngineFailure),
    #[error("Failed to stop tunnel: {0}")]
    EngineStopFailed(#[source] EngineFailure),
    #[error("Failed to query tunnel status: {0}")]
    StatusFailed(#[source] EngineFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Down,
    Configured,
    Up,
}

/// What `stop` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No config file, nothing can be running
    NoConfig,
    /// Config present but the engine reports no tunnel
    NotRunning,
    /// A live tunnel was brought down
    Stopped,
}

/// Live engine status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    pub output: String,
}

pub struct TunnelManager<E> {
    engine: E,
    config_dir: PathBuf,
    config_path: PathBuf,
    state: TunnelState,
}

impl<E: TunnelEngine> TunnelManager<E> {
    /// Manage `<config_dir>/<interface>.conf`
    pub fn new(engine: E, config_dir: impl Into<PathBuf>, interface: &str) -> Self {
        let config_dir = config_dir.into();
        let config_path = config_dir.join(format!("{}.conf", interface));
        Self {
            engine,
            config_dir,
            config_path,
            state: TunnelState::Down,
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Write the engine config for `credential`, owner-only
    pub fn render_config(&mut self, credential: &TunnelCredential) -> Result<(), TunnelError> {
        let write_failed = |path: &Path, source: io::Error| TunnelError::ConfigWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if !self.config_dir.exists() {
            debug!("Creating config directory {:?}", self.config_dir);
            create_private_dir(&self.config_dir).map_err(|e| write_failed(&self.config_dir, e))?;
        }

        let text = render_config(credential);
        write_private(&self.config_path, text.as_bytes())
            .map_err(|e| write_failed(&self.config_path, e))?;

        info!("Tunnel config written to {:?}", self.config_path);
        if self.state == TunnelState::Down {
            self.state = TunnelState::Configured;
        }
        Ok(())
    }

    /// Bring the tunnel up from the rendered config
    pub fn start(&mut self) -> Result<(), TunnelError> {
        info!("Starting tunnel from {:?}", self.config_path);
        let output = self
            .engine
            .up(&self.config_path)
            .map_err(|e| TunnelError::EngineStartFailed(e.into()))?;

        if !output.success {
            return Err(TunnelError::EngineStartFailed(EngineFailure::from_output(
                &output,
            )));
        }

        self.state = TunnelState::Up;
        info!("Tunnel is up");
        Ok(())
    }

    /// Bring the tunnel down if one is running
    pub fn stop(&mut self) -> Result<StopOutcome, TunnelError> {
        if !self.config_path.exists() {
            debug!("No tunnel config at {:?}, nothing to stop", self.config_path);
            self.state = TunnelState::Down;
            return Ok(StopOutcome::NoConfig);
        }

        let status = self.status().map_err(|e| match e {
            TunnelError::StatusFailed(failure) => TunnelError::EngineStopFailed(failure),
            other => other,
        })?;
        if !status.running {
            debug!("Engine reports no active tunnel");
            self.state = TunnelState::Down;
            return Ok(StopOutcome::NotRunning);
        }

        info!("Stopping tunnel");
        let output = self
            .engine
            .down(&self.config_path)
            .map_err(|e| TunnelError::EngineStopFailed(e.into()))?;

        if !output.success {
            return Err(TunnelError::EngineStopFailed(EngineFailure::from_output(
                &output,
            )));
        }

        self.state = TunnelState::Down;
        info!("Tunnel is down");
        Ok(StopOutcome::Stopped)
    }

    /// Stop the tunnel and delete the rendered config, which holds the private key
    pub fn remove_config(&mut self) -> Result<StopOutcome, TunnelError> {
        let outcome = self.stop()?;
        match std::fs::remove_file(&self.config_path) {
            Ok(()) => debug!("Removed {:?}", self.config_path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TunnelError::ConfigRemoveFailed {
                    path: self.config_path.clone(),
                    source,
                });
            }
        }
        Ok(outcome)
    }

    /// Replace whatever is running with a tunnel for `credential`
    pub fn apply(&mut self, credential: &TunnelCredential) -> Result<(), TunnelError> {
        self.stop()?;
        self.render_config(credential)?;
        self.start()
    }

    /// Live status as reported by the engine
    pub fn status(&self) -> Result<EngineStatus, TunnelError> {
        let output = self
            .engine
            .show()
            .map_err(|e| TunnelError::StatusFailed(e.into()))?;

        if !output.success {
            return Err(TunnelError::StatusFailed(EngineFailure::from_output(
                &output,
            )));
        }

        Ok(EngineStatus {
            running: !output.stdout.trim().is_empty(),
            output: output.stdout,
        })
    }
}
