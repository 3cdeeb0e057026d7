//! Platform-specific implementations
//!
//! The tunnel itself is run by an external WireGuard engine. This module
//! hides which executables that means on each OS behind [`TunnelEngine`],
//! and provides the browser launcher and privilege check used by the CLI.

#[cfg(unix)]
mod wg_quick;

#[cfg(target_os = "macos")]
pub mod mac;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(unix)]
pub use wg_quick::WgQuickEngine;

use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to run {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} not found; install the WireGuard tools (https://www.wireguard.com/install/)")]
    ToolMissing(String),
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Exit status and captured output of one engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for EngineOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// External packet-tunnel engine, driven as a black box
pub trait TunnelEngine {
    /// Bring the tunnel described by `config_path` up
    fn up(&self, config_path: &Path) -> Result<EngineOutput, PlatformError>;

    /// Bring the tunnel described by `config_path` down
    fn down(&self, config_path: &Path) -> Result<EngineOutput, PlatformError>;

    /// Global live status (no arguments)
    fn show(&self) -> Result<EngineOutput, PlatformError>;

    /// Check that the engine executables can be run
    fn check_installed(&self) -> Result<(), PlatformError>;
}

impl<T: TunnelEngine + ?Sized> TunnelEngine for Box<T> {
    fn up(&self, config_path: &Path) -> Result<EngineOutput, PlatformError> {
        (**self).up(config_path)
    }

    fn down(&self, config_path: &Path) -> Result<EngineOutput, PlatformError> {
        (**self).down(config_path)
    }

    fn show(&self) -> Result<EngineOutput, PlatformError> {
        (**self).show()
    }

    fn check_installed(&self) -> Result<(), PlatformError> {
        (**self).check_installed()
    }
}

/// Run `program` with `args`, capturing its output
pub(crate) fn run(program: &str, args: &[&str]) -> Result<EngineOutput, PlatformError> {
    debug!("Running {} {:?}", program, args);
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|source| spawn_error(program, source))?;
    Ok(output.into())
}

/// Map a failure to launch `program` into the matching error
pub(crate) fn spawn_error(program: &str, source: io::Error) -> PlatformError {
    if source.kind() == io::ErrorKind::NotFound {
        PlatformError::ToolMissing(program.to_string())
    } else {
        PlatformError::SpawnError {
            program: program.to_string(),
            source,
        }
    }
}

/// Get the tunnel engine for the current platform
pub fn get_tunnel_engine() -> Result<Box<dyn TunnelEngine + Send + Sync>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(mac::engine()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::engine()))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WireGuardServiceEngine::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}

/// Directory the engine reads tunnel configs from
pub fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        windows::config_dir()
    }

    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from("/etc/wireguard")
    }
}

/// Opens URLs in the user's browser
pub trait BrowserLauncher {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Default handler of the desktop session
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that_detached(url)
    }
}

/// Check if running with Administrator privileges (Windows)
#[cfg(windows)]
pub fn is_admin() -> bool {
    use ::windows::Win32::UI::Shell::IsUserAnAdmin;
    unsafe { IsUserAnAdmin().as_bool() }
}

/// Check if running with root privileges (Unix)
#[cfg(not(windows))]
pub fn is_admin() -> bool {
    nix::unistd::geteuid().is_root()
}
