//! Windows tunnel engine
//!
//! The WireGuard for Windows installer ships `wireguard.exe`, which manages
//! one Windows service per tunnel, and `wg.exe` for status.
//!
//! ```bat
//! wireguard.exe /installtunnelservice "%LOCALAPPDATA%\WireGuard\wg0.conf"
//! wireguard.exe /uninstalltunnelservice wg0
//! wg.exe show
//! ```

use super::{run, EngineOutput, PlatformError, TunnelEngine};
use std::path::{Path, PathBuf};

const INSTALL_DIR: &str = r"C:\Program Files\WireGuard";

pub struct WireGuardServiceEngine {
    wireguard: String,
    wg: String,
}

impl WireGuardServiceEngine {
    pub fn new() -> Self {
        let install_dir = Path::new(INSTALL_DIR);
        Self {
            wireguard: install_dir.join("wireguard.exe").to_string_lossy().to_string(),
            wg: install_dir.join("wg.exe").to_string_lossy().to_string(),
        }
    }
}

impl Default for WireGuardServiceEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Services are named after the config file stem
fn tunnel_name(config_path: &Path) -> String {
    config_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "wg0".to_string())
}

impl TunnelEngine for WireGuardServiceEngine {
    fn up(&self, config_path: &Path) -> Result<EngineOutput, PlatformError> {
        run(
            &self.wireguard,
            &["/installtunnelservice", &config_path.to_string_lossy()],
        )
    }

    fn down(&self, config_path: &Path) -> Result<EngineOutput, PlatformError> {
        run(
            &self.wireguard,
            &["/uninstalltunnelservice", &tunnel_name(config_path)],
        )
    }

    fn show(&self) -> Result<EngineOutput, PlatformError> {
        run(&self.wg, &["show"])
    }

    fn check_installed(&self) -> Result<(), PlatformError> {
        for program in [&self.wireguard, &self.wg] {
            if !Path::new(program).exists() {
                return Err(PlatformError::ToolMissing(program.clone()));
            }
        }
        Ok(())
    }
}

/// `%LOCALAPPDATA%\WireGuard`
pub fn config_dir() -> PathBuf {
    std::env::var("LOCALAPPDATA")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
        .join("WireGuard")
}
