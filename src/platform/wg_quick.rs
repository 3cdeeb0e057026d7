//! `wg-quick` / `wg` engine shared by Linux and macOS
//!
//! ```bash
//! wg-quick up /etc/wireguard/wg0.conf
//! wg-quick down /etc/wireguard/wg0.conf
//! wg show
//! ```

use super::{run, EngineOutput, PlatformError, TunnelEngine};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WgQuickEngine {
    wg_quick: String,
    wg: String,
}

impl WgQuickEngine {
    pub fn new() -> Self {
        Self::with_programs("wg-quick", "wg")
    }

    /// Use explicit executables (e.g. a Homebrew prefix)
    pub fn with_programs(wg_quick: impl Into<String>, wg: impl Into<String>) -> Self {
        Self {
            wg_quick: wg_quick.into(),
            wg: wg.into(),
        }
    }
}

impl Default for WgQuickEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelEngine for WgQuickEngine {
    fn up(&self, config_path: &Path) -> Result<EngineOutput, PlatformError> {
        run(&self.wg_quick, &["up", &config_path.to_string_lossy()])
    }

    fn down(&self, config_path: &Path) -> Result<EngineOutput, PlatformError> {
        run(&self.wg_quick, &["down", &config_path.to_string_lossy()])
    }

    fn show(&self) -> Result<EngineOutput, PlatformError> {
        run(&self.wg, &["show"])
    }

    fn check_installed(&self) -> Result<(), PlatformError> {
        // Exit status is irrelevant here, only whether the binaries launch
        run(&self.wg, &["--version"])?;
        run(&self.wg_quick, &["-h"])?;
        Ok(())
    }
}
