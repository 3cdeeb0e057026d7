//! macOS tunnel engine
//!
//! `wireguard-tools` comes from Homebrew, whose prefix is often missing from
//! the PATH of a `sudo` shell. The Apple Silicon prefix is tried first, then
//! the Intel one, then the bare program name.
//!
//! ```bash
//! /opt/homebrew/bin/wg-quick up /etc/wireguard/wg0.conf
//! /usr/local/bin/wg show
//! ```

use super::WgQuickEngine;
use std::path::Path;
use tracing::debug;

const HOMEBREW_PREFIXES: [&str; 2] = ["/opt/homebrew/bin", "/usr/local/bin"];

fn resolve(program: &str) -> String {
    for prefix in HOMEBREW_PREFIXES {
        let candidate = Path::new(prefix).join(program);
        if candidate.exists() {
            debug!("Using {:?}", candidate);
            return candidate.to_string_lossy().to_string();
        }
    }
    program.to_string()
}

pub fn engine() -> WgQuickEngine {
    WgQuickEngine::with_programs(resolve("wg-quick"), resolve("wg"))
}
