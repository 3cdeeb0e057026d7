//! Linux tunnel engine
//!
//! `wireguard-tools` installs `wg-quick` and `wg` on the PATH, so the plain
//! program names are used.

use super::WgQuickEngine;

pub fn engine() -> WgQuickEngine {
    WgQuickEngine::new()
}
