//! WireGuard config rendering
//!
//! Produces the `[Interface]` / `[Peer]` text block that `wg-quick` and
//! `wireguard.exe` parse. Output is a pure function of the credential.

use crate::controller::TunnelCredential;
use std::fmt::Write;

/// Render `credential` into engine config text
pub fn render_config(credential: &TunnelCredential) -> String {
    let interface = &credential.interface;
    let peer = &credential.peer;
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "PrivateKey = {}", interface.private_key);
    let _ = writeln!(out, "Address = {}", interface.local_address);
    let _ = writeln!(out, "DNS = {}", interface.dns_server);
    let _ = writeln!(out);
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {}", peer.server_public_key);
    if !peer.preshared_key.is_empty() {
        let _ = writeln!(out, "PresharedKey = {}", peer.preshared_key);
    }
    let _ = writeln!(out, "AllowedIPs = {}", peer.allowed_ips.join(","));
    let _ = writeln!(out, "Endpoint = {}", peer.endpoint());
    let _ = writeln!(out, "PersistentKeepalive = {}", peer.keepalive_seconds);

    out
}
