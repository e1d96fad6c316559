//! Gateway URL derivation and interface discovery.

use std::net::Ipv4Addr;

use get_if_addrs::{get_if_addrs, IfAddr};

use sidecar_core::config::{bind_mode, gateway_port};
use sidecar_core::paths::keys;
use sidecar_core::Env;

/// Interfaces checked first, in order, for a routable IPv4 address.
pub const PREFERRED_INTERFACES: [&str; 4] = ["eth0", "ens5", "ens4", "en0"];

/// URL the reconciler hands to administrative sub-commands.
///
/// An explicit URL wins; loopback binds use `127.0.0.1`; LAN binds use the
/// first routable IPv4 address, else loopback.
pub fn gateway_url(env: &Env) -> String {
    if let Some(explicit) = env.first(&keys::GATEWAY_URL) {
        return explicit.to_string();
    }
    let port = gateway_port(env);
    let host = if bind_mode(env).is_loopback() {
        Ipv4Addr::LOCALHOST
    } else {
        lan_address().unwrap_or(Ipv4Addr::LOCALHOST)
    };
    format!("ws://{host}:{port}")
}

/// First non-loopback IPv4 address of this host.
pub fn lan_address() -> Option<Ipv4Addr> {
    pick_lan_address(&ipv4_interfaces())
}

/// Preferred interface names first, then any other interface.
pub fn pick_lan_address(entries: &[(String, Ipv4Addr)]) -> Option<Ipv4Addr> {
    let routable = |ip: &Ipv4Addr| !ip.is_loopback() && !ip.is_unspecified();
    PREFERRED_INTERFACES
        .iter()
        .find_map(|wanted| {
            entries
                .iter()
                .find(|(name, ip)| name == wanted && routable(ip))
                .map(|(_, ip)| *ip)
        })
        .or_else(|| entries.iter().map(|(_, ip)| *ip).find(routable))
}

/// `(interface, address)` for every IPv4 address on the host.
pub fn ipv4_interfaces() -> Vec<(String, Ipv4Addr)> {
    match get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(v4) => Some((iface.name, v4.ip)),
                IfAddr::V6(_) => None,
            })
            .collect(),
        Err(err) => {
            tracing::debug!(error = %err, "interface enumeration failed");
            Vec::new()
        }
    }
}

/// One-shot interface summary for troubleshooting container networking.
pub fn log_network_summary() {
    let interfaces = ipv4_interfaces()
        .into_iter()
        .map(|(name, ip)| format!("{name}={ip}"))
        .collect::<Vec<_>>();
    tracing::info!(
        interfaces = ?interfaces,
        lan_address = ?lan_address(),
        "network interface summary",
    );
}
