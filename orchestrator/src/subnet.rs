//! CIDR parsing for the one thing the orchestrator needs from it: the dotted
//! subnet mask to embed in a bridged VM's `ip=` kernel cmdline argument.

use std::net::Ipv4Addr;

/// Parse `a.b.c.d/n`'s prefix length into a dotted mask. Falls back to
/// `/24` (this workspace's documented default subnet) if the CIDR is
/// malformed, since a misconfigured mask should degrade, not panic, deep
/// inside a VM create.
pub fn mask_of(cidr: &str) -> Ipv4Addr {
    let prefix = cidr
        .split('/')
        .nth(1)
        .and_then(|p| p.parse::<u32>().ok())
        .filter(|p| *p <= 32)
        .unwrap_or(24);

    let bits = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    Ipv4Addr::from(bits)
}
