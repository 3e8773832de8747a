//! PCI address parsing and format validation. `spec.md` §4.5: addresses are
//! `DDDD:BB:DD.F` (domain:bus:device.function).

use crate::error::{Result, VfioError};

pub fn validate_format(address: &str) -> Result<()> {
    let (domain_bus_dev, function) = address
        .split_once('.')
        .ok_or_else(|| VfioError::InvalidAddress(address.to_string()))?;
    let parts: Vec<&str> = domain_bus_dev.split(':').collect();
    if parts.len() != 3 {
        return Err(VfioError::InvalidAddress(address.to_string()));
    }
    let [domain, bus, device] = [parts[0], parts[1], parts[2]];
    let all_hex = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit());

    if all_hex(domain, 4) && all_hex(bus, 2) && all_hex(device, 2) && all_hex(function, 1) {
        Ok(())
    } else {
        Err(VfioError::InvalidAddress(address.to_string()))
    }
}

/// Matches `vendor:device` (exact, lowercase hex) against an allowlist entry,
/// where the entry's device half may be the literal wildcard `*`.
pub fn matches_allowlist(vendor: &str, device: &str, entry: &str) -> bool {
    let Some((entry_vendor, entry_device)) = entry.split_once(':') else {
        return false;
    };
    if !entry_vendor.eq_ignore_ascii_case(vendor) {
        return false;
    }
    entry_device == "*" || entry_device.eq_ignore_ascii_case(device)
}
