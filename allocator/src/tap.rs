//! Tap device naming. `spec.md` §4.2 / §8: `vttap-` + sanitized
//! (lowercased alnum) VM name, truncated to the 15-byte kernel interface-name
//! limit; truncation is compensated with a hash suffix to preserve
//! uniqueness.

use sha2::{Digest, Sha256};

const PREFIX: &str = "vttap-";
const MAX_LEN: usize = 15;

fn sanitize(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect()
}

fn short_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..3])
}

/// Compute the tap device name for a VM. Pure and deterministic: calling
/// this twice with the same `vm_name` always yields the same name
/// (`spec.md` §8: `prepare_tap(n,m)` called twice converges).
pub fn tap_name(vm_name: &str) -> String {
    let sanitized = sanitize(vm_name);
    let budget = MAX_LEN - PREFIX.len();

    if sanitized.len() <= budget {
        return format!("{PREFIX}{sanitized}");
    }

    let hash = short_hash(vm_name);
    let prefix_budget = budget - hash.len();
    let truncated: String = sanitized.chars().take(prefix_budget).collect();
    format!("{PREFIX}{truncated}{hash}")
}
