//! sha256 verification. `spec.md` §4.3: the `sha256:` prefix is accepted
//! and stripped before comparison.

use sha2::{Digest, Sha256};
use std::path::Path;

pub fn strip_prefix(checksum: &str) -> &str {
    checksum.strip_prefix("sha256:").unwrap_or(checksum)
}

pub fn sha256_hex(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
