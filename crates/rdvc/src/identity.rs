//! Identity and key material resolution.
//!
//! The identity is an opaque byte string; by default it is derived by
//! hashing the machine id, so the same host always negotiates as the same
//! peer and the raw hardware identifier never crosses the wire.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rdv_common::{Identity, PeerKey};
use sha2::{Digest, Sha256};
use std::path::Path;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Resolves the client identity from a hex flag or the machine id.
///
/// # Errors
///
/// Returns an error if the hex string is malformed or no machine-id file
/// exists to derive from.
pub fn resolve_identity(inline_hex: Option<&str>) -> anyhow::Result<Identity> {
    if let Some(hex_str) = inline_hex {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| anyhow::anyhow!("invalid hex identity: {e}"))?;
        return Ok(Identity::new(bytes)?);
    }
    for path in MACHINE_ID_PATHS {
        let path = Path::new(path);
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let digest = Sha256::digest(contents.trim().as_bytes());
            return Ok(Identity::new(digest.to_vec())?);
        }
    }
    anyhow::bail!("no --identity given and no machine-id file found")
}

/// Resolves the client's public key from a base64 flag or a key file.
///
/// # Errors
///
/// Returns an error if neither source is given, the base64 is malformed,
/// or the key is not exactly 32 bytes.
pub fn resolve_peer_key(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<PeerKey> {
    let encoded = if let Some(key) = inline {
        key.trim().to_string()
    } else if let Some(path) = file {
        std::fs::read_to_string(path)?.trim().to_string()
    } else {
        anyhow::bail!("either --public-key or --public-key-file is required");
    };
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid base64 public key: {e}"))?;
    let key: PeerKey = bytes.as_slice().try_into().map_err(|_| {
        anyhow::anyhow!(
            "public key must decode to exactly 32 bytes, got {}",
            bytes.len()
        )
    })?;
    Ok(key)
}
