//! Secret derivation and keyed-MAC primitives for the rendezvous exchange.
//!
//! Both sides derive the same [`AuthSecret`] from a shared passphrase, then
//! authenticate every message with a salted BLAKE2b-512 MAC under that
//! secret. The passphrase and the derived secret are never transmitted.

use crate::types::{DOMAIN_LABEL, MAC_LEN, SALT_LEN};
use blake2::digest::Mac;
use blake2::{Blake2b512, Blake2bMac512, Digest};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// BLAKE2b accepts keys of at most 64 bytes.
const KEY_MAX: usize = 64;

/// Fixed-length secret derived from the shared passphrase.
///
/// The `Debug` impl is redacted so the secret cannot leak through logging.
#[derive(Clone)]
pub struct AuthSecret([u8; KEY_MAX]);

impl AuthSecret {
    /// Raw secret bytes, used as the MAC key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_MAX] {
        &self.0
    }
}

impl fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthSecret(..)")
    }
}

/// Derives the authentication secret from a shared passphrase.
///
/// The derivation is a keyed BLAKE2b-512 over the empty message with the
/// protocol's domain-separation label as personalization, so the same
/// passphrase used by an unrelated protocol yields an unrelated secret.
/// Passphrases longer than the 64-byte key limit are pre-hashed.
///
/// # Examples
///
/// ```
/// use rdv_common::crypto::derive_secret;
///
/// let a = derive_secret(b"s3cr3t");
/// let b = derive_secret(b"s3cr3t");
/// assert_eq!(a.as_bytes(), b.as_bytes());
/// ```
#[must_use]
pub fn derive_secret(passphrase: &[u8]) -> AuthSecret {
    let key: Vec<u8> = if passphrase.len() > KEY_MAX {
        Blake2b512::digest(passphrase).to_vec()
    } else {
        passphrase.to_vec()
    };
    let mac = Blake2bMac512::new_with_salt_and_personal(&key, &[], DOMAIN_LABEL)
        .expect("key, salt and personalization lengths are fixed");
    let mut secret = [0u8; KEY_MAX];
    secret.copy_from_slice(&mac.finalize().into_bytes());
    AuthSecret(secret)
}

/// Computes the salted MAC over `data`.
#[must_use]
pub fn compute_mac(secret: &AuthSecret, salt: &[u8; SALT_LEN], data: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = Blake2bMac512::new_with_salt_and_personal(secret.as_bytes(), salt, DOMAIN_LABEL)
        .expect("key, salt and personalization lengths are fixed");
    mac.update(data);
    let mut tag = [0u8; MAC_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Verifies a salted MAC over `data` in constant time.
///
/// Returns `false` for a salt of the wrong length rather than panicking, so
/// callers can feed wire-derived slices directly.
#[must_use]
pub fn verify_mac(secret: &AuthSecret, salt: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let Ok(mut mac) =
        Blake2bMac512::new_with_salt_and_personal(secret.as_bytes(), salt, DOMAIN_LABEL)
    else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// Draws a fresh random salt from OS randomness.
#[must_use]
pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_secret(b"correct horse battery staple");
        let b = derive_secret(b"correct horse battery staple");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_passphrases_yield_different_secrets() {
        let a = derive_secret(b"alpha");
        let b = derive_secret(b"bravo");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn long_passphrase_is_accepted() {
        let long = vec![0x5au8; 300];
        let a = derive_secret(&long);
        let b = derive_secret(&long);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), derive_secret(&long[..64]).as_bytes());
    }

    #[test]
    fn mac_round_trip() {
        let secret = derive_secret(b"s3cr3t");
        let salt = random_salt();
        let tag = compute_mac(&secret, &salt, b"payload");
        assert!(verify_mac(&secret, &salt, b"payload", &tag));
    }

    #[test]
    fn mac_rejects_wrong_data() {
        let secret = derive_secret(b"s3cr3t");
        let salt = random_salt();
        let tag = compute_mac(&secret, &salt, b"payload");
        assert!(!verify_mac(&secret, &salt, b"payloae", &tag));
    }

    #[test]
    fn mac_rejects_wrong_salt() {
        let secret = derive_secret(b"s3cr3t");
        let salt = [1u8; SALT_LEN];
        let tag = compute_mac(&secret, &salt, b"payload");
        assert!(!verify_mac(&secret, &[2u8; SALT_LEN], b"payload", &tag));
    }

    #[test]
    fn mac_rejects_wrong_secret() {
        let salt = random_salt();
        let tag = compute_mac(&derive_secret(b"one"), &salt, b"payload");
        assert!(!verify_mac(&derive_secret(b"two"), &salt, b"payload", &tag));
    }

    #[test]
    fn oversized_salt_fails_closed() {
        let secret = derive_secret(b"s3cr3t");
        let tag = [0u8; MAC_LEN];
        assert!(!verify_mac(&secret, &[0u8; 17], b"payload", &tag));
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(random_salt(), random_salt());
    }
}
