//! Core type definitions and protocol constants for the rendezvous exchange.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// A 32-byte peer public key carried opaquely through the protocol.
pub type PeerKey = [u8; 32];

/// Length of the random per-message salt.
pub const SALT_LEN: usize = 16;
/// Length of the keyed MAC appended to every message.
pub const MAC_LEN: usize = 64;
/// Length of a peer public key.
pub const PEER_KEY_LEN: usize = 32;
/// Maximum identity length representable by the one-byte length prefix.
pub const MAX_IDENTITY_LEN: usize = 255;
/// Largest datagram either side will ever send or accept.
pub const MAX_DATAGRAM: usize = 512;

/// Domain-separation label mixed into every keyed hash.
/// Bump this on breaking wire-format changes.
pub const DOMAIN_LABEL: &[u8] = b"rendezvous-v1";

/// An identity exceeds the one-byte length prefix of the wire format.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("identity of {0} bytes exceeds the {MAX_IDENTITY_LEN}-byte limit")]
pub struct IdentityTooLong(pub usize);

/// Opaque byte string naming a client in the allocation store.
///
/// Construction enforces the wire format's one-byte length prefix, so an
/// `Identity` is always encodable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(Vec<u8>);

impl Identity {
    /// Creates an identity from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityTooLong`] if the input exceeds [`MAX_IDENTITY_LEN`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IdentityTooLong> {
        let bytes = bytes.into();
        if bytes.len() > MAX_IDENTITY_LEN {
            return Err(IdentityTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Raw identity bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Identity length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the zero-length identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Errors from parsing a `network/prefix` string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrError {
    /// Input was not of the form `address/prefix`.
    #[error("expected address/prefix, got {0:?}")]
    Malformed(String),
    /// The address part did not parse.
    #[error("invalid network address: {0}")]
    BadAddress(String),
    /// The prefix part did not parse or exceeds the address width.
    #[error("invalid prefix length: {0}")]
    BadPrefix(String),
}

/// A network in CIDR notation, used for address pools and range validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Creates a CIDR from an address and prefix length.
    ///
    /// # Errors
    ///
    /// Returns [`CidrError::BadPrefix`] if the prefix exceeds the address
    /// family's bit width.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, CidrError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(CidrError::BadPrefix(format!("{prefix} > {max}")));
        }
        Ok(Self { addr, prefix })
    }

    /// The address as given, host bits included.
    #[must_use]
    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of host bits.
    #[must_use]
    pub const fn host_bits(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32 - self.prefix,
            IpAddr::V6(_) => 128 - self.prefix,
        }
    }

    /// The network base address, host bits zeroed.
    #[must_use]
    pub fn network(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(v4) => IpAddr::V4((u32::from(v4) & self.mask_v4()).into()),
            IpAddr::V6(v6) => IpAddr::V6((u128::from(v6) & self.mask_v6()).into()),
        }
    }

    /// Returns `true` if `ip` lies within this network.
    ///
    /// Addresses of a different family are never contained.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (ip, self.addr) {
            (IpAddr::V4(ip), IpAddr::V4(net)) => {
                let mask = self.mask_v4();
                (u32::from(*ip) & mask) == (u32::from(net) & mask)
            }
            (IpAddr::V6(ip), IpAddr::V6(net)) => {
                let mask = self.mask_v6();
                (u128::from(*ip) & mask) == (u128::from(net) & mask)
            }
            _ => false,
        }
    }

    // Handle prefix == 0 specially to avoid shift overflow
    fn mask_v4(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            !((1u32 << (32 - self.prefix)) - 1)
        }
    }

    fn mask_v6(&self) -> u128 {
        if self.prefix == 0 {
            0
        } else {
            !((1u128 << (128 - self.prefix)) - 1)
        }
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::Malformed(s.to_string()))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| CidrError::BadAddress(addr.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrError::BadPrefix(prefix.to_string()))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}
