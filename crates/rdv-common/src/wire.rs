//! Binary serialization and authentication of rendezvous messages.
//!
//! Each datagram carries one message: a client [`Request`] or a server
//! [`Response`]. Multi-byte integers are network byte order. Every message
//! ends in a fresh 16-byte salt and a 64-byte keyed MAC computed over all
//! fields preceding the salt; the salt itself keys into the MAC through the
//! hash's salt parameter.
//!
//! Decoding deliberately collapses every failure (short input, inconsistent
//! lengths, unknown address family, MAC mismatch) into `None`, so a
//! malformed datagram is externally indistinguishable from a forged one.

use crate::crypto::{compute_mac, random_salt, verify_mac, AuthSecret};
use crate::types::{Identity, PeerKey, MAC_LEN, PEER_KEY_LEN, SALT_LEN};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address-family byte for IPv4 payloads.
pub const FAMILY_V4: u8 = 4;
/// Address-family byte for IPv6 payloads.
pub const FAMILY_V6: u8 = 6;

/// Smallest possible request: empty identity plus fixed-size fields.
const REQUEST_MIN: usize = 1 + PEER_KEY_LEN + SALT_LEN + MAC_LEN;
/// Fixed response overhead: header, salt and MAC around identity + address.
const RESPONSE_FIXED: usize = 1 + 1 + 2 + 1 + SALT_LEN + MAC_LEN;

/// A client's signed address request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Identity under which the client requests an allocation.
    pub identity: Identity,
    /// The client's public key, forwarded to the peer registrar.
    pub peer_key: PeerKey,
}

impl Request {
    /// Serializes and signs this request.
    ///
    /// # Examples
    ///
    /// ```
    /// use rdv_common::crypto::derive_secret;
    /// use rdv_common::types::Identity;
    /// use rdv_common::wire::Request;
    ///
    /// let secret = derive_secret(b"s3cr3t");
    /// let request = Request {
    ///     identity: Identity::new(b"node-A".to_vec()).unwrap(),
    ///     peer_key: [7u8; 32],
    /// };
    /// let bytes = request.encode(&secret);
    /// assert_eq!(Request::decode(&secret, &bytes), Some(request));
    /// ```
    #[must_use]
    pub fn encode(&self, secret: &AuthSecret) -> Vec<u8> {
        let id = self.identity.as_bytes();
        let mut buf = Vec::with_capacity(REQUEST_MIN + id.len());
        buf.push(id.len() as u8);
        buf.extend_from_slice(id);
        buf.extend_from_slice(&self.peer_key);
        seal(secret, &mut buf);
        buf
    }

    /// Parses and authenticates a request datagram.
    ///
    /// Returns `None` on any structural or MAC failure.
    #[must_use]
    pub fn decode(secret: &AuthSecret, data: &[u8]) -> Option<Self> {
        if data.len() < REQUEST_MIN {
            return None;
        }
        let id_len = usize::from(data[0]);
        if data.len() != REQUEST_MIN + id_len {
            return None;
        }
        let body_len = 1 + id_len + PEER_KEY_LEN;
        open(secret, data, body_len)?;

        let identity = Identity::new(&data[1..1 + id_len]).ok()?;
        let peer_key: PeerKey = data[1 + id_len..body_len].try_into().ok()?;
        Some(Self { identity, peer_key })
    }
}

/// A server's signed allocation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Identity the allocation belongs to, echoed from the request.
    pub identity: Identity,
    /// The allocated address.
    pub address: IpAddr,
    /// Prefix length of the pool network.
    pub prefix_len: u8,
    /// The server's advertised endpoint port.
    pub port: u16,
}

impl Response {
    /// Serializes and signs this response.
    #[must_use]
    pub fn encode(&self, secret: &AuthSecret) -> Vec<u8> {
        let id = self.identity.as_bytes();
        let mut buf = Vec::with_capacity(RESPONSE_FIXED + id.len() + 16);
        buf.push(id.len() as u8);
        buf.push(match self.address {
            IpAddr::V4(_) => FAMILY_V4,
            IpAddr::V6(_) => FAMILY_V6,
        });
        buf.extend_from_slice(&self.port.to_be_bytes());
        buf.push(self.prefix_len);
        buf.extend_from_slice(id);
        match self.address {
            IpAddr::V4(v4) => buf.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => buf.extend_from_slice(&v6.octets()),
        }
        seal(secret, &mut buf);
        buf
    }

    /// Parses and authenticates a response datagram.
    ///
    /// Returns `None` on any structural or MAC failure, including an
    /// address-family byte other than 4 or 6.
    #[must_use]
    pub fn decode(secret: &AuthSecret, data: &[u8]) -> Option<Self> {
        if data.len() < RESPONSE_FIXED + 4 {
            return None;
        }
        let id_len = usize::from(data[0]);
        let addr_len = match data[1] {
            FAMILY_V4 => 4,
            FAMILY_V6 => 16,
            _ => return None,
        };
        if data.len() != RESPONSE_FIXED + id_len + addr_len {
            return None;
        }
        let body_len = 5 + id_len + addr_len;
        open(secret, data, body_len)?;

        let port = u16::from_be_bytes([data[2], data[3]]);
        let prefix_len = data[4];
        let identity = Identity::new(&data[5..5 + id_len]).ok()?;
        let addr_bytes = &data[5 + id_len..body_len];
        let address = match data[1] {
            FAMILY_V4 => {
                let octets: [u8; 4] = addr_bytes.try_into().ok()?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            _ => {
                let octets: [u8; 16] = addr_bytes.try_into().ok()?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
        };
        Some(Self {
            identity,
            address,
            prefix_len,
            port,
        })
    }
}

/// Appends a fresh salt and the MAC over the current buffer contents.
fn seal(secret: &AuthSecret, buf: &mut Vec<u8>) {
    let salt = random_salt();
    let mac = compute_mac(secret, &salt, buf);
    buf.extend_from_slice(&salt);
    buf.extend_from_slice(&mac);
}

/// Checks the trailing salt + MAC against the first `body_len` bytes.
fn open(secret: &AuthSecret, data: &[u8], body_len: usize) -> Option<()> {
    let (body, rest) = data.split_at(body_len);
    let (salt, mac) = rest.split_at(SALT_LEN);
    verify_mac(secret, salt, body, mac).then_some(())
}
