//! Address pool: a pure slot → address mapping over a configured network.
//!
//! Slot numbers are what the allocator persists; addresses are derived on
//! demand, so the pool configuration can be widened later without rewriting
//! the store. The network base address is never handed out, and a
//! configurable number of leading slots (gateway, infrastructure) is skipped
//! before the first allocatable address.

use rdv_common::Cidr;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Errors from pool construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The network leaves no allocatable addresses.
    #[error("pool {0} has no allocatable addresses")]
    Empty(Cidr),
    /// More slots reserved than the network can hold.
    #[error("{reserved} reserved slots exceed pool {pool}")]
    ReservedExceedsPool {
        /// The configured pool network.
        pool: Cidr,
        /// The configured reserved-slot count.
        reserved: u64,
    },
}

/// A contiguous address range with reserved leading slots.
#[derive(Debug, Clone)]
pub struct AddressPool {
    network: Cidr,
    reserved: u64,
    max_peers: Option<u64>,
}

impl AddressPool {
    /// Builds a pool over `network`, skipping `reserved` leading slots and
    /// optionally capping the allocatable slot count.
    ///
    /// Host bits in the given network address are masked off.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] if the network holds no allocatable address
    /// after the base address and reservations are excluded.
    pub fn new(network: Cidr, reserved: u64, max_peers: Option<u64>) -> Result<Self, PoolError> {
        let network = Cidr::new(network.network(), network.prefix())
            .expect("prefix was already validated");
        let pool = Self {
            network,
            reserved,
            max_peers,
        };
        let host_bits = network.host_bits();
        if host_bits == 0 || (host_bits < 64 && (1u64 << host_bits) <= 1 + reserved) {
            return Err(if reserved == 0 {
                PoolError::Empty(network)
            } else {
                PoolError::ReservedExceedsPool {
                    pool: network,
                    reserved,
                }
            });
        }
        if pool.capacity() == 0 {
            return Err(PoolError::Empty(network));
        }
        Ok(pool)
    }

    /// Number of allocatable slots.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        let host_bits = self.network.host_bits();
        let usable = if host_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << host_bits).saturating_sub(1 + self.reserved)
        };
        match self.max_peers {
            Some(cap) => usable.min(cap),
            None => usable,
        }
    }

    /// The address for `slot`, or `None` if the slot lies outside the pool.
    #[must_use]
    pub fn address(&self, slot: u64) -> Option<IpAddr> {
        if slot >= self.capacity() {
            return None;
        }
        let offset = 1 + self.reserved + slot;
        Some(match self.network.network() {
            IpAddr::V4(base) => {
                IpAddr::V4(Ipv4Addr::from(u32::from(base) | offset as u32))
            }
            IpAddr::V6(base) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(base) | u128::from(offset)))
            }
        })
    }

    /// Prefix length of the pool network.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.network.prefix()
    }

    /// The normalized pool network.
    #[must_use]
    pub fn network(&self) -> Cidr {
        self.network
    }
}
