//! Error types for client operations.

use crate::configurator::ConfiguratorError;
use rdv_common::Cidr;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during negotiation and network setup.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Every scheduled attempt elapsed without an authenticated response.
    #[error("negotiation timed out after {0:?}")]
    Timeout(Duration),
    /// The allocated address lies outside the expected network.
    #[error("allocated address {addr} is outside the expected network {network}")]
    OutOfRange {
        /// The address the server allocated.
        addr: IpAddr,
        /// The network the client was configured to expect.
        network: Cidr,
    },
    /// The external network configurator failed.
    #[error("network configurator failed: {0}")]
    Configurator(#[from] ConfiguratorError),
    /// Negotiation was cancelled before completion.
    #[error("negotiation cancelled")]
    Cancelled,
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Process exit status for this failure, used by the binary to keep
    /// timeout, range and setup failures distinguishable to supervisors.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Timeout(_) => 2,
            Self::OutOfRange { .. } => 3,
            Self::Configurator(_) => 4,
            Self::Cancelled => 130,
            Self::Io(_) => 1,
        }
    }
}
