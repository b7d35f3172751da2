//! External network-configurator seam.
//!
//! Applying the negotiated parameters to a tunnel interface is not this
//! crate's business; the negotiated lease is handed to an external command
//! behind [`NetConfigurator`]. A failure there is a fatal setup error;
//! retrying is confined to the rendezvous exchange itself.

use crate::negotiate::Lease;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from the external network configurator.
#[derive(Debug, Error)]
pub enum ConfiguratorError {
    /// The external command could not be spawned.
    #[error("failed to run configurator command: {0}")]
    Io(#[from] std::io::Error),
    /// The external command ran but reported failure.
    #[error("configurator command exited with {0}")]
    CommandFailed(ExitStatus),
}

/// Applies a negotiated lease to the local network stack.
pub trait NetConfigurator: Send + Sync {
    /// Applies `lease`, connecting to `endpoint` and trusting `server_key`.
    fn apply(
        &self,
        lease: &Lease,
        server_key: Option<&str>,
        endpoint: &str,
    ) -> impl Future<Output = Result<(), ConfiguratorError>> + Send;
}

/// Configurator selected from the client configuration.
pub enum Configurator {
    /// Log the lease and do nothing (`--dry-run`).
    Noop,
    /// Invoke an external command with the lease parameters.
    Command(CommandConfigurator),
}

impl NetConfigurator for Configurator {
    async fn apply(
        &self,
        lease: &Lease,
        server_key: Option<&str>,
        endpoint: &str,
    ) -> Result<(), ConfiguratorError> {
        match self {
            Self::Noop => {
                debug!(address = %lease.address, endpoint, "dry run, skipping network configuration");
                Ok(())
            }
            Self::Command(cmd) => cmd.run(lease, server_key, endpoint).await,
        }
    }
}

/// Runs a configured external command with the lease as arguments:
/// `address/prefix`, endpoint `host:port`, base64 server key (or `-`).
pub struct CommandConfigurator {
    program: PathBuf,
}

impl CommandConfigurator {
    /// Creates a configurator invoking `program`.
    #[must_use]
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    async fn run(
        &self,
        lease: &Lease,
        server_key: Option<&str>,
        endpoint: &str,
    ) -> Result<(), ConfiguratorError> {
        let status = Command::new(&self.program)
            .arg(format!("{}/{}", lease.address, lease.prefix_len))
            .arg(endpoint)
            .arg(server_key.unwrap_or("-"))
            .status()
            .await?;
        if !status.success() {
            return Err(ConfiguratorError::CommandFailed(status));
        }
        info!(address = %lease.address, endpoint, "network configured");
        Ok(())
    }
}
