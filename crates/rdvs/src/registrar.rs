//! External peer-registration seam.
//!
//! Before a response leaves the server, the new peer has to be made known
//! to the outside world (typically a tunnel configurator adding an allowed
//! source address for the peer's key). That side effect lives behind
//! [`PeerRegistrar`] so the listen loop stays testable and `--dry-run`
//! stays honest.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rdv_common::{Identity, PeerKey};
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from peer registration.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The external command could not be spawned.
    #[error("failed to run registrar command: {0}")]
    Io(#[from] std::io::Error),
    /// The external command ran but reported failure.
    #[error("registrar command exited with {0}")]
    CommandFailed(ExitStatus),
}

/// Registers a freshly allocated peer with the outside world.
///
/// Called once per request on the datagram-processing task and awaited
/// before the response is signed, so implementations should complete
/// quickly.
pub trait PeerRegistrar: Send + Sync + 'static {
    /// Registers `identity`/`peer_key` as the holder of `address`.
    fn register(
        &self,
        identity: &Identity,
        peer_key: &PeerKey,
        address: IpAddr,
        prefix_len: u8,
    ) -> impl Future<Output = Result<(), RegistrarError>> + Send;
}

/// Registrar selected from the server configuration.
pub enum Registrar {
    /// Log the registration and do nothing (dry run, or no command given).
    Noop,
    /// Invoke an external command per peer.
    Command(CommandRegistrar),
}

impl PeerRegistrar for Registrar {
    async fn register(
        &self,
        identity: &Identity,
        peer_key: &PeerKey,
        address: IpAddr,
        prefix_len: u8,
    ) -> Result<(), RegistrarError> {
        match self {
            Self::Noop => {
                debug!(identity = %identity, %address, "skipping external peer registration");
                Ok(())
            }
            Self::Command(cmd) => cmd.run(identity, peer_key, address, prefix_len).await,
        }
    }
}

/// Runs a configured external command with the peer parameters as
/// arguments: hex identity, base64 key, `address/prefix`.
pub struct CommandRegistrar {
    program: PathBuf,
}

impl CommandRegistrar {
    /// Creates a registrar invoking `program` per peer.
    #[must_use]
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    async fn run(
        &self,
        identity: &Identity,
        peer_key: &PeerKey,
        address: IpAddr,
        prefix_len: u8,
    ) -> Result<(), RegistrarError> {
        let status = Command::new(&self.program)
            .arg(identity.to_string())
            .arg(BASE64.encode(peer_key))
            .arg(format!("{address}/{prefix_len}"))
            .status()
            .await?;
        if !status.success() {
            return Err(RegistrarError::CommandFailed(status));
        }
        info!(identity = %identity, %address, "peer registered");
        Ok(())
    }
}
