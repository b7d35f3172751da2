//! CLI argument parsing and client configuration.

use clap::Parser;
use rdv_common::Cidr;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// CLI arguments for the rendezvous client.
#[derive(Parser, Debug, Clone)]
#[command(name = "rdvc")]
#[command(about = "Rendezvous address-allocation client")]
#[command(version)]
pub struct Cli {
    /// Rendezvous server address as host:port.
    #[arg(long, env = "RDVC_SERVER")]
    pub server: String,
    /// Shared passphrase; prompted on stdin when neither this nor the file is given.
    #[arg(long, env = "RDVC_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
    /// Read the shared passphrase from a file.
    #[arg(long, env = "RDVC_PASSPHRASE_FILE")]
    pub passphrase_file: Option<PathBuf>,
    /// Hex identity; derived from the machine id when omitted.
    #[arg(long, env = "RDVC_IDENTITY")]
    pub identity: Option<String>,
    /// Base64 public key announced to the server.
    #[arg(long, env = "RDVC_PUBLIC_KEY")]
    pub public_key: Option<String>,
    /// Read the base64 public key from a file.
    #[arg(long, env = "RDVC_PUBLIC_KEY_FILE")]
    pub public_key_file: Option<PathBuf>,
    /// Expected pool network; responses outside it are rejected.
    #[arg(long, env = "RDVC_NETWORK")]
    pub network: Option<Cidr>,
    /// Number of request transmissions before giving up.
    #[arg(long, default_value = "10", env = "RDVC_ATTEMPTS")]
    pub attempts: usize,
    /// Overall negotiation timeout in seconds.
    #[arg(long, default_value = "60", env = "RDVC_TIMEOUT")]
    pub timeout: u64,
    /// Base64 server public key handed through to the configurator.
    #[arg(long, env = "RDVC_SERVER_KEY")]
    pub server_key: Option<String>,
    /// External command applying the negotiated parameters.
    #[arg(long, env = "RDVC_CONFIGURE_CMD")]
    pub configure_cmd: Option<PathBuf>,
    /// Complete negotiation without invoking the configurator.
    #[arg(long)]
    pub dry_run: bool,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.attempts == 0 {
            return Err("attempts must be greater than 0".to_string());
        }
        if self.attempts > 64 {
            return Err("attempts exceeds reasonable limit (64)".to_string());
        }

        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.timeout > 3600 {
            return Err("timeout exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.public_key.is_none() && self.public_key_file.is_none() {
            return Err("either --public-key or --public-key-file is required".to_string());
        }

        if self.configure_cmd.is_none() && !self.dry_run {
            return Err("either --configure-cmd or --dry-run is required".to_string());
        }
        Ok(())
    }
}

/// Resolves the shared passphrase from a flag, a file, or a stdin prompt.
///
/// The passphrase is never logged.
///
/// # Errors
///
/// Returns an error on I/O failure or an empty passphrase.
pub fn resolve_passphrase(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<String> {
    let passphrase = if let Some(p) = inline {
        p.to_string()
    } else if let Some(path) = file {
        std::fs::read_to_string(path)?.trim_end().to_string()
    } else {
        eprint!("passphrase: ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line.trim_end().to_string()
    };
    if passphrase.is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    Ok(passphrase)
}
