//! CLI argument parsing and server configuration.

use clap::Parser;
use rdv_common::Cidr;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// CLI arguments for the rendezvous server.
#[derive(Parser, Debug, Clone)]
#[command(name = "rdvs")]
#[command(about = "Rendezvous address-allocation server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:48600", env = "RDVS_LISTEN")]
    pub listen: SocketAddr,
    /// Shared passphrase; prompted on stdin when neither this nor the file is given.
    #[arg(long, env = "RDVS_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
    /// Read the shared passphrase from a file.
    #[arg(long, env = "RDVS_PASSPHRASE_FILE")]
    pub passphrase_file: Option<PathBuf>,
    /// Address pool network in CIDR notation.
    #[arg(long, default_value = "10.11.0.0/16", env = "RDVS_POOL")]
    pub pool: Cidr,
    /// Leading pool slots that are never allocated.
    #[arg(long, default_value = "1", env = "RDVS_RESERVED")]
    pub reserved: u64,
    /// Optional upper bound on allocatable slots.
    #[arg(long, env = "RDVS_MAX_PEERS")]
    pub max_peers: Option<u64>,
    /// Endpoint port advertised to clients in responses.
    #[arg(long, default_value = "51820", env = "RDVS_ENDPOINT_PORT")]
    pub endpoint_port: u16,
    /// Path of the persistent allocation store.
    #[arg(long, default_value = "rdvs-allocations.redb", env = "RDVS_STATE")]
    pub state_path: PathBuf,
    /// Number of scheduled retransmissions per response.
    #[arg(long, default_value = "8", env = "RDVS_RESPONSE_RETRIES")]
    pub response_retries: usize,
    /// Seconds over which response retransmissions are spread.
    #[arg(long, default_value = "30", env = "RDVS_RESPONSE_TIMEOUT")]
    pub response_timeout: u64,
    /// External command invoked to register each peer.
    #[arg(long, env = "RDVS_REGISTER_CMD")]
    pub register_cmd: Option<PathBuf>,
    /// Skip the external registration command while still allocating.
    #[arg(long)]
    pub dry_run: bool,
    /// Print the allocation table and exit.
    #[arg(long)]
    pub list: bool,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Endpoint port advertised to clients in responses.
    pub endpoint_port: u16,
    /// Number of scheduled retransmissions per response.
    pub response_retries: usize,
    /// Seconds over which response retransmissions are spread.
    pub response_timeout: u64,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint_port == 0 {
            return Err("endpoint_port must be greater than 0".to_string());
        }

        if self.response_retries == 0 {
            return Err("response_retries must be greater than 0".to_string());
        }
        if self.response_retries > 64 {
            return Err("response_retries exceeds reasonable limit (64)".to_string());
        }

        if self.response_timeout == 0 {
            return Err("response_timeout must be greater than 0".to_string());
        }
        if self.response_timeout > 3600 {
            return Err("response_timeout exceeds reasonable limit (3600 seconds)".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            endpoint_port: args.endpoint_port,
            response_retries: args.response_retries,
            response_timeout: args.response_timeout,
        }
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
