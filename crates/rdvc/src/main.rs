#![forbid(unsafe_code)]

use clap::Parser;
use rdv_common::backoff::retry_schedule;
use rdv_common::crypto::derive_secret;
use rdvc::config::{resolve_passphrase, Cli};
use rdvc::configurator::{CommandConfigurator, Configurator, NetConfigurator};
use rdvc::identity::{resolve_identity, resolve_peer_key};
use rdvc::negotiate::{check_network, negotiate};
use rdvc::ClientError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        let code = e
            .downcast_ref::<ClientError>()
            .map_or(1, ClientError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    let passphrase = resolve_passphrase(cli.passphrase.as_deref(), cli.passphrase_file.as_deref())?;
    let secret = derive_secret(passphrase.as_bytes());
    let identity = resolve_identity(cli.identity.as_deref())?;
    let peer_key = resolve_peer_key(cli.public_key.as_deref(), cli.public_key_file.as_deref())?;

    let server_addr = tokio::net::lookup_host(&cli.server)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {}", cli.server))?;

    let socket = UdpSocket::bind(local_bind_addr(&server_addr)).await?;
    socket.connect(server_addr).await?;

    let delays = retry_schedule(cli.attempts, Duration::from_secs(cli.timeout));
    info!(
        identity = %identity,
        server = %server_addr,
        attempts = cli.attempts,
        "starting negotiation"
    );

    let lease = tokio::select! {
        result = negotiate(&socket, &secret, &identity, &peer_key, &delays) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("negotiation cancelled");
            return Err(ClientError::Cancelled.into());
        }
    };

    if let Some(network) = cli.network {
        check_network(&lease, &network)?;
    }
    info!(
        address = %lease.address,
        prefix = lease.prefix_len,
        port = lease.port,
        "negotiation complete"
    );

    let endpoint = endpoint_for(&cli.server, lease.port);
    let configurator = if cli.dry_run {
        info!("dry run: network configuration skipped");
        Configurator::Noop
    } else if let Some(cmd) = cli.configure_cmd.clone() {
        Configurator::Command(CommandConfigurator::new(cmd))
    } else {
        Configurator::Noop
    };
    configurator
        .apply(&lease, cli.server_key.as_deref(), &endpoint)
        .await
        .map_err(ClientError::Configurator)?;

    println!("{}/{} via {}", lease.address, lease.prefix_len, endpoint);
    Ok(())
}

/// An unspecified local address matching the server's address family.
fn local_bind_addr(server: &SocketAddr) -> &'static str {
    if server.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    }
}

/// The advertised endpoint: the server's host with the negotiated port.
fn endpoint_for(server: &str, port: u16) -> String {
    match server.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{server}:{port}"),
    }
}
