#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use rdv_common::crypto::derive_secret;
use rdvs::allocator::IdentAllocator;
use rdvs::config::{resolve_passphrase, Args, ServerConfig};
use rdvs::pool::AddressPool;
use rdvs::registrar::{CommandRegistrar, Registrar};
use rdvs::RendezvousServer;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{info, warn};
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
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config: ServerConfig = args.clone().into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let pool = AddressPool::new(args.pool, args.reserved, args.max_peers)?;
    let allocator = IdentAllocator::open(&args.state_path, pool.capacity())?;

    if args.list {
        return list_allocations(&allocator, &pool);
    }

    let passphrase =
        resolve_passphrase(args.passphrase.as_deref(), args.passphrase_file.as_deref())?;
    let secret = derive_secret(passphrase.as_bytes());

    let registrar = if args.dry_run {
        info!("dry run: external peer registration disabled");
        Registrar::Noop
    } else if let Some(cmd) = args.register_cmd {
        Registrar::Command(CommandRegistrar::new(cmd))
    } else {
        warn!("no --register-cmd configured, allocations are not applied anywhere");
        Registrar::Noop
    };

    let socket = UdpSocket::bind(config.listen).await?;
    info!(
        pool = %pool.network(),
        capacity = pool.capacity(),
        "bound to {}",
        config.listen
    );

    let server = RendezvousServer::new(socket, secret, pool, allocator, registrar, config);

    let (shutdown_tx, _) = watch::channel(());
    let mut handle = tokio::spawn(server.run_with_shutdown(shutdown_tx.clone()));

    tokio::select! {
        result = &mut handle => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            let _ = shutdown_tx.send(());
            handle.await??;
        }
    }

    Ok(())
}

fn list_allocations(allocator: &IdentAllocator, pool: &AddressPool) -> Result<()> {
    let entries = allocator.entries()?;
    if entries.is_empty() {
        println!("no allocations");
        return Ok(());
    }
    for (identity, slot) in entries {
        match pool.address(slot) {
            Some(address) => {
                println!("{identity}  slot {slot}  {address}/{}", pool.prefix_len());
            }
            None => println!("{identity}  slot {slot}  (outside configured pool)"),
        }
    }
    Ok(())
}
