//! UDP listen loop and per-identity response sessions.
//!
//! One task processes inbound datagrams: decode, dedup against in-flight
//! sessions, allocate, register, respond. Response retransmission runs in a
//! spawned session task per identity so losses on the return path are
//! repaired without blocking the listener. The session table guarantees at
//! most one response session per identity at a time; a request arriving
//! after its session ended is treated as a fresh allocation attempt, which
//! the allocator answers idempotently.

use crate::allocator::{AllocError, IdentAllocator};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::pool::AddressPool;
use crate::registrar::PeerRegistrar;
use dashmap::DashMap;
use rdv_common::backoff::retry_schedule;
use rdv_common::types::MAX_DATAGRAM;
use rdv_common::wire::{Request, Response};
use rdv_common::{AuthSecret, Identity, PeerKey};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for response sessions to wind down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The rendezvous listener plus everything a request needs to be answered.
pub struct RendezvousServer<R> {
    socket: Arc<UdpSocket>,
    secret: AuthSecret,
    pool: AddressPool,
    allocator: IdentAllocator,
    registrar: R,
    config: ServerConfig,
    sessions: Arc<DashMap<Identity, ()>>,
    delays: Vec<Duration>,
}

impl<R: PeerRegistrar> RendezvousServer<R> {
    /// Assembles a server from its parts; the retransmission schedule is
    /// computed once from the configured retry count and timeout.
    pub fn new(
        socket: UdpSocket,
        secret: AuthSecret,
        pool: AddressPool,
        allocator: IdentAllocator,
        registrar: R,
        config: ServerConfig,
    ) -> Self {
        let delays = retry_schedule(
            config.response_retries,
            Duration::from_secs(config.response_timeout),
        );
        Self {
            socket: Arc::new(socket),
            secret,
            pool,
            allocator,
            registrar,
            config,
            sessions: Arc::new(DashMap::new()),
            delays,
        }
    }

    /// Runs the listen loop until the process is killed.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket's local address cannot be read.
    pub async fn run(self) -> Result<(), ServerError> {
        let (shutdown_tx, _) = watch::channel(());
        self.run_with_shutdown(shutdown_tx).await
    }

    /// Runs the listen loop with an externally-controlled shutdown signal.
    ///
    /// On shutdown every in-flight response session is signalled, then
    /// awaited, so no retransmission timer outlives this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket's local address cannot be read.
    pub async fn run_with_shutdown(
        mut self,
        shutdown_tx: watch::Sender<()>,
    ) -> Result<(), ServerError> {
        let local_addr = self.socket.local_addr()?;
        info!("server listening on {}", local_addr);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let mut sessions = JoinSet::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, src)) => {
                            self.handle_datagram(&buf[..len], src, &shutdown_tx, &mut sessions).await;
                        }
                        Err(e) => error!("failed to receive datagram: {}", e),
                    }
                }
                Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = result {
                        warn!("response session panicked: {}", e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received, draining {} sessions", sessions.len());
                    break;
                }
            }
        }

        // Sessions observe the shutdown signal at their next suspension
        // point; give them a bounded window before aborting outright.
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        loop {
            match tokio::time::timeout_at(deadline, sessions.join_next()).await {
                Ok(Some(Err(e))) => warn!("response session panicked: {}", e),
                Ok(Some(Ok(()))) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "drain timeout reached with {} sessions still active",
                        sessions.len()
                    );
                    sessions.shutdown().await;
                    break;
                }
            }
        }

        info!("server shut down gracefully");
        Ok(())
    }

    /// Decodes, dedups and answers one datagram. Every protocol-level
    /// failure is absorbed here; nothing propagates to the listen loop.
    async fn handle_datagram(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        shutdown_tx: &watch::Sender<()>,
        sessions: &mut JoinSet<()>,
    ) {
        let Some(request) = Request::decode(&self.secret, data) else {
            debug!(%src, len = data.len(), "dropping malformed or unauthenticated datagram");
            return;
        };
        let identity = request.identity;

        if self.sessions.contains_key(&identity) {
            debug!(identity = %identity, "response session already in flight, dropping duplicate");
            return;
        }

        let (address, prefix_len) = match self.init_peer(&identity, &request.peer_key).await {
            Ok(result) => result,
            Err(ServerError::Alloc(AllocError::Exhausted)) => {
                error!(identity = %identity, pool = %self.pool.network(), "address pool exhausted, dropping request");
                return;
            }
            Err(e) => {
                error!(identity = %identity, error = %e, "peer initialization failed, dropping request");
                return;
            }
        };

        let response = Response {
            identity: identity.clone(),
            address,
            prefix_len,
            port: self.config.endpoint_port,
        };
        let bytes = response.encode(&self.secret);

        info!(identity = %identity, %address, %src, "peer allocated, starting response session");
        self.sessions.insert(identity.clone(), ());
        sessions.spawn(respond_session(
            Arc::clone(&self.socket),
            Arc::clone(&self.sessions),
            identity,
            bytes,
            self.delays.clone(),
            shutdown_tx.subscribe(),
            src,
        ));
    }

    /// Allocation plus the external registration side effect. The new
    /// record is durable before the registrar runs; a registration failure
    /// leaves it in place and the identity simply retries.
    async fn init_peer(
        &mut self,
        identity: &Identity,
        peer_key: &PeerKey,
    ) -> Result<(IpAddr, u8), ServerError> {
        let slot = self.allocator.allocate(identity)?;
        let address = self
            .pool
            .address(slot)
            .ok_or(ServerError::StaleSlot(slot))?;
        let prefix_len = self.pool.prefix_len();
        self.registrar
            .register(identity, peer_key, address, prefix_len)
            .await?;
        Ok((address, prefix_len))
    }
}

/// One identity's response retransmission task. The first copy goes out
/// immediately; the schedule spaces the rest. Retransmission continues
/// through the whole schedule, since the server cannot know whether the
/// client already received a copy.
async fn respond_session(
    socket: Arc<UdpSocket>,
    sessions: Arc<DashMap<Identity, ()>>,
    identity: Identity,
    bytes: Vec<u8>,
    delays: Vec<Duration>,
    mut shutdown_rx: watch::Receiver<()>,
    dest: SocketAddr,
) {
    if let Err(e) = socket.send_to(&bytes, dest).await {
        debug!(%dest, error = %e, "failed to send response");
    }
    for delay in delays {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if let Err(e) = socket.send_to(&bytes, dest).await {
                    debug!(%dest, error = %e, "response retransmission failed");
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    sessions.remove(&identity);
    debug!(identity = %identity, "response session finished");
}
