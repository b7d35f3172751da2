//! The negotiation state machine: scheduled request retransmission with
//! continuous listening.
//!
//! The client signs one request and sends it once per scheduled delay,
//! listening on the connected socket between transmissions. The first
//! authenticated response carrying the client's own identity wins,
//! regardless of which transmission prompted it. Exhausting the schedule
//! is a timeout, a distinct outcome from every other failure.

use crate::error::ClientError;
use rdv_common::types::MAX_DATAGRAM;
use rdv_common::wire::{Request, Response};
use rdv_common::{AuthSecret, Cidr, Identity, PeerKey};
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Pause after a socket-level error before the request is retransmitted,
/// so an unreachable server does not turn the wait into a hot loop.
const RESEND_PAUSE: Duration = Duration::from_millis(100);

/// The negotiated assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Address allocated to this client.
    pub address: IpAddr,
    /// Prefix length of the pool network.
    pub prefix_len: u8,
    /// The server's advertised endpoint port.
    pub port: u16,
}

/// Negotiates an address assignment over the connected socket.
///
/// Transmits the signed request once per entry of `delays` and waits out
/// each delay listening for responses. A socket-level receive error (for
/// example an ICMP-driven connection reset on a connected UDP socket)
/// forces a fresh transmission before the wait continues. Responses for
/// other identities and unauthenticated datagrams are ignored.
///
/// # Errors
///
/// Returns [`ClientError::Timeout`] when the schedule is exhausted without
/// an authenticated response. Transmission failures are absorbed and
/// retried within the schedule rather than surfaced.
pub async fn negotiate(
    socket: &UdpSocket,
    secret: &AuthSecret,
    identity: &Identity,
    peer_key: &PeerKey,
    delays: &[Duration],
) -> Result<Lease, ClientError> {
    let request = Request {
        identity: identity.clone(),
        peer_key: *peer_key,
    }
    .encode(secret);
    let total: Duration = delays.iter().sum();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    for (attempt, delay) in delays.iter().enumerate() {
        match socket.send(&request).await {
            Ok(_) => debug!(attempt, "request sent"),
            Err(e) => debug!(attempt, error = %e, "request transmission failed"),
        }

        let deadline = Instant::now() + *delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(len)) => match Response::decode(secret, &buf[..len]) {
                    Some(response) if response.identity == *identity => {
                        debug!(attempt, address = %response.address, "authenticated response received");
                        return Ok(Lease {
                            address: response.address,
                            prefix_len: response.prefix_len,
                            port: response.port,
                        });
                    }
                    Some(response) => {
                        debug!(identity = %response.identity, "ignoring response for another identity");
                    }
                    None => {
                        debug!(len, "ignoring malformed or unauthenticated datagram");
                    }
                },
                Ok(Err(e)) => {
                    debug!(error = %e, "socket error while awaiting response, retransmitting");
                    tokio::time::sleep(RESEND_PAUSE.min(remaining)).await;
                    if let Err(e) = socket.send(&request).await {
                        debug!(error = %e, "request retransmission failed");
                    }
                }
            }
        }
    }

    Err(ClientError::Timeout(total))
}

/// Validates a lease against the network the client expects.
///
/// # Errors
///
/// Returns [`ClientError::OutOfRange`] when the allocated address lies
/// outside `network`; such a lease must never reach the configurator.
pub fn check_network(lease: &Lease, network: &Cidr) -> Result<(), ClientError> {
    if network.contains(&lease.address) {
        Ok(())
    } else {
        Err(ClientError::OutOfRange {
            addr: lease.address,
            network: *network,
        })
    }
}
