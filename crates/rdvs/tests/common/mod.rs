use rdv_common::crypto::{derive_secret, AuthSecret};
use rdv_common::types::MAX_DATAGRAM;
use rdv_common::wire::{Request, Response};
use rdv_common::{Cidr, Identity, PeerKey};
use rdvs::allocator::IdentAllocator;
use rdvs::config::ServerConfig;
use rdvs::error::ServerError;
use rdvs::pool::AddressPool;
use rdvs::registrar::{PeerRegistrar, RegistrarError};
use rdvs::RendezvousServer;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const TEST_PASSPHRASE: &[u8] = b"s3cr3t";

/// Registrar that records every call instead of touching the system.
#[derive(Clone, Default)]
pub struct RecordingRegistrar {
    pub calls: Arc<Mutex<Vec<(Identity, PeerKey, IpAddr, u8)>>>,
}

impl RecordingRegistrar {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PeerRegistrar for RecordingRegistrar {
    async fn register(
        &self,
        identity: &Identity,
        peer_key: &PeerKey,
        address: IpAddr,
        prefix_len: u8,
    ) -> Result<(), RegistrarError> {
        self.calls
            .lock()
            .unwrap()
            .push((identity.clone(), *peer_key, address, prefix_len));
        Ok(())
    }
}

/// Registrar that fails every call, for drop-path tests.
#[derive(Clone, Default)]
pub struct FailingRegistrar;

impl PeerRegistrar for FailingRegistrar {
    async fn register(
        &self,
        _identity: &Identity,
        _peer_key: &PeerKey,
        _address: IpAddr,
        _prefix_len: u8,
    ) -> Result<(), RegistrarError> {
        Err(RegistrarError::CommandFailed(Default::default()))
    }
}

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        endpoint_port: 51820,
        response_retries: 3,
        response_timeout: 1,
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub secret: AuthSecret,
    pub shutdown: watch::Sender<()>,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

/// Binds a loopback server over `pool` and spawns its listen loop.
pub async fn start_server<R: PeerRegistrar>(
    pool: &str,
    reserved: u64,
    state: &Path,
    registrar: R,
) -> TestServer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let secret = derive_secret(TEST_PASSPHRASE);
    let pool = AddressPool::new(pool.parse::<Cidr>().unwrap(), reserved, None).unwrap();
    let allocator =
        IdentAllocator::open(&state.join("allocations.redb"), pool.capacity()).unwrap();
    let server = RendezvousServer::new(
        socket,
        secret.clone(),
        pool,
        allocator,
        registrar,
        test_config(addr),
    );
    let (shutdown, _) = watch::channel(());
    let handle = tokio::spawn(server.run_with_shutdown(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        secret,
        shutdown,
        handle,
    }
}

pub struct TestClient {
    pub socket: UdpSocket,
    pub secret: AuthSecret,
    pub identity: Identity,
    pub peer_key: PeerKey,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr, identity: &[u8]) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(addr).await.unwrap();
        Self {
            socket,
            secret: derive_secret(TEST_PASSPHRASE),
            identity: Identity::new(identity.to_vec()).unwrap(),
            peer_key: [0x11u8; 32],
        }
    }

    pub fn request_bytes(&self) -> Vec<u8> {
        Request {
            identity: self.identity.clone(),
            peer_key: self.peer_key,
        }
        .encode(&self.secret)
    }

    pub async fn send_request(&self) {
        self.socket.send(&self.request_bytes()).await.unwrap();
    }

    pub async fn send_raw(&self, bytes: &[u8]) {
        self.socket.send(bytes).await.unwrap();
    }

    pub async fn recv_response(&self) -> Response {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = tokio::time::timeout(Duration::from_secs(5), self.socket.recv(&mut buf))
                .await
                .expect("timeout waiting for response")
                .unwrap();
            if let Some(response) = Response::decode(&self.secret, &buf[..len]) {
                return response;
            }
        }
    }

    pub async fn recv_response_timeout(&self, timeout: Duration) -> Option<Response> {
        tokio::time::timeout(timeout, self.recv_response()).await.ok()
    }
}
