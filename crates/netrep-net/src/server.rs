//! TCP authority: accepts observers, fans broadcasts out to them, and queues
//! their forwarded requests for the game thread.
//!
//! The game thread never touches a socket. It holds a [`ServerHandle`], which
//! implements [`Transport`] by pushing encoded frames onto per-connection
//! writer queues, and drains inbound requests with
//! [`ServerHandle::drain`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use netrep_config::Config;
use netrep_relay::{RelayMessage, StateChangeRequest, Transport, TransportError};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::bandwidth::NetworkCounters;
use crate::codec::{self, CodecConfig};
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};

/// Identifier of one observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub frame: FrameConfig,
    pub codec: CodecConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7777)),
            max_connections: 64,
            frame: FrameConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Builds server settings from the loaded configuration.
    pub fn from_config(
        config: &Config,
        codec: CodecConfig,
    ) -> Result<Self, std::net::AddrParseError> {
        let bind_addr = format!(
            "{}:{}",
            config.network.server_address, config.network.server_port
        )
        .parse()?;
        Ok(Self {
            bind_addr,
            max_connections: config.network.max_connections as usize,
            frame: FrameConfig::from_config(&config.network),
            codec,
        })
    }
}

struct Shared {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Vec<u8>>>,
    next_id: AtomicU64,
    counters: NetworkCounters,
    codec: CodecConfig,
}

/// The accept loop and connection tasks.
pub struct RelayServer {
    config: ServerConfig,
    shared: Arc<Shared>,
    inbound_tx: Sender<RelayMessage>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Game-thread side of a [`RelayServer`]. Always the authority.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
    inbound_rx: Receiver<RelayMessage>,
}

impl RelayServer {
    /// Creates a server and the handle the game thread uses to drive it.
    pub fn new(config: ServerConfig) -> (Self, ServerHandle) {
        let shared = Arc::new(Shared {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            counters: NetworkCounters::new(),
            codec: config.codec.clone(),
        });
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = ServerHandle {
            shared: Arc::clone(&shared),
            inbound_rx,
        };
        let server = Self {
            config,
            shared,
            inbound_tx,
            shutdown_tx,
            shutdown_rx,
        };
        (server, handle)
    }

    /// Binds the configured address and runs until [`Self::shutdown`].
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Relay server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Runs the accept loop on an already-bound listener.
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut failures = AcceptFailures::default();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => {
                            failures.succeeded();
                            pair
                        }
                        Err(e) => match failures.failed(&e) {
                            AcceptAction::Retry => {
                                tracing::warn!("Accept failed, skipping connection: {e}");
                                continue;
                            }
                            AcceptAction::Backoff(delay) => {
                                tracing::warn!("Accept failed, retrying in {delay:?}: {e}");
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                            AcceptAction::Fail => {
                                tracing::error!("Listener failed, stopping relay server: {e}");
                                return Err(e);
                            }
                        },
                    };
                    if self.shared.connections.len() >= self.config.max_connections {
                        tracing::warn!("Connection limit reached, rejecting {peer}");
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::warn!("Dropping {peer} before setup: {e}");
                        continue;
                    }

                    let id = ConnectionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
                    let (reader, writer) = stream.into_split();
                    let (out_tx, out_rx) = mpsc::unbounded_channel();
                    self.shared.connections.insert(id, out_tx);
                    tracing::info!("Observer {id:?} connected from {peer}");

                    tokio::spawn(write_loop(
                        id,
                        writer,
                        out_rx,
                        self.config.frame,
                        self.shutdown_rx.clone(),
                    ));

                    let shared = Arc::clone(&self.shared);
                    let inbound = self.inbound_tx.clone();
                    let frame = self.config.frame;
                    let task_shutdown = self.shutdown_rx.clone();
                    tokio::spawn(async move {
                        read_loop(id, reader, &shared, &inbound, frame, task_shutdown).await;
                        shared.connections.remove(&id);
                        tracing::info!("Observer {id:?} disconnected");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay server shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.len()
    }
}

/// Consecutive listener-level failures tolerated before the accept loop gives up.
const MAX_ACCEPT_FAILURES: u32 = 20;

/// Pause after a listener-level failure such as running out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptAction {
    /// The error concerned one pending connection.
    Retry,
    /// The listener is short of resources; wait before accepting again.
    Backoff(Duration),
    /// The listener keeps failing.
    Fail,
}

/// Classifies `accept` errors so one bad peer never stops the server.
#[derive(Debug, Default)]
struct AcceptFailures {
    consecutive: u32,
}

impl AcceptFailures {
    fn succeeded(&mut self) {
        self.consecutive = 0;
    }

    fn failed(&mut self, error: &io::Error) -> AcceptAction {
        if matches!(
            error.kind(),
            io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
        ) {
            return AcceptAction::Retry;
        }
        self.consecutive += 1;
        if self.consecutive >= MAX_ACCEPT_FAILURES {
            AcceptAction::Fail
        } else {
            AcceptAction::Backoff(ACCEPT_BACKOFF)
        }
    }
}

async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    frame: FrameConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(bytes) = next else { break };
                if let Err(e) = write_frame(&mut writer, &bytes, &frame).await {
                    tracing::warn!("Write to {id:?} failed: {e}");
                    break;
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    shared: &Shared,
    inbound: &Sender<RelayMessage>,
    frame: FrameConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = read_frame(&mut reader, &frame) => {
                let bytes = match result {
                    Ok(bytes) => bytes,
                    Err(FrameError::Closed) => break,
                    Err(e) => {
                        tracing::warn!("Read from {id:?} failed: {e}");
                        break;
                    }
                };
                match codec::decode(&bytes) {
                    Ok(RelayMessage::Forward(request)) => {
                        shared.counters.record_receive(bytes.len(), bytes.len());
                        if inbound.send(RelayMessage::Forward(request)).is_err() {
                            break;
                        }
                    }
                    Ok(RelayMessage::Broadcast(request)) => {
                        tracing::warn!(
                            "Observer {id:?} sent a broadcast for {}; dropped",
                            request.source()
                        );
                    }
                    Err(e) => tracing::warn!("Undecodable frame from {id:?}: {e}"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

impl ServerHandle {
    /// Forwarded requests received so far, in arrival order per connection.
    pub fn drain(&self) -> Vec<RelayMessage> {
        self.inbound_rx.try_iter().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.len()
    }

    pub fn counters(&self) -> &NetworkCounters {
        &self.shared.counters
    }
}

impl Transport for ServerHandle {
    fn send_to_authority(&self, _request: &StateChangeRequest) -> Result<(), TransportError> {
        Err(TransportError::WrongRole)
    }

    fn broadcast(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        let encoded = codec::encode(&RelayMessage::Broadcast(request.clone()), &self.shared.codec)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        for conn in self.shared.connections.iter() {
            if conn.value().send(encoded.bytes.clone()).is_ok() {
                self.shared
                    .counters
                    .record_send(encoded.bytes.len(), encoded.raw_len);
            }
        }
        Ok(())
    }

    fn is_local_process_authority(&self) -> bool {
        true
    }
}
