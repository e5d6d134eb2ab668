//! TCP observer: forwards local requests to the authority and queues the
//! authority's broadcasts for the game thread.

use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use netrep_relay::{RelayMessage, StateChangeRequest, Transport, TransportError};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::bandwidth::NetworkCounters;
use crate::codec::{self, CodecConfig};
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Client settings.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub frame: FrameConfig,
    pub codec: CodecConfig,
}

/// Connected observer. Dropping it closes the connection.
pub struct RelayClient {
    codec: CodecConfig,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Receiver<RelayMessage>,
    counters: Arc<NetworkCounters>,
    state: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayClient {
    /// Connects to the authority at `addr` and spawns the I/O tasks.
    pub async fn connect(addr: SocketAddr, config: ClientConfig) -> std::io::Result<Self> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let _ = state_tx.send(ConnectionState::Connected);
        tracing::info!("Connected to authority at {addr}");

        let (reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(NetworkCounters::new());

        tokio::spawn(write_loop(writer, out_rx, config.frame, shutdown_rx.clone()));

        let read_counters = Arc::clone(&counters);
        tokio::spawn(async move {
            read_loop(reader, &in_tx, &read_counters, config.frame, shutdown_rx).await;
            let _ = state_tx.send(ConnectionState::Disconnected);
            tracing::info!("Disconnected from authority");
        });

        Ok(Self {
            codec: config.codec,
            outbound: out_tx,
            inbound: in_rx,
            counters,
            state: state_rx,
            shutdown_tx,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Broadcasts received so far.
    pub fn drain(&self) -> Vec<RelayMessage> {
        self.inbound.try_iter().collect()
    }

    pub fn counters(&self) -> &NetworkCounters {
        &self.counters
    }

    /// Closes the connection. Pending outbound frames may be lost.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn write_loop(
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
                    tracing::warn!("Write to authority failed: {e}");
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
    mut reader: OwnedReadHalf,
    inbound: &Sender<RelayMessage>,
    counters: &NetworkCounters,
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
                        tracing::warn!("Read from authority failed: {e}");
                        break;
                    }
                };
                match codec::decode(&bytes) {
                    Ok(message) => {
                        counters.record_receive(bytes.len(), bytes.len());
                        if inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Undecodable frame from authority: {e}"),
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

impl Transport for RelayClient {
    fn send_to_authority(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Disconnected {
            return Err(TransportError::Disconnected);
        }
        let encoded = codec::encode(&RelayMessage::Forward(request.clone()), &self.codec)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        let wire = encoded.bytes.len();
        self.outbound
            .send(encoded.bytes)
            .map_err(|_| TransportError::Disconnected)?;
        self.counters.record_send(wire, encoded.raw_len);
        Ok(())
    }

    fn broadcast(&self, _request: &StateChangeRequest) -> Result<(), TransportError> {
        Err(TransportError::WrongRole)
    }

    fn is_local_process_authority(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netrep_relay::{CustomEvent, EntityHandle, StateChange};
    use tokio::net::TcpListener;

    use super::*;

    fn request() -> StateChangeRequest {
        StateChangeRequest::new(
            EntityHandle(5),
            StateChange::CustomEvent(CustomEvent::new("Jump", "height=2.0")),
            0.5,
        )
    }

    #[tokio::test]
    async fn test_forward_is_framed_to_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = RelayClient::connect(addr, ClientConfig::default())
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        client.send_to_authority(&request()).unwrap();
        let bytes = read_frame(&mut peer, &FrameConfig::default())
            .await
            .unwrap();
        assert_eq!(
            codec::decode(&bytes).unwrap(),
            RelayMessage::Forward(request())
        );
        assert_eq!(client.counters().snapshot_and_reset().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_broadcast_from_server_is_queued() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = RelayClient::connect(addr, ClientConfig::default())
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        let msg = RelayMessage::Broadcast(request());
        let enc = codec::encode(&msg, &CodecConfig::default()).unwrap();
        write_frame(&mut peer, &enc.bytes, &FrameConfig::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.drain(), vec![msg]);
    }

    #[tokio::test]
    async fn test_server_close_marks_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = RelayClient::connect(addr, ClientConfig::default())
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);

        drop(peer);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(
            client.send_to_authority(&request()),
            Err(TransportError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_client_is_never_authority() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = RelayClient::connect(listener.local_addr().unwrap(), ClientConfig::default())
            .await
            .unwrap();
        assert!(!client.is_local_process_authority());
        assert_eq!(
            client.broadcast(&request()),
            Err(TransportError::WrongRole)
        );
    }
}
