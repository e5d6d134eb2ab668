//! In-process transport: one authority and any number of observers.
//!
//! Every message goes through the wire codec so the traffic counters report
//! real encoded sizes. Delivery is immediate and lossless; nothing is
//! delivered until the receiving side calls [`LoopbackEndpoint::drain`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use netrep_relay::{NetRole, RelayMessage, StateChangeRequest, Transport, TransportError};

use crate::bandwidth::NetworkCounters;
use crate::codec::{self, CodecConfig};

/// Identifies an endpoint on a hub. The authority is always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl EndpointId {
    pub const AUTHORITY: Self = Self(0);
}

struct Hub {
    codec: CodecConfig,
    counters: NetworkCounters,
    authority_tx: Sender<Vec<u8>>,
    observers: DashMap<EndpointId, Sender<Vec<u8>>>,
    next_id: AtomicU64,
}

impl Hub {
    fn encode(&self, message: &RelayMessage) -> Result<codec::Encoded, TransportError> {
        codec::encode(message, &self.codec).map_err(|e| TransportError::Encode(e.to_string()))
    }
}

/// Factory for loopback endpoints sharing one set of queues.
#[derive(Clone)]
pub struct LoopbackHub {
    hub: Arc<Hub>,
    authority_rx: Receiver<Vec<u8>>,
}

impl LoopbackHub {
    pub fn new(codec: CodecConfig) -> Self {
        let (authority_tx, authority_rx) = crossbeam_channel::unbounded();
        Self {
            hub: Arc::new(Hub {
                codec,
                counters: NetworkCounters::new(),
                authority_tx,
                observers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
            authority_rx,
        }
    }

    /// The authority endpoint. Every call returns a handle on the same inbox.
    pub fn authority(&self) -> LoopbackEndpoint {
        LoopbackEndpoint {
            id: EndpointId::AUTHORITY,
            role: NetRole::Authority,
            hub: Arc::clone(&self.hub),
            inbox: self.authority_rx.clone(),
        }
    }

    /// Joins a new observer. It receives broadcasts sent after this call.
    pub fn add_observer(&self) -> LoopbackEndpoint {
        let id = EndpointId(self.hub.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::unbounded();
        self.hub.observers.insert(id, tx);
        tracing::debug!("Loopback observer {id:?} joined");
        LoopbackEndpoint {
            id,
            role: NetRole::Observer,
            hub: Arc::clone(&self.hub),
            inbox: rx,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.hub.observers.len()
    }

    /// Traffic counters for every endpoint on this hub.
    pub fn counters(&self) -> &NetworkCounters {
        &self.hub.counters
    }
}

/// One side of a loopback session.
pub struct LoopbackEndpoint {
    id: EndpointId,
    role: NetRole,
    hub: Arc<Hub>,
    inbox: Receiver<Vec<u8>>,
}

impl LoopbackEndpoint {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    /// Decodes everything queued for this endpoint. Undecodable messages are
    /// logged and skipped.
    pub fn drain(&self) -> Vec<RelayMessage> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.inbox.try_recv() {
            match codec::decode(&bytes) {
                Ok(message) => {
                    self.hub.counters.record_receive(bytes.len(), bytes.len());
                    out.push(message);
                }
                Err(e) => tracing::warn!("Loopback {:?} dropped undecodable message: {e}", self.id),
            }
        }
        out
    }

    /// Number of messages waiting in this endpoint's inbox.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Drop for LoopbackEndpoint {
    fn drop(&mut self) {
        if self.role == NetRole::Observer {
            self.hub.observers.remove(&self.id);
            tracing::debug!("Loopback observer {:?} left", self.id);
        }
    }
}

impl Transport for LoopbackEndpoint {
    fn send_to_authority(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        if self.role != NetRole::Observer {
            return Err(TransportError::WrongRole);
        }
        let encoded = self.hub.encode(&RelayMessage::Forward(request.clone()))?;
        let wire = encoded.bytes.len();
        self.hub
            .authority_tx
            .send(encoded.bytes)
            .map_err(|_| TransportError::Disconnected)?;
        self.hub.counters.record_send(wire, encoded.raw_len);
        Ok(())
    }

    fn broadcast(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        if self.role != NetRole::Authority {
            return Err(TransportError::WrongRole);
        }
        let encoded = self.hub.encode(&RelayMessage::Broadcast(request.clone()))?;
        for observer in self.hub.observers.iter() {
            if observer.value().send(encoded.bytes.clone()).is_ok() {
                self.hub
                    .counters
                    .record_send(encoded.bytes.len(), encoded.raw_len);
            }
        }
        Ok(())
    }

    fn is_local_process_authority(&self) -> bool {
        self.role == NetRole::Authority
    }
}
