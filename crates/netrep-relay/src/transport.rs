//! The transport seam between the relay and the network.
//!
//! The relay never frames, retries, or orders messages itself. A
//! [`Transport`] implementation delivers requests reliably; the relay only
//! decides *where* a request goes. Inbound traffic is handed back to the
//! dispatcher as [`RelayMessage`] values.

use serde::{Deserialize, Serialize};

use crate::request::StateChangeRequest;

/// A message travelling between relay instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayMessage {
    /// Non-authority asking the authority to replicate a change.
    Forward(StateChangeRequest),
    /// Authority instructing every observer to apply a change.
    Broadcast(StateChangeRequest),
}

/// Failure reported by a transport. Opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The operation is not valid for this endpoint's role (e.g. an
    /// observer trying to broadcast).
    #[error("operation not permitted for the local role")]
    WrongRole,

    /// The peer or hub is gone.
    #[error("transport disconnected")]
    Disconnected,

    /// The message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Reliable delivery used by the relay dispatcher.
///
/// Both send operations are fire-and-forget: they return once the message is
/// handed off and never wait for a round trip.
pub trait Transport {
    /// Sends a request to the authority (unicast).
    fn send_to_authority(&self, request: &StateChangeRequest) -> Result<(), TransportError>;

    /// Delivers a request to every current observer.
    fn broadcast(&self, request: &StateChangeRequest) -> Result<(), TransportError>;

    /// Whether this process is the authority.
    fn is_local_process_authority(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send_to_authority(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        (**self).send_to_authority(request)
    }

    fn broadcast(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        (**self).broadcast(request)
    }

    fn is_local_process_authority(&self) -> bool {
        (**self).is_local_process_authority()
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send_to_authority(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        (**self).send_to_authority(request)
    }

    fn broadcast(&self, request: &StateChangeRequest) -> Result<(), TransportError> {
        (**self).broadcast(request)
    }

    fn is_local_process_authority(&self) -> bool {
        (**self).is_local_process_authority()
    }
}
