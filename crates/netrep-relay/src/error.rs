//! Rejection reasons returned by the relay dispatcher.

use crate::transport::TransportError;

/// Why a [`submit`](crate::RelayDispatcher::submit) was not accepted.
///
/// Rejections are recovered locally: the dispatcher logs them and returns
/// them to the caller, and no counters or network traffic result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    /// A required field of the request was null or empty.
    #[error("{change}: {field} is missing")]
    InvalidPayload {
        /// Variant label of the rejected change.
        change: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The transport refused the message. The relay does not retry.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}
