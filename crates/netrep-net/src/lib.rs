//! Transports for the replication relay: wire codec, framing, an in-process
//! loopback hub, and a TCP authority server with observer clients.

pub mod bandwidth;
pub mod client;
pub mod codec;
pub mod framing;
pub mod loopback;
pub mod server;

pub use bandwidth::{NetworkCounters, TrafficSnapshot};
pub use client::{ClientConfig, ConnectionState, RelayClient};
pub use codec::{CodecConfig, CodecError, PROTOCOL_VERSION, decode, encode};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use loopback::{EndpointId, LoopbackEndpoint, LoopbackHub};
pub use server::{ConnectionId, RelayServer, ServerConfig, ServerHandle};
