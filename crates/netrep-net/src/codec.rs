//! Wire encoding for [`RelayMessage`]s.
//!
//! ```text
//! +-----------+---------------------------------------------+
//! | flag (u8) | body                                        |
//! +-----------+---------------------------------------------+
//!               flag 0x00: [version u8][postcard message]
//!               flag 0x01: lz4( [version u8][postcard message] ),
//!                          uncompressed size prepended
//! ```
//!
//! Small bodies are sent raw; compression only kicks in once the versioned
//! body reaches [`CodecConfig::threshold`] bytes.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use netrep_config::NetworkConfig;
use netrep_relay::{RelayMessage, ReplicationSettings};

/// Version byte carried inside every body.
pub const PROTOCOL_VERSION: u8 = 1;

/// Body follows uncompressed.
pub const FLAG_RAW: u8 = 0x00;
/// Body is LZ4 with the uncompressed size prepended.
pub const FLAG_LZ4: u8 = 0x01;

/// Encoder settings. Decoding needs no configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    pub compress: bool,
    /// Minimum versioned body size, in bytes, before LZ4 is tried.
    pub threshold: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compress: true,
            threshold: 256,
        }
    }
}

impl CodecConfig {
    /// Compression switch from the relay settings, threshold from config.
    pub fn from_settings(settings: &ReplicationSettings, network: &NetworkConfig) -> Self {
        Self {
            compress: settings.enable_compression,
            threshold: network.compression_threshold as usize,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("empty payload")]
    Empty,

    #[error("unknown compression flag 0x{0:02X}")]
    UnknownFlag(u8),

    #[error("lz4 decompression failed: {0}")]
    Decompress(String),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("postcard: {0}")]
    Postcard(#[from] postcard::Error),
}

/// An encoded message plus its size before compression.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub raw_len: usize,
}

/// Encodes `message` for the wire.
pub fn encode(message: &RelayMessage, config: &CodecConfig) -> Result<Encoded, CodecError> {
    let mut body = Vec::with_capacity(64);
    body.push(PROTOCOL_VERSION);
    body.extend_from_slice(&postcard::to_allocvec(message)?);
    let raw_len = body.len();

    let bytes = if config.compress && raw_len >= config.threshold {
        let packed = compress_prepend_size(&body);
        let mut out = Vec::with_capacity(1 + packed.len());
        out.push(FLAG_LZ4);
        out.extend_from_slice(&packed);
        out
    } else {
        let mut out = Vec::with_capacity(1 + raw_len);
        out.push(FLAG_RAW);
        out.extend_from_slice(&body);
        out
    };
    Ok(Encoded { bytes, raw_len })
}

/// Decodes bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<RelayMessage, CodecError> {
    let (&flag, rest) = bytes.split_first().ok_or(CodecError::Empty)?;
    let unpacked;
    let body = match flag {
        FLAG_RAW => rest,
        FLAG_LZ4 => {
            unpacked = decompress_size_prepended(rest)
                .map_err(|e| CodecError::Decompress(e.to_string()))?;
            &unpacked[..]
        }
        other => return Err(CodecError::UnknownFlag(other)),
    };

    let (&version, message) = body.split_first().ok_or(CodecError::Empty)?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(message)?)
}
