//! Length-prefixed frames on a byte stream.
//!
//! Each frame is a `u32` little-endian payload length followed by the
//! payload. The prefix does not count itself. Empty frames are legal.

use netrep_config::NetworkConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Frame size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest accepted payload in bytes. Default: 1 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1 << 20,
        }
    }
}

impl FrameConfig {
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            max_payload_size: network.max_payload_size,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: u32 },

    /// The peer closed the stream, possibly mid-frame.
    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn eof_as_closed(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::Closed
    } else {
        FrameError::Io(e)
    }
}

/// Reads one frame and returns its payload.
pub async fn read_frame<R>(reader: &mut R, config: &FrameConfig) -> Result<Vec<u8>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await.map_err(eof_as_closed)?;

    let len = u32::from_le_bytes(prefix);
    if len > config.max_payload_size {
        return Err(FrameError::TooLarge {
            size: len as usize,
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    Ok(payload)
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError>
where
    W: AsyncWriteExt + Unpin,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= config.max_payload_size)
        .ok_or(FrameError::TooLarge {
            size: payload.len(),
            max: config.max_payload_size,
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn test_frames_stay_separate() {
        let (mut a, mut b) = duplex(1024);
        let config = FrameConfig::default();
        for payload in [&b"forward"[..], b"", b"broadcast"] {
            write_frame(&mut a, payload, &config).await.unwrap();
        }
        assert_eq!(read_frame(&mut b, &config).await.unwrap(), b"forward");
        assert!(read_frame(&mut b, &config).await.unwrap().is_empty());
        assert_eq!(read_frame(&mut b, &config).await.unwrap(), b"broadcast");
    }

    #[tokio::test]
    async fn test_prefix_is_le_u32() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, b"abc", &FrameConfig::default())
            .await
            .unwrap();
        let mut raw = [0u8; 7];
        b.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_small_pipe_reassembles() {
        let (mut a, mut b) = duplex(4);
        let config = FrameConfig::default();
        let payload = vec![0xAB; 300];
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &payload, &config).await.unwrap();
        });
        assert_eq!(read_frame(&mut b, &config).await.unwrap(), expected);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_limit_enforced_both_ways() {
        let (mut a, mut b) = duplex(1024);
        let tight = FrameConfig {
            max_payload_size: 8,
        };
        assert!(matches!(
            write_frame(&mut a, &[0u8; 9], &tight).await,
            Err(FrameError::TooLarge { size: 9, max: 8 })
        ));

        a.write_all(&100u32.to_le_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, &tight).await,
            Err(FrameError::TooLarge { size: 100, .. })
        ));
    }

    #[tokio::test]
    async fn test_close_mid_frame_reports_closed() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(b"half").await.unwrap();
        drop(a);
        assert!(matches!(
            read_frame(&mut b, &FrameConfig::default()).await,
            Err(FrameError::Closed)
        ));
    }

    #[test]
    fn test_limit_from_config() {
        let network = NetworkConfig {
            max_payload_size: 4096,
            ..Default::default()
        };
        assert_eq!(FrameConfig::from_config(&network).max_payload_size, 4096);
    }
}
