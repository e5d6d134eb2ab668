//! Byte and message counters shared between network tasks and the game thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters bumped by every transport in this crate.
#[derive(Debug, Default)]
pub struct NetworkCounters {
    wire_sent: AtomicU64,
    wire_received: AtomicU64,
    raw_sent: AtomicU64,
    raw_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl NetworkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// One message left: `wire` bytes on the wire, `raw` before compression.
    pub fn record_send(&self, wire: usize, raw: usize) {
        self.wire_sent.fetch_add(wire as u64, Ordering::Relaxed);
        self.raw_sent.fetch_add(raw as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// One message arrived.
    pub fn record_receive(&self, wire: usize, raw: usize) {
        self.wire_received.fetch_add(wire as u64, Ordering::Relaxed);
        self.raw_received.fetch_add(raw as u64, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads and zeroes every counter, ending one measurement period.
    pub fn snapshot_and_reset(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            wire_sent: self.wire_sent.swap(0, Ordering::Relaxed),
            wire_received: self.wire_received.swap(0, Ordering::Relaxed),
            raw_sent: self.raw_sent.swap(0, Ordering::Relaxed),
            raw_received: self.raw_received.swap(0, Ordering::Relaxed),
            messages_sent: self.messages_sent.swap(0, Ordering::Relaxed),
            messages_received: self.messages_received.swap(0, Ordering::Relaxed),
        }
    }
}

/// Traffic over one measurement period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSnapshot {
    pub wire_sent: u64,
    pub wire_received: u64,
    pub raw_sent: u64,
    pub raw_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl TrafficSnapshot {
    /// Wire kilobytes in both directions.
    pub fn total_kb(&self) -> f32 {
        (self.wire_sent + self.wire_received) as f32 / 1024.0
    }

    /// Wire kilobytes per second over a period of `elapsed_secs`.
    pub fn kb_per_sec(&self, elapsed_secs: f32) -> f32 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.total_kb() / elapsed_secs
    }

    /// Wire bytes over raw bytes sent; 1.0 when nothing was sent.
    pub fn send_compression_ratio(&self) -> f32 {
        if self.raw_sent == 0 {
            return 1.0;
        }
        self.wire_sent as f32 / self.raw_sent as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_resets() {
        let c = NetworkCounters::new();
        c.record_send(100, 400);
        c.record_send(24, 24);
        c.record_receive(512, 512);

        let snap = c.snapshot_and_reset();
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.wire_sent, 124);
        assert_eq!(snap.raw_sent, 424);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(c.snapshot_and_reset(), TrafficSnapshot::default());
    }

    #[test]
    fn test_kb_helpers() {
        let snap = TrafficSnapshot {
            wire_sent: 1024,
            wire_received: 1024,
            raw_sent: 2048,
            ..Default::default()
        };
        assert_eq!(snap.total_kb(), 2.0);
        assert_eq!(snap.kb_per_sec(0.5), 4.0);
        assert_eq!(snap.kb_per_sec(0.0), 0.0);
        assert_eq!(snap.send_compression_ratio(), 0.5);
        assert_eq!(TrafficSnapshot::default().send_compression_ratio(), 1.0);
    }
}
