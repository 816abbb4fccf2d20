use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Internal telemetry tracking the client's forwarding activity.
///
/// Counters are updated by whichever side owns the transport -- the forwarder
/// thread in buffered mode, the calling thread in direct mode -- and read
/// through [`ClientStats`] snapshots. Updates never block and are never
/// reported back to metric submitters.
#[derive(Default)]
pub(crate) struct Telemetry {
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_dropped: AtomicU64,
    timed_flushes: AtomicU64,
    eager_flushes: AtomicU64,
}

impl Telemetry {
    pub fn track_packet_send_succeeded(&self, len: usize) {
        self.packets_sent.fetch_add(1, Relaxed);
        self.bytes_sent.fetch_add(len as u64, Relaxed);
    }

    pub fn track_packet_send_failed(&self, len: usize) {
        self.packets_dropped.fetch_add(1, Relaxed);
        self.bytes_dropped.fetch_add(len as u64, Relaxed);
    }

    pub fn track_timed_flush(&self) {
        self.timed_flushes.fetch_add(1, Relaxed);
    }

    pub fn track_eager_flush(&self) {
        self.eager_flushes.fetch_add(1, Relaxed);
    }

    pub fn snapshot(&self) -> ClientStats {
        ClientStats {
            packets_sent: self.packets_sent.load(Relaxed),
            packets_dropped: self.packets_dropped.load(Relaxed),
            bytes_sent: self.bytes_sent.load(Relaxed),
            bytes_dropped: self.bytes_dropped.load(Relaxed),
            timed_flushes: self.timed_flushes.load(Relaxed),
            eager_flushes: self.eager_flushes.load(Relaxed),
        }
    }
}

/// A point-in-time snapshot of the client's internal telemetry.
///
/// In buffered mode this is the only visibility into transport failures: the
/// forwarder absorbs send errors rather than propagating them, so callers who
/// care about loss should watch `packets_dropped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Number of packets (batches, or individual payloads in direct mode)
    /// successfully written to the transport.
    pub packets_sent: u64,

    /// Number of packets discarded because the transport write failed.
    pub packets_dropped: u64,

    /// Total payload bytes successfully written.
    pub bytes_sent: u64,

    /// Total payload bytes discarded due to failed writes.
    pub bytes_dropped: u64,

    /// Flushes triggered by the flush interval elapsing.
    pub timed_flushes: u64,

    /// Flushes triggered by an append that would have exceeded the maximum
    /// packet length.
    pub eager_flushes: u64,
}
