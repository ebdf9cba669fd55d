//! Liveness and throughput counters for the bridge's two I/O edges.
//!
//! Two independent surfaces:
//! - **ReceiverDiagnostics:** atomics bumped by the UDP thread, plus a small
//!   ring of recent message addresses for operator visibility.
//! - **DispatchStats:** atomics bumped by the caller, timer and worker of the
//!   outbound dispatcher.
//!
//! Both hand out plain `Copy`/`Clone` snapshots so readers never hold a lock
//! across formatting or logging.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Recent-address ring size. Kept small; it is a debugging aid, not a log.
pub const MAX_RECENT_ADDRESSES: usize = 10;

/// Sentinel for "no packet yet" in `last_packet_ns`.
const NEVER: u64 = u64::MAX;

/// Appends to a bounded ring; drops the oldest entry at capacity.
#[inline]
pub fn push_capped<T>(buf: &mut VecDeque<T>, val: T, cap: usize) {
    if buf.len() >= cap {
        buf.pop_front();
    }
    buf.push_back(val);
}

// ============================================================================
// Receiver
// ============================================================================

pub struct ReceiverDiagnostics {
    run_start: Instant,
    running: AtomicBool,
    last_packet_ns: AtomicU64,
    total_packets: AtomicU64,
    vmc_messages: AtomicU64,
    non_vmc_messages: AtomicU64,
    unknown_addresses: AtomicU64,
    decode_failures: AtomicU64,
    rejected_bones: AtomicU64,
    bone_count: AtomicUsize,
    recent: Mutex<VecDeque<String>>,
}

/// Point-in-time copy of [`ReceiverDiagnostics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverStatus {
    pub running: bool,
    /// `None` until the first datagram.
    pub since_last_packet: Option<Duration>,
    pub total_packets: u64,
    /// Messages inside the `/VMC/Ext/` namespace.
    pub vmc_messages: u64,
    pub non_vmc_messages: u64,
    /// Addresses outside the consumed set (VMC or not).
    pub unknown_addresses: u64,
    /// Messages or bundle elements that failed to decode.
    pub decode_failures: u64,
    pub rejected_bones: u64,
    pub bone_count: usize,
    /// Oldest first.
    pub recent_addresses: Vec<String>,
}

impl ReceiverStatus {
    pub fn millis_since_last_packet(&self) -> Option<u128> {
        self.since_last_packet.map(|d| d.as_millis())
    }
}

impl Default for ReceiverDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverDiagnostics {
    pub fn new() -> Self {
        Self {
            run_start: Instant::now(),
            running: AtomicBool::new(false),
            last_packet_ns: AtomicU64::new(NEVER),
            total_packets: AtomicU64::new(0),
            vmc_messages: AtomicU64::new(0),
            non_vmc_messages: AtomicU64::new(0),
            unknown_addresses: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            rejected_bones: AtomicU64::new(0),
            bone_count: AtomicUsize::new(0),
            recent: Mutex::new(VecDeque::with_capacity(MAX_RECENT_ADDRESSES)),
        }
    }

    /// Nanoseconds since these diagnostics were created.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn record_packet(&self) {
        self.last_packet_ns.store(self.now_ns(), Ordering::Relaxed);
        self.total_packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_message(&self, address: &str, is_vmc: bool) {
        if is_vmc {
            self.vmc_messages.fetch_add(1, Ordering::Relaxed);
        } else {
            self.non_vmc_messages.fetch_add(1, Ordering::Relaxed);
        }
        push_capped(&mut self.recent.lock(), address.to_owned(), MAX_RECENT_ADDRESSES);
    }

    #[inline]
    pub(crate) fn record_unknown_address(&self) {
        self.unknown_addresses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_decode_failures(&self, count: usize) {
        self.decode_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejected_bone(&self) {
        self.rejected_bones.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_bone_count(&self, n: usize) {
        self.bone_count.store(n, Ordering::Relaxed);
    }

    pub(crate) fn clear_recent(&self) {
        self.recent.lock().clear();
        self.bone_count.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverStatus {
        let last = self.last_packet_ns.load(Ordering::Relaxed);
        let since_last_packet = (last != NEVER)
            .then(|| Duration::from_nanos(self.now_ns().saturating_sub(last)));
        ReceiverStatus {
            running: self.is_running(),
            since_last_packet,
            total_packets: self.total_packets.load(Ordering::Relaxed),
            vmc_messages: self.vmc_messages.load(Ordering::Relaxed),
            non_vmc_messages: self.non_vmc_messages.load(Ordering::Relaxed),
            unknown_addresses: self.unknown_addresses.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            rejected_bones: self.rejected_bones.load(Ordering::Relaxed),
            bone_count: self.bone_count.load(Ordering::Relaxed),
            recent_addresses: self.recent.lock().iter().cloned().collect(),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Default)]
pub struct DispatchStats {
    pub(crate) queued: AtomicU64,
    pub(crate) sent: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) delta_skipped: AtomicU64,
    pub(crate) range_clamped: AtomicU64,
    pub(crate) queue_full: AtomicU64,
    pub(crate) suppressed: AtomicU64,
    pub(crate) stale_dropped: AtomicU64,
    pub(crate) consecutive_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`] plus the current queue depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    pub delta_skipped: u64,
    pub range_clamped: u64,
    pub queue_full: u64,
    /// Dequeued while disconnected and dropped.
    pub suppressed: u64,
    /// Dequeued after a destination change and dropped.
    pub stale_dropped: u64,
    pub queue_len: usize,
    pub consecutive_failures: u64,
}

impl DispatchStats {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self, queue_len: usize) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delta_skipped: self.delta_skipped.load(Ordering::Relaxed),
            range_clamped: self.range_clamped.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            queue_len,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}
