//! Per-session state shared between the facade and the producer thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Statistics about a capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Buffers delivered to the sink so far.
    pub buffers_delivered: u64,
    /// Total payload bytes delivered to the sink so far.
    pub bytes_delivered: u64,
}

/// State shared between the engine facade and one producer.
///
/// The producer reads `running` between packets and exits its loop once
/// the flag clears; the facade clears it in `stop` before joining. The
/// counters are advisory and only ever written by the producer.
#[derive(Debug)]
pub struct SessionState {
    running: AtomicBool,
    buffers_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
}

impl SessionState {
    /// Creates state for a session that is about to start.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            buffers_delivered: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
        }
    }

    /// Whether the session is still supposed to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clears the running flag. Returns `false` if it was already clear.
    pub fn shut_down(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    /// Records one delivered buffer of `bytes` payload bytes.
    pub fn record_delivery(&self, bytes: usize) {
        self.buffers_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            buffers_delivered: self.buffers_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
