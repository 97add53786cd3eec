//! Engine counters.
//!
//! Lock-free, so the ingest, polling and hunting tasks update them without
//! touching the host table lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for one engine instance.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// ARP frames handed over by the transport.
    pub frames_received: Counter,
    /// Frames discarded before reaching the state machine.
    pub frames_ignored: Counter,
    /// Receive errors, transient or not.
    pub rx_errors: Counter,
    /// Failed sends.
    pub tx_errors: Counter,
    /// Unicast polling requests sent.
    pub probes_sent: Counter,
    /// Replies sent on behalf of virtual hosts.
    pub virtual_replies_sent: Counter,
    /// Gratuitous frames sent while hunting.
    pub spoof_frames_sent: Counter,
    /// Snapshots handed to the notification sink.
    pub notifications_sent: Counter,
    /// Snapshots discarded because the queue was full.
    pub notifications_dropped: Counter,
    /// Current number of host table entries.
    table_size: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_table_size(&self, size: usize) {
        self.table_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn table_size(&self) -> u64 {
        self.table_size.load(Ordering::Relaxed)
    }

    /// Exports all metrics as `(name, value)` pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        vec![
            ("frames_received".into(), self.frames_received.get()),
            ("frames_ignored".into(), self.frames_ignored.get()),
            ("rx_errors".into(), self.rx_errors.get()),
            ("tx_errors".into(), self.tx_errors.get()),
            ("probes_sent".into(), self.probes_sent.get()),
            ("virtual_replies_sent".into(), self.virtual_replies_sent.get()),
            ("spoof_frames_sent".into(), self.spoof_frames_sent.get()),
            ("notifications_sent".into(), self.notifications_sent.get()),
            ("notifications_dropped".into(), self.notifications_dropped.get()),
            ("table_size".into(), self.table_size()),
        ]
    }
}
