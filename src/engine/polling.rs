//! Polling probe loop
//!
//! Probes every tracked host on a fixed interval so that silent hosts are
//! noticed. Replies flow back through the ingest loop like any other reply.

use super::handler::Inner;
use super::host_table::{Entry, EntryState, HostTable};
use crate::capture::Transport;
use crate::config::EngineConfig;
use crate::protocol::{ArpFrame, ArpOp, ArpPacket};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work produced by one polling cycle
#[derive(Debug, Default)]
pub(crate) struct PollCycle {
    pub(crate) probes: Vec<ArpFrame>,
    /// Entries that just went offline
    pub(crate) offline: Vec<Entry>,
}

/// Unicast "who has" addressed straight at the host
pub(crate) fn probe_for(config: &EngineConfig, entry: &Entry) -> ArpFrame {
    ArpFrame::new(
        entry.mac,
        ArpPacket {
            operation: ArpOp::Request,
            sender_mac: config.host_mac,
            sender_ip: config.host_ip,
            target_mac: entry.mac,
            target_ip: entry.ip,
        },
    )
}

/// Age the table and build the probes for this cycle
pub(crate) fn poll_cycle(
    config: &EngineConfig,
    table: &mut HostTable,
    stale_after: chrono::Duration,
    now: DateTime<Utc>,
) -> PollCycle {
    let mut cycle = PollCycle::default();
    let macs: Vec<_> = table.iter().map(|e| e.mac).collect();

    for mac in macs {
        let Some(entry) = table.find_by_mac_mut(&mac) else {
            continue;
        };
        if entry.state == EntryState::VirtualHost || entry.mac == config.host_mac {
            continue;
        }

        if entry.online && now - entry.last_update > stale_after {
            entry.online = false;
            info!(mac = %entry.mac, ip = %entry.ip, last_seen = %entry.last_update, "ARP device is offline");
            cycle.offline.push(entry.clone());
        }

        cycle.probes.push(probe_for(config, entry));
    }

    cycle
}

/// Silence after which an online host is declared offline
pub(crate) fn stale_after(interval: Duration, cycles: u32) -> chrono::Duration {
    chrono::Duration::from_std(interval.saturating_mul(cycles.max(1)))
        .unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Poll until `stop` fires
pub(crate) async fn run<T: Transport>(inner: Arc<Inner<T>>, interval: Duration, stop: CancellationToken) {
    let stale_after = stale_after(interval, inner.config.offline_after_cycles);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!("ARP polling loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let (cycle, notifier) = {
            let mut state = inner.lock();
            let cycle = poll_cycle(&inner.config, &mut state.table, stale_after, Utc::now());
            (cycle, state.notifier.clone())
        };

        if inner.config.verbose_logging {
            debug!(hosts = cycle.probes.len(), "ARP polling cycle");
        }

        for probe in &cycle.probes {
            if stop.is_cancelled() {
                return;
            }
            match inner.transport.send(probe).await {
                Ok(()) => inner.metrics.probes_sent.inc(),
                Err(e) => {
                    inner.metrics.tx_errors.inc();
                    warn!(mac = %probe.dst, ip = %probe.packet.target_ip, "ARP probe failed: {}", e);
                }
            }
        }

        if let Some(notifier) = notifier {
            for entry in cycle.offline {
                notifier.notify(entry, &inner.metrics).await;
            }
        }
    }
}
