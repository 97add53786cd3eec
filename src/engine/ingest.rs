//! Ingest loop
//!
//! Receives ARP frames, keeps the host table current and answers for
//! virtual hosts. Per-frame decisions live in [`process_frame`], which runs
//! under the table lock and never performs I/O; sending the reply and
//! delivering the notification happen after the lock is released.

use super::actions::{action_reply_in_hunt_state, action_request_in_hunt_state, action_update_client};
use super::handler::Inner;
use super::host_table::{Entry, EntryState, HostTable};
use super::tasks::TaskHandle;
use crate::capture::Transport;
use crate::config::EngineConfig;
use crate::protocol::{ArpFrame, ArpOp, ArpPacket, MacAddr};
use crate::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause before retrying after a transient receive error
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(30);

/// What to do once the table lock is released
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub(crate) reply: Option<ArpFrame>,
    pub(crate) notification: Option<Entry>,
}

/// Apply one received packet to the table.
///
/// Returns `None` when the frame is discarded before reaching the state
/// machine.
pub(crate) fn process_frame(
    config: &EngineConfig,
    table: &mut HostTable,
    packet: &ArpPacket,
    now: DateTime<Utc>,
) -> Option<Outcome> {
    if packet.is_link_local() {
        if config.verbose_logging {
            debug!(ip = %packet.sender_ip, target = %packet.target_ip, "ARP skipping link local packet");
        }
        return None;
    }

    let mac = packet.sender_mac;
    let mut notify = false;

    if table.find_by_mac(&mac).is_none() {
        if packet.is_probe() {
            if config.verbose_logging {
                debug!(mac = %mac, target = %packet.target_ip, "ARP probe from unknown host");
            }
            return None;
        }
        // a reply must carry the sender's address, so this one is malformed
        if packet.sender_ip.is_unspecified() {
            if config.verbose_logging {
                debug!(mac = %mac, "ARP reply without sender address");
            }
            return None;
        }
        if let Err(e) = table.append(EntryState::Normal, mac, packet.sender_ip, now) {
            warn!(mac = %mac, ip = %packet.sender_ip, "ARP cannot track new host: {}", e);
            return None;
        }
        notify = true;
    }

    let sender = table.find_by_mac_mut(&mac)?;
    if sender.state == EntryState::VirtualHost {
        if config.verbose_logging {
            debug!(mac = %mac, ip = %packet.sender_ip, "ARP skipping virtual host packet");
        }
        return None;
    }
    sender.last_update = now;

    let mut outcome = Outcome::default();

    if packet.operation == ArpOp::Request {
        if let Some(target) = table.find_virtual_by_ip(packet.target_ip) {
            if config.verbose_logging {
                debug!(ip = %target.ip, virtual_mac = %target.mac, from = %mac, "ARP request for virtual host");
            }
            let reply = ArpPacket::reply(target.mac, target.ip, MacAddr::BROADCAST, target.ip);
            outcome.reply = Some(ArpFrame::broadcast(reply));
        }
    }

    let sender = table.find_by_mac_mut(&mac)?;
    match (packet.operation, sender.state) {
        // answered for a virtual host, the sender's own state is left alone
        _ if outcome.reply.is_some() => {}
        (_, EntryState::Normal) => {
            notify |= action_update_client(config, sender, mac, packet.sender_ip);
        }
        (ArpOp::Request, EntryState::Hunt) => {
            match action_request_in_hunt_state(config, sender, packet.sender_ip, packet.target_ip) {
                Ok(changed) => notify |= changed,
                Err(e) => error!(mac = %mac, "ARP hunt update failed: {}", e),
            }
        }
        (ArpOp::Reply, EntryState::Hunt) => {
            notify |= action_reply_in_hunt_state(config, sender, mac, packet.sender_ip);
        }
        (op, state) => {
            error!(mac = %mac, ?op, %state, "ARP unexpected packet for state");
        }
    }

    if notify {
        if sender.online {
            info!(mac = %sender.mac, ip = %sender.ip, state = %sender.state, "ARP device changed");
        } else {
            sender.online = true;
            info!(mac = %sender.mac, ip = %sender.ip, state = %sender.state, "ARP device is online");
        }
        outcome.notification = Some(sender.clone());
    }

    Some(outcome)
}

/// Receive until stopped or the transport fails for good
pub(crate) async fn run<T: Transport>(inner: &Inner<T>, task: &TaskHandle) -> Result<()> {
    let metrics = &inner.metrics;
    inner.transport.set_read_timeout(None);

    loop {
        let received = inner.transport.recv().await;
        if task.stopping() {
            debug!("ARP ingest loop stopping");
            return Ok(());
        }

        let frame = match received {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                metrics.rx_errors.inc();
                warn!("ARP read error, retrying: {}", e);
                tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
                continue;
            }
            Err(e) => {
                metrics.rx_errors.inc();
                error!("ARP read error: {}", e);
                return Err(e);
            }
        };
        metrics.frames_received.inc();

        let (outcome, notifier) = {
            let mut state = inner.lock();
            let outcome = process_frame(&inner.config, &mut state.table, &frame.packet, Utc::now());
            metrics.set_table_size(state.table.len());
            (outcome, state.notifier.clone())
        };

        let Some(outcome) = outcome else {
            metrics.frames_ignored.inc();
            continue;
        };

        if let Some(reply) = outcome.reply {
            match inner.transport.send(&reply).await {
                Ok(()) => metrics.virtual_replies_sent.inc(),
                Err(e) => {
                    metrics.tx_errors.inc();
                    warn!(ip = %reply.packet.sender_ip, "ARP failed to answer for virtual host: {}", e);
                }
            }
        }

        if let (Some(entry), Some(notifier)) = (outcome.notification, notifier) {
            notifier.notify(entry, metrics).await;
        }
    }
}
