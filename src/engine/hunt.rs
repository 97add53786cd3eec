//! Hunting control
//!
//! A hunt binds a virtual MAC to the target's IP and keeps asserting that
//! binding until the target moves to another address. The ingest loop
//! answers requests for the contested IP on the virtual MAC's behalf, so the
//! target's own conflict detection sees the address as taken.

use super::handler::Inner;
use super::host_table::{Entry, EntryState, HostTable};
use crate::capture::Transport;
use crate::protocol::{ArpFrame, ArpPacket, MacAddr};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where a hunt stands, read under the table lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HuntStatus {
    Hunting,
    /// The target left the contested address
    Released(Ipv4Addr),
    /// The target entry no longer exists
    Gone,
}

/// Register the virtual host for `ip` and put `mac` into hunt state.
///
/// Returns the virtual MAC now answering for `ip`.
pub(crate) fn begin_hunt(
    table: &mut HostTable,
    mac: MacAddr,
    ip: Ipv4Addr,
    now: DateTime<Utc>,
) -> Result<MacAddr> {
    let target = table.find_by_mac(&mac).ok_or(Error::HostNotFound { mac })?;
    match target.state {
        EntryState::Normal => {}
        EntryState::Hunt => return Err(Error::HuntInProgress { mac }),
        EntryState::VirtualHost => return Err(Error::HostNotFound { mac }),
    }
    if target.ip != ip {
        return Err(Error::AddressMismatch {
            mac,
            expected: ip,
            actual: target.ip,
        });
    }
    if table.find_virtual_by_ip(ip).is_some() {
        return Err(Error::HuntInProgress { mac });
    }

    // hunted entries are never evicted, so mark the target before making room
    set_state(table, &mac, EntryState::Hunt);

    let virtual_mac = MacAddr::virtual_for(ip);
    match table.append(EntryState::VirtualHost, virtual_mac, ip, now) {
        Ok(entry) => {
            entry.online = true;
            Ok(virtual_mac)
        }
        Err(e) => {
            set_state(table, &mac, EntryState::Normal);
            Err(e)
        }
    }
}

/// The hunt for `ip` owns the target only while the target is hunted on
/// that same address; a later hunt on a new address is someone else's.
pub(crate) fn hunt_status(table: &HostTable, target: &MacAddr, ip: Ipv4Addr) -> HuntStatus {
    match table.find_by_mac(target) {
        None => HuntStatus::Gone,
        Some(entry) if entry.state == EntryState::Hunt && entry.ip == ip => HuntStatus::Hunting,
        Some(entry) => HuntStatus::Released(entry.ip),
    }
}

/// Retire the virtual host for `ip` and return the target to normal
/// tracking if this hunt still owns it.
///
/// Returns a copy of the target if its state had to be reset.
pub(crate) fn end_hunt(
    table: &mut HostTable,
    target: &MacAddr,
    ip: Ipv4Addr,
    virtual_mac: &MacAddr,
) -> Option<Entry> {
    if table
        .find_by_mac(virtual_mac)
        .is_some_and(|e| e.state == EntryState::VirtualHost && e.ip == ip)
    {
        table.remove(virtual_mac);
    }

    if hunt_status(table, target, ip) != HuntStatus::Hunting {
        return None;
    }
    let entry = table.find_by_mac_mut(target)?;
    entry.state = EntryState::Normal;
    Some(entry.clone())
}

/// Decide whether the hunt is over and, if so, retire it.
///
/// Returns `None` while the hunt goes on, otherwise the final status
/// (`Hunting` meaning it expired) and the target if it was reset.
pub(crate) fn settle_hunt(
    table: &mut HostTable,
    target: &MacAddr,
    ip: Ipv4Addr,
    virtual_mac: &MacAddr,
    expired: bool,
) -> Option<(HuntStatus, Option<Entry>)> {
    let status = hunt_status(table, target, ip);
    if status == HuntStatus::Hunting && !expired {
        return None;
    }
    Some((status, end_hunt(table, target, ip, virtual_mac)))
}

/// Frames sent every hunt tick: a broadcast gratuitous request from the
/// virtual MAC and a reply aimed at the target itself.
pub(crate) fn spoof_frames(target: MacAddr, ip: Ipv4Addr, virtual_mac: MacAddr) -> [ArpFrame; 2] {
    [
        ArpFrame::broadcast(ArpPacket::gratuitous(virtual_mac, ip)),
        ArpFrame::new(target, ArpPacket::reply(virtual_mac, ip, target, ip)),
    ]
}

fn set_state(table: &mut HostTable, mac: &MacAddr, state: EntryState) {
    if let Some(entry) = table.find_by_mac_mut(mac) {
        entry.state = state;
    }
}

/// Drive one hunt until the target releases the address, the hunt times
/// out or the engine stops
pub(crate) async fn run<T: Transport>(
    inner: Arc<Inner<T>>,
    target: MacAddr,
    ip: Ipv4Addr,
    virtual_mac: MacAddr,
) {
    let deadline = inner.config.hunt_timeout.map(|t| Instant::now() + t);
    let mut ticker = tokio::time::interval(inner.config.hunt_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(mac = %target, ip = %ip, virtual_mac = %virtual_mac, "ARP hunt started");

    loop {
        tokio::select! {
            biased;
            _ = inner.tasks.cancelled() => {
                debug!(mac = %target, ip = %ip, "ARP hunt stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let expired = deadline.is_some_and(|d| Instant::now() >= d);
        if let Some(status) = inner.settle_hunt(&target, ip, &virtual_mac, expired).await {
            match status {
                HuntStatus::Hunting => warn!(mac = %target, ip = %ip, "ARP hunt timed out, giving up"),
                HuntStatus::Released(new_ip) => {
                    info!(mac = %target, old_ip = %ip, new_ip = %new_ip, "ARP hunt succeeded")
                }
                HuntStatus::Gone => warn!(mac = %target, ip = %ip, "ARP hunt target disappeared"),
            }
            return;
        }

        for frame in spoof_frames(target, ip, virtual_mac) {
            match inner.transport.send(&frame).await {
                Ok(()) => inner.metrics.spoof_frames_sent.inc(),
                Err(e) => {
                    inner.metrics.tx_errors.inc();
                    warn!(mac = %target, ip = %ip, "ARP hunt send failed: {}", e);
                }
            }
        }
    }
}
