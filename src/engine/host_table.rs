//! Host table (MAC to IP tracking)

use crate::config::CapacityPolicy;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::warn;

/// Entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Routine tracking
    Normal,
    /// Being forced off its IP address
    Hunt,
    /// An address this engine answers for, not a real device
    VirtualHost,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryState::Normal => "normal",
            EntryState::Hunt => "hunt",
            EntryState::VirtualHost => "virtual",
        };
        f.write_str(name)
    }
}

/// One observed or impersonated MAC/IP pairing.
///
/// Values handed out of the table are copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub state: EntryState,
    pub online: bool,
    pub last_update: DateTime<Utc>,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<15} {:<7} {:<7} {}",
            self.mac,
            self.ip,
            self.state,
            if self.online { "online" } else { "offline" },
            self.last_update.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// Insertion-ordered table keyed by MAC
#[derive(Debug)]
pub struct HostTable {
    entries: HashMap<MacAddr, Entry>,
    /// First-seen order, kept in step with `entries`
    order: Vec<MacAddr>,
    capacity: usize,
    policy: CapacityPolicy,
}

impl HostTable {
    pub fn new(capacity: usize, policy: CapacityPolicy) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn find_by_mac(&self, mac: &MacAddr) -> Option<&Entry> {
        self.entries.get(mac)
    }

    pub fn find_by_mac_mut(&mut self, mac: &MacAddr) -> Option<&mut Entry> {
        self.entries.get_mut(mac)
    }

    /// Virtual entry answering for `ip`, if any
    pub fn find_virtual_by_ip(&self, ip: Ipv4Addr) -> Option<&Entry> {
        self.entries
            .values()
            .find(|e| e.state == EntryState::VirtualHost && e.ip == ip)
    }

    /// Add a new entry, offline, stamped `now`
    pub fn append(
        &mut self,
        state: EntryState,
        mac: MacAddr,
        ip: Ipv4Addr,
        now: DateTime<Utc>,
    ) -> Result<&mut Entry> {
        if self.entries.contains_key(&mac) {
            return Err(Error::DuplicateHost { mac });
        }

        if self.entries.len() >= self.capacity {
            self.make_room()?;
        }

        self.order.push(mac);
        let entry = self.entries.entry(mac).or_insert(Entry {
            mac,
            ip,
            state,
            online: false,
            last_update: now,
        });
        Ok(entry)
    }

    fn make_room(&mut self) -> Result<()> {
        let full = Error::TableFull {
            capacity: self.capacity,
        };

        match self.policy {
            CapacityPolicy::Reject => Err(full),
            CapacityPolicy::EvictOldest => {
                let oldest = self
                    .order
                    .iter()
                    .copied()
                    .find(|mac| {
                        self.entries
                            .get(mac)
                            .is_some_and(|e| e.state == EntryState::Normal)
                    })
                    .ok_or(full)?;
                if let Some(evicted) = self.remove(&oldest) {
                    warn!(mac = %evicted.mac, ip = %evicted.ip, "Host table full, evicting oldest host");
                }
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, mac: &MacAddr) -> Option<Entry> {
        let entry = self.entries.remove(mac)?;
        self.order.retain(|m| m != mac);
        Some(entry)
    }

    /// Entries in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.order.iter().filter_map(|mac| self.entries.get(mac))
    }

    /// Copies of all entries in first-seen order
    pub fn snapshot(&self) -> Vec<Entry> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, n])
    }

    fn ip(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, n)
    }

    #[test]
    fn test_append_and_lookup() {
        let mut table = HostTable::new(4, CapacityPolicy::Reject);
        let now = Utc::now();

        let entry = table.append(EntryState::Normal, mac(1), ip(1), now).unwrap();
        assert!(!entry.online);
        assert_eq!(entry.last_update, now);

        let found = table.find_by_mac(&mac(1)).unwrap();
        assert_eq!(found.ip, ip(1));
        assert_eq!(found.state, EntryState::Normal);
        assert!(table.find_by_mac(&mac(2)).is_none());
    }

    #[test]
    fn test_one_entry_per_mac() {
        let mut table = HostTable::new(4, CapacityPolicy::Reject);
        table.append(EntryState::Normal, mac(1), ip(1), Utc::now()).unwrap();

        let err = table
            .append(EntryState::Normal, mac(1), ip(2), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHost { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_virtual_lookup_ignores_real_hosts() {
        let mut table = HostTable::new(4, CapacityPolicy::Reject);
        let now = Utc::now();
        table.append(EntryState::Hunt, mac(1), ip(5), now).unwrap();
        assert!(table.find_virtual_by_ip(ip(5)).is_none());

        let virtual_mac = MacAddr::virtual_for(ip(5));
        table.append(EntryState::VirtualHost, virtual_mac, ip(5), now).unwrap();
        assert_eq!(table.find_virtual_by_ip(ip(5)).unwrap().mac, virtual_mac);
        assert!(table.find_virtual_by_ip(ip(6)).is_none());
    }

    #[test]
    fn test_reject_when_full() {
        let mut table = HostTable::new(2, CapacityPolicy::Reject);
        table.append(EntryState::Normal, mac(1), ip(1), Utc::now()).unwrap();
        table.append(EntryState::Normal, mac(2), ip(2), Utc::now()).unwrap();

        let err = table
            .append(EntryState::Normal, mac(3), ip(3), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::TableFull { capacity: 2 }));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_evict_oldest_normal() {
        let mut table = HostTable::new(3, CapacityPolicy::EvictOldest);
        let now = Utc::now();
        table.append(EntryState::Hunt, mac(1), ip(1), now).unwrap();
        table.append(EntryState::Normal, mac(2), ip(2), now).unwrap();
        table.append(EntryState::Normal, mac(3), ip(3), now).unwrap();

        table.append(EntryState::Normal, mac(4), ip(4), now).unwrap();

        let macs: Vec<MacAddr> = table.iter().map(|e| e.mac).collect();
        assert_eq!(macs, vec![mac(1), mac(3), mac(4)]);
    }

    #[test]
    fn test_evict_needs_a_normal_entry() {
        let mut table = HostTable::new(1, CapacityPolicy::EvictOldest);
        table
            .append(EntryState::VirtualHost, mac(1), ip(1), Utc::now())
            .unwrap();

        assert!(table
            .append(EntryState::Normal, mac(2), ip(2), Utc::now())
            .is_err());
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut table = HostTable::new(8, CapacityPolicy::Reject);
        for n in [9, 3, 7, 1] {
            table.append(EntryState::Normal, mac(n), ip(n), Utc::now()).unwrap();
        }
        table.remove(&mac(7));

        let snapshot = table.snapshot();
        let ips: Vec<Ipv4Addr> = snapshot.iter().map(|e| e.ip).collect();
        assert_eq!(ips, vec![ip(9), ip(3), ip(1)]);

        // copies, not aliases
        table.find_by_mac_mut(&mac(9)).unwrap().online = true;
        assert!(!snapshot[0].online);
    }
}
