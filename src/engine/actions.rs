//! State action handlers
//!
//! Pure decisions over a single entry. Callers hold the table lock; the
//! return value says whether the change is worth a notification.

use super::host_table::{Entry, EntryState};
use crate::config::EngineConfig;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use tracing::debug;

/// Track a sender in `Normal` state (or one leaving `Hunt`).
///
/// Traffic from the gateway or from this host never updates an entry.
pub(crate) fn action_update_client(
    config: &EngineConfig,
    entry: &mut Entry,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
) -> bool {
    if (entry.ip == sender_ip && entry.online)
        || sender_ip.is_unspecified()
        || config.gateway_mac == Some(sender_mac)
        || sender_ip == config.host_ip
    {
        return false;
    }

    entry.ip = sender_ip;
    entry.state = EntryState::Normal;

    if config.verbose_logging {
        debug!(mac = %entry.mac, ip = %entry.ip, "ARP client updated IP");
    }

    true
}

/// Interpret a request from a hunted host using Address Conflict Detection.
///
/// Only probes (sender 0.0.0.0) and announcements (sender == target) count:
///
/// | type         | op | sender MAC | sender IP | target MAC | target IP |
/// |--------------|----|------------|-----------|------------|-----------|
/// | ACD probe    | 1  | client     | 0.0.0.0   | 00:00..    | wanted IP |
/// | announcement | 1  | client     | client IP | ff:ff.. / 0| client IP |
///
/// A target IP different from the recorded one is the host's new address;
/// the entry moves back to `Normal` and the hunt control retires the
/// virtual host. The same IP means the host is still clinging to it.
pub(crate) fn action_request_in_hunt_state(
    config: &EngineConfig,
    entry: &mut Entry,
    sender_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) -> Result<bool> {
    if !sender_ip.is_unspecified() && sender_ip != target_ip {
        return Ok(false);
    }

    let ip = entry.ip;
    if config.verbose_logging {
        debug!(mac = %entry.mac, ip = %ip, target = %target_ip, "ARP client announcement in hunt state");
    }

    if ip == target_ip {
        if config.verbose_logging {
            debug!(mac = %entry.mac, ip = %ip, "ARP client attempting to keep the same IP");
        }
        return Ok(false);
    }

    let mac = entry.mac;
    if !action_update_client(config, entry, mac, target_ip) {
        return Err(Error::UpdateFailed { mac, ip: target_ip });
    }
    Ok(true)
}

/// Hosts that skip ACD announce a new address with a plain reply.
pub(crate) fn action_reply_in_hunt_state(
    config: &EngineConfig,
    entry: &mut Entry,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
) -> bool {
    if sender_ip.is_unspecified() || sender_ip == entry.ip {
        return false;
    }
    action_update_client(config, entry, sender_mac, sender_ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::Utc;

    const CLIENT: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const GATEWAY: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);

    fn config() -> EngineConfig {
        let mut config = EngineConfig::new(
            "eth0",
            MacAddr([0x02, 0, 0, 0, 0, 0x0a]),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 1),
            "192.168.1.0/24".parse().unwrap(),
        );
        config.gateway_mac = Some(GATEWAY);
        config
    }

    fn entry(state: EntryState, ip: [u8; 4], online: bool) -> Entry {
        Entry {
            mac: CLIENT,
            ip: Ipv4Addr::from(ip),
            state,
            online,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn test_update_same_ip_online_is_noop() {
        let mut e = entry(EntryState::Normal, [192, 168, 1, 5], true);
        assert!(!action_update_client(&config(), &mut e, CLIENT, Ipv4Addr::new(192, 168, 1, 5)));
    }

    #[test]
    fn test_update_same_ip_offline_reports_change() {
        let mut e = entry(EntryState::Normal, [192, 168, 1, 5], false);
        assert!(action_update_client(&config(), &mut e, CLIENT, Ipv4Addr::new(192, 168, 1, 5)));
    }

    #[test]
    fn test_update_new_ip() {
        let mut e = entry(EntryState::Normal, [192, 168, 1, 5], true);
        assert!(action_update_client(&config(), &mut e, CLIENT, Ipv4Addr::new(192, 168, 1, 6)));
        assert_eq!(e.ip, Ipv4Addr::new(192, 168, 1, 6));
        assert_eq!(e.state, EntryState::Normal);
    }

    #[test]
    fn test_update_ignores_infrastructure() {
        let cfg = config();
        let mut e = entry(EntryState::Normal, [192, 168, 1, 5], true);

        assert!(!action_update_client(&cfg, &mut e, CLIENT, Ipv4Addr::UNSPECIFIED));
        assert!(!action_update_client(&cfg, &mut e, GATEWAY, Ipv4Addr::new(192, 168, 1, 7)));
        assert!(!action_update_client(&cfg, &mut e, CLIENT, cfg.host_ip));
        assert_eq!(e.ip, Ipv4Addr::new(192, 168, 1, 5));
    }

    #[test]
    fn test_hunt_ignores_ordinary_requests() {
        let mut e = entry(EntryState::Hunt, [192, 168, 1, 5], true);
        let changed = action_request_in_hunt_state(
            &config(),
            &mut e,
            Ipv4Addr::new(192, 168, 1, 5),
            Ipv4Addr::new(192, 168, 1, 1),
        )
        .unwrap();
        assert!(!changed);
        assert_eq!(e.state, EntryState::Hunt);
    }

    #[test]
    fn test_hunt_announcement_of_new_ip() {
        let mut e = entry(EntryState::Hunt, [192, 168, 1, 5], true);
        let new_ip = Ipv4Addr::new(192, 168, 1, 50);

        let changed = action_request_in_hunt_state(&config(), &mut e, new_ip, new_ip).unwrap();
        assert!(changed);
        assert_eq!(e.ip, new_ip);
        assert_eq!(e.state, EntryState::Normal);
    }

    #[test]
    fn test_hunt_probe_for_new_ip() {
        let mut e = entry(EntryState::Hunt, [192, 168, 1, 5], true);
        let new_ip = Ipv4Addr::new(192, 168, 1, 51);

        let changed =
            action_request_in_hunt_state(&config(), &mut e, Ipv4Addr::UNSPECIFIED, new_ip).unwrap();
        assert!(changed);
        assert_eq!(e.ip, new_ip);
    }

    #[test]
    fn test_hunt_clinging_to_old_ip() {
        let mut e = entry(EntryState::Hunt, [192, 168, 1, 5], true);
        let old_ip = Ipv4Addr::new(192, 168, 1, 5);

        assert!(!action_request_in_hunt_state(&config(), &mut e, old_ip, old_ip).unwrap());
        assert!(!action_request_in_hunt_state(&config(), &mut e, Ipv4Addr::UNSPECIFIED, old_ip).unwrap());
        assert_eq!(e.state, EntryState::Hunt);
    }

    #[test]
    fn test_hunt_update_failure_is_reported() {
        let cfg = config();
        let mut e = entry(EntryState::Hunt, [192, 168, 1, 5], true);

        // announcing the engine's own address can never be accepted
        let err = action_request_in_hunt_state(&cfg, &mut e, cfg.host_ip, cfg.host_ip).unwrap_err();
        assert!(matches!(err, Error::UpdateFailed { .. }));
        assert_eq!(e.state, EntryState::Hunt);
    }

    #[test]
    fn test_hunt_reply_with_new_ip() {
        let mut e = entry(EntryState::Hunt, [192, 168, 1, 5], true);

        assert!(!action_reply_in_hunt_state(&config(), &mut e, CLIENT, Ipv4Addr::new(192, 168, 1, 5)));
        assert!(!action_reply_in_hunt_state(&config(), &mut e, CLIENT, Ipv4Addr::UNSPECIFIED));
        assert_eq!(e.state, EntryState::Hunt);

        assert!(action_reply_in_hunt_state(&config(), &mut e, CLIENT, Ipv4Addr::new(192, 168, 1, 60)));
        assert_eq!(e.state, EntryState::Normal);
        assert_eq!(e.ip, Ipv4Addr::new(192, 168, 1, 60));
    }
}
