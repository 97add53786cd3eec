//! Configuration management
//!
//! `arpsentry.toml` is parsed into [`Config`], checked by [`validate`] and
//! resolved into the immutable [`EngineConfig`] the engine runs with.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MacAddr;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const MINIMAL: &str = r#"
interface = "eth0"
host_ip = "192.168.1.10"
gateway_ip = "192.168.1.1"
home_lan = "192.168.1.0/24"
"#;

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let cfg = parse(MINIMAL).unwrap();

        assert_eq!(cfg.interface, "eth0");
        assert_eq!(cfg.host_mac, None);
        assert_eq!(cfg.polling.interval_secs, 10);
        assert_eq!(cfg.table.capacity, 256);
        assert_eq!(cfg.table.policy, CapacityPolicy::Reject);
        assert_eq!(cfg.notification.policy, NotificationPolicy::Block);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_full() {
        let content = r#"
interface = "br-lan"
host_mac = "02:00:00:00:00:01"
host_ip = "10.0.0.2"
gateway_ip = "10.0.0.1"
gateway_mac = "aa:bb:cc:dd:ee:ff"
home_lan = "10.0.0.0/24"
verbose_logging = true

[polling]
interval_secs = 30
offline_after_cycles = 2

[table]
capacity = 64
policy = "evict-oldest"

[hunt]
interval_ms = 500
timeout_secs = 0

[notification]
queue_size = 8
policy = "drop-newest"

[logging]
level = "debug"
format = "json"
"#;
        let cfg = parse(content).unwrap();
        let host_mac = cfg.host_mac.unwrap();
        let engine = cfg.engine_config(host_mac);

        assert_eq!(host_mac, MacAddr([0x02, 0, 0, 0, 0, 1]));
        assert_eq!(engine.gateway_mac, Some(MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])));
        assert_eq!(engine.host_ip, Ipv4Addr::new(10, 0, 0, 2));
        assert!(engine.verbose_logging);
        assert_eq!(engine.offline_after_cycles, 2);
        assert_eq!(engine.table_capacity, 64);
        assert_eq!(engine.capacity_policy, CapacityPolicy::EvictOldest);
        assert_eq!(engine.hunt_interval, Duration::from_millis(500));
        assert_eq!(engine.hunt_timeout, None);
        assert_eq!(engine.notification_queue, 8);
        assert_eq!(engine.notification_policy, NotificationPolicy::DropNewest);
        assert_eq!(engine.replay_delay, Duration::from_millis(50));
        assert_eq!(cfg.logging.format, "json");
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        let bad_mac = format!("{}host_mac = \"00:11:22\"\n", MINIMAL);
        assert!(matches!(parse(&bad_mac), Err(Error::Config(_))));

        let bad_lan = MINIMAL.replace("192.168.1.0/24", "192.168.1.0");
        assert!(matches!(parse(&bad_lan), Err(Error::Config(_))));

        let missing = MINIMAL.replace("gateway_ip = \"192.168.1.1\"\n", "");
        assert!(parse(&missing).is_err());
    }
}
