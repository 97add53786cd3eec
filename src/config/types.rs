//! Configuration types

use crate::protocol::{Ipv4Cidr, MacAddr};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Host table size for an IPv4 /24 segment
pub const DEFAULT_TABLE_CAPACITY: usize = 256;

/// User-defined configuration (arpsentry.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub interface: String,
    /// Read from the interface when absent
    #[serde(default)]
    pub host_mac: Option<MacAddr>,
    pub host_ip: Ipv4Addr,
    pub gateway_ip: Ipv4Addr,
    #[serde(default)]
    pub gateway_mac: Option<MacAddr>,
    pub home_lan: Ipv4Cidr,
    #[serde(default)]
    pub verbose_logging: bool,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub hunt: HuntConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// Missed polling cycles before an online host is reported offline
    pub offline_after_cycles: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            offline_after_cycles: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub capacity: usize,
    pub policy: CapacityPolicy,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TABLE_CAPACITY,
            policy: CapacityPolicy::default(),
        }
    }
}

/// What to do with a new host when the table is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityPolicy {
    /// Drop the new host and log a warning
    #[default]
    Reject,
    /// Evict the oldest host in `Normal` state
    EvictOldest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    pub interval_ms: u64,
    /// Zero hunts until the host gives in or the engine stops
    pub timeout_secs: u64,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub queue_size: usize,
    pub policy: NotificationPolicy,
    pub replay_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_size: 32,
            policy: NotificationPolicy::default(),
            replay_delay_ms: 50,
        }
    }
}

/// Behaviour when the notification queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationPolicy {
    /// The ingest loop waits for the consumer
    #[default]
    Block,
    /// The new notification is discarded and counted
    DropNewest,
}

/// Runtime engine configuration, immutable once the engine is built
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub interface: String,
    pub host_mac: MacAddr,
    pub host_ip: Ipv4Addr,
    pub gateway_ip: Ipv4Addr,
    pub gateway_mac: Option<MacAddr>,
    pub home_lan: Ipv4Cidr,
    pub verbose_logging: bool,
    pub offline_after_cycles: u32,
    pub table_capacity: usize,
    pub capacity_policy: CapacityPolicy,
    pub hunt_interval: Duration,
    pub hunt_timeout: Option<Duration>,
    pub notification_queue: usize,
    pub notification_policy: NotificationPolicy,
    pub replay_delay: Duration,
    pub stop_timeout: Duration,
}

impl EngineConfig {
    /// Configuration with default tunables for the given segment
    pub fn new(
        interface: impl Into<String>,
        host_mac: MacAddr,
        host_ip: Ipv4Addr,
        gateway_ip: Ipv4Addr,
        home_lan: Ipv4Cidr,
    ) -> Self {
        let hunt = HuntConfig::default();
        let notification = NotificationConfig::default();
        Self {
            interface: interface.into(),
            host_mac,
            host_ip,
            gateway_ip,
            gateway_mac: None,
            home_lan,
            verbose_logging: false,
            offline_after_cycles: PollingConfig::default().offline_after_cycles,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            capacity_policy: CapacityPolicy::default(),
            hunt_interval: Duration::from_millis(hunt.interval_ms),
            hunt_timeout: timeout_from_secs(hunt.timeout_secs),
            notification_queue: notification.queue_size,
            notification_policy: notification.policy,
            replay_delay: Duration::from_millis(notification.replay_delay_ms),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Resolve the runtime configuration once the host MAC is known
    pub fn engine_config(&self, host_mac: MacAddr) -> EngineConfig {
        EngineConfig {
            gateway_mac: self.gateway_mac,
            verbose_logging: self.verbose_logging,
            offline_after_cycles: self.polling.offline_after_cycles,
            table_capacity: self.table.capacity,
            capacity_policy: self.table.policy,
            hunt_interval: Duration::from_millis(self.hunt.interval_ms),
            hunt_timeout: timeout_from_secs(self.hunt.timeout_secs),
            notification_queue: self.notification.queue_size,
            notification_policy: self.notification.policy,
            replay_delay: Duration::from_millis(self.notification.replay_delay_ms),
            ..EngineConfig::new(
                self.interface.clone(),
                host_mac,
                self.host_ip,
                self.gateway_ip,
                self.home_lan,
            )
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs)
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
