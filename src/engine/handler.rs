//! ARP engine
//!
//! Owns the host table, the transport and every task spawned on their
//! behalf. All table access goes through one mutex that is never held
//! across an await point.

use super::host_table::{Entry, HostTable};
use super::notify::{self, Notifier};
use super::tasks::TaskGroup;
use super::{hunt, ingest, polling};
use crate::capture::{AfPacketSocket, Transport};
use crate::config::EngineConfig;
use crate::protocol::MacAddr;
use crate::telemetry::EngineMetrics;
use crate::{Error, Result};
use chrono::Utc;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Delay between the stop signal and closing the transport
const CLOSE_DELAY: Duration = Duration::from_millis(10);

/// State guarded by the engine lock
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) table: HostTable,
    pub(crate) notifier: Option<Notifier>,
}

pub(crate) struct Inner<T> {
    pub(crate) config: EngineConfig,
    pub(crate) transport: T,
    state: Mutex<EngineState>,
    pub(crate) tasks: TaskGroup,
    pub(crate) metrics: Arc<EngineMetrics>,
    stopping: AtomicBool,
}

impl<T> Inner<T> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check a hunt and retire it under one lock, reporting the target if
    /// it was reset. Returns `None` while the hunt goes on.
    pub(crate) async fn settle_hunt(
        &self,
        target: &MacAddr,
        ip: Ipv4Addr,
        virtual_mac: &MacAddr,
        expired: bool,
    ) -> Option<hunt::HuntStatus> {
        let (status, reset, notifier) = {
            let mut state = self.lock();
            let (status, reset) = hunt::settle_hunt(&mut state.table, target, ip, virtual_mac, expired)?;
            self.metrics.set_table_size(state.table.len());
            (status, reset, state.notifier.clone())
        };
        if let (Some(entry), Some(notifier)) = (reset, notifier) {
            notifier.notify(entry, &self.metrics).await;
        }
        Some(status)
    }
}

/// ARP host tracking engine bound to one interface
pub struct Engine<T: Transport = AfPacketSocket> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Engine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Engine<AfPacketSocket> {
    /// Open the interface named in `config` and build an engine on it
    pub fn new(config: EngineConfig) -> Result<Self> {
        let socket = AfPacketSocket::bind(&config.interface).map_err(|e| {
            error!(interface = %config.interface, "ARP error opening interface: {}", e);
            e
        })?;
        Ok(Self::with_transport(config, socket))
    }
}

impl<T: Transport> Engine<T> {
    pub fn with_transport(config: EngineConfig, transport: T) -> Self {
        info!(
            interface = %config.interface,
            host_mac = %config.host_mac,
            host_ip = %config.host_ip,
            gateway_ip = %config.gateway_ip,
            home_lan = %config.home_lan,
            "ARP engine created"
        );

        let table = HostTable::new(config.table_capacity, config.capacity_policy);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: Mutex::new(EngineState {
                    table,
                    notifier: None,
                }),
                tasks: TaskGroup::new(),
                metrics: Arc::new(EngineMetrics::new()),
                stopping: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    /// Serve until [`stop`](Self::stop) is called or the transport fails.
    ///
    /// Starts the polling loop, then runs the ingest loop on the calling task.
    pub async fn listen_and_serve(&self, poll_interval: Duration) -> Result<()> {
        if poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".into()));
        }

        let task = self.inner.tasks.begin("arp ingest");
        if task.stopping() {
            return Ok(());
        }

        info!(interface = %self.inner.config.interface, poll_interval = ?poll_interval, "ARP engine serving");

        // the poller lives only as long as this call
        let poll_stop = self.inner.tasks.child_token();
        let _poll_guard = poll_stop.clone().drop_guard();

        let inner = self.inner.clone();
        self.inner
            .tasks
            .spawn("arp polling", polling::run(inner, poll_interval, poll_stop));

        ingest::run(&self.inner, &task).await
    }

    /// Send every entry change to `sink`.
    ///
    /// Shortly after registration the whole table is replayed in first-seen
    /// order, ahead of any live change. A later registration replaces this
    /// one. Must be called within a Tokio runtime.
    pub fn add_notification_channel(&self, sink: mpsc::Sender<Entry>) {
        let config = &self.inner.config;
        let (notifier, queue) = Notifier::channel(config.notification_queue, config.notification_policy);

        let snapshot = {
            let mut state = self.inner.lock();
            state.notifier = Some(notifier);
            state.table.snapshot()
        };

        self.inner.tasks.spawn(
            "arp notification",
            notify::deliver(
                snapshot,
                queue,
                sink,
                config.replay_delay,
                self.inner.tasks.clone(),
                self.inner.metrics.clone(),
            ),
        );
    }

    /// Stop every task and close the transport.
    ///
    /// Safe to call more than once; the transport is closed exactly once.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.stopping.swap(true, Ordering::SeqCst) {
            info!(interface = %inner.config.interface, "ARP engine stopping");
            inner.tasks.cancel();

            let closer = inner.clone();
            inner.tasks.spawn("arp close", async move {
                tokio::time::sleep(CLOSE_DELAY).await;
                closer.transport.close();
            });
        }

        inner.tasks.wait(inner.config.stop_timeout).await.map_err(|e| {
            error!(running = inner.tasks.running(), "ARP engine did not stop in time");
            e
        })
    }

    pub fn find_by_mac(&self, mac: &MacAddr) -> Option<Entry> {
        self.inner.lock().table.find_by_mac(mac).cloned()
    }

    pub fn find_virtual_by_ip(&self, ip: Ipv4Addr) -> Option<Entry> {
        self.inner.lock().table.find_virtual_by_ip(ip).cloned()
    }

    /// Copies of all entries in first-seen order
    pub fn table(&self) -> Vec<Entry> {
        self.inner.lock().table.snapshot()
    }

    /// Log the table
    pub fn print_table(&self) {
        let (entries, capacity) = {
            let state = self.inner.lock();
            (state.table.snapshot(), state.table.capacity())
        };

        info!(entries = entries.len(), capacity, "ARP table");
        for entry in &entries {
            info!("ARP {}", entry);
        }
    }

    /// Force the host `mac` off `ip`.
    ///
    /// A virtual host takes over `ip` and the hunt runs in the background
    /// until the host announces another address. Must be called within a
    /// Tokio runtime.
    pub fn force_ip_change(&self, mac: MacAddr, ip: Ipv4Addr) -> Result<()> {
        if self.inner.tasks.is_stopping() {
            return Err(Error::TransportClosed);
        }

        let (virtual_mac, target, notifier) = {
            let mut state = self.inner.lock();
            let virtual_mac = hunt::begin_hunt(&mut state.table, mac, ip, Utc::now())?;
            self.inner.metrics.set_table_size(state.table.len());
            (
                virtual_mac,
                state.table.find_by_mac(&mac).cloned(),
                state.notifier.clone(),
            )
        };

        let inner = self.inner.clone();
        self.inner.tasks.spawn("arp hunt", async move {
            if let (Some(entry), Some(notifier)) = (target, notifier) {
                notifier.notify(entry, &inner.metrics).await;
            }
            hunt::run(inner, mac, ip, virtual_mac).await;
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ChannelPeer, ChannelTransport};
    use crate::engine::EntryState;
    use crate::protocol::{ArpFrame, ArpPacket};

    const CLIENT: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

    fn engine() -> (Engine<ChannelTransport>, ChannelPeer) {
        let config = EngineConfig::new(
            "test0",
            MacAddr([0x02, 0, 0, 0, 0, 0x0a]),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 1),
            "192.168.1.0/24".parse().unwrap(),
        );
        let (transport, peer) = ChannelTransport::pair();
        (Engine::with_transport(config, transport), peer)
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_rejected() {
        let (engine, _peer) = engine();
        let err = engine.listen_and_serve(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (engine, peer) = engine();

        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
        assert_eq!(peer.close_count(), 1);

        // serving after stop returns immediately
        engine
            .listen_and_serve(Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_force_ip_change_unknown_host() {
        let (engine, _peer) = engine();
        let err = engine
            .force_ip_change(CLIENT, Ipv4Addr::new(192, 168, 1, 5))
            .unwrap_err();
        assert!(matches!(err, Error::HostNotFound { .. }));
    }

    #[tokio::test]
    async fn test_lookups_return_copies() {
        let (engine, peer) = engine();
        let server = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.listen_and_serve(Duration::from_secs(60)).await })
        };

        peer.inject(ArpFrame::broadcast(ArpPacket::request(
            CLIENT,
            Ipv4Addr::new(192, 168, 1, 5),
            Ipv4Addr::new(192, 168, 1, 1),
        )));

        let mut found = None;
        for _ in 0..100 {
            found = engine.find_by_mac(&CLIENT);
            if found.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut found = found.unwrap();
        assert_eq!(found.state, EntryState::Normal);

        found.ip = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(engine.table()[0].ip, Ipv4Addr::new(192, 168, 1, 5));
        assert_eq!(engine.metrics().table_size(), 1);

        engine.print_table();
        engine.stop().await.unwrap();
        server.await.unwrap().unwrap();
    }
}
