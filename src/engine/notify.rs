//! Notification delivery
//!
//! Snapshots go through a bounded internal queue to a delivery task that
//! feeds the external sink, so a slow consumer only stalls the ingest loop
//! under [`NotificationPolicy::Block`]. The consumer is expected to keep
//! draining its channel.

use super::host_table::Entry;
use super::tasks::TaskGroup;
use crate::config::NotificationPolicy;
use crate::telemetry::EngineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Producer side of the notification queue
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    queue: mpsc::Sender<Entry>,
    policy: NotificationPolicy,
}

impl Notifier {
    /// Create the queue; the receiver belongs to [`deliver`]
    pub(crate) fn channel(
        size: usize,
        policy: NotificationPolicy,
    ) -> (Notifier, mpsc::Receiver<Entry>) {
        let (queue, rx) = mpsc::channel(size.max(1));
        (Notifier { queue, policy }, rx)
    }

    pub(crate) async fn notify(&self, entry: Entry, metrics: &EngineMetrics) {
        match self.policy {
            NotificationPolicy::Block => {
                if self.queue.send(entry).await.is_err() {
                    debug!("Notification queue closed");
                }
            }
            NotificationPolicy::DropNewest => match self.queue.try_send(entry) {
                Ok(()) => {}
                Err(TrySendError::Full(entry)) => {
                    metrics.notifications_dropped.inc();
                    warn!(mac = %entry.mac, ip = %entry.ip, "Notification queue full, dropping");
                }
                Err(TrySendError::Closed(_)) => debug!("Notification queue closed"),
            },
        }
    }
}

/// Replay `snapshot` after `replay_delay`, then forward queued entries.
///
/// Returns when the engine stops, the queue is replaced or the sink is
/// dropped.
pub(crate) async fn deliver(
    snapshot: Vec<Entry>,
    mut queue: mpsc::Receiver<Entry>,
    sink: mpsc::Sender<Entry>,
    replay_delay: Duration,
    tasks: TaskGroup,
    metrics: Arc<EngineMetrics>,
) {
    tokio::select! {
        biased;
        _ = tasks.cancelled() => return,
        _ = tokio::time::sleep(replay_delay) => {}
    }

    for entry in snapshot {
        if !forward(&sink, entry, &tasks, &metrics).await {
            return;
        }
    }

    loop {
        let entry = tokio::select! {
            biased;
            _ = tasks.cancelled() => return,
            entry = queue.recv() => match entry {
                Some(entry) => entry,
                None => return,
            },
        };
        if !forward(&sink, entry, &tasks, &metrics).await {
            return;
        }
    }
}

async fn forward(
    sink: &mpsc::Sender<Entry>,
    entry: Entry,
    tasks: &TaskGroup,
    metrics: &EngineMetrics,
) -> bool {
    tokio::select! {
        biased;
        _ = tasks.cancelled() => false,
        result = sink.send(entry) => match result {
            Ok(()) => {
                metrics.notifications_sent.inc();
                true
            }
            Err(_) => {
                debug!("Notification sink closed");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EntryState;
    use crate::protocol::MacAddr;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn entry(n: u8) -> Entry {
        Entry {
            mac: MacAddr([0, 0, 0, 0, 0, n]),
            ip: Ipv4Addr::new(10, 0, 0, n),
            state: EntryState::Normal,
            online: true,
            last_update: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_precedes_live_entries() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(EngineMetrics::new());
        let (notifier, queue) = Notifier::channel(4, NotificationPolicy::Block);
        let (sink, mut consumer) = mpsc::channel(16);

        // live entry queued before the delivery task even starts
        notifier.notify(entry(9), &metrics).await;

        tokio::spawn(deliver(
            vec![entry(1), entry(2)],
            queue,
            sink,
            Duration::from_millis(5),
            tasks.clone(),
            metrics.clone(),
        ));

        let order: Vec<u8> = [
            consumer.recv().await.unwrap(),
            consumer.recv().await.unwrap(),
            consumer.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.mac.0[5])
        .collect();
        assert_eq!(order, vec![1, 2, 9]);
        assert_eq!(metrics.notifications_sent.get(), 3);
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let metrics = EngineMetrics::new();
        let (notifier, mut queue) = Notifier::channel(1, NotificationPolicy::DropNewest);

        notifier.notify(entry(1), &metrics).await;
        notifier.notify(entry(2), &metrics).await;

        assert_eq!(metrics.notifications_dropped.get(), 1);
        assert_eq!(queue.recv().await.unwrap().mac.0[5], 1);
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delivery_stops_on_cancel() {
        let tasks = TaskGroup::new();
        let (_notifier, queue) = Notifier::channel(1, NotificationPolicy::Block);
        // nobody reads the sink, so delivery would block forever
        let (sink, _consumer) = mpsc::channel(1);

        let handle = tokio::spawn(deliver(
            vec![entry(1), entry(2), entry(3)],
            queue,
            sink,
            Duration::ZERO,
            tasks.clone(),
            Arc::new(EngineMetrics::new()),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        tasks.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
