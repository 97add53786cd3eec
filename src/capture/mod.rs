//! Link-layer transports
//!
//! The engine talks to the network only through [`Transport`]:
//! - AF_PACKET: raw ARP socket bound to one Linux interface
//! - Channel: in-memory transport for tests and demos

mod af_packet;
mod channel;

pub use af_packet::AfPacketSocket;
pub use channel::{ChannelPeer, ChannelTransport};

use crate::protocol::ArpFrame;
use crate::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// ARP transport shared by the ingest, polling and hunting tasks.
///
/// Every method takes `&self`; a single handle is used concurrently.
pub trait Transport: Send + Sync + 'static {
    /// Receive the next ARP frame.
    ///
    /// Blocks until a frame arrives, the read timeout expires (a transient
    /// `TimedOut` error) or the transport is closed (`TransportClosed`).
    fn recv(&self) -> impl Future<Output = Result<ArpFrame>> + Send;

    /// Send an ARP frame
    fn send(&self, frame: &ArpFrame) -> impl Future<Output = Result<()>> + Send;

    /// Set the receive deadline; `None` blocks forever
    fn set_read_timeout(&self, timeout: Option<Duration>);

    /// Close the transport, unblocking any pending `recv`. Idempotent.
    fn close(&self);
}

/// Receive deadline stored as milliseconds, zero meaning none
#[derive(Debug, Default)]
pub(crate) struct ReadTimeout(AtomicU64);

impl ReadTimeout {
    pub(crate) fn set(&self, timeout: Option<Duration>) {
        let millis = timeout.map_or(0, |t| (t.as_millis() as u64).max(1));
        self.0.store(millis, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }
}

/// Run a receive future under the configured deadline
pub(crate) async fn with_deadline<F>(timeout: Option<Duration>, fut: F) -> Result<ArpFrame>
where
    F: Future<Output = Result<ArpFrame>>,
{
    match timeout {
        Some(t) => tokio::time::timeout(t, fut).await.map_err(|_| {
            crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "read deadline exceeded",
            ))
        })?,
        None => fut.await,
    }
}
