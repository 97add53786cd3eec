//! In-memory transport
//!
//! Frames injected through a [`ChannelPeer`] are delivered by `recv`, and
//! every frame the engine sends shows up on the peer.

use super::{with_deadline, ReadTimeout, Transport};
use crate::protocol::ArpFrame;
use crate::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct ChannelTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<Result<ArpFrame>>>,
    outbound: mpsc::UnboundedSender<ArpFrame>,
    read_timeout: ReadTimeout,
    closed: CancellationToken,
    close_count: Arc<AtomicUsize>,
}

/// The "wire" side of a [`ChannelTransport`]
pub struct ChannelPeer {
    inject: mpsc::UnboundedSender<Result<ArpFrame>>,
    sent: mpsc::UnboundedReceiver<ArpFrame>,
    close_count: Arc<AtomicUsize>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, ChannelPeer) {
        let (inject, inbound) = mpsc::unbounded_channel();
        let (outbound, sent) = mpsc::unbounded_channel();
        let close_count = Arc::new(AtomicUsize::new(0));

        let transport = ChannelTransport {
            inbound: Mutex::new(inbound),
            outbound,
            read_timeout: ReadTimeout::default(),
            closed: CancellationToken::new(),
            close_count: close_count.clone(),
        };
        let peer = ChannelPeer {
            inject,
            sent,
            close_count,
        };
        (transport, peer)
    }
}

impl ChannelPeer {
    /// Deliver a frame to the transport's `recv`
    pub fn inject(&self, frame: ArpFrame) {
        let _ = self.inject.send(Ok(frame));
    }

    /// Make the transport's next `recv` fail with `error`
    pub fn inject_error(&self, error: Error) {
        let _ = self.inject.send(Err(error));
    }

    /// Wait for the next frame the transport sent
    pub async fn next_sent(&mut self) -> Option<ArpFrame> {
        self.sent.recv().await
    }

    /// Next already-sent frame, if any
    pub fn try_next_sent(&mut self) -> Option<ArpFrame> {
        self.sent.try_recv().ok()
    }

    /// Number of `close` calls the transport has seen
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl Transport for ChannelTransport {
    async fn recv(&self) -> Result<ArpFrame> {
        let mut inbound = self.inbound.lock().await;
        let next = async {
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => Err(Error::TransportClosed),
                msg = inbound.recv() => msg.unwrap_or(Err(Error::TransportClosed)),
            }
        };
        with_deadline(self.read_timeout.get(), next).await
    }

    async fn send(&self, frame: &ArpFrame) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::TransportClosed);
        }
        self.outbound
            .send(frame.clone())
            .map_err(|_| Error::TransportClosed)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.read_timeout.set(timeout);
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }
}
