//! Consumers of decoded fixes

use tokio::sync::mpsc;
use tracing::trace;

use crate::types::Fix;

/// Destination for decoded fixes, typically the platform's location service.
#[async_trait::async_trait]
pub trait LocationSink: Send + 'static {
    /// Deliver a fix. Returns `false` if the sink rejected it.
    async fn push(&mut self, fix: Fix) -> bool;

    /// Whether the sink is currently able to accept fixes.
    fn is_registered(&self) -> bool {
        true
    }
}

#[async_trait::async_trait]
impl LocationSink for Box<dyn LocationSink> {
    async fn push(&mut self, fix: Fix) -> bool {
        (**self).push(fix).await
    }

    fn is_registered(&self) -> bool {
        (**self).is_registered()
    }
}

/// Sink forwarding fixes into an mpsc channel.
///
/// Unregistered once the receiver is dropped. Applies backpressure when the
/// channel is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Fix>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Fix>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of a channel of the given capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Fix>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl LocationSink for ChannelSink {
    async fn push(&mut self, fix: Fix) -> bool {
        match self.tx.send(fix).await {
            Ok(()) => true,
            Err(_) => {
                trace!("Channel sink receiver dropped");
                false
            }
        }
    }

    fn is_registered(&self) -> bool {
        !self.tx.is_closed()
    }
}
