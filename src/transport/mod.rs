//! Byte sources a device session reads from

mod replay;
#[cfg(feature = "serial")]
mod serial;

pub use replay::ReplayTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

use crate::Result;
use crate::sentence::RawChunk;
use crate::types::LineSettings;

/// A readable byte handle to a GPS receiver.
///
/// A session drives a transport through `open`, `configure`, repeated
/// `read_chunk` calls and finally `close`. After a read error the session
/// closes the transport and calls `open` again on the same value, so
/// implementations must support reopening.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Acquire the underlying handle.
    async fn open(&mut self) -> Result<()>;

    /// Apply baud rate and framing. Called after every successful `open`.
    async fn configure(&mut self, line: &LineSettings) -> Result<()>;

    /// Wait for the next bytes.
    ///
    /// Returns:
    /// - `Ok(Some(chunk))` - Bytes available (never empty)
    /// - `Ok(None)` - Stream ended, the device will not produce more data
    /// - `Err(e)` - Read failed
    ///
    /// Must be cancel-safe: a session may drop the future at any await point
    /// when the device is detached.
    async fn read_chunk(&mut self) -> Result<Option<RawChunk>>;

    /// Release the handle. Closing a transport that is not open is a no-op.
    async fn close(&mut self);

    /// Human-readable identity used in logs and errors, e.g. a device path.
    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl Transport for Box<dyn Transport> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn configure(&mut self, line: &LineSettings) -> Result<()> {
        (**self).configure(line).await
    }

    async fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        (**self).read_chunk().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Platform notification about the receiver.
#[derive(Debug)]
pub enum DeviceEvent<T> {
    /// A receiver appeared; the transport is ready to be opened.
    Attached(T),
    /// The receiver went away.
    Detached,
}
