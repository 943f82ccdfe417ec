//! Streaming pipeline from a serial GPS receiver to validated position fixes.
//!
//! gpsrelay reads NMEA 0183 output from a receiver over any byte transport,
//! reassembles and checksums sentences, decodes position sentences into
//! [`Fix`] values and hands them to a [`LocationSink`]. Receivers can be
//! attached and detached at any time; a session restarts after transient
//! read failures and shuts down cleanly when the device goes away.
//!
//! # Features
//!
//! - **Noise tolerant**: chunking, line noise and corrupted sentences never
//!   produce a bad fix
//! - **Session lifecycle**: explicit states with bounded restart backoff
//! - **Transports**: recorded logs everywhere, serial ports with the `serial`
//!   feature
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gpsrelay::{ChannelSink, DeviceEvent, GpsRelay, RelayConfig, ReplayTransport};
//!
//! #[tokio::main]
//! async fn main() -> gpsrelay::Result<()> {
//!     let config = RelayConfig::default();
//!     let (sink, mut fixes) = ChannelSink::channel(32);
//!     let mut relay = GpsRelay::new(config.clone(), sink)?;
//!
//!     let log = ReplayTransport::from_path("drive.nmea", config.replay);
//!     relay.handle_event(DeviceEvent::Attached(log)).await?;
//!
//!     while let Some(fix) = fixes.recv().await {
//!         println!("{:.5}, {:.5} at {}", fix.latitude(), fix.longitude(), fix.timestamp());
//!     }
//!     relay.shutdown().await
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod stats;
#[cfg_attr(any(test, feature = "test-utils"), path = "test_utils.rs")]
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Byte-to-fix pipeline
pub mod decode;
pub mod pipeline;
pub mod sentence;

// Session architecture
pub mod emitter;
mod relay;
pub mod session;
pub mod sink;
pub mod stream;
pub mod transport;

// Core exports
pub use config::{RelayConfig, ReplaySettings, RestartPolicy};
pub use error::*;
pub use stats::{DiscardReason, PipelineStats, StatsSnapshot};
pub use types::*;

// Pipeline exports
pub use decode::{DecodeError, FixDecoder, SentenceType};
pub use pipeline::SentencePipeline;
pub use sentence::{CandidateSentence, ChecksumStatus, RawChunk, SentenceBuffer};

// Session exports
pub use emitter::{EmitOutcome, FixEmitter};
pub use relay::{GpsRelay, NOMINAL_FIX_RATE_HZ};
pub use session::{CloseReason, DeviceSession, SessionHandle, SessionState};
pub use sink::{ChannelSink, LocationSink};
pub use transport::{DeviceEvent, ReplayTransport, Transport};

#[cfg(feature = "serial")]
pub use transport::SerialTransport;
