//! Scriptable transports, recording sinks and sentence fixtures for tests
//! and benchmarks.

#![cfg(any(test, feature = "test-utils"))]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::sentence::{RawChunk, compute_checksum};
use crate::sink::LocationSink;
use crate::transport::Transport;
use crate::types::{Fix, FixQuality, FixSource, LineSettings};
use crate::{RelayError, Result};

/// The GGA example from the NMEA 0183 reference, at Munich.
pub const SAMPLE_GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
/// The matching RMC example, dated 23 March 1994.
pub const SAMPLE_RMC: &str =
    "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

/// Frame `payload` as `$payload*HH` with the correct checksum.
pub fn sentence_with_checksum(payload: &str) -> String {
    format!("${}*{:02X}", payload, compute_checksum(payload.as_bytes()))
}

/// A valid GGA sentence at time-of-day `hhmmss`.
pub fn gga_at(hhmmss: &str) -> String {
    sentence_with_checksum(&format!(
        "GPGGA,{hhmmss},4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"
    ))
}

/// A valid RMC sentence at `hhmmss` on `ddmmyy`.
pub fn rmc_at(hhmmss: &str, ddmmyy: &str) -> String {
    sentence_with_checksum(&format!(
        "GPRMC,{hhmmss},A,4807.038,N,01131.000,E,022.4,084.4,{ddmmyy},003.1,W"
    ))
}

/// A fix at Munich, `seconds` after 2024-03-23 12:00:00 UTC.
pub fn sample_fix(seconds: u32) -> Fix {
    let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 23, 12, 0, 0).single().unwrap_or_default();
    let timestamp = base + TimeDelta::seconds(seconds as i64);
    match Fix::builder(48.1173, 11.5167, timestamp, FixQuality::Gps, FixSource::Gga).build() {
        Ok(fix) => fix,
        Err(e) => panic!("sample fix is valid: {e}"),
    }
}

/// Scripted outcome of one [`MockTransport::read_chunk`] call.
#[derive(Debug, Clone)]
pub enum MockRead {
    Chunk(Vec<u8>),
    Error(String),
    End,
}

#[derive(Debug, Default)]
struct MockState {
    opens: u32,
    closes: u32,
    configured: Vec<LineSettings>,
    is_open: bool,
    fail_open: bool,
    fail_configure: bool,
    hang_open: bool,
}

/// In-memory transport whose reads are scripted through a [`MockController`].
///
/// A read blocks until the controller queues something, like a serial port
/// with a silent receiver. Dropping the controller ends the stream.
pub struct MockTransport {
    name: String,
    reads: mpsc::UnboundedReceiver<MockRead>,
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle for scripting and inspecting a [`MockTransport`].
#[derive(Clone)]
pub struct MockController {
    reads: mpsc::UnboundedSender<MockRead>,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> (Self, MockController) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MockState::default()));
        let transport = Self { name: name.into(), reads: rx, state: Arc::clone(&state) };
        (transport, MockController { reads: tx, state })
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let hang = {
            let mut state = self.state();
            state.opens += 1;
            if state.fail_open {
                return Err(RelayError::transport_open(&self.name, "scripted open failure"));
            }
            state.hang_open
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.state().is_open = true;
        Ok(())
    }

    async fn configure(&mut self, line: &LineSettings) -> Result<()> {
        let mut state = self.state();
        if state.fail_configure {
            return Err(RelayError::transport_open(&self.name, "scripted configure failure"));
        }
        state.configured.push(*line);
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        if !self.state().is_open {
            return Err(RelayError::transport_read(&self.name, "mock transport is not open"));
        }
        match self.reads.recv().await {
            Some(MockRead::Chunk(bytes)) => Ok(Some(RawChunk::from(bytes))),
            Some(MockRead::Error(reason)) => Err(RelayError::transport_read(&self.name, reason)),
            Some(MockRead::End) | None => Ok(None),
        }
    }

    async fn close(&mut self) {
        let mut state = self.state();
        if state.is_open {
            state.is_open = false;
            state.closes += 1;
        }
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

impl MockController {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_bytes(&self, bytes: impl AsRef<[u8]>) {
        let _ = self.reads.send(MockRead::Chunk(bytes.as_ref().to_vec()));
    }

    /// Queue a sentence followed by CR LF.
    pub fn push_sentence(&self, sentence: &str) {
        self.push_bytes(format!("{sentence}\r\n"));
    }

    pub fn fail_read(&self, reason: impl Into<String>) {
        let _ = self.reads.send(MockRead::Error(reason.into()));
    }

    pub fn end_stream(&self) {
        let _ = self.reads.send(MockRead::End);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    pub fn set_fail_configure(&self, fail: bool) {
        self.state().fail_configure = fail;
    }

    /// Make `open` block forever, like a device that never answers.
    pub fn set_hang_open(&self, hang: bool) {
        self.state().hang_open = hang;
    }

    pub fn opens(&self) -> u32 {
        self.state().opens
    }

    pub fn closes(&self) -> u32 {
        self.state().closes
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open
    }

    pub fn configured(&self) -> Vec<LineSettings> {
        self.state().configured.clone()
    }
}

#[derive(Debug, Default)]
struct SinkState {
    fixes: Mutex<Vec<Fix>>,
    unregistered: AtomicBool,
    refusing: AtomicBool,
}

/// Sink that records every accepted fix. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<SinkState>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self) -> MutexGuard<'_, Vec<Fix>> {
        self.inner.fixes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fixes(&self) -> Vec<Fix> {
        self.record().clone()
    }

    pub fn len(&self) -> usize {
        self.record().len()
    }

    pub fn is_empty(&self) -> bool {
        self.record().is_empty()
    }

    pub fn set_registered(&self, registered: bool) {
        self.inner.unregistered.store(!registered, Ordering::SeqCst);
    }

    /// When not accepting, `push` returns `false` and records nothing.
    pub fn set_accepting(&self, accepting: bool) {
        self.inner.refusing.store(!accepting, Ordering::SeqCst);
    }

    /// Poll until at least `count` fixes were recorded or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Fix> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.len() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.fixes()
    }
}

#[async_trait::async_trait]
impl LocationSink for RecordingSink {
    async fn push(&mut self, fix: Fix) -> bool {
        if self.inner.refusing.load(Ordering::SeqCst) {
            return false;
        }
        self.record().push(fix);
        true
    }

    fn is_registered(&self) -> bool {
        !self.inner.unregistered.load(Ordering::SeqCst)
    }
}
