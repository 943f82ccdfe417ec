//! Replay transport for recorded NMEA logs

use std::path::{Path, PathBuf};
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use super::Transport;
use crate::config::ReplaySettings;
use crate::sentence::RawChunk;
use crate::types::LineSettings;
use crate::{RelayError, Result};

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// Transport that plays back a captured byte stream in fixed-size chunks.
///
/// End of the recording is end of stream. Reopening after a close resumes at
/// the current offset; use [`ReplayTransport::rewind`] to start over.
#[derive(Debug)]
pub struct ReplayTransport {
    source: Source,
    data: Option<Vec<u8>>,
    position: usize,
    chunk_size: usize,
    pace: Option<Duration>,
    interval: Option<Interval>,
}

impl ReplayTransport {
    /// Replay an NMEA log file. The file is read on `open`.
    pub fn from_path<P: AsRef<Path>>(path: P, settings: ReplaySettings) -> Self {
        Self::with_source(Source::File(path.as_ref().to_path_buf()), settings)
    }

    /// Replay bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, settings: ReplaySettings) -> Self {
        Self::with_source(Source::Memory(bytes.into()), settings)
    }

    fn with_source(source: Source, settings: ReplaySettings) -> Self {
        Self {
            source,
            data: None,
            position: 0,
            chunk_size: settings.chunk_size.max(1),
            pace: settings.chunk_interval(),
            interval: None,
        }
    }

    /// Start playback from the beginning on the next read.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Bytes not yet played back, if the recording is loaded.
    pub fn remaining(&self) -> Option<usize> {
        self.data.as_ref().map(|data| data.len().saturating_sub(self.position))
    }
}

#[async_trait::async_trait]
impl Transport for ReplayTransport {
    async fn open(&mut self) -> Result<()> {
        let data = match &self.source {
            Source::File(path) => tokio::fs::read(path).await.map_err(|e| {
                RelayError::transport_open_with_source(
                    path.display().to_string(),
                    "cannot read replay file",
                    Box::new(e),
                )
            })?,
            Source::Memory(bytes) => bytes.clone(),
        };

        info!(
            source = %self.describe(),
            bytes = data.len(),
            offset = self.position,
            "Opened replay"
        );
        self.data = Some(data);

        self.interval = self.pace.map(|pace| {
            let mut interval = interval(pace);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        Ok(())
    }

    async fn configure(&mut self, line: &LineSettings) -> Result<()> {
        debug!(line = %line, "Replay ignores line settings");
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        let Some(data) = self.data.as_ref() else {
            return Err(RelayError::transport_read(self.describe(), "replay is not open"));
        };

        if self.position >= data.len() {
            debug!("Reached end of replay");
            return Ok(None);
        }

        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }

        let end = (self.position + self.chunk_size).min(data.len());
        let chunk = RawChunk::from(&data[self.position..end]);
        trace!(offset = self.position, len = chunk.len(), "Replay chunk");
        self.position = end;

        Ok(Some(chunk))
    }

    async fn close(&mut self) {
        self.data = None;
        self.interval = None;
    }

    fn describe(&self) -> String {
        match &self.source {
            Source::File(path) => format!("replay:{}", path.display()),
            Source::Memory(bytes) => format!("replay:memory({} bytes)", bytes.len()),
        }
    }
}
