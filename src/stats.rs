//! Pipeline counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a sentence or fragment was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    /// Buffer overran without a terminator and was reset
    FrameDesync,
    /// Checksum suffix did not match the payload
    ChecksumMismatch,
    /// No checksum suffix while strict checking is enabled
    MissingChecksum,
    /// Position sentence with malformed fields
    Decode,
}

/// Counters shared between the session task, the emitter and the supervisor.
///
/// Counters only ever increase. Use [`PipelineStats::snapshot`] for a
/// consistent-enough copy to log or serialize.
#[derive(Debug, Default)]
pub struct PipelineStats {
    bytes_received: AtomicU64,
    chunks_received: AtomicU64,
    sentences_framed: AtomicU64,
    frame_desyncs: AtomicU64,
    checksum_mismatches: AtomicU64,
    missing_checksums: AtomicU64,
    unverified_sentences: AtomicU64,
    decode_errors: AtomicU64,
    fixes_decoded: AtomicU64,
    fixes_forwarded: AtomicU64,
    fixes_dropped: AtomicU64,
    fixes_stale: AtomicU64,
    read_errors: AtomicU64,
    restarts: AtomicU64,
    sessions_started: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub bytes_received: u64,
    pub chunks_received: u64,
    pub sentences_framed: u64,
    pub frame_desyncs: u64,
    pub checksum_mismatches: u64,
    pub missing_checksums: u64,
    /// Sentences accepted without a checksum under lenient policy
    pub unverified_sentences: u64,
    pub decode_errors: u64,
    pub fixes_decoded: u64,
    pub fixes_forwarded: u64,
    /// Fixes the sink refused or was not registered for
    pub fixes_dropped: u64,
    pub fixes_stale: u64,
    pub read_errors: u64,
    pub restarts: u64,
    pub sessions_started: u64,
}

impl StatsSnapshot {
    /// Everything that was discarded before reaching the decoder output.
    pub fn total_discarded(&self) -> u64 {
        self.frame_desyncs + self.checksum_mismatches + self.missing_checksums + self.decode_errors
    }
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_chunk(&self, len: usize) {
        bump(&self.chunks_received, 1);
        bump(&self.bytes_received, len as u64);
    }

    pub(crate) fn record_sentence(&self) {
        bump(&self.sentences_framed, 1);
    }

    pub(crate) fn record_discard(&self, reason: DiscardReason) {
        let counter = match reason {
            DiscardReason::FrameDesync => &self.frame_desyncs,
            DiscardReason::ChecksumMismatch => &self.checksum_mismatches,
            DiscardReason::MissingChecksum => &self.missing_checksums,
            DiscardReason::Decode => &self.decode_errors,
        };
        bump(counter, 1);
    }

    pub(crate) fn record_unverified(&self) {
        bump(&self.unverified_sentences, 1);
    }

    pub(crate) fn record_decoded(&self) {
        bump(&self.fixes_decoded, 1);
    }

    pub(crate) fn record_forwarded(&self) {
        bump(&self.fixes_forwarded, 1);
    }

    pub(crate) fn record_dropped(&self) {
        bump(&self.fixes_dropped, 1);
    }

    pub(crate) fn record_stale(&self) {
        bump(&self.fixes_stale, 1);
    }

    pub(crate) fn record_read_error(&self) {
        bump(&self.read_errors, 1);
    }

    pub(crate) fn record_restart(&self) {
        bump(&self.restarts, 1);
    }

    pub(crate) fn record_session_started(&self) {
        bump(&self.sessions_started, 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            bytes_received: load(&self.bytes_received),
            chunks_received: load(&self.chunks_received),
            sentences_framed: load(&self.sentences_framed),
            frame_desyncs: load(&self.frame_desyncs),
            checksum_mismatches: load(&self.checksum_mismatches),
            missing_checksums: load(&self.missing_checksums),
            unverified_sentences: load(&self.unverified_sentences),
            decode_errors: load(&self.decode_errors),
            fixes_decoded: load(&self.fixes_decoded),
            fixes_forwarded: load(&self.fixes_forwarded),
            fixes_dropped: load(&self.fixes_dropped),
            fixes_stale: load(&self.fixes_stale),
            read_errors: load(&self.read_errors),
            restarts: load(&self.restarts),
            sessions_started: load(&self.sessions_started),
        }
    }
}
