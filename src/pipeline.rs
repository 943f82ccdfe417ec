//! Synchronous byte-to-fix pipeline run inside the session task.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::decode::FixDecoder;
use crate::sentence::{ChecksumStatus, RawChunk, SentenceBuffer, verify};
use crate::stats::{DiscardReason, PipelineStats};
use crate::types::Fix;

/// Reassembler, checksum policy and decoder chained together.
///
/// Each chunk is processed to completion before the next read, so fixes come
/// out in the order their sentences were received.
#[derive(Debug)]
pub struct SentencePipeline {
    buffer: SentenceBuffer,
    decoder: FixDecoder,
    strict_checksum: bool,
    stats: Arc<PipelineStats>,
}

impl SentencePipeline {
    pub fn new(max_sentence_len: usize, strict_checksum: bool, stats: Arc<PipelineStats>) -> Self {
        Self::with_decoder(max_sentence_len, strict_checksum, FixDecoder::new(), stats)
    }

    /// Use a preconfigured decoder, e.g. one with a fixed reference date.
    pub fn with_decoder(
        max_sentence_len: usize,
        strict_checksum: bool,
        decoder: FixDecoder,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self { buffer: SentenceBuffer::new(max_sentence_len), decoder, strict_checksum, stats }
    }

    /// Feed one chunk and return the fixes it completes.
    pub fn process(&mut self, chunk: &RawChunk) -> Vec<Fix> {
        self.stats.record_chunk(chunk.len());
        trace!(len = chunk.len(), "Processing chunk");

        let reassembled = self.buffer.feed(chunk.as_bytes());
        for _ in 0..reassembled.resets {
            self.stats.record_discard(DiscardReason::FrameDesync);
        }

        let mut fixes = Vec::new();
        for sentence in reassembled.sentences {
            self.stats.record_sentence();

            match verify(&sentence) {
                ChecksumStatus::Valid => {}
                ChecksumStatus::Missing if self.strict_checksum => {
                    debug!(%sentence, "Discarding sentence without checksum");
                    self.stats.record_discard(DiscardReason::MissingChecksum);
                    continue;
                }
                ChecksumStatus::Missing => self.stats.record_unverified(),
                ChecksumStatus::Mismatch { expected, computed } => {
                    debug!(%sentence, ?expected, computed, "Discarding sentence with bad checksum");
                    self.stats.record_discard(DiscardReason::ChecksumMismatch);
                    continue;
                }
            }

            match self.decoder.try_decode(&sentence) {
                Ok(Some(fix)) => {
                    self.stats.record_decoded();
                    fixes.push(fix);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(%sentence, error = %e, "Discarding undecodable sentence");
                    self.stats.record_discard(DiscardReason::Decode);
                }
            }
        }

        fixes
    }

    pub fn set_decoder(&mut self, decoder: FixDecoder) {
        self.decoder = decoder;
    }

    /// Drop any partial sentence. The date context survives so time-only
    /// sentences after a restart are still dated correctly.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }
}
