//! Byte-stream sentence reassembly

use tracing::{debug, trace};

use super::{CandidateSentence, START_MARKER};

/// Default cap on buffered bytes without a terminator.
///
/// A well-formed NMEA 0183 sentence is at most 82 characters; this leaves
/// room for vendor sentences that overrun the limit.
pub const DEFAULT_MAX_SENTENCE_LEN: usize = 512;

/// Replacement for bytes outside printable ASCII.
pub const FILLER: u8 = b'.';

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Output of one [`SentenceBuffer::feed`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reassembled {
    /// Complete frames, in arrival order
    pub sentences: Vec<CandidateSentence>,
    /// Buffer resets caused by a missing terminator
    pub resets: usize,
}

/// Accumulator for bytes received since the last sentence boundary.
///
/// The buffer always either starts with `$` or holds line noise that will be
/// thrown away at the next terminator. A new `$` abandons whatever partial
/// frame preceded it.
///
/// At most one reset is counted between two terminators, however the run
/// without a terminator is split up by `$` markers.
#[derive(Debug, Clone)]
pub struct SentenceBuffer {
    bytes: Vec<u8>,
    max_len: usize,
    resyncing: bool,
    /// Non-terminator bytes since the last line feed
    since_terminator: usize,
    /// A reset was already counted for the current terminator-free run
    desynced: bool,
    total_resets: u64,
}

impl Default for SentenceBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SENTENCE_LEN)
    }
}

impl SentenceBuffer {
    /// Create a buffer that resets after `max_len` bytes without a terminator.
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            bytes: Vec::with_capacity(max_len + 1),
            max_len,
            resyncing: false,
            since_terminator: 0,
            desynced: false,
            total_resets: 0,
        }
    }

    /// Append a chunk and return every sentence it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Reassembled {
        let mut out = Reassembled::default();

        for &raw in chunk {
            let byte = sanitize(raw);

            if byte == LF {
                self.since_terminator = 0;
                self.desynced = false;
                if self.resyncing {
                    trace!("Terminator reached, resynchronised");
                    self.resyncing = false;
                    self.bytes.clear();
                } else {
                    self.complete_line(&mut out.sentences);
                }
                continue;
            }

            if byte != CR {
                self.since_terminator += 1;
                if self.since_terminator > self.max_len {
                    self.count_reset(&mut out);
                }
            }

            if byte == START_MARKER {
                self.resyncing = false;
                self.bytes.clear();
                self.bytes.push(byte);
                continue;
            }

            if self.resyncing {
                continue;
            }

            // The CR of a CRLF terminator does not count against the limit
            let limit = if byte == CR { self.max_len + 1 } else { self.max_len };
            if self.bytes.len() >= limit {
                self.bytes.clear();
                self.resyncing = true;
                self.count_reset(&mut out);
                continue;
            }

            self.bytes.push(byte);
        }

        out
    }

    /// Drop any partial frame, e.g. after the transport restarted.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.resyncing = false;
        self.since_terminator = 0;
        self.desynced = false;
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Resets since the buffer was created.
    pub fn total_resets(&self) -> u64 {
        self.total_resets
    }

    fn count_reset(&mut self, out: &mut Reassembled) {
        if self.desynced {
            return;
        }
        debug!(max_len = self.max_len, "No terminator within limit, resetting sentence buffer");
        self.desynced = true;
        self.total_resets += 1;
        out.resets += 1;
    }

    fn complete_line(&mut self, sentences: &mut Vec<CandidateSentence>) {
        if self.bytes.last() == Some(&CR) {
            self.bytes.pop();
        }

        if self.bytes.first() == Some(&START_MARKER) && self.bytes.len() > 1 {
            // A lone CR inside the frame is still a control byte
            for byte in self.bytes.iter_mut().filter(|b| **b == CR) {
                *byte = FILLER;
            }
            sentences.push(CandidateSentence::from_sanitized(&self.bytes));
        } else if !self.bytes.is_empty() {
            trace!(len = self.bytes.len(), "Discarding line without start marker");
        }

        self.bytes.clear();
    }
}

fn sanitize(byte: u8) -> u8 {
    match byte {
        CR | LF | 0x20..=0x7E => byte,
        _ => FILLER,
    }
}
