//! Sentence framing: raw chunks in, candidate NMEA sentences out.
//!
//! [`SentenceBuffer`] turns an arbitrarily chunked byte stream into
//! [`CandidateSentence`]s, and [`checksum`] decides which of them are
//! trustworthy enough to decode.

pub mod checksum;
mod reassembler;

pub use checksum::{ChecksumStatus, compute_checksum, validate, verify};
pub use reassembler::{DEFAULT_MAX_SENTENCE_LEN, FILLER, Reassembled, SentenceBuffer};

/// Start-of-sentence marker.
pub const START_MARKER: u8 = b'$';
/// Delimiter introducing the checksum suffix.
pub const CHECKSUM_DELIMITER: u8 = b'*';

/// Bytes delivered by the transport in a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    data: Box<[u8]>,
}

impl RawChunk {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for RawChunk {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for RawChunk {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

/// One framed sentence, `$` through the character before the line terminator.
///
/// Always starts with `$` and contains printable ASCII only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateSentence {
    text: String,
}

impl CandidateSentence {
    /// Wrap an already framed line such as `$GPGGA,...*47`.
    ///
    /// Returns `None` unless the line starts with `$` and is printable ASCII.
    pub fn from_line(line: &str) -> Option<Self> {
        let bytes = line.as_bytes();
        if bytes.len() < 2 || bytes[0] != START_MARKER {
            return None;
        }
        if !bytes.iter().all(|b| (0x20..=0x7E).contains(b)) {
            return None;
        }
        Some(Self { text: line.to_string() })
    }

    /// Built by the reassembler from sanitized bytes.
    pub(crate) fn from_sanitized(bytes: &[u8]) -> Self {
        Self { text: bytes.iter().map(|&b| b as char).collect() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Text between the start marker and the checksum delimiter (or the end).
    pub fn payload(&self) -> &str {
        let body = &self.text[1..];
        match body.find(CHECKSUM_DELIMITER as char) {
            Some(star) => &body[..star],
            None => body,
        }
    }

    /// Text after the checksum delimiter, if the sentence carries one.
    pub fn checksum_suffix(&self) -> Option<&str> {
        self.text.find(CHECKSUM_DELIMITER as char).map(|star| &self.text[star + 1..])
    }
}

impl std::fmt::Display for CandidateSentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_line_requires_marker_and_printable_text() {
        assert!(CandidateSentence::from_line("$GPGGA,1").is_some());
        assert!(CandidateSentence::from_line("GPGGA,1").is_none());
        assert!(CandidateSentence::from_line("$").is_none());
        assert!(CandidateSentence::from_line("$GP\tGGA").is_none());
    }

    #[test]
    fn payload_and_suffix_split_on_delimiter() {
        let sentence = CandidateSentence::from_line("$GPGLL,4916.45,N*2D").unwrap();
        assert_eq!(sentence.payload(), "GPGLL,4916.45,N");
        assert_eq!(sentence.checksum_suffix(), Some("2D"));

        let bare = CandidateSentence::from_line("$GPGLL,4916.45,N").unwrap();
        assert_eq!(bare.payload(), "GPGLL,4916.45,N");
        assert_eq!(bare.checksum_suffix(), None);
    }
}
