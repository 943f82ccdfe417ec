//! NMEA checksum verification
//!
//! The checksum is the XOR of every byte between `$` and `*`, written as two
//! hex digits after the `*`. Sentences without a suffix are reported as
//! [`ChecksumStatus::Missing`]; whether to trust them is the caller's policy.

use super::CandidateSentence;

/// Result of checking a sentence's checksum suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Suffix present and equal to the computed value
    Valid,
    /// No `*HH` suffix, sentence is unverifiable
    Missing,
    /// Suffix present but wrong, or not two hex digits (`expected` is `None`)
    Mismatch { expected: Option<u8>, computed: u8 },
}

impl ChecksumStatus {
    /// Whether the sentence may proceed to decoding under lenient policy.
    pub fn is_acceptable(self) -> bool {
        !matches!(self, ChecksumStatus::Mismatch { .. })
    }
}

/// XOR of all bytes in `payload`.
pub fn compute_checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Check the sentence's checksum suffix against its payload.
pub fn verify(sentence: &CandidateSentence) -> ChecksumStatus {
    let Some(suffix) = sentence.checksum_suffix() else {
        return ChecksumStatus::Missing;
    };

    let computed = compute_checksum(sentence.payload().as_bytes());
    let expected = parse_hex_pair(suffix);

    match expected {
        Some(value) if value == computed => ChecksumStatus::Valid,
        _ => ChecksumStatus::Mismatch { expected, computed },
    }
}

/// Accept valid and unverifiable sentences, reject mismatches.
pub fn validate(sentence: &CandidateSentence) -> bool {
    verify(sentence).is_acceptable()
}

fn parse_hex_pair(text: &str) -> Option<u8> {
    if text.len() != 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    fn sentence(text: &str) -> CandidateSentence {
        CandidateSentence::from_line(text).expect("framed sentence")
    }

    #[test]
    fn accepts_matching_checksum() {
        assert_eq!(verify(&sentence(GGA)), ChecksumStatus::Valid);
        assert!(validate(&sentence(GGA)));
    }

    #[test]
    fn hex_is_case_insensitive() {
        let lower = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6a";
        assert_eq!(verify(&sentence(lower)), ChecksumStatus::Valid);
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let corrupted = GGA.replace("*47", "*48");
        assert_eq!(
            verify(&sentence(&corrupted)),
            ChecksumStatus::Mismatch { expected: Some(0x48), computed: 0x47 }
        );
        assert!(!validate(&sentence(&corrupted)));
    }

    #[test]
    fn passes_sentence_without_checksum() {
        let bare = GGA.trim_end_matches("*47");
        assert_eq!(verify(&sentence(bare)), ChecksumStatus::Missing);
        assert!(validate(&sentence(bare)));
    }

    #[test]
    fn malformed_suffix_is_a_mismatch() {
        for suffix in ["*4", "*GG", "*471", "*"] {
            let text = GGA.replace("*47", suffix);
            assert!(
                matches!(verify(&sentence(&text)), ChecksumStatus::Mismatch { expected: None, .. }),
                "suffix {suffix} should be rejected"
            );
        }
    }

    #[test]
    fn noise_in_payload_breaks_checksum() {
        let noisy = GGA.replacen("4807", "48.7", 1);
        assert!(!validate(&sentence(&noisy)));
    }

    proptest! {
        #[test]
        fn computed_suffix_always_validates(payload in "[A-Z0-9,.]{1,70}") {
            let text = format!("${}*{:02X}", payload, compute_checksum(payload.as_bytes()));
            prop_assert_eq!(verify(&sentence(&text)), ChecksumStatus::Valid);
        }

        #[test]
        fn any_wrong_suffix_is_rejected(payload in "[A-Z0-9,.]{1,70}", delta in 1u8..=255) {
            let wrong = compute_checksum(payload.as_bytes()) ^ delta;
            let text = format!("${}*{:02X}", payload, wrong);
            prop_assert!(!validate(&sentence(&text)));
        }
    }
}
