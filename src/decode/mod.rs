//! Sentence-to-fix decoding.
//!
//! [`FixDecoder`] recognises the position-bearing sentences (`GGA`, `RMC`,
//! `GLL`) from any talker and turns them into validated [`Fix`] values.
//! Decoding is all-or-nothing per sentence: a sentence either yields a
//! complete fix or nothing.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use gpsrelay::decode::FixDecoder;
//! use gpsrelay::sentence::CandidateSentence;
//!
//! let mut decoder = FixDecoder::with_reference_date(NaiveDate::from_ymd_opt(2024, 3, 23).unwrap());
//! let sentence = CandidateSentence::from_line(
//!     "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
//! )
//! .unwrap();
//!
//! let fix = decoder.decode(&sentence).expect("position sentence");
//! assert!((fix.latitude() - 48.1173).abs() < 1e-4);
//! assert!((fix.longitude() - 11.5167).abs() < 1e-4);
//! ```

mod fields;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::trace;

use crate::sentence::CandidateSentence;
use crate::types::{Fix, FixError, FixQuality, FixSource};
use fields::Axis;

/// Knots to metres per second.
const KNOTS_TO_MPS: f64 = 1852.0 / 3600.0;

/// Sentence types the decoder knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentenceType {
    /// Fix data: time, position, quality
    Gga,
    /// Recommended minimum: time, date, position, speed, course
    Rmc,
    /// Geographic position: position, time, status
    Gll,
    Gsa,
    Gsv,
    Vtg,
    Zda,
    Txt,
    Gst,
}

impl SentenceType {
    /// Look up the three-letter formatter, e.g. `GGA`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "GGA" => Some(SentenceType::Gga),
            "RMC" => Some(SentenceType::Rmc),
            "GLL" => Some(SentenceType::Gll),
            "GSA" => Some(SentenceType::Gsa),
            "GSV" => Some(SentenceType::Gsv),
            "VTG" => Some(SentenceType::Vtg),
            "ZDA" => Some(SentenceType::Zda),
            "TXT" => Some(SentenceType::Txt),
            "GST" => Some(SentenceType::Gst),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            SentenceType::Gga => "GGA",
            SentenceType::Rmc => "RMC",
            SentenceType::Gll => "GLL",
            SentenceType::Gsa => "GSA",
            SentenceType::Gsv => "GSV",
            SentenceType::Vtg => "VTG",
            SentenceType::Zda => "ZDA",
            SentenceType::Txt => "TXT",
            SentenceType::Gst => "GST",
        }
    }

    /// Whether this type can produce a [`Fix`].
    pub fn carries_position(self) -> bool {
        matches!(self, SentenceType::Gga | SentenceType::Rmc | SentenceType::Gll)
    }
}

impl std::fmt::Display for SentenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A position sentence whose fields could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{sentence} has {found} fields, expected at least {expected}")]
    TooFewFields { sentence: SentenceType, expected: usize, found: usize },

    #[error("{sentence} field '{field}' is malformed: {value:?}")]
    MalformedField { sentence: SentenceType, field: &'static str, value: String },

    #[error("{sentence} decoded to an invalid fix: {source}")]
    InvalidFix {
        sentence: SentenceType,
        #[source]
        source: FixError,
    },
}

/// Split talker + formatter, e.g. `GNRMC` into `("GN", Rmc)`.
pub fn parse_address(address: &str) -> Option<(&str, SentenceType)> {
    if address.len() != 5 || !address.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return None;
    }
    let (talker, code) = address.split_at(2);
    if talker.starts_with('P') {
        // Proprietary sentences have no standard formatter
        return None;
    }
    SentenceType::from_code(code).map(|kind| (talker, kind))
}

/// Stateful decoder from candidate sentences to fixes.
///
/// The state is the date context: GGA and GLL sentences only carry a time of
/// day, so they are dated from the most recent RMC.
#[derive(Debug, Clone, Default)]
pub struct FixDecoder {
    last_dated: Option<DateTime<Utc>>,
    reference_date: Option<NaiveDate>,
}

impl FixDecoder {
    /// Decoder that dates time-only sentences with today's UTC date until an
    /// RMC sentence has been seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that uses `date` instead of the system clock for time-only
    /// sentences seen before the first RMC.
    pub fn with_reference_date(date: NaiveDate) -> Self {
        Self { last_dated: None, reference_date: Some(date) }
    }

    /// Decode a sentence, or `None` if it carries no usable position.
    pub fn decode(&mut self, sentence: &CandidateSentence) -> Option<Fix> {
        self.try_decode(sentence).ok().flatten()
    }

    /// Decode a sentence, distinguishing "no position here" (`Ok(None)`)
    /// from a position sentence with malformed fields (`Err`).
    pub fn try_decode(&mut self, sentence: &CandidateSentence) -> Result<Option<Fix>, DecodeError> {
        let items: Vec<&str> = sentence.payload().split(',').collect();

        let Some((talker, kind)) = parse_address(items[0]) else {
            trace!(sentence = %sentence, "Unrecognised sentence type");
            return Ok(None);
        };

        let fields = Fields { kind, items };
        match kind {
            SentenceType::Gga => self.decode_gga(&fields),
            SentenceType::Rmc => self.decode_rmc(&fields),
            SentenceType::Gll => self.decode_gll(&fields),
            _ => {
                trace!(talker, kind = %kind, "Sentence carries no position");
                Ok(None)
            }
        }
    }

    /// The date context learned from the last RMC sentence, if any.
    pub fn last_dated(&self) -> Option<DateTime<Utc>> {
        self.last_dated
    }

    fn decode_gga(&mut self, fields: &Fields<'_>) -> Result<Option<Fix>, DecodeError> {
        fields.require_len(10)?;

        let Some(code) = fields.value(6, "quality", fields::integer::<u8>)? else {
            return Ok(None);
        };
        if code == 0 {
            return Ok(None);
        }
        let quality = FixQuality::from_gga_code(code)
            .ok_or_else(|| fields.malformed(6, "quality"))?;

        let Some(time) = fields.value(1, "time", fields::time_of_day)? else {
            return Ok(None);
        };
        let Some(latitude) = fields.coordinate(2, 3, Axis::Latitude)? else {
            return Ok(None);
        };
        let Some(longitude) = fields.coordinate(4, 5, Axis::Longitude)? else {
            return Ok(None);
        };
        let satellites = fields.value(7, "satellites", fields::integer::<u8>)?;
        let hdop = fields.value(8, "hdop", fields::decimal)?;
        let altitude = fields.value(9, "altitude", fields::signed_decimal)?;

        let timestamp = self.date_time_of_day(time);
        let fix = Fix::builder(latitude, longitude, timestamp, quality, FixSource::Gga)
            .satellites(satellites)
            .hdop(hdop)
            .altitude(altitude)
            .build();

        fields.finish(fix)
    }

    fn decode_rmc(&mut self, fields: &Fields<'_>) -> Result<Option<Fix>, DecodeError> {
        fields.require_len(10)?;

        let time = fields.value(1, "time", fields::time_of_day)?;
        let date = fields.value(9, "date", fields::date)?;
        let (Some(time), Some(date)) = (time, date) else {
            return Ok(None);
        };
        let timestamp = date.and_time(time).and_utc();
        self.last_dated = Some(timestamp);

        match fields.get(2) {
            "A" => {}
            "V" | "" => return Ok(None),
            _ => return Err(fields.malformed(2, "status")),
        }

        let Some(quality) = fields.mode(12)? else {
            return Ok(None);
        };
        let Some(latitude) = fields.coordinate(3, 4, Axis::Latitude)? else {
            return Ok(None);
        };
        let Some(longitude) = fields.coordinate(5, 6, Axis::Longitude)? else {
            return Ok(None);
        };
        let speed = fields.value(7, "speed", fields::decimal)?.map(|knots| knots * KNOTS_TO_MPS);
        let course = fields.value(8, "course", fields::decimal)?;

        let fix = Fix::builder(latitude, longitude, timestamp, quality, FixSource::Rmc)
            .speed(speed)
            .course(course)
            .build();

        fields.finish(fix)
    }

    fn decode_gll(&mut self, fields: &Fields<'_>) -> Result<Option<Fix>, DecodeError> {
        fields.require_len(7)?;

        match fields.get(6) {
            "A" => {}
            "V" | "" => return Ok(None),
            _ => return Err(fields.malformed(6, "status")),
        }

        let Some(quality) = fields.mode(7)? else {
            return Ok(None);
        };
        let Some(time) = fields.value(5, "time", fields::time_of_day)? else {
            return Ok(None);
        };
        let Some(latitude) = fields.coordinate(1, 2, Axis::Latitude)? else {
            return Ok(None);
        };
        let Some(longitude) = fields.coordinate(3, 4, Axis::Longitude)? else {
            return Ok(None);
        };

        let timestamp = self.date_time_of_day(time);
        let fix = Fix::builder(latitude, longitude, timestamp, quality, FixSource::Gll).build();

        fields.finish(fix)
    }

    fn date_time_of_day(&self, time: NaiveTime) -> DateTime<Utc> {
        let Some(last) = self.last_dated else {
            let date = self.reference_date.unwrap_or_else(|| Utc::now().date_naive());
            return date.and_time(time).and_utc();
        };

        let candidate = last.date_naive().and_time(time).and_utc();
        let half_day = TimeDelta::hours(12);
        if last - candidate > half_day {
            // Time-of-day wrapped past midnight since the last RMC
            candidate + TimeDelta::days(1)
        } else if candidate - last > half_day {
            candidate - TimeDelta::days(1)
        } else {
            candidate
        }
    }
}

/// Comma-separated fields of one sentence, index 0 being the address.
struct Fields<'a> {
    kind: SentenceType,
    items: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn get(&self, index: usize) -> &'a str {
        self.items.get(index).copied().unwrap_or("")
    }

    fn require_len(&self, expected: usize) -> Result<(), DecodeError> {
        if self.items.len() < expected {
            return Err(DecodeError::TooFewFields {
                sentence: self.kind,
                expected,
                found: self.items.len(),
            });
        }
        Ok(())
    }

    fn malformed(&self, index: usize, field: &'static str) -> DecodeError {
        DecodeError::MalformedField { sentence: self.kind, field, value: self.get(index).to_string() }
    }

    /// Empty field is `Ok(None)`, malformed text is an error.
    fn value<T>(
        &self,
        index: usize,
        field: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, DecodeError> {
        let text = self.get(index);
        if text.is_empty() {
            return Ok(None);
        }
        parse(text).map(Some).ok_or_else(|| self.malformed(index, field))
    }

    fn coordinate(
        &self,
        value: usize,
        hemisphere: usize,
        axis: Axis,
    ) -> Result<Option<f64>, DecodeError> {
        let (text, hemi) = (self.get(value), self.get(hemisphere));
        if text.is_empty() || hemi.is_empty() {
            return Ok(None);
        }
        let field = match axis {
            Axis::Latitude => "latitude",
            Axis::Longitude => "longitude",
        };
        fields::coordinate(text, hemi, axis).map(Some).ok_or_else(|| self.malformed(value, field))
    }

    /// Mode indicator; absent on pre-2.3 receivers, which means autonomous.
    fn mode(&self, index: usize) -> Result<Option<FixQuality>, DecodeError> {
        let text = self.get(index);
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(Some(FixQuality::Gps)),
            (Some('N'), None) => Ok(None),
            (Some(mode), None) => {
                FixQuality::from_mode_indicator(mode).map(Some).ok_or_else(|| self.malformed(index, "mode"))
            }
            _ => Err(self.malformed(index, "mode")),
        }
    }

    fn finish(&self, fix: Result<Fix, FixError>) -> Result<Option<Fix>, DecodeError> {
        fix.map(Some).map_err(|source| DecodeError::InvalidFix { sentence: self.kind, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::compute_checksum;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    fn framed(payload: &str) -> CandidateSentence {
        let text = format!("${}*{:02X}", payload, compute_checksum(payload.as_bytes()));
        CandidateSentence::from_line(&text).unwrap()
    }

    fn decoder() -> FixDecoder {
        FixDecoder::with_reference_date(NaiveDate::from_ymd_opt(2024, 3, 23).unwrap())
    }

    #[test]
    fn decodes_gga() {
        let fix = decoder().decode(&CandidateSentence::from_line(GGA).unwrap()).unwrap();

        assert!((fix.latitude() - 48.1173).abs() < 1e-4);
        assert!((fix.longitude() - 11.5167).abs() < 1e-4);
        assert_eq!(fix.quality(), FixQuality::Gps);
        assert_eq!(fix.source(), FixSource::Gga);
        assert_eq!(fix.satellites(), Some(8));
        assert_eq!(fix.hdop(), Some(0.9));
        assert_eq!(fix.altitude(), Some(545.4));
        assert_eq!(fix.timestamp(), Utc.with_ymd_and_hms(2024, 3, 23, 12, 35, 19).unwrap());
    }

    #[test]
    fn decodes_rmc_with_motion_and_date() {
        let mut decoder = decoder();
        let fix = decoder.decode(&CandidateSentence::from_line(RMC).unwrap()).unwrap();

        assert_eq!(fix.timestamp(), Utc.with_ymd_and_hms(1994, 3, 23, 12, 35, 19).unwrap());
        assert!((fix.speed().unwrap() - 22.4 * KNOTS_TO_MPS).abs() < 1e-9);
        assert_eq!(fix.course(), Some(84.4));
        assert_eq!(decoder.last_dated(), Some(fix.timestamp()));
    }

    #[test]
    fn decodes_gll_from_other_talkers() {
        let fix = decoder().decode(&framed("GNGLL,4916.45,N,12311.12,W,225444,A,D")).unwrap();
        assert!((fix.latitude() - 49.274_166).abs() < 1e-4);
        assert!((fix.longitude() + 123.185_333).abs() < 1e-4);
        assert_eq!(fix.quality(), FixQuality::DGps);
        assert_eq!(fix.source(), FixSource::Gll);
    }

    #[test]
    fn time_only_sentences_take_date_from_rmc() {
        let mut decoder = decoder();
        decoder.decode(&framed("GPRMC,235959,A,4807.038,N,01131.000,E,,,311224,,")).unwrap();

        let after_midnight = decoder
            .decode(&framed("GPGGA,000001,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"))
            .unwrap();
        assert_eq!(after_midnight.timestamp(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap());

        let same_day = decoder
            .decode(&framed("GPGGA,235958,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"))
            .unwrap();
        assert_eq!(same_day.timestamp(), Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap());
    }

    #[test]
    fn empty_latitude_yields_no_fix() {
        let sentence = framed("GPGGA,123519,,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert_eq!(decoder().try_decode(&sentence), Ok(None));
    }

    #[test]
    fn no_fix_indicators_yield_none() {
        let mut decoder = decoder();
        let cases = [
            "GPGGA,123519,4807.038,N,01131.000,E,0,00,,,M,,M,,",
            "GPGGA,,,,,,,,,,,,,,",
            "GPRMC,123519,V,,,,,,,230394,,",
            "GPRMC,123519,A,4807.038,N,01131.000,E,,,230394,,,N",
            "GPGLL,,,,,225444,V,N",
        ];
        for payload in cases {
            assert_eq!(decoder.try_decode(&framed(payload)), Ok(None), "{payload}");
        }
    }

    #[test]
    fn irrelevant_and_unknown_sentences_yield_none() {
        let mut decoder = decoder();
        for payload in [
            "GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00",
            "GPVTG,054.7,T,034.4,M,005.5,N,010.2,K",
            "PUBX,00,081350.00,4717.113210,N",
            "GPXYZ,1,2,3",
            "garbage",
        ] {
            assert_eq!(decoder.try_decode(&framed(payload)), Ok(None), "{payload}");
        }
    }

    #[test]
    fn malformed_numbers_reject_whole_sentence() {
        let mut decoder = decoder();
        let err = decoder
            .try_decode(&framed("GPGGA,123519,48O7.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedField { field: "latitude", .. }));

        let err = decoder
            .try_decode(&framed("GPRMC,123519,A,4807.038,N,01131.000,E,fast,084.4,230394,003.1,W"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedField { field: "speed", .. }));

        let err = decoder.try_decode(&framed("GPGGA,123519,4807.038,N")).unwrap_err();
        assert!(matches!(err, DecodeError::TooFewFields { expected: 10, found: 4, .. }));
    }

    #[test]
    fn out_of_range_coordinates_are_invalid_fixes() {
        let err = decoder()
            .try_decode(&framed("GPGGA,123519,9107.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFix { source: FixError::LatitudeOutOfRange(_), .. }));
    }

    #[test]
    fn address_parsing() {
        assert_eq!(parse_address("GNRMC"), Some(("GN", SentenceType::Rmc)));
        assert_eq!(parse_address("BDGSA"), Some(("BD", SentenceType::Gsa)));
        assert_eq!(parse_address("PGRME"), None);
        assert_eq!(parse_address("GPGGAX"), None);
        assert!(!SentenceType::Vtg.carries_position());
    }

    proptest! {
        #[test]
        fn fuzzed_fields_never_break_coordinate_invariant(
            time in "[0-9]{0,7}(\\.[0-9]{0,3})?",
            lat in "[0-9.]{0,10}",
            ns in "[NSEW]?",
            lon in "[0-9.]{0,11}",
            ew in "[NSEW]?",
            quality in "[0-9]?",
            altitude in "-?[0-9.]{0,6}",
        ) {
            let payload = format!(
                "GPGGA,{time},{lat},{ns},{lon},{ew},{quality},08,0.9,{altitude},M,46.9,M,,"
            );
            if let Ok(Some(fix)) = decoder().try_decode(&framed(&payload)) {
                prop_assert!((-90.0..=90.0).contains(&fix.latitude()));
                prop_assert!((-180.0..=180.0).contains(&fix.longitude()));
            }
        }

        #[test]
        fn arbitrary_text_never_panics(body in "[ -~]{0,90}") {
            if let Some(sentence) = CandidateSentence::from_line(&format!("${body}")) {
                let _ = decoder().try_decode(&sentence);
            }
        }
    }
}
