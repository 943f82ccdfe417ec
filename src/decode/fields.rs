//! Field-level parsers for NMEA text
//!
//! Every parser takes a non-empty field and returns `None` when the text is
//! malformed. Empty fields are handled by the caller, since an empty field is
//! a legitimate "no data yet" in NMEA rather than an error.

use chrono::{NaiveDate, NaiveTime};

/// Which coordinate a `ddmm.mmmm` field encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Latitude,
    Longitude,
}

/// Unsigned decimal such as `0.9` or `022.4`.
pub(crate) fn decimal(text: &str) -> Option<f64> {
    let mut digits = 0usize;
    let mut dots = 0usize;
    for b in text.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }
    text.parse().ok()
}

/// Decimal with an optional leading sign, for altitudes below sea level.
pub(crate) fn signed_decimal(text: &str) -> Option<f64> {
    match text.strip_prefix('-') {
        Some(rest) => decimal(rest).map(|v| -v),
        None => decimal(text.strip_prefix('+').unwrap_or(text)),
    }
}

/// Plain unsigned integer of any width.
pub(crate) fn integer<T: std::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere letter to signed degrees.
pub(crate) fn coordinate(value: &str, hemisphere: &str, axis: Axis) -> Option<f64> {
    let raw = decimal(value)?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return None;
    }

    let sign = match (axis, hemisphere) {
        (Axis::Latitude, "N") | (Axis::Longitude, "E") => 1.0,
        (Axis::Latitude, "S") | (Axis::Longitude, "W") => -1.0,
        _ => return None,
    };

    Some(sign * (degrees + minutes / 60.0))
}

/// `hhmmss` with optional fractional seconds.
pub(crate) fn time_of_day(text: &str) -> Option<NaiveTime> {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    if whole.len() != 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hour: u32 = whole[0..2].parse().ok()?;
    let minute: u32 = whole[2..4].parse().ok()?;
    let second: u32 = whole[4..6].parse().ok()?;

    let nanos = match fraction {
        None => 0,
        Some(digits) => {
            if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            let value: u32 = digits.parse().ok()?;
            value * 10u32.pow(9 - digits.len() as u32)
        }
    };

    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
}

/// `ddmmyy`; two-digit years 80-99 are 19xx, the rest 20xx.
pub(crate) fn date(text: &str) -> Option<NaiveDate> {
    if text.len() != 6 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = text[0..2].parse().ok()?;
    let month: u32 = text[2..4].parse().ok()?;
    let yy: i32 = text[4..6].parse().ok()?;
    let year = if yy >= 80 { 1900 + yy } else { 2000 + yy };

    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn converts_degrees_and_minutes() {
        let lat = coordinate("4807.038", "N", Axis::Latitude).unwrap();
        let lon = coordinate("01131.000", "E", Axis::Longitude).unwrap();
        assert!((lat - 48.1173).abs() < 1e-4);
        assert!((lon - 11.516_666).abs() < 1e-4);
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        let lat = coordinate("3351.000", "S", Axis::Latitude).unwrap();
        let lon = coordinate("15112.000", "W", Axis::Longitude).unwrap();
        assert!((lat + 33.85).abs() < 1e-9);
        assert!((lon + 151.2).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert_eq!(coordinate("48x7.038", "N", Axis::Latitude), None);
        assert_eq!(coordinate("4867.000", "N", Axis::Latitude), None);
        assert_eq!(coordinate("4807.038", "E", Axis::Latitude), None);
        assert_eq!(coordinate("01131.000", "n", Axis::Longitude), None);
        assert_eq!(coordinate("-4807.038", "N", Axis::Latitude), None);
        assert_eq!(coordinate("48.07.038", "N", Axis::Latitude), None);
    }

    #[test]
    fn parses_time_with_fraction() {
        assert_eq!(time_of_day("123519"), NaiveTime::from_hms_opt(12, 35, 19));
        assert_eq!(time_of_day("123519.25"), NaiveTime::from_hms_milli_opt(12, 35, 19, 250));
        assert_eq!(time_of_day("246000"), None);
        assert_eq!(time_of_day("1235"), None);
        assert_eq!(time_of_day("123519."), None);
    }

    #[test]
    fn parses_date_with_century_pivot() {
        assert_eq!(date("230394"), NaiveDate::from_ymd_opt(1994, 3, 23));
        assert_eq!(date("010125"), NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(date("310225"), None);
    }

    #[test]
    fn numbers_reject_signs_and_words() {
        assert_eq!(decimal("inf"), None);
        assert_eq!(decimal("NaN"), None);
        assert_eq!(decimal("."), None);
        assert_eq!(signed_decimal("-12.5"), Some(-12.5));
        assert_eq!(integer::<u8>("08"), Some(8));
        assert_eq!(integer::<u8>("300"), None);
        assert_eq!(integer::<u8>("+1"), None);
    }

    proptest! {
        #[test]
        fn parsers_never_panic(text in ".{0,24}", hemi in ".{0,2}") {
            let _ = decimal(&text);
            let _ = signed_decimal(&text);
            let _ = integer::<u8>(&text);
            let _ = time_of_day(&text);
            let _ = date(&text);
            let _ = coordinate(&text, &hemi, Axis::Latitude);
        }

        #[test]
        fn latitudes_stay_within_minutes_bound(value in "[0-9]{1,6}(\\.[0-9]{1,4})?") {
            if let Some(lat) = coordinate(&value, "N", Axis::Latitude) {
                let raw: f64 = value.parse().unwrap();
                prop_assert!(lat >= 0.0);
                prop_assert!(lat <= raw / 100.0 + 1.0);
            }
        }
    }
}
