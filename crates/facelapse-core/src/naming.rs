//! On-disk naming of photos and timelapse artifacts.
//!
//! Photos: `face_<DDMMYYYY>_<HHMMSS>.jpg`.
//! Videos: `face_timelapse_<DDMMYYYY>_to_<DDMMYYYY>.mp4`.
//! Both numeric fields are fixed-width and zero-padded; renaming this scheme
//! orphans every existing photo from the catalog.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const PHOTO_PREFIX: &str = "face_";
const PHOTO_EXTENSION: &str = ".jpg";
const TIMELAPSE_PREFIX: &str = "face_timelapse_";
const TIMELAPSE_EXTENSION: &str = ".mp4";

/// Filename for a photo captured at `timestamp` (second resolution).
pub fn photo_file_name(timestamp: NaiveDateTime) -> String {
    format!(
        "{PHOTO_PREFIX}{}{PHOTO_EXTENSION}",
        timestamp.format("%d%m%Y_%H%M%S")
    )
}

/// Parse a photo filename back into its capture timestamp.
///
/// Returns `None` unless the name matches the fixed-width format exactly and
/// encodes a valid calendar date and time of day.
pub fn parse_photo_file_name(name: &str) -> Option<NaiveDateTime> {
    let stem = name
        .strip_prefix(PHOTO_PREFIX)?
        .strip_suffix(PHOTO_EXTENSION)?;
    let (date, time) = stem.split_once('_')?;

    let [day, month, year] = split_digits(date, [2, 2, 4])?;
    let [hour, minute, second] = split_digits(time, [2, 2, 2])?;

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(date.and_time(time))
}

/// Filename for a timelapse covering `start..=end`.
pub fn timelapse_file_name(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{TIMELAPSE_PREFIX}{}_to_{}{TIMELAPSE_EXTENSION}",
        start.format("%d%m%Y"),
        end.format("%d%m%Y")
    )
}

/// Split an ASCII-digit string into fixed-width numeric fields.
fn split_digits<const N: usize>(s: &str, widths: [usize; N]) -> Option<[u32; N]> {
    if s.len() != widths.iter().sum::<usize>() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut out = [0u32; N];
    let mut offset = 0;
    for (slot, width) in out.iter_mut().zip(widths) {
        *slot = s[offset..offset + width].parse().ok()?;
        offset += width;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn at(d: u32, m: u32, y: i32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[test]
    fn test_photo_name_round_trip() {
        let ts = at(31, 12, 2024, 23, 59, 59);
        let name = photo_file_name(ts);
        assert_eq!(name, "face_31122024_235959.jpg");

        let parsed = parse_photo_file_name(&name).unwrap();
        assert_eq!(
            (parsed.day(), parsed.month(), parsed.year(), parsed.hour(), parsed.minute(), parsed.second()),
            (31, 12, 2024, 23, 59, 59)
        );
    }

    #[test]
    fn test_photo_name_zero_padded() {
        assert_eq!(photo_file_name(at(1, 2, 2024, 3, 4, 5)), "face_01022024_030405.jpg");
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for name in [
            "face_3112024_235959.jpg",   // short date
            "face_31122024_23595.jpg",   // short time
            "face_31122024_235959.png",  // wrong extension
            "photo_31122024_235959.jpg", // wrong prefix
            "face_31122024.jpg",         // no time
            "face_3112202a_235959.jpg",  // non-digit
            "face_32122024_235959.jpg",  // invalid day
            "face_29022023_120000.jpg",  // not a leap year
            "face_31122024_246000.jpg",  // invalid time
            "face_+1122024_235959.jpg",  // sign
            "face_timelapse_01012024_to_02012024.mp4",
        ] {
            assert!(parse_photo_file_name(name).is_none(), "{name} should not parse");
        }
    }

    #[test]
    fn test_parse_accepts_leap_day() {
        assert_eq!(
            parse_photo_file_name("face_29022024_070809.jpg"),
            Some(at(29, 2, 2024, 7, 8, 9))
        );
    }

    #[test]
    fn test_timelapse_name() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(
            timelapse_file_name(start, end),
            "face_timelapse_05012024_to_01022024.mp4"
        );
    }
}
