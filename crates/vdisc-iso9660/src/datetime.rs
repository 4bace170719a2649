//! Recording timestamps.
//!
//! Volume descriptors use a 17-byte decimal form `YYYYMMDDhhmmsscc` plus an
//! offset byte; directory records and Rock Ridge `TF` entries use a 7-byte
//! binary form. Both end with an offset from UTC in 15-minute units: the
//! decimal form stores it biased by 50 (so 50 is UTC), the binary form as a
//! signed byte. Timestamps are always written in UTC.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{IsoError, IsoResult};

pub const DECIMAL_LEN: usize = 17;
pub const ENTRY_LEN: usize = 7;

/// Offset byte of a decimal timestamp recorded in UTC.
pub const DECIMAL_UTC_OFFSET: u8 = 50;

/// The decimal form meaning "not specified".
pub const UNSPECIFIED_DECIMAL: [u8; DECIMAL_LEN] = [
    b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0',
    0,
];

fn to_utc(
    year: i32,
    month: u32,
    day: u32,
    hms: (u32, u32, u32),
    nanos: u32,
    offset: i32,
) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_nano_opt(hms.0, hms.1, hms.2, nanos)?;
    let tz = FixedOffset::east_opt(offset * 15 * 60)?;
    tz.from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

pub fn encode_decimal(t: Option<&DateTime<Utc>>) -> [u8; DECIMAL_LEN] {
    let Some(t) = t.filter(|t| (1..=9999).contains(&t.year())) else {
        return UNSPECIFIED_DECIMAL;
    };
    let hundredths = (t.nanosecond() / 10_000_000).min(99);
    let digits = format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}{:02}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        hundredths
    );
    let mut out = [0u8; DECIMAL_LEN];
    out[..16].copy_from_slice(digits.as_bytes());
    out[16] = DECIMAL_UTC_OFFSET;
    out
}

/// Decode a decimal timestamp. The unspecified form (all `'0'` digits, or
/// all zero bytes) decodes to `None`.
pub fn decode_decimal(b: &[u8]) -> IsoResult<Option<DateTime<Utc>>> {
    let b = b
        .get(..DECIMAL_LEN)
        .ok_or_else(|| IsoError::format("truncated decimal datetime"))?;
    if b[..16].iter().all(|&c| c == b'0' || c == 0) {
        return Ok(None);
    }
    let digits = std::str::from_utf8(&b[..16])
        .ok()
        .filter(|s| s.bytes().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| IsoError::format("decimal datetime is not all digits"))?;
    let field = |range: std::ops::Range<usize>| -> u32 { digits[range].parse().unwrap_or(0) };
    to_utc(
        field(0..4) as i32,
        field(4..6),
        field(6..8),
        (field(8..10), field(10..12), field(12..14)),
        field(14..16) * 10_000_000,
        b[16] as i32 - DECIMAL_UTC_OFFSET as i32,
    )
    .map(Some)
    .ok_or_else(|| IsoError::format(format!("invalid decimal datetime {digits:?}")))
}

pub fn encode_entry(t: &DateTime<Utc>) -> [u8; ENTRY_LEN] {
    let year = (t.year() - 1900).clamp(0, 255) as u8;
    [
        year,
        t.month() as u8,
        t.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second().min(59) as u8,
        0,
    ]
}

/// Decode a 7-byte timestamp. An all-zero field, which some mastering tools
/// write for "unknown", decodes to the Unix epoch.
pub fn decode_entry(b: &[u8]) -> IsoResult<DateTime<Utc>> {
    let b = b
        .get(..ENTRY_LEN)
        .ok_or_else(|| IsoError::format("truncated entry datetime"))?;
    if b.iter().all(|&c| c == 0) {
        return Ok(DateTime::UNIX_EPOCH);
    }
    to_utc(
        1900 + b[0] as i32,
        b[1] as u32,
        b[2] as u32,
        (b[3] as u32, b[4] as u32, b[5] as u32),
        0,
        b[6] as i8 as i32,
    )
    .ok_or_else(|| IsoError::format(format!("invalid entry datetime {b:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn decimal_layout() {
        let t = at(2021, 3, 4, 5, 6, 7);
        let b = encode_decimal(Some(&t));
        assert_eq!(&b[..16], b"2021030405060700");
        assert_eq!(b[16], 50);
        assert_eq!(decode_decimal(&b).unwrap(), Some(t));
    }

    #[test]
    fn decimal_unspecified() {
        assert_eq!(encode_decimal(None), UNSPECIFIED_DECIMAL);
        assert_eq!(decode_decimal(&UNSPECIFIED_DECIMAL).unwrap(), None);
        assert_eq!(decode_decimal(&[0u8; 17]).unwrap(), None);
    }

    #[test]
    fn decimal_offset_is_applied() {
        let mut b = encode_decimal(Some(&at(2021, 1, 1, 12, 0, 0)));
        b[16] = 54; // UTC+1
        assert_eq!(decode_decimal(&b).unwrap(), Some(at(2021, 1, 1, 11, 0, 0)));
        b[16] = 42; // UTC-2
        assert_eq!(decode_decimal(&b).unwrap(), Some(at(2021, 1, 1, 14, 0, 0)));
    }

    #[test]
    fn entry_layout() {
        let t = at(2009, 12, 31, 23, 59, 58);
        let b = encode_entry(&t);
        assert_eq!(b, [109, 12, 31, 23, 59, 58, 0]);
        assert_eq!(decode_entry(&b).unwrap(), t);
    }

    #[test]
    fn entry_negative_offset() {
        let mut b = encode_entry(&at(2020, 6, 1, 0, 0, 0));
        b[6] = (-8i8) as u8; // UTC-2
        assert_eq!(decode_entry(&b).unwrap(), at(2020, 6, 1, 2, 0, 0));
    }

    #[test]
    fn invalid_entry() {
        assert!(decode_entry(&[100, 13, 1, 0, 0, 0, 0]).is_err());
        assert_eq!(decode_entry(&[0; 7]).unwrap(), DateTime::UNIX_EPOCH);
    }
}
