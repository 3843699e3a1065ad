//! Scalar field converters.
//!
//! A [`Field`](crate::fix::fieldmap::Field) stores its value as raw bytes; these functions
//! interpret those bytes as the FIX scalar types and render typed values back to bytes. All
//! parsers return [`Result<_, ConvertError>`](ConvertError); all generators append to a
//! caller-provided buffer rather than allocating, matching the crate's existing
//! [`SerializedInt`](crate::fix::encode::SerializedInt) convention.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvertError {
    #[error("empty value")]
    Empty,
    #[error("not a valid integer: {0:?}")]
    InvalidInt(Vec<u8>),
    #[error("not a valid unsigned integer: {0:?}")]
    InvalidUnsigned(Vec<u8>),
    #[error("not a valid checksum: {0:?}")]
    InvalidChecksum(Vec<u8>),
    #[error("not a valid double: {0:?}")]
    InvalidDouble(Vec<u8>),
    #[error("not a single printable-ASCII char: {0:?}")]
    InvalidChar(Vec<u8>),
    #[error("not a valid bool (expected Y or N): {0:?}")]
    InvalidBool(Vec<u8>),
    #[error("not a valid UTC timestamp: {0:?}")]
    InvalidTimestamp(Vec<u8>),
    #[error("not a valid UTC date: {0:?}")]
    InvalidDate(Vec<u8>),
    #[error("not a valid UTC time: {0:?}")]
    InvalidTime(Vec<u8>),
    #[error("embedded SOH in non-data field")]
    EmbeddedSoh,
}

/// Signed base-10 integer. Rejects empty input and any non-digit byte except a leading `-`.
pub fn parse_int(bytes: &[u8]) -> Result<i64, ConvertError> {
    if bytes.is_empty() {
        return Err(ConvertError::Empty);
    }
    let s = std::str::from_utf8(bytes).map_err(|_| ConvertError::InvalidInt(bytes.to_vec()))?;
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConvertError::InvalidInt(bytes.to_vec()));
    }
    s.parse::<i64>()
        .map_err(|_| ConvertError::InvalidInt(bytes.to_vec()))
}

pub fn write_int(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(v.to_string().as_bytes());
}

/// Non-negative base-10 integer, used for counts and lengths.
pub fn parse_uint(bytes: &[u8]) -> Result<u64, ConvertError> {
    if bytes.is_empty() {
        return Err(ConvertError::Empty);
    }
    if !bytes.iter().all(|b| b.is_ascii_digit()) {
        return Err(ConvertError::InvalidUnsigned(bytes.to_vec()));
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| ConvertError::InvalidUnsigned(bytes.to_vec()))
}

pub fn write_uint(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(v.to_string().as_bytes());
}

/// Exactly three digits, numerically less than 256.
pub fn parse_checksum(bytes: &[u8]) -> Result<u8, ConvertError> {
    if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_digit()) {
        return Err(ConvertError::InvalidChecksum(bytes.to_vec()));
    }
    let v: u32 = std::str::from_utf8(bytes).unwrap().parse().unwrap();
    if v >= 256 {
        return Err(ConvertError::InvalidChecksum(bytes.to_vec()));
    }
    Ok(v as u8)
}

pub fn write_checksum(buf: &mut Vec<u8>, v: u8) {
    buf.extend_from_slice(format!("{:03}", v).as_bytes());
}

/// Optional leading `-`, digits, optional `.` and fractional digits. No exponent, no thousands
/// separators. Maximum 15 fractional digits.
pub fn parse_double(bytes: &[u8]) -> Result<f64, ConvertError> {
    if bytes.is_empty() {
        return Err(ConvertError::InvalidDouble(bytes.to_vec()));
    }
    let s = std::str::from_utf8(bytes).map_err(|_| ConvertError::InvalidDouble(bytes.to_vec()))?;
    let body = s.strip_prefix('-').unwrap_or(s);
    let mut parts = body.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConvertError::InvalidDouble(bytes.to_vec()));
    }
    if let Some(frac) = frac_part {
        if frac.len() > 15 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConvertError::InvalidDouble(bytes.to_vec()));
        }
    }
    s.parse::<f64>()
        .map_err(|_| ConvertError::InvalidDouble(bytes.to_vec()))
}

/// Renders with a fixed number of fractional digits, half-to-even rounding, capped at 15.
pub fn write_double(buf: &mut Vec<u8>, v: f64, fractional_digits: usize) {
    let digits = fractional_digits.min(15);
    buf.extend_from_slice(format!("{:.*}", digits, v).as_bytes());
}

/// Exactly one byte in the printable-ASCII range (32, 127) exclusive per spec.md.
pub fn parse_char(bytes: &[u8]) -> Result<char, ConvertError> {
    if bytes.len() != 1 || bytes[0] <= 32 || bytes[0] >= 127 {
        return Err(ConvertError::InvalidChar(bytes.to_vec()));
    }
    Ok(bytes[0] as char)
}

pub fn write_char(buf: &mut Vec<u8>, v: char) {
    buf.push(v as u8);
}

pub fn parse_bool(bytes: &[u8]) -> Result<bool, ConvertError> {
    match bytes {
        b"Y" => Ok(true),
        b"N" => Ok(false),
        _ => Err(ConvertError::InvalidBool(bytes.to_vec())),
    }
}

pub fn write_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(if v { b'Y' } else { b'N' });
}

const TIMESTAMP_SHORT: &str = "%Y%m%d-%H:%M:%S";
const TIMESTAMP_LONG: &str = "%Y%m%d-%H:%M:%S%.3f";

/// `YYYYMMDD-HH:MM:SS` (17 bytes) or `YYYYMMDD-HH:MM:SS.sss` (21 bytes).
pub fn parse_utc_timestamp(bytes: &[u8]) -> Result<DateTime<Utc>, ConvertError> {
    let s =
        std::str::from_utf8(bytes).map_err(|_| ConvertError::InvalidTimestamp(bytes.to_vec()))?;
    let fmt = match bytes.len() {
        17 => TIMESTAMP_SHORT,
        21 => TIMESTAMP_LONG,
        _ => return Err(ConvertError::InvalidTimestamp(bytes.to_vec())),
    };
    NaiveDateTime::parse_from_str(s, fmt)
        .map(|n| n.and_utc())
        .map_err(|_| ConvertError::InvalidTimestamp(bytes.to_vec()))
}

pub fn write_utc_timestamp(buf: &mut Vec<u8>, v: DateTime<Utc>, with_millis: bool) {
    let fmt = if with_millis {
        TIMESTAMP_LONG
    } else {
        TIMESTAMP_SHORT
    };
    buf.extend_from_slice(v.format(fmt).to_string().as_bytes());
}

/// `YYYYMMDD` (8 bytes).
pub fn parse_utc_date(bytes: &[u8]) -> Result<NaiveDate, ConvertError> {
    if bytes.len() != 8 {
        return Err(ConvertError::InvalidDate(bytes.to_vec()));
    }
    let s = std::str::from_utf8(bytes).map_err(|_| ConvertError::InvalidDate(bytes.to_vec()))?;
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| ConvertError::InvalidDate(bytes.to_vec()))
}

pub fn write_utc_date(buf: &mut Vec<u8>, v: NaiveDate) {
    buf.extend_from_slice(v.format("%Y%m%d").to_string().as_bytes());
}

/// `HH:MM:SS` or `HH:MM:SS.sss`.
pub fn parse_utc_time(bytes: &[u8]) -> Result<NaiveTime, ConvertError> {
    let s = std::str::from_utf8(bytes).map_err(|_| ConvertError::InvalidTime(bytes.to_vec()))?;
    let fmt = match bytes.len() {
        8 => "%H:%M:%S",
        12 => "%H:%M:%S%.3f",
        _ => return Err(ConvertError::InvalidTime(bytes.to_vec())),
    };
    NaiveTime::parse_from_str(s, fmt).map_err(|_| ConvertError::InvalidTime(bytes.to_vec()))
}

pub fn write_utc_time(buf: &mut Vec<u8>, v: NaiveTime, with_millis: bool) {
    let fmt = if with_millis { "%H:%M:%S%.3f" } else { "%H:%M:%S" };
    buf.extend_from_slice(v.format(fmt).to_string().as_bytes());
}

/// Identity conversion; only checked for an embedded SOH, since non-data strings may not carry
/// one.
pub fn parse_string(bytes: &[u8]) -> Result<&[u8], ConvertError> {
    if bytes.contains(&1u8) {
        return Err(ConvertError::EmbeddedSoh);
    }
    Ok(bytes)
}

pub fn write_string(buf: &mut Vec<u8>, v: &[u8]) {
    buf.extend_from_slice(v);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(b"123").unwrap(), 123);
        assert_eq!(parse_int(b"-123").unwrap(), -123);
        assert!(parse_int(b"").is_err());
        assert!(parse_int(b"12a").is_err());
        assert!(parse_int(b"-").is_err());
    }

    #[test]
    fn test_parse_uint() {
        assert_eq!(parse_uint(b"0").unwrap(), 0);
        assert!(parse_uint(b"-1").is_err());
    }

    #[test]
    fn test_parse_checksum() {
        assert_eq!(parse_checksum(b"001").unwrap(), 1);
        assert!(parse_checksum(b"256").is_err());
        assert!(parse_checksum(b"12").is_err());
        assert!(parse_checksum(b"abc").is_err());
    }

    #[test]
    fn test_parse_double() {
        assert_eq!(parse_double(b"12.3456").unwrap(), 12.3456);
        assert_eq!(parse_double(b"-12.34").unwrap(), -12.34);
        assert!(parse_double(b"12.3e5").is_err());
        assert!(parse_double(b"1,234").is_err());
    }

    #[test]
    fn test_parse_char() {
        assert_eq!(parse_char(b"Y").unwrap(), 'Y');
        assert!(parse_char(b"").is_err());
        assert!(parse_char(b"YY").is_err());
        assert!(parse_char(&[1]).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(b"Y").unwrap());
        assert!(!parse_bool(b"N").unwrap());
        assert!(parse_bool(b"y").is_err());
    }

    #[test]
    fn test_parse_utc_timestamp() {
        let dt = parse_utc_timestamp(b"20250101-00:00:00").unwrap();
        assert_eq!(dt.format("%Y%m%d-%H:%M:%S").to_string(), "20250101-00:00:00");
        let dt2 = parse_utc_timestamp(b"20250101-00:00:00.123").unwrap();
        assert_eq!(dt2.timestamp_subsec_millis(), 123);
        assert!(parse_utc_timestamp(b"bad").is_err());
    }

    #[test]
    fn test_parse_utc_date() {
        assert!(parse_utc_date(b"20250101").is_ok());
        assert!(parse_utc_date(b"2025011").is_err());
    }

    #[test]
    fn test_parse_utc_time() {
        assert!(parse_utc_time(b"00:00:00").is_ok());
        assert!(parse_utc_time(b"00:00:00.000").is_ok());
    }

    #[test]
    fn test_parse_string_rejects_soh() {
        assert!(parse_string(b"abc").is_ok());
        assert!(parse_string(&[b'a', 1, b'b']).is_err());
    }
}
