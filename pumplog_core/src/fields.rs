//! Fixed-offset field codecs for history records.
//!
//! All multi-byte fields are big-endian. Reads are bounds-checked so a
//! record that lies about its layout produces `TruncatedEvent` instead of
//! a panic.

use crate::codes::BgUnits;
use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale of insulin amounts and rates on the wire
pub const INSULIN_SCALE: u32 = 10_000;

/// Milliseconds per minute
pub const MIN_TO_MSEC: u64 = 60_000;

/// Insulin amount (U) or rate (U/h) held as integer ten-thousandths
///
/// Kept integral so that amounts can be compared and summed exactly; the
/// pump's smallest step is 0.025 U.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Insulin(pub u32);

impl Insulin {
    pub const ZERO: Insulin = Insulin(0);

    pub fn from_units(units: f64) -> Self {
        Insulin((units * INSULIN_SCALE as f64).round() as u32)
    }

    pub fn units(self) -> f64 {
        self.0 as f64 / INSULIN_SCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `percent` of this rate, e.g. 150 for 150%
    pub fn percent_of(self, percent: u8) -> Insulin {
        Insulin((self.0 as u64 * percent as u64 / 100) as u32)
    }

    pub fn times(self, factor: u32) -> Insulin {
        Insulin(self.0.saturating_mul(factor))
    }

    pub fn plus(self, other: Insulin) -> Insulin {
        Insulin(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Insulin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}U", self.units())
    }
}

impl Serialize for Insulin {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.units())
    }
}

impl<'de> Deserialize<'de> for Insulin {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Insulin::from_units)
    }
}

/// Bounds-checked big-endian reader over one record
#[derive(Clone, Copy)]
pub struct Fields<'a> {
    bytes: &'a [u8],
}

impl<'a> Fields<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn span(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        self.bytes
            .get(offset..offset + width)
            .ok_or(Error::TruncatedEvent {
                code: self.bytes.first().copied().unwrap_or_default(),
                len: self.bytes.len(),
                required: offset + width,
            })
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.span(offset, 1)?[0])
    }

    pub fn u16(&self, offset: usize) -> Result<u16> {
        Ok(BigEndian::read_u16(self.span(offset, 2)?))
    }

    pub fn i16(&self, offset: usize) -> Result<i16> {
        Ok(BigEndian::read_i16(self.span(offset, 2)?))
    }

    pub fn u32(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u32(self.span(offset, 4)?))
    }

    pub fn i32(&self, offset: usize) -> Result<i32> {
        Ok(BigEndian::read_i32(self.span(offset, 4)?))
    }

    pub fn insulin(&self, offset: usize) -> Result<Insulin> {
        self.u32(offset).map(Insulin)
    }

    /// u16 count of minutes, in milliseconds
    pub fn minutes_ms(&self, offset: usize) -> Result<u64> {
        Ok(self.u16(offset)? as u64 * MIN_TO_MSEC)
    }

    pub fn bytes(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        self.span(offset, width)
    }

    /// Everything from `offset` to the end of the record
    pub fn tail(&self, offset: usize) -> &'a [u8] {
        self.bytes.get(offset..).unwrap_or_default()
    }
}

/// Glucose quantity stored in mg/dL or in tenths of mmol/L
///
/// Only the mmol/L case is rescaled.
pub fn bg_value(raw: f64, units: BgUnits) -> f64 {
    match units {
        BgUnits::MgDl => raw,
        BgUnits::MmolL => raw / 10.0,
    }
}

/// Sign-extend the low `bits` bits of `value`
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Meter serial numbers are stored back to front and space padded
pub fn reversed_serial(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .chars()
        .rev()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insulin_exact_scale() {
        let bytes = hex::decode("00014dfc").unwrap();
        let fields = Fields::new(&bytes);
        let amount = fields.insulin(0).unwrap();
        assert_eq!(amount, Insulin(85_500));
        assert_eq!(amount.units(), 8.55);
    }

    #[test]
    fn test_percent_of_rate() {
        assert_eq!(Insulin(5_250).percent_of(200).units(), 1.05);
        assert_eq!(Insulin(10_000).percent_of(150).units(), 1.5);
    }

    #[test]
    fn test_out_of_range_read_is_truncation() {
        let bytes = [0x1d, 0x00, 0x05, 0x00, 0x00];
        let err = Fields::new(&bytes).u32(3).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedEvent {
                code: 0x1d,
                len: 5,
                required: 7
            }
        ));
    }

    #[test]
    fn test_bg_value_only_rescales_mmol() {
        assert_eq!(bg_value(120.0, BgUnits::MgDl), 120.0);
        assert_eq!(bg_value(55.0, BgUnits::MmolL), 5.5);
    }

    #[test]
    fn test_sign_extend_ten_bits() {
        assert_eq!(sign_extend(0x3ff, 10), -1);
        assert_eq!(sign_extend(0x200, 10), -512);
        assert_eq!(sign_extend(0x1ff, 10), 511);
    }

    #[test]
    fn test_reversed_serial() {
        assert_eq!(reversed_serial(b"  4321CBA"), "ABC1234");
        assert_eq!(reversed_serial(b"       "), "");
    }

    #[test]
    fn test_minutes_to_ms() {
        let bytes = [0x00, 0xf0];
        assert_eq!(Fields::new(&bytes).minutes_ms(0).unwrap(), 14_400_000);
    }
}
