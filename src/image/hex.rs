//! Intel HEX record parsing
//!
//! One record per line: `:BBAAAATT<data>CC` where `BB` is the data byte
//! count, `AAAA` the 16-bit load offset, `TT` the record type and `CC` the
//! two's-complement checksum over every preceding byte.

use heapless::Vec;

use crate::config;
use crate::error::ParseError;

/// Shortest valid record (`:00000001FF`)
pub const MIN_RECORD_LEN: usize = 11;

/// Most data bytes a buffered line can carry
pub const MAX_RECORD_DATA: usize = (config::LINE_BUFFER_SIZE - MIN_RECORD_LEN) / 2;

/// How record checksums are treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum ChecksumPolicy {
    /// Reject records whose checksum does not match
    #[default]
    Enforce,
    /// Accept records regardless of checksum
    Ignore,
}

/// Intel HEX record types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum RecordKind {
    /// 00: data
    Data,
    /// 01: end of file
    EndOfFile,
    /// 02: extended segment address (base = value << 4)
    ExtendedSegmentAddress,
    /// 03: start segment address (CS:IP), no effect on programming
    StartSegmentAddress,
    /// 04: extended linear address (base = value << 16)
    ExtendedLinearAddress,
    /// 05: start linear address (EIP), no effect on programming
    StartLinearAddress,
}

impl RecordKind {
    /// Decode a record type byte
    ///
    /// # Errors
    ///
    /// `UnsupportedRecord` for types above 0x05.
    pub const fn from_code(code: u8) -> Result<Self, ParseError> {
        Ok(match code {
            0x00 => Self::Data,
            0x01 => Self::EndOfFile,
            0x02 => Self::ExtendedSegmentAddress,
            0x03 => Self::StartSegmentAddress,
            0x04 => Self::ExtendedLinearAddress,
            0x05 => Self::StartLinearAddress,
            other => return Err(ParseError::UnsupportedRecord(other)),
        })
    }
}

/// One decoded record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexRecord {
    /// Record type
    pub kind: RecordKind,
    /// 16-bit load offset
    pub offset: u16,
    /// Payload
    pub data: Vec<u8, MAX_RECORD_DATA>,
}

impl HexRecord {
    /// Base address carried by an extended address record
    #[must_use]
    pub fn extended_base(&self) -> Option<u32> {
        let value = u32::from(u16::from_be_bytes([*self.data.first()?, *self.data.get(1)?]));
        match self.kind {
            RecordKind::ExtendedSegmentAddress => Some(value << 4),
            RecordKind::ExtendedLinearAddress => Some(value << 16),
            _ => None,
        }
    }
}

/// Parse one trimmed line starting with `:`
///
/// # Errors
///
/// Any [`ParseError`]; the caller discards the line.
pub fn parse_record(line: &[u8], policy: ChecksumPolicy) -> Result<HexRecord, ParseError> {
    if line.len() < MIN_RECORD_LEN {
        return Err(ParseError::TooShort(line.len()));
    }

    let count = hex_byte(line, 1)?;
    let needed = MIN_RECORD_LEN + 2 * usize::from(count);
    if line.len() < needed || usize::from(count) > MAX_RECORD_DATA {
        return Err(ParseError::Truncated { declared: count });
    }

    let offset_hi = hex_byte(line, 3)?;
    let offset_lo = hex_byte(line, 5)?;
    let code = hex_byte(line, 7)?;

    let mut sum = count.wrapping_add(offset_hi).wrapping_add(offset_lo).wrapping_add(code);
    let mut data = Vec::new();
    for i in 0..usize::from(count) {
        let byte = hex_byte(line, 9 + 2 * i)?;
        sum = sum.wrapping_add(byte);
        let _ = data.push(byte);
    }

    let found = hex_byte(line, 9 + 2 * usize::from(count))?;
    let expected = sum.wrapping_neg();
    if policy == ChecksumPolicy::Enforce && found != expected {
        return Err(ParseError::Checksum { expected, found });
    }

    let kind = RecordKind::from_code(code)?;
    let record = HexRecord {
        kind,
        offset: u16::from_be_bytes([offset_hi, offset_lo]),
        data,
    };
    if matches!(
        kind,
        RecordKind::ExtendedSegmentAddress | RecordKind::ExtendedLinearAddress
    ) && record.data.len() < 2
    {
        return Err(ParseError::BadExtendedAddress);
    }
    Ok(record)
}

/// Two hex digits at `col`
fn hex_byte(line: &[u8], col: usize) -> Result<u8, ParseError> {
    let hi = line.get(col).copied().and_then(hex_digit).ok_or(ParseError::InvalidDigit(col))?;
    let lo = line
        .get(col + 1)
        .copied()
        .and_then(hex_digit)
        .ok_or(ParseError::InvalidDigit(col + 1))?;
    Ok(hi << 4 | lo)
}

/// Value of one ASCII hex digit
pub(crate) const fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
