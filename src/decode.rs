//! Detect and parse miniSEED records; the v2 parser lives here.
//!
//! [`detect()`] identifies the format version and length of the record at
//! the start of a buffer, [`parse()`] dispatches to the v2 parser below or
//! to [`decode_v3`](crate::decode_v3).

use serde_json::Value;

use crate::decode_v3;
use crate::record::{MseedRecord, ParseOptions, SWAP_HEADER, SWAP_PAYLOAD};
use crate::sid::SourceId;
use crate::time::{NanoTime, NsTime};
use crate::types::{ByteOrder, FormatVersion};
use crate::{MseedError, Result};

/// Size of the v2 fixed header.
pub const V2_HEADER_SIZE: usize = 48;
/// Smallest legal v2 record length.
pub const V2_MIN_RECORD_LENGTH: usize = 128;
/// Largest legal v2 record length.
pub const V2_MAX_RECORD_LENGTH: usize = 65536;

const MAX_BLOCKETTES: usize = 64;

/// Identify the record at the start of `data`.
///
/// Returns the format version and total record length, or `None` when more
/// bytes are needed to decide. Fails with [`MseedError::NotSeedData`] when
/// the bytes cannot be the start of a record.
pub fn detect(data: &[u8]) -> Result<Option<(FormatVersion, usize)>> {
    if data.len() >= 3 && data[0] == b'M' && data[1] == b'S' && data[2] == 3 {
        if data.len() < decode_v3::V3_HEADER_SIZE {
            return Ok(None);
        }
        let length = decode_v3::record_length(data)?;
        return Ok(Some((FormatVersion::V3, length)));
    }

    if !looks_like_v2_prefix(data) {
        return Err(MseedError::NotSeedData);
    }
    if data.len() < V2_HEADER_SIZE {
        return Ok(None);
    }
    let Some(order) = v2_header_order(data) else {
        return Err(MseedError::NotSeedData);
    };
    match find_blockettes(data, order)? {
        Scan::NeedMore => Ok(None),
        Scan::Done(blockettes) => {
            let Some(b1000) = blockettes.b1000 else {
                return Err(MseedError::MissingBlockette1000);
            };
            Ok(Some((FormatVersion::V2, b1000.record_length()?)))
        }
    }
}

/// Parse one record from the start of `data`.
pub fn parse(data: &[u8], options: &ParseOptions) -> Result<MseedRecord> {
    match detect(data)? {
        Some((FormatVersion::V3, _)) => decode_v3::parse_v3(data, options),
        Some((FormatVersion::V2, _)) => parse_v2(data, options),
        None => Err(MseedError::WrongLength {
            expected: V2_HEADER_SIZE.max(decode_v3::V3_HEADER_SIZE),
            actual: data.len(),
        }),
    }
}

/// Sequence number, quality indicator and reserved byte.
fn looks_like_v2_prefix(data: &[u8]) -> bool {
    let seq_ok = data
        .iter()
        .take(6)
        .all(|&b| b.is_ascii_digit() || b == b' ' || b == 0);
    let quality_ok = data.get(6).is_none_or(|b| matches!(b, b'D' | b'R' | b'Q' | b'M'));
    let reserved_ok = data.get(7).is_none_or(|&b| b == b' ' || b == 0);
    seq_ok && quality_ok && reserved_ok
}

/// Byte order of the fixed header, judged by a plausible BTIME.
fn v2_header_order(data: &[u8]) -> Option<ByteOrder> {
    let plausible = |order: ByteOrder| {
        let year = read_u16(data, 20, order);
        let day = read_u16(data, 22, order);
        (1900..=2100).contains(&year)
            && (1..=366).contains(&day)
            && data[24] <= 23
            && data[25] <= 59
            && data[26] <= 60
    };
    [ByteOrder::Big, ByteOrder::Little]
        .into_iter()
        .find(|&order| plausible(order))
}

fn read_u16(data: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let bytes = [data[offset], data[offset + 1]];
    match order {
        ByteOrder::Big => u16::from_be_bytes(bytes),
        ByteOrder::Little => u16::from_le_bytes(bytes),
    }
}

fn read_i16(data: &[u8], offset: usize, order: ByteOrder) -> i16 {
    read_u16(data, offset, order) as i16
}

fn read_u32(data: &[u8], offset: usize, order: ByteOrder) -> u32 {
    let bytes = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    match order {
        ByteOrder::Big => u32::from_be_bytes(bytes),
        ByteOrder::Little => u32::from_le_bytes(bytes),
    }
}

#[derive(Debug, Clone, Copy)]
struct Blockette1000 {
    encoding: u8,
    word_order: u8,
    length_power: u8,
}

impl Blockette1000 {
    fn record_length(&self) -> Result<usize> {
        let power = self.length_power as u32;
        if !(7..=16).contains(&power) {
            return Err(MseedError::OutOfRange(1usize.checked_shl(power).unwrap_or(usize::MAX)));
        }
        Ok(1 << power)
    }
}

#[derive(Debug, Default)]
struct Blockettes {
    b1000: Option<Blockette1000>,
    /// Actual sample rate from blockette 100.
    actual_rate: Option<f32>,
    /// Timing quality and microsecond offset from blockette 1001.
    b1001: Option<(u8, i8)>,
}

enum Scan {
    NeedMore,
    Done(Blockettes),
}

/// Walk the blockette chain starting at the fixed header's first offset.
fn find_blockettes(data: &[u8], order: ByteOrder) -> Result<Scan> {
    let mut found = Blockettes::default();
    let mut offset = read_u16(data, 46, order) as usize;
    let mut visited = 0;

    while offset != 0 {
        if offset < V2_HEADER_SIZE || visited >= MAX_BLOCKETTES {
            break;
        }
        if data.len() < offset + 4 {
            return Ok(Scan::NeedMore);
        }
        let kind = read_u16(data, offset, order);
        let next = read_u16(data, offset + 2, order) as usize;

        match kind {
            100 => {
                if data.len() < offset + 8 {
                    return Ok(Scan::NeedMore);
                }
                found.actual_rate = Some(f32::from_bits(read_u32(data, offset + 4, order)));
            }
            1000 => {
                if data.len() < offset + 8 {
                    return Ok(Scan::NeedMore);
                }
                found.b1000 = Some(Blockette1000 {
                    encoding: data[offset + 4],
                    word_order: data[offset + 5],
                    length_power: data[offset + 6],
                });
            }
            1001 => {
                if data.len() < offset + 8 {
                    return Ok(Scan::NeedMore);
                }
                found.b1001 = Some((data[offset + 4], data[offset + 5] as i8));
            }
            _ => {}
        }

        if next != 0 && next <= offset {
            break;
        }
        offset = next;
        visited += 1;
    }

    Ok(Scan::Done(found))
}

/// Sample rate from the v2 factor and multiplier fields.
pub(crate) fn compute_sample_rate(factor: i16, multiplier: i16) -> f64 {
    if factor == 0 || multiplier == 0 {
        return 0.0;
    }
    let f = factor as f64;
    let m = multiplier as f64;
    match (factor > 0, multiplier > 0) {
        (true, true) => f * m,
        (true, false) => -f / m,
        (false, true) => -m / f,
        (false, false) => 1.0 / (f * m),
    }
}

/// Publication version for a v2 data quality indicator.
pub(crate) fn quality_to_pubversion(quality: u8) -> u8 {
    match quality {
        b'R' => 1,
        b'D' => 2,
        b'Q' => 3,
        b'M' => 4,
        _ => 0,
    }
}

fn trimmed_code(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|_| MseedError::NotSeedData)?;
    Ok(text.trim_matches(|c| c == ' ' || c == '\0').to_string())
}

/// Parse a miniSEED v2 record (fixed header, blockettes 100/1000/1001).
pub fn parse_v2(data: &[u8], options: &ParseOptions) -> Result<MseedRecord> {
    if data.len() < V2_HEADER_SIZE {
        return Err(MseedError::WrongLength {
            expected: V2_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let order = v2_header_order(data).ok_or(MseedError::NotSeedData)?;
    let blockettes = match find_blockettes(data, order)? {
        Scan::Done(found) => found,
        Scan::NeedMore => {
            return Err(MseedError::WrongLength {
                expected: data.len() + 1,
                actual: data.len(),
            });
        }
    };
    let b1000 = blockettes.b1000.ok_or(MseedError::MissingBlockette1000)?;
    let record_length = b1000.record_length()?;
    if data.len() < record_length {
        return Err(MseedError::WrongLength {
            expected: record_length,
            actual: data.len(),
        });
    }

    let station = trimmed_code(&data[8..13])?;
    let location = trimmed_code(&data[13..15])?;
    let channel = trimmed_code(&data[15..18])?;
    let network = trimmed_code(&data[18..20])?;
    let source_id = SourceId::from_parts(&network, &station, &location, &channel)?;

    let btime = NanoTime {
        year: read_u16(data, 20, order),
        day: read_u16(data, 22, order),
        hour: data[24],
        minute: data[25],
        second: data[26],
        // byte 27 is unused
        nanosecond: read_u16(data, 28, order) as u32 * 100_000,
    };
    let sample_count = read_u16(data, 30, order) as usize;
    let factor = read_i16(data, 32, order);
    let multiplier = read_i16(data, 34, order);
    let activity_flags = data[36];
    let io_flags = data[37];
    let quality_flags = data[38];
    let time_correction = read_u32(data, 40, order) as i32;
    let data_offset = read_u16(data, 44, order) as usize;

    let mut start_time: NsTime = btime.to_nstime()?;
    if let Some((_, usec)) = blockettes.b1001 {
        start_time += usec as i64 * 1000;
    }
    // Bit 1: time correction already applied
    if activity_flags & 0x02 == 0 && time_correction != 0 {
        start_time += time_correction as i64 * 100_000;
    }

    let sample_rate = match blockettes.actual_rate {
        Some(rate) if rate != 0.0 => rate as f64,
        _ => compute_sample_rate(factor, multiplier),
    };

    let mut flags = 0u8;
    if activity_flags & 0x01 != 0 {
        flags |= crate::record::FLAG_CALIBRATION;
    }
    if quality_flags & 0x80 != 0 {
        flags |= crate::record::FLAG_TIME_QUESTIONABLE;
    }
    if io_flags & 0x20 != 0 {
        flags |= crate::record::FLAG_CLOCK_LOCKED;
    }

    let payload_order = if b1000.word_order == 0 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    };
    let mut swap_flags = 0;
    if order != ByteOrder::native() {
        swap_flags |= SWAP_HEADER;
    }
    if payload_order != ByteOrder::native() {
        swap_flags |= SWAP_PAYLOAD;
    }

    let data_length = if data_offset >= V2_HEADER_SIZE && data_offset < record_length {
        record_length - data_offset
    } else {
        0
    };

    let mut record = MseedRecord {
        format_version: FormatVersion::V2,
        source_id,
        flags,
        start_time,
        sample_rate,
        encoding: b1000.encoding,
        publication_version: quality_to_pubversion(data[6]),
        sample_count,
        crc: 0,
        extra_headers: String::new(),
        record_length,
        data_length,
        swap_flags,
        byte_order: payload_order,
        samples: None,
        raw: data[..record_length].to_vec(),
        data_offset,
    };

    if let Some((timing_quality, _)) = blockettes.b1001 {
        record.set_extra_header(&["FDSN", "Time", "Quality"], Value::from(timing_quality))?;
    }

    if options.unpack_data {
        record.unpack_data()?;
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Samples;
    use crate::types::EncodingFormat;

    const COLA_START: NsTime = 1_267_253_400_019_539_000;

    fn packed_v2(encoding: EncodingFormat, samples: Samples) -> Vec<u8> {
        let mut record = MseedRecord::new()
            .with_source_id(SourceId::from_parts("IU", "COLA", "00", "BHZ").unwrap())
            .with_start_time(COLA_START)
            .with_sample_rate(20.0)
            .with_publication_version(4)
            .with_encoding(encoding);
        let mut out = Vec::new();
        record
            .pack(samples.as_slice(), true, |rec| out.push(rec.to_vec()))
            .unwrap();
        assert_eq!(out.len(), 1);
        out.remove(0)
    }

    #[test]
    fn test_detect_v2_and_v3() {
        let v2 = packed_v2(EncodingFormat::Steim2, Samples::Int((0..50).collect()));
        assert_eq!(detect(&v2).unwrap(), Some((FormatVersion::V2, 512)));
        assert_eq!(detect(&v2[..20]).unwrap(), None);

        let mut v3 = Vec::new();
        MseedRecord::new_v3()
            .with_source_id(SourceId::parse("FDSN:XX_TEST__B_S_X").unwrap())
            .with_samples(Samples::Int(vec![1, 2, 3]))
            .repack(|rec| v3 = rec.to_vec())
            .unwrap();
        assert_eq!(detect(&v3).unwrap(), Some((FormatVersion::V3, v3.len())));
        assert_eq!(detect(&v3[..10]).unwrap(), None);
    }

    #[test]
    fn test_detect_not_seed() {
        assert!(matches!(
            detect(b"this is not miniSEED at all, just text padding it out"),
            Err(MseedError::NotSeedData)
        ));
    }

    #[test]
    fn test_parse_v2_header() {
        let samples: Vec<i32> = (0..135).map(|i| (i * 7) % 300 - 150).collect();
        let raw = packed_v2(EncodingFormat::Steim2, Samples::Int(samples.clone()));
        let record = parse(&raw, &ParseOptions::default().with_unpack_data(true)).unwrap();

        assert_eq!(record.format_version, FormatVersion::V2);
        assert_eq!(record.source_id.as_str(), "FDSN:IU_COLA_00_B_H_Z");
        assert_eq!(record.start_time, COLA_START);
        assert_eq!(record.sample_rate, 20.0);
        assert_eq!(record.publication_version, 4);
        assert_eq!(record.sample_count, 135);
        assert_eq!(record.record_length, 512);
        assert_eq!(record.encoding, 11);
        assert_eq!(record.sequence_number(), Some(1));
        assert_eq!(record.samples, Some(Samples::Int(samples)));
    }

    #[test]
    fn test_parse_v2_time_correction() {
        let mut raw = packed_v2(EncodingFormat::Int32, Samples::Int(vec![1, 2, 3]));
        // +0.5 s correction, not yet applied
        raw[40..44].copy_from_slice(&5000i32.to_be_bytes());
        let record = parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(record.start_time, COLA_START + 500_000_000);

        raw[36] |= 0x02;
        let record = parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(record.start_time, COLA_START);
    }

    #[test]
    fn test_parse_v2_little_endian_header() {
        let mut raw = packed_v2(EncodingFormat::Int32, Samples::Int(vec![5, 6]));
        // Rewrite the multi-byte header fields little-endian
        for (offset, width) in [
            (20, 2),
            (22, 2),
            (28, 2),
            (30, 2),
            (32, 2),
            (34, 2),
            (40, 4),
            (44, 2),
            (46, 2),
            (48, 2),
            (50, 2),
            (56, 2),
            (58, 2),
        ] {
            raw[offset..offset + width].reverse();
        }
        let record = parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(record.start_time, COLA_START);
        assert_eq!(record.sample_count, 2);
        assert_eq!(record.header_swapped(), ByteOrder::native() == ByteOrder::Big);
    }

    #[test]
    fn test_parse_v2_unknown_encoding() {
        let mut raw = packed_v2(EncodingFormat::Int32, Samples::Int(vec![1]));
        raw[52] = 99;
        let record = parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(record.encoding, 99);
        assert!(matches!(
            parse(&raw, &ParseOptions::default().with_unpack_data(true)),
            Err(MseedError::UnknownFormat(99))
        ));
    }

    #[test]
    fn test_parse_v2_truncated_and_out_of_range() {
        let raw = packed_v2(EncodingFormat::Int32, Samples::Int(vec![1]));
        assert!(matches!(
            parse(&raw[..300], &ParseOptions::default()),
            Err(MseedError::WrongLength {
                expected: 512,
                actual: 300
            })
        ));

        let mut bad = raw.clone();
        bad[54] = 6; // 64-byte records are not allowed
        assert!(matches!(detect(&bad), Err(MseedError::OutOfRange(64))));
    }

    #[test]
    fn test_v2_flags_mapping() {
        let mut raw = packed_v2(EncodingFormat::Int32, Samples::Int(vec![1]));
        raw[36] = 0x01;
        raw[37] = 0x20;
        raw[38] = 0x80;
        let record = parse(&raw, &ParseOptions::default()).unwrap();
        assert!(record.calibration_signals_present());
        assert!(record.clock_locked());
        assert!(record.time_tag_is_questionable());
    }

    #[test]
    fn test_sample_rate_factor_multiplier() {
        assert_eq!(compute_sample_rate(20, 1), 20.0);
        assert_eq!(compute_sample_rate(-10, 1), 0.1);
        assert_eq!(compute_sample_rate(1, -10), 0.1);
        assert_eq!(compute_sample_rate(0, 1), 0.0);
    }
}
