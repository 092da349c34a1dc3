//! Decode miniSEED v3 records from raw bytes.
//!
//! The v3 format uses a 40-byte fixed header (little-endian), followed by
//! variable-length Source Identifier, optional extra headers (JSON), and
//! data payload.

use crate::crc;
use crate::record::{MseedRecord, ParseOptions, SWAP_HEADER, SWAP_PAYLOAD};
use crate::sid::SourceId;
use crate::time::NanoTime;
use crate::types::{ByteOrder, EncodingFormat, FormatVersion};
use crate::{MseedError, Result};

/// Size of the v3 fixed header.
pub const V3_HEADER_SIZE: usize = 40;

/// Largest v3 record accepted.
pub const V3_MAX_RECORD_LENGTH: usize = 10 * 1024 * 1024;

/// Total record length declared by a v3 fixed header.
pub(crate) fn record_length(data: &[u8]) -> Result<usize> {
    if data.len() < V3_HEADER_SIZE {
        return Err(MseedError::WrongLength {
            expected: V3_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let sid_length = data[33] as usize;
    let extra_length = u16::from_le_bytes([data[34], data[35]]) as usize;
    let data_length = u32::from_le_bytes([data[36], data[37], data[38], data[39]]) as usize;
    let total = V3_HEADER_SIZE + sid_length + extra_length + data_length;
    if total > V3_MAX_RECORD_LENGTH {
        return Err(MseedError::OutOfRange(total));
    }
    Ok(total)
}

/// Byte order of a v3 payload: Steim frames are big-endian, everything
/// else little-endian.
pub(crate) fn payload_byte_order(encoding: u8) -> ByteOrder {
    match EncodingFormat::from_code(encoding) {
        Ok(enc) if enc.is_steim() => ByteOrder::Big,
        _ => ByteOrder::Little,
    }
}

/// Parse a single miniSEED v3 record from the start of `data`.
pub fn parse_v3(data: &[u8], options: &ParseOptions) -> Result<MseedRecord> {
    if data.len() < 3 || data[0] != b'M' || data[1] != b'S' || data[2] != 3 {
        return Err(MseedError::NotSeedData);
    }
    let total_length = record_length(data)?;
    if data.len() < total_length {
        return Err(MseedError::WrongLength {
            expected: total_length,
            actual: data.len(),
        });
    }
    let bytes = &data[..total_length];

    let crc = if options.validate_crc {
        crc::verify_v3_crc(bytes)?
    } else {
        u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]])
    };

    let start = NanoTime {
        nanosecond: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        year: u16::from_le_bytes([bytes[8], bytes[9]]),
        day: u16::from_le_bytes([bytes[10], bytes[11]]),
        hour: bytes[12],
        minute: bytes[13],
        second: bytes[14],
    };
    let encoding = bytes[15];
    let mut rate_bytes = [0u8; 8];
    rate_bytes.copy_from_slice(&bytes[16..24]);
    let sample_rate = f64::from_le_bytes(rate_bytes);
    let sample_count = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]) as usize;
    let sid_length = bytes[33] as usize;
    let extra_length = u16::from_le_bytes([bytes[34], bytes[35]]) as usize;
    let data_length = u32::from_le_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]) as usize;

    let sid_end = V3_HEADER_SIZE + sid_length;
    let sid = std::str::from_utf8(&bytes[V3_HEADER_SIZE..sid_end])
        .map_err(|_| MseedError::InvalidSourceId("source identifier is not UTF-8".into()))?;
    let source_id = SourceId::parse(sid)?;

    let extra_end = sid_end + extra_length;
    let extra_headers = std::str::from_utf8(&bytes[sid_end..extra_end])
        .map_err(|_| MseedError::InvalidState("extra headers are not UTF-8".into()))?
        .to_string();

    let byte_order = payload_byte_order(encoding);
    let mut swap_flags = 0;
    if ByteOrder::native() != ByteOrder::Little {
        swap_flags |= SWAP_HEADER;
    }
    if byte_order != ByteOrder::native() {
        swap_flags |= SWAP_PAYLOAD;
    }

    let mut record = MseedRecord {
        format_version: FormatVersion::V3,
        source_id,
        flags: bytes[3],
        start_time: start.to_nstime()?,
        sample_rate,
        encoding,
        publication_version: bytes[32],
        sample_count,
        crc,
        extra_headers,
        record_length: total_length,
        data_length,
        swap_flags,
        byte_order,
        samples: None,
        raw: bytes.to_vec(),
        data_offset: extra_end,
    };

    if options.unpack_data {
        record.unpack_data()?;
    }

    Ok(record)
}
