//! Write miniSEED v3 records.
//!
//! The v3 format uses a 40-byte fixed header (little-endian), followed by
//! variable-length Source Identifier, optional extra headers (JSON), and
//! data payload. CRC-32C is computed over the entire record.

use crate::crc;
use crate::decode_v3::V3_HEADER_SIZE;
use crate::record::MseedRecord;
use crate::time::{NanoTime, NsTime};
use crate::{MseedError, Result};

/// Bytes a record built from `template` spends before its payload.
pub(crate) fn header_length(template: &MseedRecord) -> Result<usize> {
    let sid = template.source_id.as_str().len();
    if sid > u8::MAX as usize {
        return Err(MseedError::EncodeError(format!(
            "SID too long: {sid} bytes (max 255)"
        )));
    }
    let extra = template.extra_headers.len();
    if extra > u16::MAX as usize {
        return Err(MseedError::EncodeError(format!(
            "extra headers too long: {extra} bytes (max {})",
            u16::MAX
        )));
    }
    Ok(V3_HEADER_SIZE + sid + extra)
}

/// Serialize one v3 record with `count` samples in `payload`.
pub(crate) fn write_v3_record(
    template: &MseedRecord,
    extra_headers: &str,
    start: NsTime,
    count: usize,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let sid = template.source_id.as_str().as_bytes();
    let extra = extra_headers.as_bytes();
    let nt = NanoTime::from_nstime(start)?;

    let mut buf = Vec::with_capacity(V3_HEADER_SIZE + sid.len() + extra.len() + payload.len());
    buf.extend_from_slice(&[b'M', b'S', 3, template.flags]);
    buf.extend_from_slice(&nt.nanosecond.to_le_bytes());
    buf.extend_from_slice(&nt.year.to_le_bytes());
    buf.extend_from_slice(&nt.day.to_le_bytes());
    buf.extend_from_slice(&[nt.hour, nt.minute, nt.second, template.encoding]);
    buf.extend_from_slice(&template.sample_rate.to_le_bytes());
    buf.extend_from_slice(&(count as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // CRC, filled in below
    buf.push(template.publication_version);
    buf.push(sid.len() as u8);
    buf.extend_from_slice(&(extra.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());

    buf.extend_from_slice(sid);
    buf.extend_from_slice(extra);
    buf.extend_from_slice(payload);

    crc::write_v3_crc(&mut buf);
    Ok(buf)
}
