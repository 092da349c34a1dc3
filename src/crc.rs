//! CRC-32C (Castagnoli) for miniSEED v3 record integrity.
//!
//! The CRC of a v3 record covers the whole record with the CRC field
//! (bytes 28..32) treated as zero.

use crate::{MseedError, Result};

/// Byte offset of the CRC field in a v3 fixed header.
pub const V3_CRC_OFFSET: usize = 28;

const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x82F6_3B78;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// Continue a CRC-32C computation over `data`.
///
/// `crc` is the raw register: start from `0xFFFF_FFFF` and invert the
/// final value.
fn update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32C_TABLE[index];
    }
    crc
}

/// Compute CRC-32C over the given data.
pub fn crc32c(data: &[u8]) -> u32 {
    update(0xFFFF_FFFF, data) ^ 0xFFFF_FFFF
}

/// CRC-32C of a v3 record, computed as if the CRC field were zero.
pub fn v3_record_crc(record: &[u8]) -> u32 {
    let crc_end = V3_CRC_OFFSET + 4;
    if record.len() < crc_end {
        return crc32c(record);
    }
    let mut crc = update(0xFFFF_FFFF, &record[..V3_CRC_OFFSET]);
    crc = update(crc, &[0u8; 4]);
    crc = update(crc, &record[crc_end..]);
    crc ^ 0xFFFF_FFFF
}

/// Compute the CRC of a v3 record and store it (little-endian) in the header.
pub fn write_v3_crc(record: &mut [u8]) -> u32 {
    let crc = v3_record_crc(record);
    if record.len() >= V3_CRC_OFFSET + 4 {
        record[V3_CRC_OFFSET..V3_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    }
    crc
}

/// Check the stored CRC of a v3 record against its contents.
pub fn verify_v3_crc(record: &[u8]) -> Result<u32> {
    if record.len() < V3_CRC_OFFSET + 4 {
        return Err(MseedError::WrongLength {
            expected: V3_CRC_OFFSET + 4,
            actual: record.len(),
        });
    }
    let stored = u32::from_le_bytes([
        record[V3_CRC_OFFSET],
        record[V3_CRC_OFFSET + 1],
        record[V3_CRC_OFFSET + 2],
        record[V3_CRC_OFFSET + 3],
    ]);
    let computed = v3_record_crc(record);
    if stored != computed {
        return Err(MseedError::InvalidCrc { stored, computed });
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_empty() {
        assert_eq!(crc32c(&[]), 0x0000_0000);
    }

    #[test]
    fn test_crc32c_known_values() {
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn test_record_crc_ignores_crc_field() {
        let mut record = vec![0u8; 64];
        record[0] = b'M';
        record[1] = b'S';
        record[2] = 3;
        let zeroed = crc32c(&record);

        record[28..32].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(v3_record_crc(&record), zeroed);
    }

    #[test]
    fn test_write_and_verify_v3_crc() {
        let mut record = vec![0u8; 64];
        record[0] = b'M';
        record[1] = b'S';
        record[2] = 3;

        let crc = write_v3_crc(&mut record);
        assert_ne!(crc, 0);
        assert_eq!(verify_v3_crc(&record).unwrap(), crc);

        record[10] ^= 0xFF;
        assert!(matches!(
            verify_v3_crc(&record),
            Err(MseedError::InvalidCrc { stored, .. }) if stored == crc
        ));
    }
}
