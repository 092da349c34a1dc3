//! Ordering and comparison of miniSEED content.

use crate::reader::MseedReader;
use crate::record::{MseedRecord, ParseOptions};
use crate::Result;

/// Reorder the records in `content` by source identifier, then start time.
///
/// The sort is stable, so records with equal keys keep their order.
pub fn sort_records(content: &[u8]) -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    let mut reader = MseedReader::new(content);
    while let Some(record) = reader.next() {
        let record = record?;
        let offset = reader.last_offset();
        entries.push((record.source_id, record.start_time, offset, record.record_length));
    }
    entries.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

    let mut sorted = Vec::with_capacity(content.len());
    for (_, _, offset, length) in entries {
        sorted.extend_from_slice(&content[offset..offset + length]);
    }
    Ok(sorted)
}

/// Per-record comparison results for two miniSEED buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentComparison {
    /// Record bytes identical, per record pair.
    pub binary: Vec<bool>,
    /// Header values and decoded samples equal, per record pair.
    pub logical: Vec<bool>,
    pub records_a: usize,
    pub records_b: usize,
}

impl ContentComparison {
    /// Same record count and every pair logically equal.
    pub fn is_equal(&self) -> bool {
        self.records_a == self.records_b && self.logical.iter().all(|&eq| eq)
    }
}

/// Whether two records carry the same trace content, regardless of
/// encoding, record length and CRC.
pub fn logically_equal(a: &MseedRecord, b: &MseedRecord) -> bool {
    a.source_id == b.source_id
        && a.start_time == b.start_time
        && a.sample_rate_hz() == b.sample_rate_hz()
        && a.publication_version == b.publication_version
        && a.sample_count == b.sample_count
        && a.samples == b.samples
}

/// Compare two buffers record by record, optionally sorting both first.
pub fn compare_records(a: &[u8], b: &[u8], ignore_order: bool) -> Result<ContentComparison> {
    let (a, b) = if ignore_order {
        (sort_records(a)?, sort_records(b)?)
    } else {
        (a.to_vec(), b.to_vec())
    };
    let options = ParseOptions::default().with_unpack_data(true);
    let left = MseedReader::with_options(&a, options).collect::<Result<Vec<_>>>()?;
    let right = MseedReader::with_options(&b, options).collect::<Result<Vec<_>>>()?;

    let mut comparison = ContentComparison {
        records_a: left.len(),
        records_b: right.len(),
        ..Default::default()
    };
    for (x, y) in left.iter().zip(&right) {
        comparison.binary.push(x.raw() == y.raw());
        comparison.logical.push(logically_equal(x, y));
    }
    Ok(comparison)
}
