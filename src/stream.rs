//! Record stream processing: time-window selection and per-source
//! statistics.
//!
//! Both functions consume any iterator of parsed records (such as a
//! [`StreamReader`](crate::StreamReader)) and pass retained record bytes
//! to a writer in arrival order.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::{debug, info, warn};

use crate::record::MseedRecord;
use crate::sid::SourceId;
use crate::time::NsTime;
use crate::trim::{self, TrimmedRecords};
use crate::types::FormatVersion;
use crate::{MseedError, Result};

/// Inclusive time selection; an unset bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub earliest: Option<NsTime>,
    pub latest: Option<NsTime>,
}

impl TimeWindow {
    pub fn new(earliest: Option<NsTime>, latest: Option<NsTime>) -> Result<Self> {
        if let (Some(e), Some(l)) = (earliest, latest) {
            if e > l {
                return Err(MseedError::InvalidTime(format!(
                    "earliest {e} is after latest {l}"
                )));
            }
        }
        Ok(Self { earliest, latest })
    }
}

/// Records and bytes written by a stream operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub records: usize,
    pub bytes: usize,
}

/// Write the records that overlap `window`, trimming those that straddle
/// its bounds.
///
/// A trimmed record that no longer fits its fixed length is written as
/// several records. Stops at the first error from the input or the writer.
pub fn process_timewindow<I, W>(
    records: I,
    writer: &mut W,
    window: &TimeWindow,
) -> Result<StreamSummary>
where
    I: IntoIterator<Item = Result<MseedRecord>>,
    W: Write,
{
    let mut summary = StreamSummary::default();
    for record in records {
        let record = record?;
        match trim::trim_to_records(&record, window.earliest, window.latest)? {
            TrimmedRecords::Excluded => {
                debug!(
                    sid = %record.source_id,
                    start = record.start_time,
                    "record outside window"
                );
            }
            TrimmedRecords::Unchanged => {
                writer.write_all(record.raw())?;
                summary.records += 1;
                summary.bytes += record.raw().len();
            }
            TrimmedRecords::Packed(packed) => {
                if packed.len() > 1 {
                    warn!(
                        sid = %record.source_id,
                        start = record.start_time,
                        records = packed.len(),
                        "trimmed record split across several records"
                    );
                }
                for bytes in &packed {
                    writer.write_all(bytes)?;
                    summary.records += 1;
                    summary.bytes += bytes.len();
                }
            }
        }
    }
    writer.flush()?;
    info!(records = summary.records, bytes = summary.bytes, "time window applied");
    Ok(summary)
}

/// Accumulated statistics for one source identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStats {
    pub record_count: usize,
    pub sample_count: usize,
    pub bytes: usize,
    /// Publication versions in order of first appearance.
    pub pubversions: Vec<u8>,
    /// Format versions in order of first appearance.
    pub formatversions: Vec<FormatVersion>,
    /// Earliest record start.
    pub earliest: NsTime,
    /// Latest record end.
    pub latest: NsTime,
}

impl TraceStats {
    fn new(record: &MseedRecord) -> Self {
        Self {
            record_count: 0,
            sample_count: 0,
            bytes: 0,
            pubversions: Vec::new(),
            formatversions: Vec::new(),
            earliest: record.start_time,
            latest: record.endtime(),
        }
    }

    fn add(&mut self, record: &MseedRecord) {
        self.record_count += 1;
        self.sample_count += record.sample_count;
        self.bytes += record.record_length;
        if !self.pubversions.contains(&record.publication_version) {
            self.pubversions.push(record.publication_version);
        }
        if !self.formatversions.contains(&record.format_version) {
            self.formatversions.push(record.format_version);
        }
        self.earliest = self.earliest.min(record.start_time);
        self.latest = self.latest.max(record.endtime());
    }
}

/// Pass every record through to `writer` while accumulating statistics
/// per source identifier.
pub fn collect_stats<I, W>(records: I, writer: &mut W) -> Result<BTreeMap<SourceId, TraceStats>>
where
    I: IntoIterator<Item = Result<MseedRecord>>,
    W: Write,
{
    let mut stats: BTreeMap<SourceId, TraceStats> = BTreeMap::new();
    for record in records {
        let record = record?;
        stats
            .entry(record.source_id.clone())
            .or_insert_with(|| TraceStats::new(&record))
            .add(&record);
        writer.write_all(record.raw())?;
    }
    writer.flush()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MseedReader;
    use crate::record::{ParseOptions, Samples};
    use crate::types::EncodingFormat;

    const SECOND: NsTime = 1_000_000_000;

    fn stream() -> Vec<u8> {
        let mut data = Vec::new();
        for (source, start) in [
            ("FDSN:XX_TEST__B_H_Z", 0),
            ("FDSN:XX_TEST__B_H_Z", 10 * SECOND),
            ("FDSN:XX_TEST__B_H_N", 20 * SECOND),
        ] {
            MseedRecord::new_v3()
                .with_source_id(SourceId::parse(source).unwrap())
                .with_start_time(start)
                .with_sample_rate(1.0)
                .with_publication_version(2)
                .with_encoding(EncodingFormat::Int32)
                .with_samples(Samples::Int((0..10).collect()))
                .repack(|rec| data.extend_from_slice(rec))
                .unwrap();
        }
        data
    }

    #[test]
    fn test_time_window_bounds() {
        assert!(TimeWindow::new(Some(2), Some(1)).is_err());
        assert!(TimeWindow::new(None, Some(1)).is_ok());
    }

    #[test]
    fn test_process_timewindow() {
        let data = stream();
        let window = TimeWindow::new(Some(5 * SECOND), Some(14 * SECOND)).unwrap();
        let mut out = Vec::new();
        let summary = process_timewindow(MseedReader::new(&data), &mut out, &window).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.bytes, out.len());

        let options = ParseOptions::default().with_unpack_data(true);
        let records: Vec<_> = MseedReader::with_options(&out, options)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records[0].start_time, 5 * SECOND);
        assert_eq!(records[0].samples, Some(Samples::Int((5..10).collect())));
        assert_eq!(records[1].start_time, 10 * SECOND);
        assert_eq!(records[1].endtime(), 14 * SECOND);
    }

    #[test]
    fn test_process_open_window_passes_through() {
        let data = stream();
        let mut out = Vec::new();
        let window = TimeWindow::default();
        let summary = process_timewindow(MseedReader::new(&data), &mut out, &window).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(out, data);
    }

    #[test]
    fn test_collect_stats() {
        let data = stream();
        let mut out = Vec::new();
        let stats = collect_stats(MseedReader::new(&data), &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.len(), 2);

        let z = &stats[&SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap()];
        assert_eq!(z.record_count, 2);
        assert_eq!(z.sample_count, 20);
        assert_eq!(z.pubversions, [2]);
        assert_eq!(z.formatversions, [FormatVersion::V3]);
        assert_eq!(z.earliest, 0);
        assert_eq!(z.latest, 19 * SECOND);
    }

    #[test]
    fn test_errors_stop_processing() {
        let mut data = stream();
        data.truncate(data.len() - 3);
        let mut out = Vec::new();
        let result = collect_stats(MseedReader::new(&data), &mut out);
        assert!(matches!(result, Err(MseedError::WrongLength { .. })));
    }

    #[test]
    fn test_trim_overflow_continues_stream() {
        let sid = SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap();
        let mut value = 0;
        let values: Vec<i32> = (0..600)
            .map(|i| {
                value += if i % 5 == 4 { 3000 } else { 1 };
                value
            })
            .collect();
        let mut data = Vec::new();
        MseedRecord::new()
            .with_source_id(sid)
            .with_start_time(0)
            .with_sample_rate(1.0)
            .with_encoding(EncodingFormat::Steim1)
            .with_samples(Samples::Int(values))
            .repack(|rec| data.extend_from_slice(rec))
            .unwrap();
        let parsed: Vec<MseedRecord> = MseedReader::new(&data)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(parsed.len() > 1);
        let total: usize = parsed.iter().map(|r| r.sample_count).sum();

        // shrinking the first record's length forces its trimmed samples
        // into several records
        let mut records = parsed.clone();
        records[0].record_length = 256;
        let window = TimeWindow::new(Some(SECOND), None).unwrap();
        let mut out = Vec::new();
        let summary =
            process_timewindow(records.into_iter().map(Ok), &mut out, &window).unwrap();
        assert!(summary.records > parsed.len());
        assert_eq!(summary.bytes, out.len());

        let options = ParseOptions::default().with_unpack_data(true);
        let written: Vec<_> = MseedReader::with_options(&out, options)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(written[0].start_time, SECOND);
        assert_eq!(written[0].record_length, 256);
        let kept: usize = written.iter().map(|r| r.sample_count).sum();
        assert_eq!(kept, total - 1);
    }
}
