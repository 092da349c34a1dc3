//! Sample-accurate trimming of records to a time window.

use crate::record::{MseedRecord, ParseOptions};
use crate::time::{self, NsTime};
use crate::types::FormatVersion;
use crate::{MseedError, Result};

const V3_TRIM_RECORD_LENGTH: usize = 4096;

/// What trimming would do to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPlan {
    /// The record lies entirely outside the window.
    Exclude,
    /// The record lies entirely inside the window.
    Keep,
    /// Drop `leading` and `trailing` samples; the first kept sample is at
    /// `start_time`.
    Clip {
        leading: usize,
        trailing: usize,
        start_time: NsTime,
    },
}

/// Result of [`trim_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimOutcome {
    Excluded,
    Unchanged,
    /// The re-packed record.
    Trimmed(Vec<u8>),
}

/// Decide how `record` must be trimmed to fit `[earliest, latest]`.
///
/// Fails with [`MseedError::NoCoverage`] for header-only records, which
/// have no samples to trim.
pub fn plan_trim(
    record: &MseedRecord,
    earliest: Option<NsTime>,
    latest: Option<NsTime>,
) -> Result<TrimPlan> {
    let start = record.start_time;
    let end = record.endtime();

    if earliest.is_some_and(|e| end < e) || latest.is_some_and(|l| start > l) {
        return Ok(TrimPlan::Exclude);
    }
    if record.sample_count == 0 && record.sample_rate == 0.0 {
        return Err(MseedError::NoCoverage);
    }

    let cut_leading = earliest.filter(|&e| start < e && e <= end);
    let cut_trailing = latest.filter(|&l| start <= l && l < end);
    if cut_leading.is_none() && cut_trailing.is_none() {
        return Ok(TrimPlan::Keep);
    }

    let period = time::sample_period_ns(record.sample_rate);
    if period <= 0 {
        return Err(MseedError::NoCoverage);
    }

    let mut start_time = start;
    let mut leading = 0;
    if let Some(earliest) = cut_leading {
        while start_time < earliest {
            start_time += period;
            leading += 1;
        }
    }

    let mut trailing = 0;
    if let Some(latest) = cut_trailing {
        let mut end_time = end;
        while end_time > latest {
            end_time -= period;
            trailing += 1;
        }
    }

    if leading + trailing >= record.sample_count {
        return Ok(TrimPlan::Exclude);
    }
    Ok(TrimPlan::Clip {
        leading,
        trailing,
        start_time,
    })
}

/// Trim `record` to `[earliest, latest]`, re-packing it when samples are
/// removed.
///
/// Records without samples are left unchanged. The trimmed samples are
/// packed into exactly one record with the original header values; use
/// [`trim_to_records`] when the slice may not fit a fixed-length record.
pub fn trim_record(
    record: &MseedRecord,
    earliest: Option<NsTime>,
    latest: Option<NsTime>,
) -> Result<TrimOutcome> {
    match trim_to_records(record, earliest, latest)? {
        TrimmedRecords::Excluded => Ok(TrimOutcome::Excluded),
        TrimmedRecords::Unchanged => Ok(TrimOutcome::Unchanged),
        TrimmedRecords::Packed(mut packed) if packed.len() == 1 => {
            Ok(TrimOutcome::Trimmed(packed.remove(0)))
        }
        TrimmedRecords::Packed(packed) => Err(MseedError::InvalidState(format!(
            "trimming {} produced {} records",
            record.source_id,
            packed.len()
        ))),
    }
}

/// Result of [`trim_to_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimmedRecords {
    Excluded,
    Unchanged,
    /// Re-packed records in time order, usually one.
    Packed(Vec<Vec<u8>>),
}

/// Trim `record` like [`trim_record`], returning every record the trimmed
/// samples pack into.
///
/// Steim1 groups differences greedily, so dropping leading samples from a
/// full fixed-length v2 record can need one more frame than the original.
pub fn trim_to_records(
    record: &MseedRecord,
    earliest: Option<NsTime>,
    latest: Option<NsTime>,
) -> Result<TrimmedRecords> {
    let (leading, trailing, start_time) = match plan_trim(record, earliest, latest) {
        Ok(TrimPlan::Exclude) => return Ok(TrimmedRecords::Excluded),
        Ok(TrimPlan::Keep) | Err(MseedError::NoCoverage) => {
            return Ok(TrimmedRecords::Unchanged);
        }
        Ok(TrimPlan::Clip {
            leading,
            trailing,
            start_time,
        }) => (leading, trailing, start_time),
        Err(err) => return Err(err),
    };

    let mut working = if record.samples.is_some() {
        record.clone()
    } else {
        let options = ParseOptions::default()
            .with_unpack_data(true)
            .with_validate_crc(false);
        let mut parsed = MseedRecord::parse(record.raw(), &options)?;
        parsed.record_length = record.record_length;
        parsed
    };
    let samples = working
        .samples
        .take()
        .ok_or_else(|| MseedError::InvalidState("record has no samples to trim".into()))?;
    let kept = samples.len().saturating_sub(trailing);
    if leading >= kept {
        return Ok(TrimmedRecords::Excluded);
    }
    working.start_time = start_time;
    if working.format_version == FormatVersion::V3 {
        // parsed v3 lengths are exact; a re-encoded subset may need more room
        working.record_length = working.record_length.max(V3_TRIM_RECORD_LENGTH);
    }

    let mut packed = Vec::new();
    working.pack(samples.as_slice().slice(leading..kept), true, |rec| {
        packed.push(rec.to_vec())
    })?;
    Ok(TrimmedRecords::Packed(packed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Samples;
    use crate::sid::SourceId;
    use crate::types::EncodingFormat;

    const SECOND: NsTime = 1_000_000_000;

    /// 100 samples at 10 Hz starting at 100 s.
    fn record(version_three: bool) -> MseedRecord {
        let base = if version_three {
            MseedRecord::new_v3()
        } else {
            MseedRecord::new().with_record_length(1024)
        };
        let mut raw = Vec::new();
        base.with_source_id(SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap())
            .with_start_time(100 * SECOND)
            .with_sample_rate(10.0)
            .with_encoding(EncodingFormat::Steim2)
            .with_samples(Samples::Int((0..100).collect()))
            .repack(|rec| raw.extend_from_slice(rec))
            .unwrap();
        MseedRecord::parse(&raw, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_plan_exclude_and_keep() {
        let rec = record(true);
        assert_eq!(plan_trim(&rec, Some(200 * SECOND), None).unwrap(), TrimPlan::Exclude);
        assert_eq!(plan_trim(&rec, None, Some(50 * SECOND)).unwrap(), TrimPlan::Exclude);
        assert_eq!(
            plan_trim(&rec, Some(50 * SECOND), Some(200 * SECOND)).unwrap(),
            TrimPlan::Keep
        );
        assert_eq!(plan_trim(&rec, None, None).unwrap(), TrimPlan::Keep);
    }

    #[test]
    fn test_plan_leading_and_trailing() {
        let rec = record(true);
        // earliest falls between samples: the next sample is kept
        let plan =
            plan_trim(&rec, Some(102 * SECOND + 50_000_000), Some(105 * SECOND)).unwrap();
        assert_eq!(
            plan,
            TrimPlan::Clip {
                leading: 21,
                trailing: 49,
                start_time: 102 * SECOND + 100_000_000,
            }
        );
    }

    #[test]
    fn test_header_only_record() {
        let rec = MseedRecord::new_v3()
            .with_source_id(SourceId::parse("FDSN:XX_TEST__L_O_G").unwrap())
            .with_start_time(100 * SECOND)
            .with_sample_rate(0.0);
        assert!(matches!(
            plan_trim(&rec, Some(90 * SECOND), Some(110 * SECOND)),
            Err(MseedError::NoCoverage)
        ));
        assert_eq!(
            trim_record(&rec, Some(90 * SECOND), Some(110 * SECOND)).unwrap(),
            TrimOutcome::Unchanged
        );
    }

    #[test]
    fn test_trim_record_v3() {
        let rec = record(true);
        let TrimOutcome::Trimmed(raw) =
            trim_record(&rec, Some(102 * SECOND), Some(105 * SECOND)).unwrap()
        else {
            panic!("expected a trimmed record");
        };
        let trimmed =
            MseedRecord::parse(&raw, &ParseOptions::default().with_unpack_data(true)).unwrap();
        assert_eq!(trimmed.start_time, 102 * SECOND);
        assert_eq!(trimmed.endtime(), 105 * SECOND);
        assert_eq!(trimmed.samples, Some(Samples::Int((20..51).collect())));
        assert_eq!(trimmed.source_id, rec.source_id);
    }

    #[test]
    fn test_trim_record_v2_keeps_sequence() {
        let rec = record(false);
        let TrimOutcome::Trimmed(raw) = trim_record(&rec, Some(109 * SECOND), None).unwrap()
        else {
            panic!("expected a trimmed record");
        };
        assert_eq!(raw.len(), 1024);
        let trimmed = MseedRecord::parse(&raw, &ParseOptions::default()).unwrap();
        assert_eq!(trimmed.sample_count, 10);
        assert_eq!(trimmed.sequence_number(), rec.sequence_number());
    }

    #[test]
    fn test_trim_everything_dropped() {
        let rec = record(true);
        // window between two samples
        let outcome = trim_record(
            &rec,
            Some(102 * SECOND + 10_000_000),
            Some(102 * SECOND + 20_000_000),
        )
        .unwrap();
        assert_eq!(outcome, TrimOutcome::Excluded);
    }

    /// First record of a v2 Steim1 stream, filled to its 512-byte capacity.
    /// Four small differences then a two-byte one defeat greedy word packing.
    fn full_v2_steim1() -> MseedRecord {
        let mut value = 0;
        let values: Vec<i32> = (0..2000)
            .map(|i| {
                value += if i % 5 == 4 { 3000 } else { 1 };
                value
            })
            .collect();
        let mut first = None;
        MseedRecord::new()
            .with_source_id(SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap())
            .with_start_time(100 * SECOND)
            .with_sample_rate(20.0)
            .with_encoding(EncodingFormat::Steim1)
            .with_samples(Samples::Int(values))
            .repack(|rec| {
                first.get_or_insert_with(|| rec.to_vec());
            })
            .unwrap();
        MseedRecord::parse(&first.unwrap(), &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_trim_full_v2_steim1_keeps_every_sample() {
        let rec = full_v2_steim1();
        assert_eq!(rec.record_length, 512);
        let period = time::sample_period_ns(rec.sample_rate);

        for k in 1..=7 {
            let earliest = rec.start_time + k * period;
            let outcome = trim_to_records(&rec, Some(earliest), None).unwrap();
            let TrimmedRecords::Packed(packed) = outcome else {
                panic!("expected packed records for k={k}");
            };
            let options = ParseOptions::default().with_unpack_data(true);
            let parsed: Vec<_> = packed
                .iter()
                .map(|raw| MseedRecord::parse(raw, &options).unwrap())
                .collect();
            assert!(packed.iter().all(|raw| raw.len() == 512));
            assert_eq!(parsed[0].start_time, earliest);
            let total: usize = parsed.iter().map(|r| r.sample_count).sum();
            assert_eq!(total, rec.sample_count - k as usize);

            match trim_record(&rec, Some(earliest), None) {
                Ok(TrimOutcome::Trimmed(_)) => assert_eq!(packed.len(), 1),
                Err(MseedError::InvalidState(_)) => assert!(packed.len() > 1),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn test_trim_overflow_packs_several_records() {
        let mut rec = full_v2_steim1();
        // same samples, half the room
        rec.record_length = 256;
        let earliest = rec.start_time + time::sample_period_ns(rec.sample_rate);

        let TrimmedRecords::Packed(packed) = trim_to_records(&rec, Some(earliest), None).unwrap()
        else {
            panic!("expected packed records");
        };
        assert!(packed.len() > 1);
        assert!(packed.iter().all(|raw| raw.len() == 256));
        assert!(matches!(
            trim_record(&rec, Some(earliest), None),
            Err(MseedError::InvalidState(_))
        ));
    }
}
