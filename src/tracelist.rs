//! Trace assembly: records grouped by source identifier into continuous
//! segments, held in an ordered index.
//!
//! A [`TraceList`] maps each [`TraceId`] (source identifier, optionally
//! split by publication version) to its chronologically ordered
//! [`TraceSegment`]s. Records are added one at a time; each record either
//! extends a segment it is continuous with or starts a new one.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::codec;
use crate::reader::{MseedReader, StreamReader};
use crate::reclist::{RecordList, RecordPtr, RecordSource};
use crate::record::{MseedRecord, ParseOptions, Samples};
use crate::sid::SourceId;
use crate::time::{self, NsTime, SubSecond, TimeFormat};
use crate::types::SampleType;
use crate::{MseedError, Result};

/// Options controlling how records are assembled into traces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceListOptions {
    /// Keep each publication version of a source identifier separate.
    pub split_version: bool,
    /// Decode samples as records are added.
    pub unpack_data: bool,
    /// Keep references to the contributing records for later decoding.
    pub record_list: bool,
    pub validate_crc: bool,
    pub skip_non_data: bool,
    /// Continuity tolerance in seconds; half a sample period when unset.
    pub time_tolerance: Option<f64>,
    /// Sample rate tolerance in Hz; a relative difference below 0.0001
    /// when unset.
    pub sample_rate_tolerance: Option<f64>,
    /// Try every segment, not only the last, when a record does not follow
    /// the latest data.
    pub merge_out_of_order: bool,
    /// Join neighbouring segments that a new record makes contiguous.
    pub autoheal: bool,
}

impl Default for TraceListOptions {
    fn default() -> Self {
        Self {
            split_version: false,
            unpack_data: false,
            record_list: false,
            validate_crc: true,
            skip_non_data: false,
            time_tolerance: None,
            sample_rate_tolerance: None,
            merge_out_of_order: true,
            autoheal: true,
        }
    }
}

impl TraceListOptions {
    pub fn with_split_version(mut self, split: bool) -> Self {
        self.split_version = split;
        self
    }

    pub fn with_unpack_data(mut self, unpack: bool) -> Self {
        self.unpack_data = unpack;
        self
    }

    pub fn with_record_list(mut self, record_list: bool) -> Self {
        self.record_list = record_list;
        self
    }

    pub fn with_validate_crc(mut self, validate: bool) -> Self {
        self.validate_crc = validate;
        self
    }

    pub fn with_skip_non_data(mut self, skip: bool) -> Self {
        self.skip_non_data = skip;
        self
    }

    /// Continuity tolerance in seconds.
    pub fn with_time_tolerance(mut self, seconds: f64) -> Self {
        self.time_tolerance = Some(seconds);
        self
    }

    /// Sample rate tolerance in Hz.
    pub fn with_sample_rate_tolerance(mut self, hz: f64) -> Self {
        self.sample_rate_tolerance = Some(hz);
        self
    }

    pub fn with_merge_out_of_order(mut self, merge: bool) -> Self {
        self.merge_out_of_order = merge;
        self
    }

    pub fn with_autoheal(mut self, autoheal: bool) -> Self {
        self.autoheal = autoheal;
        self
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions::default()
            .with_unpack_data(self.unpack_data)
            .with_validate_crc(self.validate_crc)
            .with_skip_non_data(self.skip_non_data)
    }
}

/// Data held by a segment.
#[derive(Debug, Clone)]
pub enum SegmentData {
    /// Decoded samples.
    Samples(Samples),
    /// References to the records, decoded on request.
    Records(RecordList),
    /// Samples were decoded into a caller-owned buffer.
    Released,
    /// Time coverage only.
    CoverageOnly,
}

impl SegmentData {
    fn kind(&self) -> &'static str {
        match self {
            SegmentData::Samples(_) => "samples",
            SegmentData::Records(_) => "records",
            SegmentData::Released => "released",
            SegmentData::CoverageOnly => "coverage",
        }
    }
}

/// A continuous run of samples.
#[derive(Debug, Clone)]
pub struct TraceSegment {
    pub start_time: NsTime,
    /// Time of the last sample.
    pub end_time: NsTime,
    /// Nominal rate, negative for a sample period in seconds.
    pub sample_rate: f64,
    pub sample_count: usize,
    pub sample_type: Option<SampleType>,
    pub data: SegmentData,
    /// Wall-clock time of the last change.
    pub updated: DateTime<Utc>,
}

impl TraceSegment {
    fn new(
        start_time: NsTime,
        sample_rate: f64,
        sample_count: usize,
        sample_type: Option<SampleType>,
        data: SegmentData,
    ) -> Self {
        let end_time = if sample_count == 0 {
            start_time
        } else {
            time::sample_time(start_time, sample_count as i64 - 1, sample_rate)
        };
        Self {
            start_time,
            end_time,
            sample_rate,
            sample_count,
            sample_type,
            data,
            updated: Utc::now(),
        }
    }

    /// Decoded samples, if the segment holds them.
    pub fn samples(&self) -> Option<&Samples> {
        match &self.data {
            SegmentData::Samples(samples) => Some(samples),
            _ => None,
        }
    }

    pub fn record_list(&self) -> Option<&RecordList> {
        match &self.data {
            SegmentData::Records(list) => Some(list),
            _ => None,
        }
    }

    /// Decode the record list into the segment's own sample buffer.
    ///
    /// Returns the number of samples decoded.
    pub fn unpack_recordlist(&mut self) -> Result<usize> {
        let mut samples = Samples::empty(self.sample_type.unwrap_or(SampleType::Int));
        let count = self.decode_records(&mut samples)?;
        self.data = SegmentData::Samples(samples);
        self.updated = Utc::now();
        Ok(count)
    }

    /// Decode the record list into `dest`, leaving the segment released.
    ///
    /// Samples are appended to `dest`; an empty `dest` takes the segment's
    /// sample type.
    pub fn unpack_recordlist_into(&mut self, dest: &mut Samples) -> Result<usize> {
        let count = self.decode_records(dest)?;
        self.data = SegmentData::Released;
        self.updated = Utc::now();
        Ok(count)
    }

    fn decode_records(&self, dest: &mut Samples) -> Result<usize> {
        let list = match &self.data {
            SegmentData::Records(list) => list,
            SegmentData::Samples(_) | SegmentData::Released => {
                return Err(MseedError::AlreadyUnpacked);
            }
            SegmentData::CoverageOnly => return Err(MseedError::NoRecordList),
        };
        let count = list.unpack_into(dest)?;
        if count != self.sample_count {
            return Err(MseedError::SampleCountMismatch {
                expected: self.sample_count,
                actual: count,
            });
        }
        Ok(count)
    }

    /// Decoded sample size and type of the segment's data.
    ///
    /// For a record list this comes from the first referenced record.
    pub fn sample_size_type(&self) -> Result<(usize, SampleType)> {
        match &self.data {
            SegmentData::Samples(samples) => {
                let sample_type = samples.sample_type();
                Ok((sample_type.size(), sample_type))
            }
            SegmentData::Records(list) => {
                let first = list.first().ok_or(MseedError::NoRecordList)?;
                let record = first.parse(&ParseOptions::default().with_validate_crc(false))?;
                codec::sizetype(record.encoding)
            }
            SegmentData::Released | SegmentData::CoverageOnly => match self.sample_type {
                Some(sample_type) => Ok((sample_type.size(), sample_type)),
                None => Err(MseedError::NoRecordList),
            },
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate_hz(&self) -> f64 {
        time::sample_rate_hz(self.sample_rate)
    }

    fn can_join(&self, other: &TraceSegment, options: &TraceListOptions) -> bool {
        let same_kind = matches!(
            (&self.data, &other.data),
            (SegmentData::Samples(_), SegmentData::Samples(_))
                | (SegmentData::Records(_), SegmentData::Records(_))
                | (SegmentData::CoverageOnly, SegmentData::CoverageOnly)
        );
        same_kind
            && self.sample_type == other.sample_type
            && self.sample_rate_hz() != 0.0
            && rates_match(self.sample_rate, other.sample_rate, options.sample_rate_tolerance)
    }

    /// Whether `next` starts one sample period after this segment ends.
    fn is_followed_by(&self, next: &TraceSegment, options: &TraceListOptions) -> bool {
        if !self.can_join(next, options) {
            return false;
        }
        let period = time::sample_period_ns(self.sample_rate);
        let expected = self.end_time + period;
        (next.start_time - expected).abs() <= time_tolerance_ns(self.sample_rate, options)
    }

    /// Append a segment that follows this one.
    fn append(&mut self, next: TraceSegment) -> Result<()> {
        match (&mut self.data, next.data) {
            (SegmentData::Samples(ours), SegmentData::Samples(theirs)) => {
                ours.extend_from(theirs.as_slice())?
            }
            (SegmentData::Records(ours), SegmentData::Records(mut theirs)) => {
                ours.append(&mut theirs)
            }
            _ => {}
        }
        self.end_time = next.end_time;
        self.sample_count += next.sample_count;
        self.updated = Utc::now();
        Ok(())
    }

    /// Prepend a segment that precedes this one.
    fn prepend(&mut self, previous: TraceSegment) -> Result<()> {
        let start_time = previous.start_time;
        let count = previous.sample_count;
        match (&mut self.data, previous.data) {
            (SegmentData::Samples(ours), SegmentData::Samples(mut theirs)) => {
                theirs.extend_from(ours.as_slice())?;
                *ours = theirs;
            }
            (SegmentData::Records(ours), SegmentData::Records(mut theirs)) => {
                ours.prepend(&mut theirs)
            }
            _ => {}
        }
        self.start_time = start_time;
        self.sample_count += count;
        self.updated = Utc::now();
        Ok(())
    }
}

fn rates_match(a: f64, b: f64, tolerance: Option<f64>) -> bool {
    let (a, b) = (time::sample_rate_hz(a), time::sample_rate_hz(b));
    match tolerance {
        Some(hz) => (a - b).abs() <= hz,
        None if b == 0.0 => a == 0.0,
        None => (1.0 - a / b).abs() < 0.0001,
    }
}

fn time_tolerance_ns(rate: f64, options: &TraceListOptions) -> i64 {
    match options.time_tolerance {
        Some(seconds) => (seconds * 1e9).round() as i64,
        None => time::sample_period_ns(rate) / 2,
    }
}

/// One source identifier (and publication version, when split) with its
/// segments.
#[derive(Debug, Clone)]
pub struct TraceId {
    pub source_id: SourceId,
    /// Publication version; the highest seen when versions are not split.
    pub publication_version: u8,
    /// Earliest segment start.
    pub earliest: NsTime,
    /// Latest segment end.
    pub latest: NsTime,
    /// Segments in chronological order.
    pub segments: Vec<TraceSegment>,
    pub(crate) pack_sequence: u32,
}

impl TraceId {
    fn new(source_id: SourceId, publication_version: u8) -> Self {
        Self {
            source_id,
            publication_version,
            earliest: NsTime::MAX,
            latest: NsTime::MIN,
            segments: Vec::new(),
            pack_sequence: 1,
        }
    }

    pub fn numsegments(&self) -> usize {
        self.segments.len()
    }

    pub fn segments_mut(&mut self) -> &mut [TraceSegment] {
        &mut self.segments
    }

    pub(crate) fn refresh_extent(&mut self) {
        self.earliest = self
            .segments
            .iter()
            .map(|s| s.start_time)
            .min()
            .unwrap_or(NsTime::MAX);
        self.latest = self
            .segments
            .iter()
            .map(|s| s.end_time)
            .max()
            .unwrap_or(NsTime::MIN);
    }

    /// Merge `incoming` into the segments.
    fn assimilate(&mut self, incoming: TraceSegment, options: &TraceListOptions) -> Result<()> {
        if let Some(last) = self.segments.last_mut() {
            if last.is_followed_by(&incoming, options) {
                last.append(incoming)?;
                self.refresh_extent();
                return Ok(());
            }
        }

        if options.merge_out_of_order {
            let count = self.segments.len();
            for index in 0..count {
                if self.segments[index].is_followed_by(&incoming, options) {
                    debug!(sid = %self.source_id, index, "appending out-of-order data");
                    self.segments[index].append(incoming)?;
                    if options.autoheal {
                        self.heal(index, options)?;
                    }
                    self.refresh_extent();
                    return Ok(());
                }
                if incoming.is_followed_by(&self.segments[index], options) {
                    debug!(sid = %self.source_id, index, "prepending out-of-order data");
                    self.segments[index].prepend(incoming)?;
                    if options.autoheal && index > 0 {
                        self.heal(index - 1, options)?;
                    }
                    self.refresh_extent();
                    return Ok(());
                }
            }
        }

        let position = self
            .segments
            .partition_point(|s| s.start_time <= incoming.start_time);
        debug!(
            sid = %self.source_id,
            position,
            start = incoming.start_time,
            "new segment"
        );
        self.segments.insert(position, incoming);
        self.refresh_extent();
        Ok(())
    }

    /// Join the segment at `index` with its successor if they now touch.
    fn heal(&mut self, index: usize, options: &TraceListOptions) -> Result<()> {
        let Some(next) = self.segments.get(index + 1) else {
            return Ok(());
        };
        if self.segments[index].is_followed_by(next, options) {
            let next = self.segments.remove(index + 1);
            debug!(sid = %self.source_id, index, "healed gap between segments");
            self.segments[index].append(next)?;
        }
        Ok(())
    }
}

/// Ordered index of traces.
///
/// # Example
///
/// ```
/// use miniseed_trace::{MseedRecord, Samples, SourceId, TraceList};
///
/// let sid = SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap();
/// let mut traces = TraceList::default();
/// traces.add_data(&sid, Samples::Int(vec![1, 2, 3]), 1.0, 0, 1).unwrap();
/// traces.add_data(&sid, Samples::Int(vec![4, 5]), 1.0, 3_000_000_000, 1).unwrap();
///
/// let trace = traces.find(&sid, 0).unwrap();
/// assert_eq!(trace.numsegments(), 1);
/// assert_eq!(trace.segments[0].sample_count, 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceList {
    options: TraceListOptions,
    pub(crate) traces: BTreeMap<(SourceId, u8), TraceId>,
}

impl TraceList {
    pub fn new(options: TraceListOptions) -> Self {
        Self {
            options,
            traces: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &TraceListOptions {
        &self.options
    }

    fn key(&self, source_id: &SourceId, version: u8) -> (SourceId, u8) {
        let version = if self.options.split_version { version } else { 0 };
        (source_id.clone(), version)
    }

    fn lookup(&self, source_id: &SourceId, version: u8) -> Option<(SourceId, u8)> {
        if self.options.split_version && version == 0 {
            let low = (source_id.clone(), 0);
            let high = (source_id.clone(), u8::MAX);
            return self.traces.range(low..=high).next().map(|(k, _)| k.clone());
        }
        let key = self.key(source_id, version);
        self.traces.contains_key(&key).then_some(key)
    }

    /// Find a trace. Version 0 matches any version.
    pub fn find(&self, source_id: &SourceId, version: u8) -> Result<&TraceId> {
        self.lookup(source_id, version)
            .and_then(|key| self.traces.get(&key))
            .ok_or_else(|| MseedError::NotFound(source_id.to_string()))
    }

    pub fn find_mut(&mut self, source_id: &SourceId, version: u8) -> Result<&mut TraceId> {
        let key = self
            .lookup(source_id, version)
            .ok_or_else(|| MseedError::NotFound(source_id.to_string()))?;
        self.traces
            .get_mut(&key)
            .ok_or_else(|| MseedError::NotFound(source_id.to_string()))
    }

    /// Find a trace, creating it when missing.
    pub fn insert_or_get(&mut self, source_id: &SourceId, version: u8) -> &mut TraceId {
        let key = self.key(source_id, version);
        let trace = self
            .traces
            .entry(key)
            .or_insert_with(|| TraceId::new(source_id.clone(), version));
        if version > trace.publication_version {
            trace.publication_version = version;
        }
        trace
    }

    /// Merge a segment into its trace. A new trace is only inserted, and an
    /// existing trace's version only raised, once the merge succeeds.
    fn add_segment(
        &mut self,
        source_id: &SourceId,
        version: u8,
        segment: TraceSegment,
    ) -> Result<()> {
        let options = self.options;
        let key = self.key(source_id, version);
        match self.traces.entry(key) {
            Entry::Occupied(mut entry) => {
                let trace = entry.get_mut();
                trace.assimilate(segment, &options)?;
                trace.publication_version = trace.publication_version.max(version);
            }
            Entry::Vacant(entry) => {
                let mut trace = TraceId::new(source_id.clone(), version);
                trace.assimilate(segment, &options)?;
                entry.insert(trace);
            }
        }
        Ok(())
    }

    /// Traces ordered by source identifier, then version.
    pub fn iter(&self) -> impl Iterator<Item = &TraceId> {
        self.traces.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TraceId> {
        self.traces.values_mut()
    }

    pub fn numtraceids(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn sourceids(&self) -> impl Iterator<Item = &SourceId> {
        self.traces.values().map(|trace| &trace.source_id)
    }

    pub fn remove(&mut self, source_id: &SourceId, version: u8) -> Option<TraceId> {
        let key = self.lookup(source_id, version)?;
        self.traces.remove(&key)
    }

    /// Add a parsed record.
    ///
    /// `ptr` locates the record's bytes and is required when the list keeps
    /// record references. Returns `false` for records without samples,
    /// which are skipped.
    pub fn add_record(&mut self, record: &MseedRecord, ptr: Option<RecordPtr>) -> Result<bool> {
        if record.sample_count == 0 {
            debug!(sid = %record.source_id, "skipping record without samples");
            return Ok(false);
        }

        let sample_type = codec::sizetype(record.encoding).ok().map(|(_, t)| t);
        let data = if self.options.unpack_data {
            let samples = match &record.samples {
                Some(samples) => samples.clone(),
                None => codec::decode(
                    record.payload(),
                    record.encoding,
                    record.sample_count,
                    record.byte_order,
                )?,
            };
            if samples.len() != record.sample_count {
                return Err(MseedError::SampleCountMismatch {
                    expected: record.sample_count,
                    actual: samples.len(),
                });
            }
            SegmentData::Samples(samples)
        } else if self.options.record_list {
            let ptr = ptr.ok_or_else(|| {
                MseedError::InvalidState("record list requested without a record pointer".into())
            })?;
            let mut list = RecordList::new(self.options.validate_crc);
            list.push(ptr);
            SegmentData::Records(list)
        } else {
            SegmentData::CoverageOnly
        };

        let segment = TraceSegment::new(
            record.start_time,
            record.sample_rate,
            record.sample_count,
            sample_type,
            data,
        );
        self.add_segment(&record.source_id, record.publication_version, segment)?;
        Ok(true)
    }

    /// Add samples directly.
    pub fn add_data(
        &mut self,
        source_id: &SourceId,
        samples: Samples,
        sample_rate: f64,
        start_time: NsTime,
        publication_version: u8,
    ) -> Result<bool> {
        if samples.is_empty() {
            debug!(sid = %source_id, "skipping empty sample buffer");
            return Ok(false);
        }
        let segment = TraceSegment::new(
            start_time,
            sample_rate,
            samples.len(),
            Some(samples.sample_type()),
            SegmentData::Samples(samples),
        );
        self.add_segment(source_id, publication_version, segment)?;
        Ok(true)
    }

    /// Add every record in a buffer. Returns the number of records read.
    pub fn read_buffer(&mut self, data: Arc<[u8]>) -> Result<usize> {
        let mut reader = MseedReader::with_options(&data, self.options.parse_options());
        let mut count = 0;
        while let Some(record) = reader.next() {
            let record = record?;
            let ptr = self.options.record_list.then(|| {
                RecordPtr::new(
                    RecordSource::Buffer(Arc::clone(&data)),
                    reader.last_offset() as u64,
                    &record,
                )
            });
            self.add_record(&record, ptr)?;
            count += 1;
        }
        Ok(count)
    }

    /// Add every record in a file. Returns the number of records read.
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = Arc::new(path.as_ref().to_path_buf());
        let mut reader = StreamReader::open(path.as_path(), self.options.parse_options())?;
        let mut count = 0;
        while let Some(record) = reader.next() {
            let record = record?;
            let ptr = self.options.record_list.then(|| {
                RecordPtr::new(
                    RecordSource::File(Arc::clone(&path)),
                    reader.last_offset(),
                    &record,
                )
            });
            self.add_record(&record, ptr)?;
            count += 1;
        }
        if count == 0 {
            warn!(path = %path.display(), "no miniSEED records found");
        }
        Ok(count)
    }

    /// Drop segments with no samples left, then traces with no segments.
    pub(crate) fn prune(&mut self) {
        for trace in self.traces.values_mut() {
            trace.segments.retain(|s| s.sample_count > 0);
            trace.refresh_extent();
        }
        self.traces.retain(|_, trace| !trace.segments.is_empty());
    }
}

fn timestr(nstime: NsTime) -> String {
    time::nstime_to_timestr(nstime, TimeFormat::IsoMonthDayZ, SubSecond::NanoMicro)
        .unwrap_or_else(|_| nstime.to_string())
}

impl fmt::Display for TraceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<37}{:<28}{:<21}Hz  Samples",
            "       SourceID", "Start sample", "End sample"
        )?;
        let mut segments = 0;
        for trace in self.iter() {
            for seg in &trace.segments {
                writeln!(
                    f,
                    "{:<27} {:>2} {} {} {:>8} {:>8}",
                    trace.source_id.as_str(),
                    trace.publication_version,
                    timestr(seg.start_time),
                    timestr(seg.end_time),
                    format!("{:.3}", seg.sample_rate_hz()),
                    seg.sample_count
                )?;
                segments += 1;
            }
        }
        write!(
            f,
            "Total: {} trace(s) with {} segment(s)",
            self.numtraceids(),
            segments
        )
    }
}

impl fmt::Display for TraceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}, {} samples at {} Hz ({})",
            timestr(self.start_time),
            timestr(self.end_time),
            self.sample_count,
            self.sample_rate_hz(),
            self.data.kind()
        )
    }
}
