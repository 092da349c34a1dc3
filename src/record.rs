//! Unified miniSEED record type for v2 and v3.
//!
//! [`MseedRecord`] represents a single miniSEED record. It supports both v2
//! and v3 formats through a unified struct, similar to libmseed's
//! `MS3Record`: v2 identification is mapped to an FDSN source identifier,
//! v2 data quality to a publication version and v2 header flags to the v3
//! flag bits.

use std::fmt;
use std::ops::Range;

use serde_json::{Map, Value};

use crate::sid::SourceId;
use crate::time::{self, NsTime, SubSecond, TimeFormat};
use crate::types::{ByteOrder, EncodingFormat, FormatVersion, SampleType};
use crate::{MseedError, Result, codec, decode, encode};

/// Calibration signals present.
pub const FLAG_CALIBRATION: u8 = 0x01;
/// Time tag is questionable.
pub const FLAG_TIME_QUESTIONABLE: u8 = 0x02;
/// Clock locked.
pub const FLAG_CLOCK_LOCKED: u8 = 0x04;

/// Header fields are byte-swapped relative to the host.
pub const SWAP_HEADER: u8 = 0x01;
/// Payload is byte-swapped relative to the host.
pub const SWAP_PAYLOAD: u8 = 0x02;

/// Options controlling record parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Decode the payload into [`MseedRecord::samples`].
    pub unpack_data: bool,
    /// Verify the CRC-32C of v3 records.
    pub validate_crc: bool,
    /// Skip bytes that are not miniSEED instead of failing (readers only).
    pub skip_non_data: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            unpack_data: false,
            validate_crc: true,
            skip_non_data: false,
        }
    }
}

impl ParseOptions {
    pub fn with_unpack_data(mut self, unpack: bool) -> Self {
        self.unpack_data = unpack;
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
}

/// A miniSEED record (v2 or v3).
#[derive(Debug, Clone, PartialEq)]
pub struct MseedRecord {
    /// The miniSEED format version of this record.
    pub format_version: FormatVersion,
    pub source_id: SourceId,
    /// Record flags, see the `FLAG_*` constants.
    pub flags: u8,
    /// Start time of the first sample.
    pub start_time: NsTime,
    /// Samples per second, or the negated sample period in seconds.
    pub sample_rate: f64,
    /// Raw payload encoding code.
    pub encoding: u8,
    pub publication_version: u8,
    pub sample_count: usize,
    pub crc: u32,
    /// Extra headers as compact JSON text, empty when there are none.
    pub extra_headers: String,
    /// Record length in bytes. When packing this is the maximum length.
    pub record_length: usize,
    /// Payload length in bytes.
    pub data_length: usize,
    /// See [`SWAP_HEADER`] and [`SWAP_PAYLOAD`].
    pub swap_flags: u8,
    /// Byte order of the payload.
    pub byte_order: ByteOrder,
    /// Decoded samples, present after unpacking.
    pub samples: Option<Samples>,
    pub(crate) raw: Vec<u8>,
    pub(crate) data_offset: usize,
}

impl MseedRecord {
    /// Create a new `MseedRecord` with v2 defaults.
    ///
    /// Defaults: big-endian, 512-byte records, INT32, no samples.
    pub fn new() -> Self {
        Self {
            format_version: FormatVersion::V2,
            source_id: SourceId::default(),
            flags: 0,
            start_time: 0,
            sample_rate: 1.0,
            encoding: EncodingFormat::Int32.to_code(),
            publication_version: 0,
            sample_count: 0,
            crc: 0,
            extra_headers: String::new(),
            record_length: 512,
            data_length: 0,
            swap_flags: 0,
            byte_order: ByteOrder::Big,
            samples: None,
            raw: Vec::new(),
            data_offset: 0,
        }
    }

    /// Create a new `MseedRecord` with v3 defaults (4096-byte maximum length).
    pub fn new_v3() -> Self {
        Self {
            format_version: FormatVersion::V3,
            record_length: 4096,
            byte_order: ByteOrder::Little,
            ..Self::new()
        }
    }

    /// Parse one record from the start of `data`.
    pub fn parse(data: &[u8], options: &ParseOptions) -> Result<Self> {
        decode::parse(data, options)
    }

    pub fn with_source_id(mut self, source_id: SourceId) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn with_start_time(mut self, time: NsTime) -> Self {
        self.start_time = time;
        self
    }

    /// Set the sample rate in Hz (negative for a period in seconds).
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_encoding(mut self, enc: EncodingFormat) -> Self {
        self.encoding = enc.to_code();
        self
    }

    /// Set the sample data and count.
    pub fn with_samples(mut self, samples: Samples) -> Self {
        self.sample_count = samples.len();
        self.samples = Some(samples);
        self
    }

    /// Set the record length (power of 2 for v2, maximum length for v3).
    pub fn with_record_length(mut self, len: usize) -> Self {
        self.record_length = len;
        self
    }

    pub fn with_publication_version(mut self, version: u8) -> Self {
        self.publication_version = version;
        self
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Time of the last sample.
    pub fn endtime(&self) -> NsTime {
        if self.sample_count == 0 || self.sample_rate == 0.0 {
            return self.start_time;
        }
        time::sample_time(self.start_time, self.sample_count as i64 - 1, self.sample_rate)
    }

    /// Nominal sample rate in samples per second.
    pub fn sample_rate_hz(&self) -> f64 {
        time::sample_rate_hz(self.sample_rate)
    }

    pub fn encoding_format(&self) -> Result<EncodingFormat> {
        EncodingFormat::from_code(self.encoding)
    }

    /// Type of the decoded samples, or the type the encoding decodes to.
    pub fn sample_type(&self) -> Option<SampleType> {
        match &self.samples {
            Some(samples) => Some(samples.sample_type()),
            None => codec::sizetype(self.encoding).ok().map(|(_, t)| t),
        }
    }

    /// The raw record bytes, empty for records that were not parsed.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The encoded payload of a parsed record.
    pub fn payload(&self) -> &[u8] {
        let start = self.data_offset.min(self.raw.len());
        let end = (self.data_offset + self.data_length).min(self.raw.len());
        &self.raw[start..end]
    }

    /// The 6-digit sequence number of a parsed v2 record.
    pub fn sequence_number(&self) -> Option<u32> {
        if self.format_version != FormatVersion::V2 || self.raw.len() < 6 {
            return None;
        }
        std::str::from_utf8(&self.raw[..6]).ok()?.trim().parse().ok()
    }

    /// Decode the payload into [`samples`](Self::samples).
    ///
    /// Returns the number of samples decoded.
    pub fn unpack_data(&mut self) -> Result<usize> {
        if self.raw.is_empty() {
            return Err(MseedError::InvalidState(
                "record has no payload to unpack".into(),
            ));
        }
        let samples = codec::decode(
            self.payload(),
            self.encoding,
            self.sample_count,
            self.byte_order,
        )?;
        let count = samples.len();
        self.samples = Some(samples);
        Ok(count)
    }

    /// Extra headers parsed as a JSON object (empty object when absent).
    pub fn extra_headers_json(&self) -> Result<Value> {
        if self.extra_headers.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        Ok(serde_json::from_str(&self.extra_headers)?)
    }

    /// Replace the extra headers with `json`, which must be a JSON object.
    pub fn set_extra_headers(&mut self, json: &str) -> Result<()> {
        if json.trim().is_empty() {
            self.extra_headers.clear();
            return Ok(());
        }
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(MseedError::InvalidState(
                "extra headers must be a JSON object".into(),
            ));
        }
        self.extra_headers = serde_json::to_string(&value)?;
        Ok(())
    }

    /// Look up an extra header by path, e.g. `["FDSN", "Sequence"]`.
    pub fn extra_header(&self, path: &[&str]) -> Option<Value> {
        let mut value = self.extra_headers_json().ok()?;
        for key in path {
            value = value.get_mut(*key)?.take();
        }
        Some(value)
    }

    /// Set an extra header by path, creating intermediate objects.
    pub fn set_extra_header(&mut self, path: &[&str], new_value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(MseedError::InvalidState("empty extra header path".into()));
        };
        let mut root = self.extra_headers_json()?;
        let mut node = &mut root;
        for key in parents {
            let Value::Object(map) = node else {
                return Err(MseedError::InvalidState(format!(
                    "extra header {key} is not inside an object"
                )));
            };
            node = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let Value::Object(map) = node else {
            return Err(MseedError::InvalidState(format!(
                "extra header {last} is not inside an object"
            )));
        };
        map.insert(last.to_string(), new_value);
        self.extra_headers = serde_json::to_string(&root)?;
        Ok(())
    }

    pub fn calibration_signals_present(&self) -> bool {
        self.flags & FLAG_CALIBRATION != 0
    }

    pub fn time_tag_is_questionable(&self) -> bool {
        self.flags & FLAG_TIME_QUESTIONABLE != 0
    }

    pub fn clock_locked(&self) -> bool {
        self.flags & FLAG_CLOCK_LOCKED != 0
    }

    /// Names and states of the record flags.
    pub fn flags_dict(&self) -> [(&'static str, bool); 3] {
        [
            ("calibration_signals_present", self.calibration_signals_present()),
            ("time_tag_is_questionable", self.time_tag_is_questionable()),
            ("clock_locked", self.clock_locked()),
        ]
    }

    pub fn header_swapped(&self) -> bool {
        self.swap_flags & SWAP_HEADER != 0
    }

    pub fn payload_swapped(&self) -> bool {
        self.swap_flags & SWAP_PAYLOAD != 0
    }

    /// Pack `samples` into records using this record's header values.
    ///
    /// Each record is passed to `handler` once, in order. With `flush` unset
    /// only full records are produced and the unpacked tail is left to the
    /// caller. Returns `(packed_samples, packed_records)`.
    ///
    /// Packing a parsed v2 record keeps its sequence number by storing it in
    /// the extra headers as `FDSN.Sequence`; v2 output starts counting from
    /// that value.
    pub fn pack<F>(
        &mut self,
        samples: SampleSlice<'_>,
        flush: bool,
        mut handler: F,
    ) -> Result<(usize, usize)>
    where
        F: FnMut(&[u8]),
    {
        if let Some(sequence) = self.sequence_number() {
            self.set_extra_header(&["FDSN", "Sequence"], Value::from(sequence))?;
        }
        let sequence = self
            .extra_header(&["FDSN", "Sequence"])
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(1);
        let outcome = encode::pack_records(self, samples, flush, sequence, &mut handler)?;
        Ok((outcome.samples, outcome.records))
    }

    /// Pack this record's own samples, flushing everything.
    pub fn repack<F>(&mut self, handler: F) -> Result<(usize, usize)>
    where
        F: FnMut(&[u8]),
    {
        let samples = self.samples.take().unwrap_or(Samples::Int(Vec::new()));
        let result = self.pack(samples.as_slice(), true, handler);
        self.samples = Some(samples);
        result
    }
}

impl Default for MseedRecord {
    fn default() -> Self {
        Self::new()
    }
}

fn encoding_description(code: u8) -> String {
    match EncodingFormat::from_code(code) {
        Ok(enc) => format!("{enc} (val: {code})"),
        Err(_) => format!("unknown (val: {code})"),
    }
}

/// `{}` prints a one-line summary; `{:#}` prints all header details.
impl fmt::Display for MseedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = time::nstime_to_timestr(
            self.start_time,
            TimeFormat::IsoMonthDayZ,
            SubSecond::NanoMicroNone,
        )
        .unwrap_or_else(|_| self.start_time.to_string());

        if !f.alternate() {
            return write!(
                f,
                "{}, {}, {}, {} samples, {} Hz, {}",
                self.source_id,
                self.publication_version,
                self.record_length,
                self.sample_count,
                self.sample_rate_hz(),
                start
            );
        }

        writeln!(
            f,
            "{}, version {}, {} bytes (format: {})",
            self.source_id,
            self.publication_version,
            self.record_length,
            self.format_version.as_u8()
        )?;
        writeln!(f, "             start time: {start}")?;
        writeln!(f, "      number of samples: {}", self.sample_count)?;
        writeln!(f, "       sample rate (Hz): {}", self.sample_rate_hz())?;
        writeln!(f, "                  flags: [{:08b}] 8 bits", self.flags)?;
        for (name, set) in self.flags_dict() {
            if set {
                writeln!(f, "                         [{name}]")?;
            }
        }
        writeln!(f, "                    CRC: {:#010X}", self.crc)?;
        writeln!(f, "    extra header length: {} bytes", self.extra_headers.len())?;
        writeln!(f, "    data payload length: {} bytes", self.data_length)?;
        write!(f, "       payload encoding: {}", encoding_description(self.encoding))
    }
}

/// Decoded sample data.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<u8>),
}

impl Samples {
    /// An empty buffer of the given type.
    pub fn empty(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::Int => Samples::Int(Vec::new()),
            SampleType::Float => Samples::Float(Vec::new()),
            SampleType::Double => Samples::Double(Vec::new()),
            SampleType::Text => Samples::Text(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
            Samples::Double(v) => v.len(),
            Samples::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::Int(_) => SampleType::Int,
            Samples::Float(_) => SampleType::Float,
            Samples::Double(_) => SampleType::Double,
            Samples::Text(_) => SampleType::Text,
        }
    }

    pub fn as_slice(&self) -> SampleSlice<'_> {
        match self {
            Samples::Int(v) => SampleSlice::Int(v),
            Samples::Float(v) => SampleSlice::Float(v),
            Samples::Double(v) => SampleSlice::Double(v),
            Samples::Text(v) => SampleSlice::Text(v),
        }
    }

    /// Append samples of the same type.
    pub fn extend_from(&mut self, other: SampleSlice<'_>) -> Result<()> {
        match (self, other) {
            (Samples::Int(a), SampleSlice::Int(b)) => a.extend_from_slice(b),
            (Samples::Float(a), SampleSlice::Float(b)) => a.extend_from_slice(b),
            (Samples::Double(a), SampleSlice::Double(b)) => a.extend_from_slice(b),
            (Samples::Text(a), SampleSlice::Text(b)) => a.extend_from_slice(b),
            (this, other) => {
                return Err(MseedError::InvalidState(format!(
                    "cannot combine {} samples with {} samples",
                    this.sample_type(),
                    other.sample_type()
                )));
            }
        }
        Ok(())
    }

    /// Remove the first `count` samples.
    pub fn drain_front(&mut self, count: usize) {
        match self {
            Samples::Int(v) => drop(v.drain(..count.min(v.len()))),
            Samples::Float(v) => drop(v.drain(..count.min(v.len()))),
            Samples::Double(v) => drop(v.drain(..count.min(v.len()))),
            Samples::Text(v) => drop(v.drain(..count.min(v.len()))),
        }
    }
}

impl<'a> From<&'a Samples> for SampleSlice<'a> {
    fn from(samples: &'a Samples) -> Self {
        samples.as_slice()
    }
}

/// Borrowed view of sample data, used as packing input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleSlice<'a> {
    Int(&'a [i32]),
    Float(&'a [f32]),
    Double(&'a [f64]),
    Text(&'a [u8]),
}

impl<'a> SampleSlice<'a> {
    pub fn len(&self) -> usize {
        match self {
            SampleSlice::Int(v) => v.len(),
            SampleSlice::Float(v) => v.len(),
            SampleSlice::Double(v) => v.len(),
            SampleSlice::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleSlice::Int(_) => SampleType::Int,
            SampleSlice::Float(_) => SampleType::Float,
            SampleSlice::Double(_) => SampleType::Double,
            SampleSlice::Text(_) => SampleType::Text,
        }
    }

    /// Sub-range of the samples. Panics if out of bounds, like slice indexing.
    pub fn slice(&self, range: Range<usize>) -> SampleSlice<'a> {
        match *self {
            SampleSlice::Int(v) => SampleSlice::Int(&v[range]),
            SampleSlice::Float(v) => SampleSlice::Float(&v[range]),
            SampleSlice::Double(v) => SampleSlice::Double(&v[range]),
            SampleSlice::Text(v) => SampleSlice::Text(&v[range]),
        }
    }

    pub fn to_samples(&self) -> Samples {
        match *self {
            SampleSlice::Int(v) => Samples::Int(v.to_vec()),
            SampleSlice::Float(v) => Samples::Float(v.to_vec()),
            SampleSlice::Double(v) => Samples::Double(v.to_vec()),
            SampleSlice::Text(v) => Samples::Text(v.to_vec()),
        }
    }
}
