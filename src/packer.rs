//! Streaming packer: re-serialize buffered trace samples into records.
//!
//! [`TraceList::pack`] emits records for every segment that holds decoded
//! samples. Without flushing, only complete records are produced and the
//! remaining samples stay in the segment for a later call, so a trace list
//! can be fed and drained incrementally.

use tracing::{debug, warn};

use crate::encode;
use crate::record::MseedRecord;
use crate::time;
use crate::tracelist::{SegmentData, TraceList};
use crate::types::{ByteOrder, EncodingFormat, FormatVersion};
use crate::Result;

/// Options for [`TraceList::pack`].
#[derive(Debug, Clone, PartialEq)]
pub struct PackOptions {
    /// Pack every remaining sample, including partial records.
    pub flush: bool,
    /// Record length for v2, maximum record length for v3.
    pub record_length: usize,
    pub encoding: EncodingFormat,
    pub format_version: FormatVersion,
    /// Extra headers (JSON object) written to every v3 record.
    pub extra_headers: Option<String>,
    /// Keep emptied segments and traces in the list.
    pub maintain: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            flush: true,
            record_length: 4096,
            encoding: EncodingFormat::Steim1,
            format_version: FormatVersion::V3,
            extra_headers: None,
            maintain: false,
        }
    }
}

impl PackOptions {
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_record_length(mut self, len: usize) -> Self {
        self.record_length = len;
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingFormat) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_format_version(mut self, version: FormatVersion) -> Self {
        self.format_version = version;
        self
    }

    pub fn with_extra_headers(mut self, json: impl Into<String>) -> Self {
        self.extra_headers = Some(json.into());
        self
    }

    pub fn with_maintain(mut self, maintain: bool) -> Self {
        self.maintain = maintain;
        self
    }
}

impl TraceList {
    /// Pack buffered samples into records, passing each to `handler`.
    ///
    /// Traces are visited in index order and segments chronologically.
    /// Packed samples are removed from their segment and its start time
    /// advances past them. Segments without decoded samples are skipped.
    /// v2 sequence numbers continue across calls for each trace.
    ///
    /// Returns `(packed_samples, packed_records)` summed over all traces.
    pub fn pack<F>(&mut self, options: &PackOptions, mut handler: F) -> Result<(usize, usize)>
    where
        F: FnMut(&[u8]),
    {
        let mut template = match options.format_version {
            FormatVersion::V2 => MseedRecord::new(),
            FormatVersion::V3 => MseedRecord::new_v3(),
        }
        .with_encoding(options.encoding)
        .with_record_length(options.record_length);
        template.byte_order = match options.format_version {
            FormatVersion::V2 => ByteOrder::Big,
            FormatVersion::V3 => crate::decode_v3::payload_byte_order(options.encoding.to_code()),
        };
        if let Some(json) = &options.extra_headers {
            template.set_extra_headers(json)?;
        }

        let mut total_samples = 0;
        let mut total_records = 0;

        for trace in self.traces.values_mut() {
            template.source_id = trace.source_id.clone();
            template.publication_version = trace.publication_version;

            for segment in trace.segments.iter_mut() {
                let SegmentData::Samples(samples) = &mut segment.data else {
                    if segment.sample_count > 0 {
                        warn!(
                            sid = %trace.source_id,
                            start = segment.start_time,
                            "skipping segment without decoded samples"
                        );
                    }
                    continue;
                };
                if samples.is_empty() {
                    continue;
                }

                template.start_time = segment.start_time;
                template.sample_rate = segment.sample_rate;
                let outcome = encode::pack_records(
                    &template,
                    samples.as_slice(),
                    options.flush,
                    trace.pack_sequence,
                    &mut handler,
                )?;
                if outcome.samples == 0 {
                    continue;
                }

                samples.drain_front(outcome.samples);
                segment.start_time = time::sample_time(
                    segment.start_time,
                    outcome.samples as i64,
                    segment.sample_rate,
                );
                segment.sample_count -= outcome.samples;
                if segment.sample_count == 0 {
                    segment.end_time = segment.start_time;
                }
                trace.pack_sequence = outcome.next_sequence;

                debug!(
                    sid = %trace.source_id,
                    samples = outcome.samples,
                    records = outcome.records,
                    remaining = segment.sample_count,
                    "packed segment"
                );
                total_samples += outcome.samples;
                total_records += outcome.records;
            }
            trace.refresh_extent();
        }

        if !options.maintain {
            self.prune();
        }

        Ok((total_samples, total_records))
    }
}
