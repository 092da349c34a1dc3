//! miniSEED v2 and v3 parsing, trace assembly, indexing and streaming
//! repacking.
//!
//! Records of either format version are parsed into a common
//! [`MseedRecord`], assembled into continuous segments per source
//! identifier in a [`TraceList`], and re-serialized as v2 or v3 records by
//! [`TraceList::pack`]. Steim1/2, integer and float encodings, CRC-32C
//! validation and FDSN Source Identifiers are supported.
//!
//! # Creating and parsing a record
//!
//! ```
//! use miniseed_trace::{EncodingFormat, MseedRecord, ParseOptions, Samples, SourceId};
//! use miniseed_trace::time::timestr_to_nstime;
//!
//! let mut bytes = Vec::new();
//! MseedRecord::new_v3()
//!     .with_source_id(SourceId::parse("FDSN:IU_ANMO_00_B_H_Z").unwrap())
//!     .with_start_time(timestr_to_nstime("2025-04-10T12:30:45.5Z").unwrap())
//!     .with_sample_rate(20.0)
//!     .with_encoding(EncodingFormat::Steim2)
//!     .with_samples(Samples::Int(vec![1, -2, 3, -4]))
//!     .repack(|record| bytes.extend_from_slice(record))
//!     .unwrap();
//!
//! let options = ParseOptions::default().with_unpack_data(true);
//! let record = MseedRecord::parse(&bytes, &options).unwrap();
//! assert_eq!(record.source_id.station(), "ANMO");
//! assert_eq!(record.samples, Some(Samples::Int(vec![1, -2, 3, -4])));
//! ```
//!
//! # Assembling traces
//!
//! ```
//! use miniseed_trace::{MseedRecord, Samples, SourceId, TraceList, TraceListOptions};
//!
//! let sid = SourceId::from_parts("IU", "ANMO", "00", "BHZ").unwrap();
//! let mut data = Vec::new();
//! for (start, values) in [(0, 0..10), (10_000_000_000, 10..20)] {
//!     MseedRecord::new_v3()
//!         .with_source_id(sid.clone())
//!         .with_start_time(start)
//!         .with_samples(Samples::Int(values.collect()))
//!         .repack(|record| data.extend_from_slice(record))
//!         .unwrap();
//! }
//!
//! let mut traces = TraceList::new(TraceListOptions::default().with_unpack_data(true));
//! assert_eq!(traces.read_buffer(data.into()).unwrap(), 2);
//!
//! let trace = traces.find(&sid, 0).unwrap();
//! assert_eq!(trace.numsegments(), 1);
//! assert_eq!(trace.segments[0].sample_count, 20);
//! ```
//!
//! # Packing buffered samples
//!
//! ```
//! use miniseed_trace::{EncodingFormat, FormatVersion, PackOptions, Samples, SourceId, TraceList};
//!
//! let sid = SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap();
//! let mut traces = TraceList::default();
//! traces
//!     .add_data(&sid, Samples::Int((0..1000).collect()), 40.0, 0, 1)
//!     .unwrap();
//!
//! let options = PackOptions::default()
//!     .with_format_version(FormatVersion::V2)
//!     .with_encoding(EncodingFormat::Int32)
//!     .with_record_length(512);
//! let mut records = Vec::new();
//! let (samples, count) = traces.pack(&options, |r| records.push(r.to_vec())).unwrap();
//! assert_eq!(samples, 1000);
//! assert_eq!(count, records.len());
//! assert!(records.iter().all(|r| r.len() == 512));
//! ```

pub mod codec;
pub mod compare;
pub mod crc;
pub mod decode;
pub mod decode_v3;
pub mod encode;
pub mod encode_v3;
pub mod error;
pub mod packer;
pub mod reader;
pub mod reclist;
pub mod record;
pub mod sid;
pub mod steim;
pub mod stream;
pub mod time;
pub mod tracelist;
pub mod trim;
pub mod types;

pub use compare::{ContentComparison, compare_records, sort_records};
pub use error::{MseedError, Result};
pub use packer::PackOptions;
pub use reader::{MseedReader, StreamReader};
pub use reclist::{RecordList, RecordPtr, RecordSource};
pub use record::{MseedRecord, ParseOptions, SampleSlice, Samples};
pub use sid::SourceId;
pub use stream::{StreamSummary, TimeWindow, TraceStats, collect_stats, process_timewindow};
pub use time::{BTime, NanoTime, NsTime};
pub use tracelist::{SegmentData, TraceId, TraceList, TraceListOptions, TraceSegment};
pub use trim::{TrimOutcome, TrimPlan, TrimmedRecords, plan_trim, trim_record, trim_to_records};
pub use types::{ByteOrder, EncodingFormat, FormatVersion, SampleType};
