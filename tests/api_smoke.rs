//! Compile-time smoke test: verify top-level re-exports work.

use miniseed_trace::{
    BTime, ByteOrder, EncodingFormat, FormatVersion, MseedError, MseedRecord, NanoTime,
    PackOptions, ParseOptions, RecordList, Result, SampleType, Samples, SegmentData, SourceId,
    TimeWindow, TraceList, TraceListOptions, TrimOutcome, collect_stats, compare_records,
    process_timewindow, sort_records, trim_record,
};

#[test]
fn top_level_imports_compile() {
    let _: fn(&[u8], &ParseOptions) -> Result<MseedRecord> = MseedRecord::parse;
    let _: fn(&[u8]) -> Result<Vec<u8>> = sort_records;
    let _: fn(&[u8], &[u8], bool) -> Result<_> = compare_records;
    let _: fn(&MseedRecord, Option<i64>, Option<i64>) -> Result<TrimOutcome> = trim_record;
    let _ = process_timewindow::<Vec<Result<MseedRecord>>, Vec<u8>>;
    let _ = collect_stats::<Vec<Result<MseedRecord>>, Vec<u8>>;

    let _bo = ByteOrder::Big;
    let _s = Samples::Int(vec![]);
    let _bt = BTime {
        year: 2025,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
        fract: 0,
    };
    let _nt = NanoTime::epoch();

    let _enc = EncodingFormat::Steim1;
    let _fv = FormatVersion::V2;
    let _st = SampleType::Int;

    let _sid = SourceId::from_parts("IU", "ANMO", "00", "BHZ").unwrap();
    let _list = TraceList::new(TraceListOptions::default());
    let _pack = PackOptions::default();
    let _window = TimeWindow::default();
    let _data = SegmentData::Records(RecordList::default());

    let _e: Option<MseedError> = None;
}
