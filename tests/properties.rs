use miniseed_trace::time::sample_period_ns;
use miniseed_trace::{
    EncodingFormat, FormatVersion, MseedRecord, PackOptions, ParseOptions, Samples, SourceId,
    TraceList, TrimOutcome, trim_record,
};
use proptest::prelude::*;

fn sid() -> SourceId {
    SourceId::parse("FDSN:XX_PROP__H_H_Z").unwrap()
}

fn decode_all(bytes: &[u8]) -> Vec<i32> {
    let options = ParseOptions::default().with_unpack_data(true);
    let mut values = Vec::new();
    for record in miniseed_trace::MseedReader::with_options(bytes, options) {
        if let Some(Samples::Int(v)) = record.unwrap().samples {
            values.extend(v);
        }
    }
    values
}

fn int_encoding() -> impl Strategy<Value = EncodingFormat> {
    prop_oneof![
        Just(EncodingFormat::Int32),
        Just(EncodingFormat::Steim1),
        Just(EncodingFormat::Steim2),
    ]
}

proptest! {
    #[test]
    fn pack_then_parse_roundtrips_integers(
        values in prop::collection::vec(-100_000i32..100_000, 1..600),
        encoding in int_encoding(),
        v3 in any::<bool>(),
    ) {
        let base = if v3 { MseedRecord::new_v3() } else { MseedRecord::new() };
        let mut bytes = Vec::new();
        base.with_source_id(sid())
            .with_encoding(encoding)
            .with_sample_rate(100.0)
            .with_samples(Samples::Int(values.clone()))
            .repack(|r| bytes.extend_from_slice(r))
            .unwrap();
        prop_assert_eq!(decode_all(&bytes), values);
    }

    #[test]
    fn pack_then_parse_roundtrips_doubles(
        values in prop::collection::vec(-1.0e6f64..1.0e6, 1..300),
    ) {
        let mut bytes = Vec::new();
        MseedRecord::new_v3()
            .with_source_id(sid())
            .with_encoding(EncodingFormat::Float64)
            .with_samples(Samples::Double(values.clone()))
            .repack(|r| bytes.extend_from_slice(r))
            .unwrap();
        let options = ParseOptions::default().with_unpack_data(true);
        let mut decoded = Vec::new();
        for record in miniseed_trace::MseedReader::with_options(&bytes, options) {
            if let Some(Samples::Double(v)) = record.unwrap().samples {
                decoded.extend(v);
            }
        }
        prop_assert_eq!(decoded, values);
    }

    #[test]
    fn sourceid_parts_roundtrip(
        network in "[A-Z0-9]{1,8}",
        station in "[A-Z0-9]{1,8}",
        location in "[A-Z0-9]{0,2}",
        channel in "[A-Z0-9]{3}",
    ) {
        let sid = SourceId::from_parts(&network, &station, &location, &channel).unwrap();
        let (n, s, l, c) = sid.to_parts().unwrap();
        prop_assert_eq!(SourceId::from_parts(&n, &s, &l, &c).unwrap(), sid);
        prop_assert_eq!((n, s, l, c), (network, station, location, channel));
    }

    #[test]
    fn chunked_packing_matches_single_flush(
        values in prop::collection::vec(-5_000i32..5_000, 1..3000),
        splits in prop::collection::vec(1usize..800, 1..5),
        steim2 in any::<bool>(),
        v2 in any::<bool>(),
    ) {
        let encoding = if steim2 { EncodingFormat::Steim2 } else { EncodingFormat::Steim1 };
        let version = if v2 { FormatVersion::V2 } else { FormatVersion::V3 };
        let options = PackOptions::default()
            .with_encoding(encoding)
            .with_format_version(version)
            .with_record_length(512);
        // integral period keeps chunk start times exact
        let rate = 10.0;

        let mut single = Vec::new();
        let mut list = TraceList::default();
        list.add_data(&sid(), Samples::Int(values.clone()), rate, 0, 1).unwrap();
        let single_counts = list.pack(&options, |r| single.extend_from_slice(r)).unwrap();

        let mut chunked = Vec::new();
        let mut totals = (0, 0);
        let mut list = TraceList::default();
        let mut offset = 0;
        for split in splits {
            let end = (offset + split).min(values.len());
            if offset == end {
                break;
            }
            let start = offset as i64 * sample_period_ns(rate);
            list.add_data(&sid(), Samples::Int(values[offset..end].to_vec()), rate, start, 1)
                .unwrap();
            let (s, r) = list
                .pack(&options.clone().with_flush(false), |rec| chunked.extend_from_slice(rec))
                .unwrap();
            totals.0 += s;
            totals.1 += r;
            offset = end;
        }
        if offset < values.len() {
            let start = offset as i64 * sample_period_ns(rate);
            list.add_data(&sid(), Samples::Int(values[offset..].to_vec()), rate, start, 1)
                .unwrap();
        }
        let (s, r) = list.pack(&options, |rec| chunked.extend_from_slice(rec)).unwrap();
        totals.0 += s;
        totals.1 += r;

        prop_assert_eq!(totals, single_counts);
        prop_assert_eq!(chunked, single);
    }

    #[test]
    fn trimming_leading_samples(
        count in 2usize..400,
        cut in 0usize..400,
    ) {
        let cut = cut % count;
        let rate = 20.0;
        let period = sample_period_ns(rate);
        let mut bytes = Vec::new();
        MseedRecord::new_v3()
            .with_source_id(sid())
            .with_start_time(1_000 * 1_000_000_000)
            .with_sample_rate(rate)
            .with_encoding(EncodingFormat::Steim2)
            .with_samples(Samples::Int((0..count as i32).collect()))
            .repack(|r| bytes.extend_from_slice(r))
            .unwrap();
        let record = MseedRecord::parse(&bytes, &ParseOptions::default()).unwrap();

        let earliest = record.start_time + cut as i64 * period;
        match trim_record(&record, Some(earliest), None).unwrap() {
            TrimOutcome::Unchanged => prop_assert_eq!(cut, 0),
            TrimOutcome::Trimmed(raw) => {
                let trimmed = MseedRecord::parse(&raw, &ParseOptions::default()).unwrap();
                prop_assert_eq!(trimmed.sample_count, count - cut);
                prop_assert_eq!(trimmed.start_time, earliest);
            }
            TrimOutcome::Excluded => prop_assert!(false, "record overlaps the window"),
        }
    }
}
