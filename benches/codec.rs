use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use miniseed_trace::{
    EncodingFormat, MseedReader, MseedRecord, PackOptions, ParseOptions, Samples, SourceId,
    TraceList, TraceListOptions,
};

/// Smooth samples with small differences, typical of seismic data.
fn seismic_samples(n: usize) -> Vec<i32> {
    (0..n)
        .map(|i| {
            let drift = (i as f64 * 0.05).sin() * 50.0;
            let noise = ((i as f64 * 1.7).sin() * 10.0) as i32;
            1000 + drift as i32 + noise
        })
        .collect()
}

fn template(v3: bool, encoding: EncodingFormat, samples: &[i32]) -> MseedRecord {
    let base = if v3 { MseedRecord::new_v3() } else { MseedRecord::new() };
    base.with_source_id(SourceId::from_parts("IU", "ANMO", "00", "BHZ").unwrap())
        .with_start_time(1_744_288_200_000_000_000)
        .with_sample_rate(100.0)
        .with_encoding(encoding)
        .with_samples(Samples::Int(samples.to_vec()))
}

fn packed(v3: bool, encoding: EncodingFormat, samples: &[i32]) -> Vec<u8> {
    let mut out = Vec::new();
    template(v3, encoding, samples)
        .repack(|r| out.extend_from_slice(r))
        .unwrap();
    out
}

const CASES: [(&str, bool, EncodingFormat); 6] = [
    ("v2/steim1", false, EncodingFormat::Steim1),
    ("v2/steim2", false, EncodingFormat::Steim2),
    ("v2/int32", false, EncodingFormat::Int32),
    ("v3/steim1", true, EncodingFormat::Steim1),
    ("v3/steim2", true, EncodingFormat::Steim2),
    ("v3/int32", true, EncodingFormat::Int32),
];

fn bench_parse(c: &mut Criterion) {
    let samples = seismic_samples(100);
    let options = ParseOptions::default().with_unpack_data(true);
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(100));

    for (name, v3, encoding) in CASES {
        let bytes = packed(v3, encoding, &samples);
        group.bench_function(format!("{name}/100samp"), |b| {
            b.iter(|| MseedRecord::parse(black_box(&bytes), &options).unwrap())
        });
    }
    group.finish();
}

fn bench_pack(c: &mut Criterion) {
    let samples = seismic_samples(100);
    let mut group = c.benchmark_group("pack");
    group.throughput(Throughput::Elements(100));

    for (name, v3, encoding) in CASES {
        let mut record = template(v3, encoding, &samples);
        group.bench_function(format!("{name}/100samp"), |b| {
            b.iter(|| record.repack(|r| { black_box(r); }).unwrap())
        });
    }
    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    let samples = seismic_samples(100);
    let mut stream = Vec::new();
    for i in 0..10 {
        stream.extend(packed(i % 2 == 1, EncodingFormat::Steim2, &samples));
    }

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Elements(10));
    group.bench_function("10_records/mixed", |b| {
        b.iter(|| {
            MseedReader::new(black_box(&stream))
                .collect::<Result<Vec<_>, _>>()
                .unwrap()
        })
    });
    group.finish();
}

fn bench_tracelist(c: &mut Criterion) {
    let sid = SourceId::from_parts("IU", "ANMO", "00", "BHZ").unwrap();
    let samples = seismic_samples(400);
    let mut stream = Vec::new();
    for i in 0..50 {
        MseedRecord::new_v3()
            .with_source_id(sid.clone())
            .with_start_time(i * 4_000_000_000)
            .with_sample_rate(100.0)
            .with_encoding(EncodingFormat::Steim2)
            .with_samples(Samples::Int(samples.clone()))
            .repack(|r| stream.extend_from_slice(r))
            .unwrap();
    }
    let stream: std::sync::Arc<[u8]> = stream.into();

    let mut group = c.benchmark_group("tracelist");
    group.throughput(Throughput::Elements(50 * 400));
    group.bench_function("assemble/50_records", |b| {
        b.iter(|| {
            let mut list = TraceList::new(TraceListOptions::default().with_unpack_data(true));
            list.read_buffer(black_box(stream.clone())).unwrap();
            list
        })
    });
    group.bench_function("assemble_and_pack/50_records", |b| {
        b.iter(|| {
            let mut list = TraceList::new(TraceListOptions::default().with_unpack_data(true));
            list.read_buffer(stream.clone()).unwrap();
            list.pack(&PackOptions::default(), |r| {
                black_box(r);
            })
            .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_pack, bench_reader, bench_tracelist);
criterion_main!(benches);
