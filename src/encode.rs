//! Pack samples into miniSEED records.
//!
//! [`pack_records`] drives the record loop for both format versions; the v2
//! header is written here and the v3 header in
//! [`encode_v3`](crate::encode_v3).

use crate::codec;
use crate::decode::V2_HEADER_SIZE;
use crate::encode_v3;
use crate::record::{
    FLAG_CALIBRATION, FLAG_CLOCK_LOCKED, FLAG_TIME_QUESTIONABLE, MseedRecord, SampleSlice,
};
use crate::steim::{FRAME_SIZE, STEIM_LOOKAHEAD};
use crate::time::{self, NanoTime, NsTime};
use crate::types::{ByteOrder, EncodingFormat, FormatVersion};
use crate::{MseedError, Result};

/// Payload offset of packed v2 records: fixed header, B1000 and B1001.
pub const V2_DATA_OFFSET: usize = 64;

/// Most samples a v2 header can count.
pub const V2_MAX_SAMPLES: usize = u16::MAX as usize;

/// Largest v2 sequence number before wrapping back to 1.
pub const MAX_SEQUENCE: u32 = 999_999;

/// Result of one packing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PackOutcome {
    pub samples: usize,
    pub records: usize,
    /// Sequence number for the next v2 record.
    pub next_sequence: u32,
}

pub(crate) fn next_sequence(sequence: u32) -> u32 {
    if sequence >= MAX_SEQUENCE { 1 } else { sequence + 1 }
}

/// Header values shared by every record of one packing run.
struct Layout {
    encoding: EncodingFormat,
    byte_order: ByteOrder,
    capacity: usize,
    max_count: usize,
    v2: Option<V2Codes>,
    extra_headers: String,
}

struct V2Codes {
    network: String,
    station: String,
    location: String,
    channel: String,
    factor: i16,
    multiplier: i16,
    length_power: u8,
    timing_quality: u8,
}

fn layout(template: &MseedRecord) -> Result<Layout> {
    let encoding = template.encoding_format()?;
    match template.format_version {
        FormatVersion::V2 => {
            let length = template.record_length;
            if !length.is_power_of_two()
                || !(crate::decode::V2_MIN_RECORD_LENGTH..=crate::decode::V2_MAX_RECORD_LENGTH)
                    .contains(&length)
            {
                return Err(MseedError::OutOfRange(length));
            }
            let (network, station, location, channel) = template.source_id.to_parts()?;
            for (code, width) in [(&network, 2), (&station, 5), (&location, 2), (&channel, 3)] {
                if code.len() > width {
                    return Err(MseedError::EncodeError(format!(
                        "{}: '{code}' does not fit in a {width}-character v2 field",
                        template.source_id
                    )));
                }
            }
            let (factor, multiplier) = rate_factor_multiplier(template.sample_rate)?;
            let timing_quality = template
                .extra_header(&["FDSN", "Time", "Quality"])
                .and_then(|v| v.as_u64())
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(0);
            Ok(Layout {
                encoding,
                byte_order: ByteOrder::Big,
                capacity: length - V2_DATA_OFFSET,
                max_count: V2_MAX_SAMPLES,
                v2: Some(V2Codes {
                    network,
                    station,
                    location,
                    channel,
                    factor,
                    multiplier,
                    length_power: length.trailing_zeros() as u8,
                    timing_quality,
                }),
                extra_headers: String::new(),
            })
        }
        FormatVersion::V3 => {
            let length = template.record_length;
            if length > crate::decode_v3::V3_MAX_RECORD_LENGTH {
                return Err(MseedError::OutOfRange(length));
            }
            let overhead = encode_v3::header_length(template)?;
            Ok(Layout {
                encoding,
                byte_order: crate::decode_v3::payload_byte_order(encoding.to_code()),
                capacity: length.saturating_sub(overhead),
                max_count: u32::MAX as usize,
                v2: None,
                extra_headers: template.extra_headers.clone(),
            })
        }
    }
}

/// Whether a record holding `consumed` of `remaining` samples is final even
/// without flushing.
fn record_is_full(layout: &Layout, remaining: usize, consumed: usize) -> bool {
    if consumed >= layout.max_count {
        return true;
    }
    match codec::encoded_sample_size(layout.encoding) {
        Some(size) => consumed == layout.capacity / size,
        None => remaining - consumed >= STEIM_LOOKAHEAD,
    }
}

/// Pack `samples` into records using `template`'s header values.
///
/// Records are passed to `handler` in order. Without `flush`, samples that
/// would only fill a partial record are left unpacked. An empty input packs
/// to a single header-only record when flushing.
pub(crate) fn pack_records<F>(
    template: &MseedRecord,
    samples: SampleSlice<'_>,
    flush: bool,
    sequence: u32,
    handler: &mut F,
) -> Result<PackOutcome>
where
    F: FnMut(&[u8]),
{
    let layout = layout(template)?;
    let expected = layout.encoding.sample_type();
    if !samples.is_empty() && samples.sample_type() != expected {
        return Err(MseedError::EncodeError(format!(
            "{} encoding cannot hold {} samples",
            layout.encoding,
            samples.sample_type()
        )));
    }

    let mut outcome = PackOutcome {
        samples: 0,
        records: 0,
        next_sequence: sequence,
    };

    if samples.is_empty() {
        if flush {
            let record = write_record(template, &layout, template.start_time, 0, &[], sequence)?;
            handler(&record);
            outcome.records = 1;
            outcome.next_sequence = next_sequence(sequence);
        }
        return Ok(outcome);
    }

    let total = samples.len();
    while outcome.samples < total {
        let remaining = total - outcome.samples;
        let window =
            samples.slice(outcome.samples..outcome.samples + remaining.min(layout.max_count));
        let (payload, consumed) =
            codec::encode(window, layout.encoding, layout.byte_order, layout.capacity)?;
        if consumed == 0 {
            return Err(MseedError::EncodeError(format!(
                "record length {} too small for {} data",
                template.record_length, layout.encoding
            )));
        }
        if !flush && !record_is_full(&layout, remaining, consumed) {
            break;
        }

        let start = time::sample_time(
            template.start_time,
            outcome.samples as i64,
            template.sample_rate,
        );
        let record = write_record(
            template,
            &layout,
            start,
            consumed,
            &payload,
            outcome.next_sequence,
        )?;
        handler(&record);

        outcome.samples += consumed;
        outcome.records += 1;
        outcome.next_sequence = next_sequence(outcome.next_sequence);
    }

    tracing::trace!(
        sid = %template.source_id,
        samples = outcome.samples,
        records = outcome.records,
        "packed records"
    );
    Ok(outcome)
}

fn write_record(
    template: &MseedRecord,
    layout: &Layout,
    start: NsTime,
    count: usize,
    payload: &[u8],
    sequence: u32,
) -> Result<Vec<u8>> {
    match &layout.v2 {
        Some(codes) => write_v2_record(template, layout, codes, start, count, payload, sequence),
        None => encode_v3::write_v3_record(
            template,
            &layout.extra_headers,
            start,
            count,
            payload,
        ),
    }
}

/// v2 data quality indicator for a publication version.
pub(crate) fn pubversion_to_quality(version: u8) -> u8 {
    match version {
        1 => b'R',
        3 => b'Q',
        4 => b'M',
        _ => b'D',
    }
}

fn write_padded(dest: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    for (i, slot) in dest.iter_mut().enumerate() {
        *slot = if i < bytes.len() { bytes[i] } else { b' ' };
    }
}

fn write_btime(dest: &mut [u8], nt: &NanoTime) {
    let bt = nt.to_btime();
    dest[0..2].copy_from_slice(&bt.year.to_be_bytes());
    dest[2..4].copy_from_slice(&bt.day.to_be_bytes());
    dest[4] = bt.hour;
    dest[5] = bt.minute;
    dest[6] = bt.second;
    dest[7] = 0; // unused
    dest[8..10].copy_from_slice(&bt.fract.to_be_bytes());
}

fn write_v2_record(
    template: &MseedRecord,
    layout: &Layout,
    codes: &V2Codes,
    start: NsTime,
    count: usize,
    payload: &[u8],
    sequence: u32,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; template.record_length];

    let seq = format!("{:06}", sequence % (MAX_SEQUENCE + 1));
    buf[0..6].copy_from_slice(seq.as_bytes());
    buf[6] = pubversion_to_quality(template.publication_version);
    buf[7] = b' ';
    write_padded(&mut buf[8..13], &codes.station);
    write_padded(&mut buf[13..15], &codes.location);
    write_padded(&mut buf[15..18], &codes.channel);
    write_padded(&mut buf[18..20], &codes.network);

    let nt = NanoTime::from_nstime(start)?;
    write_btime(&mut buf[20..30], &nt);

    buf[30..32].copy_from_slice(&(count as u16).to_be_bytes());
    buf[32..34].copy_from_slice(&codes.factor.to_be_bytes());
    buf[34..36].copy_from_slice(&codes.multiplier.to_be_bytes());

    if template.flags & FLAG_CALIBRATION != 0 {
        buf[36] |= 0x01;
    }
    if template.flags & FLAG_CLOCK_LOCKED != 0 {
        buf[37] |= 0x20;
    }
    if template.flags & FLAG_TIME_QUESTIONABLE != 0 {
        buf[38] |= 0x80;
    }
    buf[39] = 2;
    // Time correction (40-43) stays zero
    buf[44..46].copy_from_slice(&(V2_DATA_OFFSET as u16).to_be_bytes());
    buf[46..48].copy_from_slice(&(V2_HEADER_SIZE as u16).to_be_bytes());

    // Blockette 1000
    buf[48..50].copy_from_slice(&1000u16.to_be_bytes());
    buf[50..52].copy_from_slice(&56u16.to_be_bytes());
    buf[52] = layout.encoding.to_code();
    buf[53] = 1;
    buf[54] = codes.length_power;

    // Blockette 1001
    buf[56..58].copy_from_slice(&1001u16.to_be_bytes());
    buf[58..60].copy_from_slice(&0u16.to_be_bytes());
    buf[60] = codes.timing_quality;
    buf[61] = ((nt.nanosecond / 1000) % 100) as i8 as u8;
    buf[63] = if layout.encoding.is_steim() {
        (payload.len() / FRAME_SIZE) as u8
    } else {
        0
    };

    let end = V2_DATA_OFFSET + payload.len();
    if end > buf.len() {
        return Err(MseedError::EncodeError(format!(
            "payload of {} bytes exceeds record length {}",
            payload.len(),
            template.record_length
        )));
    }
    buf[V2_DATA_OFFSET..end].copy_from_slice(payload);
    Ok(buf)
}

/// Express a sample rate as the v2 factor and multiplier fields.
///
/// Tries an integral rate, then an integral period, then a rational
/// `factor / multiplier` approximation within 1 ppm.
pub(crate) fn rate_factor_multiplier(raw_rate: f64) -> Result<(i16, i16)> {
    if raw_rate == 0.0 {
        return Ok((0, 0));
    }
    let hz = time::sample_rate_hz(raw_rate);
    if !hz.is_finite() || hz < 0.0 {
        return Err(MseedError::EncodeError(format!("invalid sample rate {raw_rate}")));
    }
    let limit = i16::MAX as f64;

    if hz.fract() == 0.0 && hz <= limit {
        return Ok((hz as i16, 1));
    }
    let period = 1.0 / hz;
    if (period - period.round()).abs() < 1e-9 * period && period.round() <= limit {
        return Ok((-(period.round() as i16), 1));
    }
    for multiplier in 1..=10_000i32 {
        let factor = (hz * multiplier as f64).round();
        if factor < 1.0 || factor > limit {
            continue;
        }
        if ((factor / multiplier as f64) - hz).abs() <= hz * 1e-6 {
            return Ok((factor as i16, -(multiplier as i16)));
        }
    }
    Err(MseedError::EncodeError(format!(
        "sample rate {raw_rate} cannot be expressed as a v2 factor and multiplier"
    )))
}
