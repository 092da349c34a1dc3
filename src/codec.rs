//! Sample codec boundary: [`encode`], [`decode`] and [`sizetype`].
//!
//! Record packing and parsing go through these three functions only; the
//! encodings themselves (fixed-width integers and floats, text, Steim1/2)
//! are dispatched from here.

use crate::record::{SampleSlice, Samples};
use crate::steim::{self, FRAME_SIZE};
use crate::types::{ByteOrder, EncodingFormat, SampleType};
use crate::{MseedError, Result};

/// Decoded sample size in bytes and sample type for an encoding code.
pub fn sizetype(encoding: u8) -> Result<(usize, SampleType)> {
    let sample_type = EncodingFormat::from_code(encoding)?.sample_type();
    Ok((sample_type.size(), sample_type))
}

/// Encoded size of one sample, `None` for variable-size (Steim) encodings.
pub fn encoded_sample_size(encoding: EncodingFormat) -> Option<usize> {
    match encoding {
        EncodingFormat::Text => Some(1),
        EncodingFormat::Int16 => Some(2),
        EncodingFormat::Int32 | EncodingFormat::Float32 => Some(4),
        EncodingFormat::Float64 => Some(8),
        EncodingFormat::Steim1 | EncodingFormat::Steim2 => None,
    }
}

/// Encode as many leading samples as fit in `max_bytes`.
///
/// Returns the payload and the number of samples it holds. Steim payloads
/// are whole 64-byte frames. The sample type must match the encoding.
pub fn encode(
    samples: SampleSlice<'_>,
    encoding: EncodingFormat,
    byte_order: ByteOrder,
    max_bytes: usize,
) -> Result<(Vec<u8>, usize)> {
    let big = byte_order == ByteOrder::Big;
    match (encoding, samples) {
        (EncodingFormat::Text, SampleSlice::Text(text)) => {
            let count = text.len().min(max_bytes);
            Ok((text[..count].to_vec(), count))
        }
        (EncodingFormat::Int16, SampleSlice::Int(values)) => {
            let count = values.len().min(max_bytes / 2);
            let mut payload = Vec::with_capacity(count * 2);
            for &value in &values[..count] {
                let narrow = i16::try_from(value).map_err(|_| {
                    MseedError::EncodeError(format!("sample {value} does not fit in INT16"))
                })?;
                payload.extend_from_slice(&if big {
                    narrow.to_be_bytes()
                } else {
                    narrow.to_le_bytes()
                });
            }
            Ok((payload, count))
        }
        (EncodingFormat::Int32, SampleSlice::Int(values)) => Ok(encode_fixed(
            values,
            max_bytes,
            if big { i32::to_be_bytes } else { i32::to_le_bytes },
        )),
        (EncodingFormat::Float32, SampleSlice::Float(values)) => Ok(encode_fixed(
            values,
            max_bytes,
            if big { f32::to_be_bytes } else { f32::to_le_bytes },
        )),
        (EncodingFormat::Float64, SampleSlice::Double(values)) => Ok(encode_fixed(
            values,
            max_bytes,
            if big { f64::to_be_bytes } else { f64::to_le_bytes },
        )),
        (EncodingFormat::Steim1, SampleSlice::Int(values)) => {
            steim::encode_steim1(values, max_bytes / FRAME_SIZE, byte_order)
        }
        (EncodingFormat::Steim2, SampleSlice::Int(values)) => {
            steim::encode_steim2(values, max_bytes / FRAME_SIZE, byte_order)
        }
        (encoding, samples) => Err(MseedError::EncodeError(format!(
            "{encoding} encoding cannot hold {} samples",
            samples.sample_type()
        ))),
    }
}

fn encode_fixed<T: Copy, const N: usize>(
    values: &[T],
    max_bytes: usize,
    to_bytes: fn(T) -> [u8; N],
) -> (Vec<u8>, usize) {
    let count = values.len().min(max_bytes / N);
    let mut payload = Vec::with_capacity(count * N);
    for &value in &values[..count] {
        payload.extend_from_slice(&to_bytes(value));
    }
    (payload, count)
}

/// Decode `count` samples from a payload.
pub fn decode(data: &[u8], encoding: u8, count: usize, byte_order: ByteOrder) -> Result<Samples> {
    let big = byte_order == ByteOrder::Big;
    let samples = match EncodingFormat::from_code(encoding)? {
        EncodingFormat::Text => {
            check_length(data, count)?;
            Samples::Text(data[..count].to_vec())
        }
        EncodingFormat::Int16 => {
            let narrow = decode_fixed(
                data,
                count,
                if big { i16::from_be_bytes } else { i16::from_le_bytes },
            )?;
            Samples::Int(narrow.into_iter().map(i32::from).collect())
        }
        EncodingFormat::Int32 => Samples::Int(decode_fixed(
            data,
            count,
            if big { i32::from_be_bytes } else { i32::from_le_bytes },
        )?),
        EncodingFormat::Float32 => Samples::Float(decode_fixed(
            data,
            count,
            if big { f32::from_be_bytes } else { f32::from_le_bytes },
        )?),
        EncodingFormat::Float64 => Samples::Double(decode_fixed(
            data,
            count,
            if big { f64::from_be_bytes } else { f64::from_le_bytes },
        )?),
        EncodingFormat::Steim1 => Samples::Int(steim::decode_steim1(data, count, byte_order)?),
        EncodingFormat::Steim2 => Samples::Int(steim::decode_steim2(data, count, byte_order)?),
    };
    Ok(samples)
}

fn check_length(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(MseedError::WrongLength {
            expected: needed,
            actual: data.len(),
        });
    }
    Ok(())
}

fn decode_fixed<T, const N: usize>(
    data: &[u8],
    count: usize,
    from_bytes: fn([u8; N]) -> T,
) -> Result<Vec<T>> {
    check_length(data, count * N)?;
    Ok(data[..count * N]
        .chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            from_bytes(bytes)
        })
        .collect())
}
