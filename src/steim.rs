//! Steim1 and Steim2 compression and decompression.
//!
//! These are differential integer compression schemes used in seismological
//! data (SEED/miniSEED format). See Appendix B of the SEED Manual v2.4.
//!
//! Encoding is capacity-limited: the caller passes the number of 64-byte
//! frames available and gets back the frames used and the number of samples
//! they hold. The first difference of every encoded block is zero, so each
//! block decodes independently of any previous one.

use tracing::warn;

use crate::types::ByteOrder;
use crate::{MseedError, Result};

/// Size of one Steim frame in bytes.
pub const FRAME_SIZE: usize = 64; // 16 x 32-bit words
const WORDS_PER_FRAME: usize = 16;

/// Number of samples the greedy word packer looks ahead.
///
/// An encoded block that leaves at least this many samples unconsumed is
/// identical to the block that would be produced with any further samples
/// appended to the input.
pub const STEIM_LOOKAHEAD: usize = 7;

fn read_u32(data: &[u8], offset: usize, byte_order: ByteOrder) -> u32 {
    let bytes = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    match byte_order {
        ByteOrder::Big => u32::from_be_bytes(bytes),
        ByteOrder::Little => u32::from_le_bytes(bytes),
    }
}

fn extract_nibble(control_word: u32, word_index: usize) -> u8 {
    let shift = 30 - (word_index * 2);
    ((control_word >> shift) & 0x03) as u8
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (value as i32).wrapping_shl(shift).wrapping_shr(shift)
}

/// Push `count` sign-extended `bits`-wide diffs, most significant first.
fn push_packed(word: u32, count: u32, bits: u32, top_shift: u32, diffs: &mut Vec<i32>) {
    let mask = (1u32 << bits) - 1;
    for i in 0..count {
        diffs.push(sign_extend((word >> (top_shift - i * bits)) & mask, bits));
    }
}

fn steim1_unpack_word(word: u32, nibble: u8, diffs: &mut Vec<i32>) -> Result<()> {
    match nibble {
        0b00 => {} // no data
        0b01 => push_packed(word, 4, 8, 24, diffs),
        0b10 => push_packed(word, 2, 16, 16, diffs),
        _ => diffs.push(word as i32),
    }
    Ok(())
}

fn steim2_unpack_word(word: u32, nibble: u8, diffs: &mut Vec<i32>) -> Result<()> {
    let dnib = ((word >> 30) & 0x03) as u8;

    match (nibble, dnib) {
        (0b00, _) => {}
        (0b01, _) => push_packed(word, 4, 8, 24, diffs),
        (0b10, 0b01) => diffs.push(sign_extend(word & 0x3FFF_FFFF, 30)),
        (0b10, 0b10) => push_packed(word, 2, 15, 15, diffs),
        (0b10, 0b11) => push_packed(word, 3, 10, 20, diffs),
        (0b11, 0b00) => push_packed(word, 5, 6, 24, diffs),
        (0b11, 0b01) => push_packed(word, 6, 5, 25, diffs),
        (0b11, 0b10) => push_packed(word, 7, 4, 24, diffs),
        _ => {
            return Err(MseedError::SteimDecode(format!(
                "steim2 nibble={nibble:02b} invalid dnib={dnib:02b}"
            )));
        }
    }
    Ok(())
}

type UnpackWord = fn(u32, u8, &mut Vec<i32>) -> Result<()>;

fn decode_frames(
    data: &[u8],
    num_samples: usize,
    byte_order: ByteOrder,
    unpack_word: UnpackWord,
) -> Result<Vec<i32>> {
    if num_samples == 0 {
        return Ok(Vec::new());
    }

    let num_frames = data.len() / FRAME_SIZE;
    if num_frames == 0 {
        return Err(MseedError::SteimDecode(format!(
            "{} bytes is less than one frame",
            data.len()
        )));
    }

    // Frame 0, word 1 = X0 (forward integration constant)
    // Frame 0, word 2 = Xn (reverse integration constant)
    let x0 = read_u32(data, 4, byte_order) as i32;
    let xn = read_u32(data, 8, byte_order) as i32;

    let mut diffs = Vec::with_capacity(num_samples + STEIM_LOOKAHEAD);
    'frames: for frame_idx in 0..num_frames {
        let frame_offset = frame_idx * FRAME_SIZE;
        let control_word = read_u32(data, frame_offset, byte_order);

        for word_idx in 1..WORDS_PER_FRAME {
            if diffs.len() >= num_samples {
                break 'frames;
            }
            if frame_idx == 0 && (word_idx == 1 || word_idx == 2) {
                continue;
            }

            let word = read_u32(data, frame_offset + word_idx * 4, byte_order);
            unpack_word(word, extract_nibble(control_word, word_idx), &mut diffs)?;
        }
    }

    if diffs.len() < num_samples {
        return Err(MseedError::SampleCountMismatch {
            expected: num_samples,
            actual: diffs.len(),
        });
    }

    // The first difference refers to the previous record and is ignored
    let mut samples = Vec::with_capacity(num_samples);
    let mut acc = x0;
    samples.push(acc);
    for &diff in &diffs[1..num_samples] {
        acc = acc.wrapping_add(diff);
        samples.push(acc);
    }

    if acc != xn {
        warn!(last = acc, xn, "steim integrity check failed: last sample != Xn");
    }

    Ok(samples)
}

/// Decode Steim1 compressed data into i32 samples.
///
/// Trailing bytes that do not make up a whole frame are ignored.
pub fn decode_steim1(data: &[u8], num_samples: usize, byte_order: ByteOrder) -> Result<Vec<i32>> {
    decode_frames(data, num_samples, byte_order, steim1_unpack_word)
}

/// Decode Steim2 compressed data into i32 samples.
///
/// Extends Steim1 with additional packing formats using "dnib" (bits 31-30 of data word).
pub fn decode_steim2(data: &[u8], num_samples: usize, byte_order: ByteOrder) -> Result<Vec<i32>> {
    decode_frames(data, num_samples, byte_order, steim2_unpack_word)
}

type PackWord = fn(&[i32]) -> Result<(u32, u8, usize)>;

fn encode_frames(
    samples: &[i32],
    max_frames: usize,
    byte_order: ByteOrder,
    pack_word: PackWord,
) -> Result<(Vec<u8>, usize)> {
    if samples.is_empty() || max_frames == 0 {
        return Ok((Vec::new(), 0));
    }

    let mut diffs = Vec::with_capacity(samples.len());
    diffs.push(0i32);
    for pair in samples.windows(2) {
        diffs.push(pair[1].wrapping_sub(pair[0]));
    }

    let mut frames: Vec<[u32; WORDS_PER_FRAME]> = Vec::new();
    let mut diff_idx = 0;

    while frames.len() < max_frames && diff_idx < diffs.len() {
        let mut frame = [0u32; WORDS_PER_FRAME];
        let mut control: u32 = 0;

        let start_word = if frames.is_empty() {
            frame[1] = samples[0] as u32;
            3
        } else {
            1
        };

        #[allow(clippy::needless_range_loop)]
        for word_idx in start_word..WORDS_PER_FRAME {
            if diff_idx >= diffs.len() {
                break;
            }
            let (packed_word, nibble, consumed) = pack_word(&diffs[diff_idx..])?;
            frame[word_idx] = packed_word;
            control |= (nibble as u32) << (30 - word_idx * 2);
            diff_idx += consumed;
        }

        frame[0] = control;
        frames.push(frame);
    }

    // Xn is the last sample actually encoded
    frames[0][2] = samples[diff_idx - 1] as u32;

    let mut output = Vec::with_capacity(frames.len() * FRAME_SIZE);
    for frame in &frames {
        for &word in frame {
            match byte_order {
                ByteOrder::Big => output.extend_from_slice(&word.to_be_bytes()),
                ByteOrder::Little => output.extend_from_slice(&word.to_le_bytes()),
            }
        }
    }

    Ok((output, diff_idx))
}

/// Encode as many samples as fit in `max_frames` Steim1 frames.
///
/// Returns the encoded frames and the number of samples they contain.
pub fn encode_steim1(
    samples: &[i32],
    max_frames: usize,
    byte_order: ByteOrder,
) -> Result<(Vec<u8>, usize)> {
    encode_frames(samples, max_frames, byte_order, steim1_pack_diffs)
}

/// Encode as many samples as fit in `max_frames` Steim2 frames.
///
/// Fails if two consecutive samples differ by more than 30 bits.
pub fn encode_steim2(
    samples: &[i32],
    max_frames: usize,
    byte_order: ByteOrder,
) -> Result<(Vec<u8>, usize)> {
    encode_frames(samples, max_frames, byte_order, steim2_pack_diffs)
}

fn fits(diffs: &[i32], count: usize, bits: u32) -> bool {
    let max = (1i32 << (bits - 1)) - 1;
    let min = -(1i32 << (bits - 1));
    diffs.len() >= count && diffs[..count].iter().all(|&d| (min..=max).contains(&d))
}

fn pack_fields(diffs: &[i32], count: usize, bits: u32, top_shift: u32) -> u32 {
    let mask = (1u32 << bits) - 1;
    let mut word = 0u32;
    for (i, &d) in diffs[..count].iter().enumerate() {
        word |= ((d as u32) & mask) << (top_shift - i as u32 * bits);
    }
    word
}

/// Pack consecutive diffs into a single Steim1 word.
/// Returns (packed_word, nibble, num_consumed).
fn steim1_pack_diffs(diffs: &[i32]) -> Result<(u32, u8, usize)> {
    if fits(diffs, 4, 8) {
        return Ok((pack_fields(diffs, 4, 8, 24), 0b01, 4));
    }
    if fits(diffs, 2, 16) {
        return Ok((pack_fields(diffs, 2, 16, 16), 0b10, 2));
    }
    Ok((diffs[0] as u32, 0b11, 1))
}

/// Pack consecutive diffs into a single Steim2 word.
/// Returns (packed_word, nibble, num_consumed).
fn steim2_pack_diffs(diffs: &[i32]) -> Result<(u32, u8, usize)> {
    // 7 x 4-bit, nibble=11, dnib=10
    if fits(diffs, 7, 4) {
        return Ok(((0b10 << 30) | pack_fields(diffs, 7, 4, 24), 0b11, 7));
    }
    // 6 x 5-bit, nibble=11, dnib=01
    if fits(diffs, 6, 5) {
        return Ok(((0b01 << 30) | pack_fields(diffs, 6, 5, 25), 0b11, 6));
    }
    // 5 x 6-bit, nibble=11, dnib=00
    if fits(diffs, 5, 6) {
        return Ok((pack_fields(diffs, 5, 6, 24), 0b11, 5));
    }
    // 4 x 8-bit, nibble=01
    if fits(diffs, 4, 8) {
        return Ok((pack_fields(diffs, 4, 8, 24), 0b01, 4));
    }
    // 3 x 10-bit, nibble=10, dnib=11
    if fits(diffs, 3, 10) {
        return Ok(((0b11 << 30) | pack_fields(diffs, 3, 10, 20), 0b10, 3));
    }
    // 2 x 15-bit, nibble=10, dnib=10
    if fits(diffs, 2, 15) {
        return Ok(((0b10 << 30) | pack_fields(diffs, 2, 15, 15), 0b10, 2));
    }
    // 1 x 30-bit, nibble=10, dnib=01
    if fits(diffs, 1, 30) {
        return Ok(((0b01 << 30) | ((diffs[0] as u32) & 0x3FFF_FFFF), 0b10, 1));
    }
    Err(MseedError::EncodeError(format!(
        "difference {} exceeds the Steim2 30-bit range",
        diffs[0]
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seismic_like(n: usize) -> Vec<i32> {
        let mut rng_state: u32 = 42;
        let mut val: i32 = 0;
        (0..n)
            .map(|_| {
                rng_state = rng_state.wrapping_mul(1103515245).wrapping_add(12345);
                let diff = ((rng_state >> 16) as i32 % 1000) - 500;
                val = val.wrapping_add(diff);
                val
            })
            .collect()
    }

    #[test]
    fn test_steim1_roundtrip() {
        let samples: Vec<i32> = (0..100).collect();
        let (encoded, consumed) = encode_steim1(&samples, 10, ByteOrder::Big).unwrap();
        assert_eq!(consumed, 100);
        assert_eq!(encoded.len() % FRAME_SIZE, 0);
        let decoded = decode_steim1(&encoded, consumed, ByteOrder::Big).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_steim2_roundtrip() {
        let samples: Vec<i32> = (0..100).collect();
        let (encoded, consumed) = encode_steim2(&samples, 10, ByteOrder::Big).unwrap();
        assert_eq!(consumed, 100);
        // 14 words of seven 4-bit diffs plus one 2 x 15-bit word
        assert_eq!(encoded.len(), 2 * FRAME_SIZE);
        let decoded = decode_steim2(&encoded, consumed, ByteOrder::Big).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_steim_roundtrip_random() {
        let samples = seismic_like(200);
        let (s1, n1) = encode_steim1(&samples, 64, ByteOrder::Big).unwrap();
        assert_eq!(decode_steim1(&s1, n1, ByteOrder::Big).unwrap(), samples);
        let (s2, n2) = encode_steim2(&samples, 64, ByteOrder::Little).unwrap();
        assert_eq!(decode_steim2(&s2, n2, ByteOrder::Little).unwrap(), samples);
    }

    #[test]
    fn test_capacity_limited_encoding() {
        let samples = seismic_like(1000);
        let (encoded, consumed) = encode_steim1(&samples, 2, ByteOrder::Big).unwrap();
        assert_eq!(encoded.len(), 2 * FRAME_SIZE);
        assert!(consumed > 0 && consumed < samples.len());
        let decoded = decode_steim1(&encoded, consumed, ByteOrder::Big).unwrap();
        assert_eq!(decoded, samples[..consumed]);
        // Xn holds the last encoded sample
        assert_eq!(read_u32(&encoded, 8, ByteOrder::Big) as i32, samples[consumed - 1]);
    }

    #[test]
    fn test_lookahead_block_is_stable() {
        let samples = seismic_like(2000);
        let (full, consumed) = encode_steim2(&samples, 3, ByteOrder::Big).unwrap();
        let truncated = &samples[..consumed + STEIM_LOOKAHEAD];
        let (again, consumed_again) = encode_steim2(truncated, 3, ByteOrder::Big).unwrap();
        assert_eq!(consumed_again, consumed);
        assert_eq!(again, full);
    }

    #[test]
    fn test_first_difference_ignored() {
        let samples = vec![10, 11, 12, 13];
        let (mut encoded, consumed) = encode_steim1(&samples, 1, ByteOrder::Big).unwrap();
        // First 8-bit difference lives in the top byte of word 3
        encoded[12] = 5;
        let decoded = decode_steim1(&encoded, consumed, ByteOrder::Big).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_zero_samples() {
        assert!(decode_steim1(&[], 0, ByteOrder::Big).unwrap().is_empty());
        let (encoded, consumed) = encode_steim2(&[], 4, ByteOrder::Big).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_decode_short_data() {
        assert!(matches!(
            decode_steim2(&[0u8; 10], 5, ByteOrder::Big),
            Err(MseedError::SteimDecode(_))
        ));
        let (encoded, _) = encode_steim1(&[1, 2, 3], 1, ByteOrder::Big).unwrap();
        assert!(matches!(
            decode_steim1(&encoded, 50, ByteOrder::Big),
            Err(MseedError::SampleCountMismatch { expected: 50, .. })
        ));
    }

    #[test]
    fn test_steim2_difference_out_of_range() {
        let samples = vec![0, 1 << 30];
        assert!(matches!(
            encode_steim2(&samples, 4, ByteOrder::Big),
            Err(MseedError::EncodeError(_))
        ));
        // Steim1 carries full 32-bit differences
        let (encoded, consumed) = encode_steim1(&samples, 4, ByteOrder::Big).unwrap();
        assert_eq!(decode_steim1(&encoded, consumed, ByteOrder::Big).unwrap(), samples);
    }
}
