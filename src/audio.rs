//! ADPCM tables and PCM utilities shared by both formats
//!
//! Holds the IMA step table, the 2-bit and 4-bit index adjustment tables,
//! precomputed per-step sample deltas for KWZ, and helpers for resampling,
//! mixing and diagnosing decoded 16-bit PCM.

use lazy_static::lazy_static;

/// IMA ADPCM step sizes, indexed by step index
pub const ADPCM_STEP_TABLE: [i16; 90] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767, 0,
];

/// Step index adjustment for 2-bit samples
pub const ADPCM_INDEX_TABLE_2BIT: [i8; 4] = [-1, 2, -1, 2];

/// Step index adjustment for 4-bit samples
pub const ADPCM_INDEX_TABLE_4BIT: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

lazy_static! {
    /// Precomputed 2-bit sample deltas, indexed `sample + 4 * step_index`
    ///
    /// Entries near the top of the step table exceed the `i16` range.
    pub static ref ADPCM_SAMPLE_TABLE_2BIT: [i32; 90 * 4] = build_sample_table_2bit();

    /// Precomputed 4-bit sample deltas, indexed `sample + 16 * step_index`
    pub static ref ADPCM_SAMPLE_TABLE_4BIT: [i32; 90 * 16] = build_sample_table_4bit();
}

fn build_sample_table_2bit() -> [i32; 90 * 4] {
    let mut table = [0i32; 90 * 4];
    for step_index in 0..90 {
        let step = ADPCM_STEP_TABLE[step_index] as i32;
        for sample in 0..4 {
            let mut diff = step >> 3;
            if sample & 1 != 0 {
                diff += step;
            }
            if sample & 2 != 0 {
                diff = -diff;
            }
            table[sample + 4 * step_index] = diff;
        }
    }
    table
}

fn build_sample_table_4bit() -> [i32; 90 * 16] {
    let mut table = [0i32; 90 * 16];
    for step_index in 0..90 {
        let step = ADPCM_STEP_TABLE[step_index] as i32;
        for sample in 0..16 {
            table[sample + 16 * step_index] = ima_diff(step, sample as u8);
        }
    }
    table
}

/// Standard IMA delta for a 4-bit sample: magnitude bits 0-2, sign bit 3
#[inline]
pub fn ima_diff(step: i32, sample: u8) -> i32 {
    let mut diff = step >> 3;
    if sample & 4 != 0 {
        diff += step;
    }
    if sample & 2 != 0 {
        diff += step >> 1;
    }
    if sample & 1 != 0 {
        diff += step >> 2;
    }
    if sample & 8 != 0 {
        diff = -diff;
    }
    diff
}

/// Number of samples in `src_len` samples at `src_freq` once converted to `dst_freq`
fn resampled_len(src_len: usize, src_freq: f64, dst_freq: f64) -> usize {
    ((src_len as f64 / src_freq) * dst_freq).floor() as usize
}

/// Nearest-neighbour resample
pub fn pcm_resample_nearest(src: &[i16], src_freq: f64, dst_freq: f64) -> Vec<i16> {
    if src.is_empty() {
        return Vec::new();
    }
    let dst_len = resampled_len(src.len(), src_freq, dst_freq);
    let step = src_freq / dst_freq;
    (0..dst_len)
        .map(|i| {
            let src_index = ((i as f64 * step).floor() as usize).min(src.len() - 1);
            src[src_index]
        })
        .collect()
}

/// Linear-interpolating resample
pub fn pcm_resample_linear(src: &[i16], src_freq: f64, dst_freq: f64) -> Vec<i16> {
    if src.is_empty() {
        return Vec::new();
    }
    let dst_len = resampled_len(src.len(), src_freq, dst_freq);
    let step = src_freq / dst_freq;
    let last = src.len() - 1;
    (0..dst_len)
        .map(|i| {
            let pos = i as f64 * step;
            let index = (pos.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let frac = pos - pos.floor();
            let a = src[index] as f64;
            let b = src[next] as f64;
            (a + (b - a) * frac) as i16
        })
        .collect()
}

/// Resample with `resample` unless the rates already match
pub fn pcm_resample_with(
    src: Vec<i16>,
    src_freq: f64,
    dst_freq: f64,
    resample: fn(&[i16], f64, f64) -> Vec<i16>,
) -> Vec<i16> {
    if src_freq == dst_freq {
        src
    } else {
        resample(&src, src_freq, dst_freq)
    }
}

/// Overlay `src` onto `dst` at half amplitude starting at `dst_offset`, clamping to `i16`
///
/// Samples of `src` that would land past the end of `dst` are dropped.
pub fn pcm_mix(src: &[i16], dst: &mut [i16], dst_offset: usize) {
    if dst_offset >= dst.len() {
        return;
    }
    for (out, &sample) in dst[dst_offset..].iter_mut().zip(src) {
        let mixed = *out as f64 + sample as f64 / 2.0;
        *out = mixed.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    }
}

/// Fraction of samples sitting at the `i16` rails
pub fn pcm_clipping_ratio(src: &[i16]) -> f64 {
    if src.is_empty() {
        return 0.0;
    }
    let clipped = src
        .iter()
        .filter(|&&s| s <= i16::MIN || s >= i16::MAX)
        .count();
    clipped as f64 / src.len() as f64
}

/// Root mean square amplitude; 0 for an empty buffer
pub fn pcm_rms(src: &[i16]) -> f64 {
    if src.is_empty() {
        return 0.0;
    }
    let sum: f64 = src.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / src.len() as f64).sqrt()
}

/// Encode PCM samples as little-endian bytes
pub fn pcm_to_le_bytes(src: &[i16]) -> Vec<u8> {
    src.iter().flat_map(|s| s.to_le_bytes()).collect()
}
