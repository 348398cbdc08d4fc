//! Converts the interleaved stereo accumulator into output PCM.
//!
//! The accumulator always holds left/right pairs. Mono output takes the
//! left side, which equals the right one whenever panning is disabled.

use crate::SampleFormat;

#[inline]
fn clamp(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Write clamped 16 bit frames.
///
/// # Arguments
///
/// * `mix` - interleaved stereo accumulator
/// * `out` - destination, `width` samples per frame
/// * `width` - 1 for mono, 2 for stereo
pub fn write_i16(mix: &[i32], out: &mut [i16], width: usize) {
    for (frame, dest) in mix.chunks_exact(2).zip(out.chunks_exact_mut(width)) {
        for (sample, value) in dest.iter_mut().zip(frame) {
            *sample = clamp(*value);
        }
    }
}

/// Write frames as bytes in the given sample format
pub fn write_bytes(mix: &[i32], out: &mut [u8], width: usize, format: SampleFormat) {
    let stride = width * format.bytes();
    for (frame, dest) in mix.chunks_exact(2).zip(out.chunks_exact_mut(stride)) {
        for (bytes, value) in dest.chunks_exact_mut(format.bytes()).zip(frame) {
            let sample = clamp(*value);
            match format {
                SampleFormat::U8 => bytes[0] = ((sample >> 8) + 128) as u8,
                SampleFormat::S16Le => bytes.copy_from_slice(&sample.to_le_bytes()),
            }
        }
    }
}
