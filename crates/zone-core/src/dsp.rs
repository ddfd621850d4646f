//! Scalar DSP helpers shared by the player and the effects
//!
//! All functions work in place on caller-owned slices and never allocate,
//! so they are safe to call from the realtime callback.

use crate::types::Sample;

/// Mix-add `src` scaled by `level` into `out`
///
/// Processes `min(src.len(), out.len())` samples. Existing content of `out`
/// is kept, so several sources can sum into the same output.
#[inline]
pub fn mix(src: &[Sample], level: f32, out: &mut [Sample]) {
    for (o, &s) in out.iter_mut().zip(src.iter()) {
        *o += s * level;
    }
}

/// Apply a linear gain ramp from `start` toward `end` across `buf`
///
/// Sample `i` is scaled by `start + i * (end - start) / len`, so the ramp
/// reaches `end` exactly at the first sample of the next block.
#[inline]
pub fn ramp(buf: &mut [Sample], start: f32, end: f32) {
    if buf.is_empty() {
        return;
    }
    let step = (end - start) / buf.len() as f32;
    let mut gain = start;
    for s in buf.iter_mut() {
        *s *= gain;
        gain += step;
    }
}

/// Scale every sample by a constant gain
#[inline]
pub fn scale(buf: &mut [Sample], gain: f32) {
    for s in buf.iter_mut() {
        *s *= gain;
    }
}
