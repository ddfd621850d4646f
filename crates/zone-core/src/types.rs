//! Common types for Zone
//!
//! Fundamental audio types shared by the playback engine and the effects:
//! fixed-size mono buffers and the split-channel stereo frames that the
//! audio server hands us once per callback.

use std::ops::{Deref, DerefMut};

/// Default sample rate (48kHz). The actual rate is read from the server at runtime.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default callback frame size in samples per channel
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Default transform size for overlap-save convolution
///
/// Must be larger than the frame size; the difference is the overlap tail
/// carried between callbacks (and the longest alias-free impulse response).
pub const DEFAULT_FFT_SIZE: usize = 4096;

/// Channel index of the left side of a stereo frame
pub const LEFT: usize = 0;

/// Channel index of the right side of a stereo frame
pub const RIGHT: usize = 1;

/// Audio sample type
pub type Sample = f32;

/// A fixed-size mono sample buffer
///
/// The length is set at construction and never changes, so a buffer
/// allocated during setup can be handed to the realtime thread and written
/// in place without reallocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Box<[Sample]>,
}

impl AudioBuffer {
    /// Create a buffer of `len` silent samples
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![0.0; len].into_boxed_slice(),
        }
    }

    /// Create a buffer holding a copy of `samples`
    pub fn from_slice(samples: &[Sample]) -> Self {
        Self {
            samples: samples.to_vec().into_boxed_slice(),
        }
    }

    /// Number of samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer has no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the samples as a slice
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Get the samples as a mutable slice
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Overwrite every sample with silence (real-time safe)
    #[inline]
    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    /// Copy from `src` into the start of the buffer (real-time safe)
    ///
    /// Copies `min(src.len(), self.len())` samples and leaves the rest untouched.
    #[inline]
    pub fn copy_from(&mut self, src: &[Sample]) {
        let n = src.len().min(self.samples.len());
        self.samples[..n].copy_from_slice(&src[..n]);
    }

    /// Peak absolute amplitude
    pub fn peak(&self) -> Sample {
        self.samples.iter().fold(0.0, |acc, s| acc.max(s.abs()))
    }
}

impl Deref for AudioBuffer {
    type Target = [Sample];

    #[inline]
    fn deref(&self) -> &[Sample] {
        &self.samples
    }
}

impl DerefMut for AudioBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }
}

impl From<Vec<Sample>> for AudioBuffer {
    fn from(samples: Vec<Sample>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }
}

/// One callback's worth of stereo audio, stored as separate channels
///
/// Split channels match what the audio server provides per port, so a
/// frame can be mixed straight into the port buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoFrame {
    pub left: AudioBuffer,
    pub right: AudioBuffer,
}

impl StereoFrame {
    /// Create a silent frame with `len` samples per channel
    pub fn silence(len: usize) -> Self {
        Self {
            left: AudioBuffer::silence(len),
            right: AudioBuffer::silence(len),
        }
    }

    /// Create a frame from separate left and right channel slices
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        Self {
            left: AudioBuffer::from_slice(left),
            right: AudioBuffer::from_slice(right),
        }
    }

    /// Samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Get a channel by index ([`LEFT`] or [`RIGHT`])
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        if index == LEFT {
            &self.left
        } else {
            &self.right
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_buffer_silence() {
        let buffer = AudioBuffer::silence(8);
        assert_eq!(buffer.len(), 8);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_audio_buffer_copy_from_shorter() {
        let mut buffer = AudioBuffer::from(vec![9.0; 4]);
        buffer.copy_from(&[1.0, 2.0]);
        assert_eq!(buffer.as_slice(), &[1.0, 2.0, 9.0, 9.0]);
    }

    #[test]
    fn test_audio_buffer_peak() {
        let buffer = AudioBuffer::from_slice(&[0.1, -0.8, 0.5]);
        assert!((buffer.peak() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_frame_channels() {
        let frame = StereoFrame::from_channels(&[1.0, 2.0], &[3.0, 4.0]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.channel(LEFT), &[1.0, 2.0]);
        assert_eq!(frame.channel(RIGHT), &[3.0, 4.0]);
    }

    #[test]
    #[should_panic]
    fn test_stereo_frame_mismatched_channels() {
        let _ = StereoFrame::from_channels(&[1.0], &[1.0, 2.0]);
    }
}
