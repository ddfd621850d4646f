//! Frame-indexed stereo recordings
//!
//! A [`Recording`] is owned outside the player (sample library, looper
//! tracks, ...) and only read by it. [`FrameRecording`] is the in-memory
//! implementation used when the audio is already decoded.

use crate::types::{Sample, StereoFrame};

/// Read-only source of stereo frames, indexed by callback frame
pub trait Recording: Send + Sync {
    /// Number of frames
    fn size(&self) -> usize;

    /// Frame at `index`, or `None` if the index is out of range
    fn get(&self, index: usize) -> Option<&StereoFrame>;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

/// A recording held fully in memory as a list of frames
#[derive(Debug, Clone, Default)]
pub struct FrameRecording {
    frames: Vec<StereoFrame>,
}

impl FrameRecording {
    /// Create a recording from already-chopped frames
    pub fn new(frames: Vec<StereoFrame>) -> Self {
        Self { frames }
    }

    /// Chop whole channels into frames of `frame_size` samples
    ///
    /// The final frame is padded with silence. Panics if the channel lengths
    /// differ or `frame_size` is zero.
    pub fn from_channels(left: &[Sample], right: &[Sample], frame_size: usize) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        assert!(frame_size > 0, "Frame size must be non-zero");

        let frames = left
            .chunks(frame_size)
            .zip(right.chunks(frame_size))
            .map(|(l, r)| {
                let mut frame = StereoFrame::silence(frame_size);
                frame.left.copy_from(l);
                frame.right.copy_from(r);
                frame
            })
            .collect();
        Self { frames }
    }

    /// Append a frame
    pub fn push(&mut self, frame: StereoFrame) {
        self.frames.push(frame);
    }

    /// Iterate the frames in order
    pub fn frames(&self) -> impl Iterator<Item = &StereoFrame> {
        self.frames.iter()
    }
}

impl Recording for FrameRecording {
    fn size(&self) -> usize {
        self.frames.len()
    }

    fn get(&self, index: usize) -> Option<&StereoFrame> {
        self.frames.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channels_pads_last_frame() {
        let left: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let right = vec![1.0; 10];
        let recording = FrameRecording::from_channels(&left, &right, 4);

        assert_eq!(recording.size(), 3);
        let last = recording.get(2).unwrap();
        assert_eq!(last.left.as_slice(), &[8.0, 9.0, 0.0, 0.0]);
        assert_eq!(last.right.as_slice(), &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_get_out_of_range() {
        let recording = FrameRecording::new(vec![StereoFrame::silence(4)]);
        assert!(recording.get(1).is_none());
        assert!(!recording.is_empty());
    }

    #[test]
    fn test_empty_recording() {
        let recording = FrameRecording::default();
        assert!(recording.is_empty());
        assert_eq!(recording.frames().count(), 0);
    }
}
