//! Player - tape-counter playback of a recording, one frame per callback

use std::sync::Arc;

use crate::config::DspConfig;
use crate::dsp;
use crate::types::Sample;

use super::control::{control_channel, ControlLink, PlayerCommand, PlayerControl};
use super::observer::{event_channel, PlayerEvent, PositionRelay, Played};
use super::recording::Recording;

/// Default mix level applied to the recording
pub const DEFAULT_LEVEL: f32 = 0.5;

/// What happens when the tape reaches the end of the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Play once, stop, and come to rest at position 0
    #[default]
    OneShot,
    /// Wrap to frame 0 and keep playing
    Loop,
}

/// Plays a [`Recording`] into the output buffers, one frame per callback
///
/// The tape position is the next frame to play. `process` is called once per
/// audio callback and mixes (adds) the current frame into the outputs, so
/// several players can share the same output ports.
///
/// Notifications go through a lock-free ring to a [`PositionRelay`]; the
/// realtime path never calls the observer directly.
///
/// Once the player has moved into the callback, drive it through the
/// [`PlayerControl`] from [`Player::attach_control`]. Replaced recordings
/// are then handed back to the control instead of being freed in `process`.
pub struct Player {
    /// Samples per frame (callback size)
    frame_size: usize,
    /// Next frame to play
    tape: usize,
    playing: bool,
    mode: PlaybackMode,
    /// Mix level applied while mixing into the outputs
    level: f32,
    recording: Option<Arc<dyn Recording>>,
    events: Option<rtrb::Producer<PlayerEvent>>,
    control: Option<ControlLink>,
}

impl Player {
    /// Create a stopped player with no recording
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            tape: 0,
            playing: false,
            mode: PlaybackMode::default(),
            level: DEFAULT_LEVEL,
            recording: None,
            events: None,
            control: None,
        }
    }

    /// Create a player for the configured callback size
    pub fn from_config(config: &DspConfig) -> Self {
        Self::new(config.frame_size)
    }

    /// Attach a control handle, replacing any previous one
    pub fn attach_control(&mut self) -> PlayerControl {
        let (control, link) = control_channel();
        self.control = Some(link);
        control
    }

    /// Attach an observer, returning the relay that delivers its events
    ///
    /// Replaces any previously attached observer; the old relay sees
    /// [`PositionRelay::is_detached`] from then on.
    pub fn attach_observer(&mut self, observer: Box<dyn Played>) -> PositionRelay {
        let (tx, rx) = event_channel();
        self.events = Some(tx);
        PositionRelay::new(rx, observer)
    }

    /// Stop posting notifications
    pub fn detach_observer(&mut self) {
        self.events = None;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Set the mix level applied to the recording
    pub fn set_level(&mut self, level: f32) {
        self.level = level;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Next frame to be played
    #[inline]
    pub fn tape_position(&self) -> usize {
        self.tape
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Length of the current recording in frames (0 without a recording)
    pub fn len(&self) -> usize {
        self.recording.as_ref().map_or(0, |r| r.size())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the current recording in seconds at `sample_rate`
    pub fn seconds(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        (self.len() * self.frame_size) as f32 / sample_rate as f32
    }

    /// Move the tape back to frame 0 and report head 0
    pub fn rewind(&mut self) {
        self.tape = 0;
        self.notify(PlayerEvent::Head(0));
    }

    /// Swap the recording, rewinding first
    ///
    /// The tape never points into the new recording with a position taken
    /// from the old one.
    pub fn set_recording(&mut self, recording: Option<Arc<dyn Recording>>) {
        self.rewind();
        if let Some(previous) = std::mem::replace(&mut self.recording, recording) {
            self.retire(previous);
        }
    }

    /// Hand a released recording back to the control thread
    fn retire(&mut self, recording: Arc<dyn Recording>) {
        if let Some(link) = self.control.as_mut() {
            // Full only if the player is also driven directly inside the callback
            let _ = link.retired.push(recording);
        }
    }

    /// Apply queued control commands (realtime safe)
    pub fn apply_commands(&mut self) {
        while let Some(command) = self.next_command() {
            self.apply(command);
        }
    }

    fn next_command(&mut self) -> Option<PlayerCommand> {
        self.control.as_mut()?.commands.pop().ok()
    }

    fn apply(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::SetRecording(recording) => self.set_recording(recording),
            PlayerCommand::SetPlaying(playing) => self.set_playing(playing),
            PlayerCommand::SetMode(mode) => self.set_mode(mode),
            PlayerCommand::SetLevel(level) => self.set_level(level),
            PlayerCommand::SetSample(sample) => self.set_sample(sample),
            PlayerCommand::Rewind => self.rewind(),
            PlayerCommand::Clear => self.clear(),
        }
    }

    /// Stop and drop the recording
    pub fn clear(&mut self) {
        self.playing = false;
        self.set_recording(None);
    }

    /// Jump to an absolute sample offset
    ///
    /// The frame is `sample / frame_size`, clamped to the last frame. An
    /// empty recording resets to 0. The observer receives the new head
    /// position re-expressed in samples (frame aligned).
    pub fn set_sample(&mut self, sample: u64) {
        let frames = self.len();
        if frames == 0 || self.frame_size == 0 {
            self.rewind();
            return;
        }

        let frame = (sample / self.frame_size as u64).min(frames as u64 - 1) as usize;
        self.tape = frame;
        self.notify(PlayerEvent::Head(self.head_samples(frame)));
    }

    /// Mix the next frame into the outputs (realtime callback)
    ///
    /// Queued control commands are applied first.
    ///
    /// Does nothing while stopped or without audio. Past the end, a one-shot
    /// stops and a loop restarts at frame 0. After the last frame the tape is
    /// reset to 0 right away, so a one-shot always comes to rest at 0.
    pub fn process(&mut self, out_left: &mut [Sample], out_right: &mut [Sample]) {
        self.apply_commands();
        if !self.playing {
            return;
        }
        let frames = self.len();
        if frames == 0 {
            return;
        }

        let mut frame = self.tape;
        self.tape += 1;

        if frame >= frames {
            self.rewind();
            if self.mode == PlaybackMode::OneShot {
                self.stop();
                return;
            }
            frame = 0;
            self.tape = 1;
        }

        if let Some(buf) = self.recording.as_ref().and_then(|r| r.get(frame)) {
            dsp::mix(&buf.left, self.level, out_left);
            dsp::mix(&buf.right, self.level, out_right);
        }

        if frame + 1 >= frames {
            self.tape = 0;
            if self.mode == PlaybackMode::OneShot {
                self.stop();
            }
        }

        self.notify(PlayerEvent::Head(self.head_samples(frame)));
    }

    fn stop(&mut self) {
        self.playing = false;
        self.notify(PlayerEvent::Stopped);
    }

    #[inline]
    fn head_samples(&self, frame: usize) -> u64 {
        frame as u64 * self.frame_size as u64
    }

    #[inline]
    fn notify(&mut self, event: PlayerEvent) {
        if let Some(events) = self.events.as_mut() {
            // Full ring: the observer is behind, drop the update
            let _ = events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::FrameRecording;
    use crate::types::StereoFrame;
    use std::sync::Mutex;

    const FRAME: usize = 4;

    /// Recording whose frame `k` holds the constant `k + 1` on both channels
    fn numbered(frames: usize) -> Arc<dyn Recording> {
        let frames = (0..frames)
            .map(|k| {
                let value = (k + 1) as f32;
                StereoFrame::from_channels(&[value; FRAME], &[-value; FRAME])
            })
            .collect();
        Arc::new(FrameRecording::new(frames))
    }

    fn player_with(frames: usize, mode: PlaybackMode) -> Player {
        let mut player = Player::new(FRAME);
        player.set_level(1.0);
        player.set_mode(mode);
        player.set_recording(Some(numbered(frames)));
        player.set_playing(true);
        player
    }

    /// Run one callback into fresh buffers and return the left channel value
    fn tick(player: &mut Player) -> f32 {
        let mut left = [0.0; FRAME];
        let mut right = [0.0; FRAME];
        player.process(&mut left, &mut right);
        assert_eq!(left[0], -right[0]);
        left[0]
    }

    #[derive(Clone, Default)]
    struct Seen(Arc<Mutex<Vec<PlayerEvent>>>);

    impl Played for Seen {
        fn set_head(&mut self, sample: u64) {
            self.0.lock().unwrap().push(PlayerEvent::Head(sample));
        }

        fn play_state(&mut self) {
            self.0.lock().unwrap().push(PlayerEvent::Stopped);
        }
    }

    #[test]
    fn test_one_shot_plays_each_frame_once_then_stops() {
        let mut player = player_with(4, PlaybackMode::OneShot);

        let played: Vec<f32> = (0..4).map(|_| tick(&mut player)).collect();
        assert_eq!(played, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(!player.is_playing());
        assert_eq!(player.tape_position(), 0);

        // Stopped: further callbacks leave the outputs alone
        assert_eq!(tick(&mut player), 0.0);
    }

    #[test]
    fn test_one_shot_rests_at_zero_for_any_length() {
        for n in 1..8 {
            let mut player = player_with(n, PlaybackMode::OneShot);
            for _ in 0..n {
                tick(&mut player);
            }
            assert!(!player.is_playing(), "length {}", n);
            assert_eq!(player.tape_position(), 0, "length {}", n);
        }
    }

    #[test]
    fn test_loop_wraps_and_keeps_playing() {
        let mut player = player_with(3, PlaybackMode::Loop);

        for _ in 0..3 {
            tick(&mut player);
        }
        assert!(player.is_playing());
        assert_eq!(player.tape_position(), 0);

        let played: Vec<f32> = (0..6).map(|_| tick(&mut player)).collect();
        assert_eq!(played, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert!(player.is_playing());
    }

    #[test]
    fn test_mix_is_additive() {
        let mut player = player_with(1, PlaybackMode::Loop);
        player.set_level(0.5);

        let mut left = [1.0; FRAME];
        let mut right = [1.0; FRAME];
        player.process(&mut left, &mut right);

        assert_eq!(left, [1.5; FRAME]);
        assert_eq!(right, [0.5; FRAME]);
    }

    #[test]
    fn test_set_sample_selects_frame() {
        let mut player = player_with(4, PlaybackMode::OneShot);

        player.set_sample(9); // 9 / 4 = frame 2
        assert_eq!(player.tape_position(), 2);
        assert_eq!(tick(&mut player), 3.0);
    }

    #[test]
    fn test_set_sample_clamps_past_end() {
        let mut player = player_with(4, PlaybackMode::OneShot);

        player.set_sample(10_000);
        assert_eq!(player.tape_position(), 3);
        assert_eq!(tick(&mut player), 4.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_set_sample_on_empty_resets() {
        let mut player = Player::new(FRAME);
        player.set_sample(100);
        assert_eq!(player.tape_position(), 0);
    }

    #[test]
    fn test_set_recording_rewinds() {
        let mut player = player_with(8, PlaybackMode::Loop);
        player.set_sample(6 * FRAME as u64);
        assert_eq!(player.tape_position(), 6);

        player.set_recording(Some(numbered(2)));
        assert_eq!(player.tape_position(), 0);
        assert_eq!(tick(&mut player), 1.0);
    }

    #[test]
    fn test_stopped_or_empty_is_silent() {
        let mut player = Player::new(FRAME);
        player.set_playing(true);
        assert_eq!(tick(&mut player), 0.0);

        let mut player = player_with(2, PlaybackMode::Loop);
        player.set_playing(false);
        assert_eq!(tick(&mut player), 0.0);
        assert_eq!(player.tape_position(), 0);
    }

    #[test]
    fn test_clear() {
        let mut player = player_with(2, PlaybackMode::Loop);
        player.clear();
        assert!(!player.is_playing());
        assert!(player.is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::DspConfig {
            frame_size: 128,
            ..Default::default()
        };
        assert_eq!(Player::from_config(&config).frame_size(), 128);
    }

    #[test]
    fn test_seconds() {
        let player = player_with(12, PlaybackMode::OneShot);
        // 12 frames * 4 samples at 48 samples/s
        assert!((player.seconds(48) - 1.0).abs() < 1e-6);
        assert_eq!(player.seconds(0), 0.0);
    }

    #[test]
    fn test_observer_sees_heads_and_stop() {
        let seen = Seen::default();
        let mut player = player_with(2, PlaybackMode::OneShot);
        let mut relay = player.attach_observer(Box::new(seen.clone()));

        tick(&mut player);
        tick(&mut player);
        // Nothing reaches the observer until the relay runs
        assert!(seen.0.lock().unwrap().is_empty());

        relay.pump();
        assert_eq!(
            *seen.0.lock().unwrap(),
            vec![
                PlayerEvent::Head(0),
                PlayerEvent::Stopped,
                PlayerEvent::Head(FRAME as u64),
            ]
        );
    }

    #[test]
    fn test_observer_sees_set_sample_in_samples() {
        let seen = Seen::default();
        let mut player = player_with(4, PlaybackMode::OneShot);
        let mut relay = player.attach_observer(Box::new(seen.clone()));

        player.set_sample(7);
        relay.pump();
        assert_eq!(*seen.0.lock().unwrap(), vec![PlayerEvent::Head(FRAME as u64)]);
    }

    /// Remembers which thread freed it
    struct Tracked {
        inner: FrameRecording,
        freed_on: Arc<Mutex<Option<String>>>,
    }

    impl Recording for Tracked {
        fn size(&self) -> usize {
            self.inner.size()
        }

        fn get(&self, index: usize) -> Option<&StereoFrame> {
            self.inner.get(index)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            let name = std::thread::current().name().map(str::to_string);
            *self.freed_on.lock().unwrap() = Some(name.unwrap_or_default());
        }
    }

    #[test]
    fn test_control_applies_at_next_callback() {
        let mut player = player_with(4, PlaybackMode::Loop);
        let mut control = player.attach_control();

        assert!(control.set_level(0.5));
        assert!(control.set_sample(2 * FRAME as u64));
        assert_eq!(control.pending(), 2);
        // Nothing changes until the callback runs
        assert_eq!(player.tape_position(), 0);
        assert_eq!(player.level(), 1.0);

        assert_eq!(tick(&mut player), 1.5);
        assert_eq!(control.pending(), 0);

        assert!(control.set_playing(false));
        assert_eq!(tick(&mut player), 0.0);
        assert!(!player.is_playing());

        assert!(control.set_recording(Some(numbered(2))));
        assert!(control.set_playing(true));
        assert_eq!(tick(&mut player), 0.5);
    }

    #[test]
    fn test_full_control_ring_hands_command_back() {
        let mut player = Player::new(FRAME);
        let mut control = player.attach_control();
        for _ in 0..crate::playback::COMMAND_QUEUE_CAPACITY {
            assert!(control.rewind());
        }
        assert!(matches!(
            control.send(PlayerCommand::SetPlaying(true)),
            Err(PlayerCommand::SetPlaying(true))
        ));

        player.apply_commands();
        assert!(control.set_playing(true));
    }

    #[test]
    fn test_released_recording_freed_off_callback_thread() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::{Duration, Instant};

        let freed_on = Arc::new(Mutex::new(None));
        let recording: Arc<dyn Recording> = Arc::new(Tracked {
            inner: FrameRecording::new(vec![StereoFrame::silence(FRAME); 2]),
            freed_on: Arc::clone(&freed_on),
        });

        let mut player = Player::new(FRAME);
        let mut control = player.attach_control();
        let running = Arc::new(AtomicBool::new(true));
        let callback = {
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("zone-rt".into())
                .spawn(move || {
                    let mut left = [0.0; FRAME];
                    let mut right = [0.0; FRAME];
                    while running.load(Ordering::Acquire) {
                        player.process(&mut left, &mut right);
                        std::thread::sleep(Duration::from_millis(1));
                    }
                })
                .unwrap()
        };

        assert!(control.set_recording(Some(recording)));
        assert!(control.set_playing(true));
        assert!(control.clear());

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut freed = 0;
        while freed == 0 && Instant::now() < deadline {
            freed += control.collect();
            std::thread::sleep(Duration::from_millis(1));
        }
        running.store(false, Ordering::Release);
        callback.join().unwrap();

        assert_eq!(freed, 1);
        let thread = freed_on.lock().unwrap().clone().unwrap();
        assert_ne!(thread, "zone-rt");
    }

    #[test]
    fn test_detach_observer() {
        let mut player = player_with(2, PlaybackMode::Loop);
        let relay = player.attach_observer(Box::new(Seen::default()));
        player.detach_observer();
        assert!(relay.is_detached());
        tick(&mut player);
    }
}
