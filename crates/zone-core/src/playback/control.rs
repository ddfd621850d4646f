//! Lock-free control of a player living inside the process callback
//!
//! The control thread pushes [`PlayerCommand`]s into a pre-allocated `rtrb`
//! ring and the player applies them at the top of [`Player::process`], so
//! state never changes in the middle of a frame. Recordings the player lets
//! go of travel back over a second ring and are freed by
//! [`PlayerControl::collect`] on the control thread.
//!
//! ```text
//! ┌────────────────┐  PlayerCommand   ┌─────────────────┐
//! │ PlayerControl  │─────────────────►│  Player (RT)    │
//! │ (control)      │◄─────────────────│  process()      │
//! └────────────────┘  retired Arc     └─────────────────┘
//! ```
//!
//! [`Player::process`]: super::Player::process

use std::sync::Arc;

use super::player::PlaybackMode;
use super::recording::Recording;

/// Capacity of the command ring (and of the ring returning recordings)
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// A change applied by the player at the start of its next callback
pub enum PlayerCommand {
    /// Rewind, then swap the recording
    SetRecording(Option<Arc<dyn Recording>>),
    SetPlaying(bool),
    SetMode(PlaybackMode),
    SetLevel(f32),
    /// Jump to an absolute sample offset
    SetSample(u64),
    Rewind,
    /// Stop and release the recording
    Clear,
}

/// Player side of a control channel
pub(crate) struct ControlLink {
    pub(crate) commands: rtrb::Consumer<PlayerCommand>,
    pub(crate) retired: rtrb::Producer<Arc<dyn Recording>>,
}

pub(crate) fn control_channel() -> (PlayerControl, ControlLink) {
    let (command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    let (retired_tx, retired_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
    let control = PlayerControl {
        commands: command_tx,
        retired: retired_rx,
    };
    let link = ControlLink {
        commands: command_rx,
        retired: retired_tx,
    };
    (control, link)
}

/// Control-thread handle of a player
///
/// Every send first collects returned recordings. Each command retires at
/// most one recording and both rings share a capacity, so the return ring
/// always has room for what the player hands back.
pub struct PlayerControl {
    commands: rtrb::Producer<PlayerCommand>,
    retired: rtrb::Consumer<Arc<dyn Recording>>,
}

impl PlayerControl {
    /// Queue a command, handing it back if the ring is full
    pub fn send(&mut self, command: PlayerCommand) -> Result<(), PlayerCommand> {
        self.collect();
        self.commands
            .push(command)
            .map_err(|rtrb::PushError::Full(command)| command)
    }

    pub fn set_recording(&mut self, recording: Option<Arc<dyn Recording>>) -> bool {
        self.send(PlayerCommand::SetRecording(recording)).is_ok()
    }

    pub fn set_playing(&mut self, playing: bool) -> bool {
        self.send(PlayerCommand::SetPlaying(playing)).is_ok()
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) -> bool {
        self.send(PlayerCommand::SetMode(mode)).is_ok()
    }

    pub fn set_level(&mut self, level: f32) -> bool {
        self.send(PlayerCommand::SetLevel(level)).is_ok()
    }

    pub fn set_sample(&mut self, sample: u64) -> bool {
        self.send(PlayerCommand::SetSample(sample)).is_ok()
    }

    pub fn rewind(&mut self) -> bool {
        self.send(PlayerCommand::Rewind).is_ok()
    }

    pub fn clear(&mut self) -> bool {
        self.send(PlayerCommand::Clear).is_ok()
    }

    /// Free recordings the player has released, returning how many
    pub fn collect(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(recording) = self.retired.pop() {
            drop(recording);
            freed += 1;
        }
        freed
    }

    /// Commands not yet applied by the player
    pub fn pending(&self) -> usize {
        COMMAND_QUEUE_CAPACITY - self.commands.slots()
    }

    /// Check if the player was dropped or attached to another control
    pub fn is_detached(&self) -> bool {
        self.commands.is_abandoned()
    }
}
