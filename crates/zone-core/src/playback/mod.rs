//! Playback - turns a stored recording into callback-rate frames
//!
//! - [`Recording`]: read-only frame source owned outside the player
//! - [`Player`]: tape-counter state machine, mixed into the outputs once per callback
//! - [`PositionRelay`]: delivers transport notifications off the realtime thread
//! - [`PlayerControl`]: lock-free commands into a player running in the callback

mod control;
mod observer;
mod player;
mod recording;

pub use control::{PlayerCommand, PlayerControl, COMMAND_QUEUE_CAPACITY};
pub use observer::{PlayerEvent, Played, PositionRelay, EVENT_QUEUE_CAPACITY};
pub use player::{PlaybackMode, Player, DEFAULT_LEVEL};
pub use recording::{FrameRecording, Recording};
