//! Zone Core - realtime-safe playback and effects for the Zone signal path

pub mod config;
pub mod dsp;
pub mod effect;
pub mod playback;
pub mod types;

pub use types::*;
