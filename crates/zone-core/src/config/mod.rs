//! Engine configuration
//!
//! YAML-backed settings for the Zone signal path:
//!
//! - Audio-server client names and session tick intervals
//! - Callback frame size and convolution transform size
//! - Port query timeout and callback worker count
//!
//! # Usage
//!
//! ```ignore
//! use zone_core::config::{default_config_path, EngineConfig};
//!
//! let config = EngineConfig::load(&default_config_path("engine.yaml"));
//! let frames = config.dsp.frame_size;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{DspConfig, EngineConfig, SessionConfig};
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
