//! Engine settings: session clients, DSP sizes, query timeout

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_FFT_SIZE, DEFAULT_FRAME_SIZE, DEFAULT_SAMPLE_RATE};

/// Default idle tick of a session thread (milliseconds)
///
/// The idle loop wakes as soon as a request arrives, so this only bounds how
/// quickly a session notices that it has been asked to close.
const DEFAULT_IDLE_TICK_MS: u64 = 250;

/// Default poll interval while waiting for a client handle (milliseconds)
const DEFAULT_CLIENT_POLL_MS: u64 = 10;

/// Default bound on the cross-session port query join (milliseconds)
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 1000;

/// Default number of background threads running request callbacks
const DEFAULT_CALLBACK_WORKERS: usize = 2;

/// Settings for one audio-server client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Client name registered with the audio server
    pub client_name: String,

    /// Idle tick of the session thread in milliseconds
    pub idle_tick_ms: u64,

    /// Sleep between polls while a caller waits for the client handle
    pub client_poll_ms: u64,
}

impl SessionConfig {
    /// Create session settings with the given client name and default timings
    pub fn named(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            ..Default::default()
        }
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms.max(1))
    }

    pub fn client_poll(&self) -> Duration {
        Duration::from_millis(self.client_poll_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: "zone".to_string(),
            idle_tick_ms: DEFAULT_IDLE_TICK_MS,
            client_poll_ms: DEFAULT_CLIENT_POLL_MS,
        }
    }
}

/// Block sizes shared by the player and the effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DspConfig {
    /// Samples per channel per callback
    pub frame_size: usize,

    /// Convolution transform size (must exceed `frame_size`)
    pub fft_size: usize,

    /// Nominal sample rate, used for length-in-seconds reporting
    pub sample_rate: u32,
}

impl DspConfig {
    /// Overlap tail carried between convolution blocks
    pub fn overlap_size(&self) -> usize {
        self.fft_size.saturating_sub(self.frame_size)
    }

    /// Check that the sizes describe a usable overlap-save setup
    pub fn is_valid(&self) -> bool {
        self.frame_size > 0 && self.fft_size > self.frame_size && self.sample_rate > 0
    }
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            fft_size: DEFAULT_FFT_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Top-level configuration for the engine facade and its effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session that owns AUDIO ports
    pub audio: SessionConfig,

    /// Session that owns MIDI ports
    pub midi: SessionConfig,

    /// Block sizes
    pub dsp: DspConfig,

    /// Bound on waiting for both sessions to answer a port query
    pub query_timeout_ms: u64,

    /// Threads running asynchronous request callbacks
    pub callback_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: SessionConfig::named("zone-audio"),
            midi: SessionConfig::named("zone-midi"),
            dsp: DspConfig::default(),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            callback_workers: DEFAULT_CALLBACK_WORKERS,
        }
    }
}

impl EngineConfig {
    /// Load from YAML, falling back to defaults, then sanitize
    pub fn load(path: &Path) -> Self {
        super::load_config::<Self>(path).sanitized()
    }

    /// Replace settings that cannot work with their defaults
    pub fn sanitized(mut self) -> Self {
        if !self.dsp.is_valid() {
            log::warn!(
                "Invalid DSP sizes (frame {}, fft {}, rate {}), using defaults",
                self.dsp.frame_size,
                self.dsp.fft_size,
                self.dsp.sample_rate
            );
            self.dsp = DspConfig::default();
        }
        if self.callback_workers == 0 {
            self.callback_workers = DEFAULT_CALLBACK_WORKERS;
        }
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Set the AUDIO and MIDI client names
    pub fn with_client_names(mut self, audio: impl Into<String>, midi: impl Into<String>) -> Self {
        self.audio.client_name = audio.into();
        self.midi.client_name = midi.into();
        self
    }

    /// Set the frame and transform sizes
    pub fn with_dsp_sizes(mut self, frame_size: usize, fft_size: usize) -> Self {
        self.dsp.frame_size = frame_size;
        self.dsp.fft_size = fft_size;
        self
    }

    /// Set the port query timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the idle tick of both sessions
    pub fn with_idle_tick(mut self, tick: Duration) -> Self {
        let ms = tick.as_millis() as u64;
        self.audio.idle_tick_ms = ms;
        self.midi.idle_tick_ms = ms;
        self
    }
}
