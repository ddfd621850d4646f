//! Effect system - common trait, parameter descriptions, and errors
//!
//! Effects are driven from two sides:
//! - the control thread calls [`Effect::set`] / [`Effect::get`] with integer
//!   parameter values (0..100 for continuous parameters, an index for
//!   selectors)
//! - the audio callback calls [`Effect::process`] on split-channel blocks
//!
//! Once an effect lives inside the callback, parameter changes reach it
//! through a [`ParamControl`]/[`ParamQueue`] pair instead of direct calls.
//!
//! Parameter errors are returned synchronously and leave the effect
//! unchanged. `process` never fails.

pub mod control;
pub mod convolution;
pub mod gain;
pub mod ir;

pub use control::{param_channel, ParamChange, ParamControl, ParamQueue};
pub use convolution::{Convolution, MonoConvolution};
pub use gain::Gain;
pub use ir::{ImpulseResponse, IrLibrary, IrProvider};

use thiserror::Error;

use crate::types::Sample;

/// Errors from effect parameter changes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("Unknown parameter index {0}")]
    UnknownParam(usize),

    #[error("Cabinet {index} out of range (library holds {count})")]
    CabinetOutOfRange { index: i32, count: usize },

    #[error("Impulse response has {actual} bins, expected {expected}")]
    SpectrumMismatch { expected: usize, actual: usize },

    #[error("Transform failed: {0}")]
    Transform(String),
}

/// Result type for effect parameter operations
pub type EffectResult<T> = Result<T, EffectError>;

/// Description of one effect parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    /// Parameter name for display
    pub name: String,
    /// Value after `reset()`, in the same units `set` takes
    pub default: i32,
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, default: i32) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// Information about an effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectInfo {
    /// Effect name for display
    pub name: String,
    /// Parameter descriptions, in index order
    pub params: Vec<ParamInfo>,
}

impl EffectInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter to this effect
    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// The core effect trait - implemented by all audio effects
pub trait Effect: Send {
    /// Get information about this effect (name, parameters)
    fn info(&self) -> &EffectInfo;

    fn param_count(&self) -> usize {
        self.info().param_count()
    }

    /// Set a parameter by index
    fn set(&mut self, index: usize, value: i32) -> EffectResult<()>;

    /// Read a parameter back in the units `set` takes
    fn get(&self, index: usize) -> EffectResult<i32>;

    /// Process a block in place
    ///
    /// `right` is `None` for a mono path. Realtime safe: no allocation, no
    /// locking, no failure.
    fn process(&mut self, left: &mut [Sample], right: Option<&mut [Sample]>);

    /// Clear carried audio state and restore any default parameters
    fn reset(&mut self);

    /// Called when the effect is attached to a running signal path
    fn activate(&mut self) {}
}
