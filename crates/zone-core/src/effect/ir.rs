//! Impulse responses and the provider the convolution reads them from

use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::RealFftPlanner;

use super::{EffectError, EffectResult};
use crate::types::Sample;

/// An impulse response, stored as its frequency-domain representation
///
/// The spectrum holds `fft_size / 2 + 1` bins of the zero-padded taps, the
/// layout a real-to-complex transform of `fft_size` produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    name: String,
    spectrum: Vec<Complex32>,
}

impl ImpulseResponse {
    /// Wrap an already transformed spectrum
    pub fn from_spectrum(name: impl Into<String>, spectrum: Vec<Complex32>) -> Self {
        Self {
            name: name.into(),
            spectrum,
        }
    }

    /// Transform time-domain taps for a convolution of size `fft_size`
    ///
    /// Taps beyond `fft_size` are dropped. Only the first
    /// `fft_size - frame_size + 1` taps convolve without wrap-around, so
    /// longer responses should be trimmed by the caller.
    pub fn from_samples(
        name: impl Into<String>,
        taps: &[Sample],
        fft_size: usize,
    ) -> EffectResult<Self> {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);

        let mut time = forward.make_input_vec();
        let n = taps.len().min(fft_size);
        time[..n].copy_from_slice(&taps[..n]);

        let mut spectrum = forward.make_output_vec();
        forward
            .process(&mut time, &mut spectrum)
            .map_err(|e| EffectError::Transform(e.to_string()))?;

        Ok(Self::from_spectrum(name, spectrum))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frequency-domain bins
    pub fn spectrum(&self) -> &[Complex32] {
        &self.spectrum
    }

    /// Transform size this response was computed for
    pub fn fft_size(&self) -> usize {
        self.spectrum.len().saturating_sub(1) * 2
    }
}

/// Indexed database of impulse responses
///
/// Injected into the convolution at construction. Responses are shared, so
/// selecting a cabinet on the control thread only swaps an `Arc`.
pub trait IrProvider: Send + Sync {
    /// Number of responses
    fn size(&self) -> usize;

    /// Response at `index`, or `None` if out of range
    fn get(&self, index: usize) -> Option<Arc<ImpulseResponse>>;
}

/// In-memory list of impulse responses
#[derive(Debug, Clone, Default)]
pub struct IrLibrary {
    responses: Vec<Arc<ImpulseResponse>>,
}

impl IrLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, response: ImpulseResponse) {
        self.responses.push(Arc::new(response));
    }

    /// Builder-style [`Self::push`]
    pub fn with(mut self, response: ImpulseResponse) -> Self {
        self.push(response);
        self
    }

    /// Index of the first response called `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.responses.iter().position(|r| r.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.responses.iter().map(|r| r.name())
    }
}

impl IrProvider for IrLibrary {
    fn size(&self) -> usize {
        self.responses.len()
    }

    fn get(&self, index: usize) -> Option<Arc<ImpulseResponse>> {
        self.responses.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_impulse_is_flat() {
        let ir = ImpulseResponse::from_samples("unit", &[1.0], 16).unwrap();
        assert_eq!(ir.spectrum().len(), 9);
        assert_eq!(ir.fft_size(), 16);
        for bin in ir.spectrum() {
            assert!((bin.re - 1.0).abs() < 1e-6);
            assert!(bin.im.abs() < 1e-6);
        }
    }

    #[test]
    fn test_long_taps_truncated() {
        let taps = vec![0.5; 100];
        let ir = ImpulseResponse::from_samples("long", &taps, 16).unwrap();
        // DC bin sums the 16 kept taps
        assert!((ir.spectrum()[0].re - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_library_lookup() {
        let library = IrLibrary::new()
            .with(ImpulseResponse::from_samples("room", &[1.0], 16).unwrap())
            .with(ImpulseResponse::from_samples("hall", &[0.5], 16).unwrap());

        assert_eq!(library.size(), 2);
        assert_eq!(library.position("hall"), Some(1));
        assert_eq!(library.get(0).unwrap().name(), "room");
        assert!(library.get(2).is_none());
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["room", "hall"]);
    }
}
