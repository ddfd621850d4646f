//! Convolution effect - overlap-save FFT convolution against a cabinet IR
//!
//! Each block is convolved as follows:
//!
//! ```text
//!   time = [ overlap tail (fft - frame) | new block (frame) ]
//!   overlap <- time[frame..]                  (saved before transforming)
//!   spectrum = FFT(time) * IR                 (bin by bin)
//!   wet = IFFT(spectrum)[overlap .. overlap + frame] / fft
//!   out = dry * (1 - mix) + wet * mix
//! ```
//!
//! All working buffers are allocated at construction. `process` only copies,
//! transforms, and multiplies in place.

use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};

use super::ir::{ImpulseResponse, IrProvider};
use crate::config::DspConfig;
use super::{Effect, EffectError, EffectInfo, EffectResult, ParamInfo};
use crate::types::Sample;

/// Parameter index of the cabinet (IR index, -1 = none selected)
pub const CABINET: usize = 0;

/// Parameter index of the wet mix (0..100)
pub const WET: usize = 1;

const DEFAULT_WET: f32 = 0.9;

fn convolution_info() -> EffectInfo {
    EffectInfo::new("Convolution")
        .with_param(ParamInfo::new("Cabinet", -1))
        .with_param(ParamInfo::new("Wet", (DEFAULT_WET * 100.0).round() as i32))
}

/// Single-channel overlap-save convolution
pub struct MonoConvolution {
    info: EffectInfo,
    frame_size: usize,
    fft_size: usize,

    db: Arc<dyn IrProvider>,
    /// Selected IR index, -1 until a cabinet is chosen
    cabinet: i32,
    ir: Option<Arc<ImpulseResponse>>,
    wet: f32,

    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,

    /// Tail carried into the next block (`fft_size - frame_size` samples)
    overlap: Vec<Sample>,
    /// Transform input, then inverse output
    time: Vec<Sample>,
    spectrum: Vec<Complex32>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
}

impl MonoConvolution {
    /// Create a convolution for blocks of `frame_size` using transforms of `fft_size`
    ///
    /// Panics if `fft_size` is not larger than `frame_size`.
    pub fn new(frame_size: usize, fft_size: usize, db: Arc<dyn IrProvider>) -> Self {
        assert!(frame_size > 0, "Frame size must be non-zero");
        assert!(
            fft_size > frame_size,
            "FFT size {} must exceed frame size {}",
            fft_size,
            frame_size
        );

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let time = forward.make_input_vec();
        let spectrum = forward.make_output_vec();
        let forward_scratch = forward.make_scratch_vec();
        let inverse_scratch = inverse.make_scratch_vec();

        Self {
            info: convolution_info(),
            frame_size,
            fft_size,
            db,
            cabinet: -1,
            ir: None,
            wet: DEFAULT_WET,
            forward,
            inverse,
            overlap: vec![0.0; fft_size - frame_size],
            time,
            spectrum,
            forward_scratch,
            inverse_scratch,
        }
    }

    /// Create a convolution with the configured frame and transform sizes
    pub fn from_config(config: &DspConfig, db: Arc<dyn IrProvider>) -> Self {
        Self::new(config.frame_size, config.fft_size, db)
    }

    #[inline]
    pub fn overlap_size(&self) -> usize {
        self.overlap.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Selected cabinet index (-1 = none)
    pub fn cabinet(&self) -> i32 {
        self.cabinet
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    /// Select the impulse response at `index`
    ///
    /// On success the overlap tail is cleared so audio convolved against the
    /// previous response does not bleed into the new one. On failure nothing
    /// changes.
    pub fn select_cabinet(&mut self, index: i32) -> EffectResult<()> {
        let count = self.db.size();
        let out_of_range = EffectError::CabinetOutOfRange { index, count };
        if index < 0 || index as usize >= count {
            return Err(out_of_range);
        }
        let ir = self.db.get(index as usize).ok_or(out_of_range)?;

        let expected = self.spectrum.len();
        if ir.spectrum().len() != expected {
            return Err(EffectError::SpectrumMismatch {
                expected,
                actual: ir.spectrum().len(),
            });
        }

        self.cabinet = index;
        self.ir = Some(ir);
        self.clear_overlap();
        Ok(())
    }

    /// Set the wet mix (clamped to 0..1)
    pub fn set_wet(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    pub fn clear_overlap(&mut self) {
        self.overlap.fill(0.0);
    }

    /// Convolve one block in place (realtime safe)
    ///
    /// Blocks whose length is not the frame size are left untouched. With a
    /// wet mix of 0 the transform is skipped but the tail is still carried,
    /// so raising the mix later continues seamlessly.
    pub fn process_block(&mut self, block: &mut [Sample]) {
        if block.len() != self.frame_size {
            return;
        }
        if self.wet <= 0.0 {
            self.carry(block);
            return;
        }

        let overlap = self.overlap_size();
        self.time[..overlap].copy_from_slice(&self.overlap);
        self.time[overlap..].copy_from_slice(block);
        self.overlap.copy_from_slice(&self.time[self.frame_size..]);

        if self.convolve().is_err() {
            // Leave the block dry
            return;
        }

        let wet = self.wet;
        let dry = 1.0 - wet;
        let norm = 1.0 / self.fft_size as f32;
        for (out, &conv) in block.iter_mut().zip(&self.time[overlap..]) {
            *out = dry * *out + wet * conv * norm;
        }
    }

    /// Convolve `mono` in place and copy the result to `stereo`
    pub fn mono_to_stereo(&mut self, mono: &mut [Sample], stereo: &mut [Sample]) {
        self.process_block(mono);
        let n = mono.len().min(stereo.len());
        stereo[..n].copy_from_slice(&mono[..n]);
    }

    /// Shift the tail without transforming
    fn carry(&mut self, block: &[Sample]) {
        let overlap = self.overlap_size();
        let frame = block.len();
        if overlap > frame {
            self.overlap.copy_within(frame.., 0);
            self.overlap[overlap - frame..].copy_from_slice(block);
        } else {
            self.overlap.copy_from_slice(&block[frame - overlap..]);
        }
    }

    /// `time` holds the composite input on entry and the unscaled result on exit
    fn convolve(&mut self) -> Result<(), FftError> {
        self.forward
            .process_with_scratch(&mut self.time, &mut self.spectrum, &mut self.forward_scratch)?;

        match &self.ir {
            Some(ir) => {
                for (x, h) in self.spectrum.iter_mut().zip(ir.spectrum()) {
                    let (a, b) = (x.re, x.im);
                    let (c, d) = (h.re, h.im);
                    *x = Complex32::new(a * c - b * d, a * d + b * c);
                }
            }
            None => self.spectrum.fill(Complex32::default()),
        }

        // DC and Nyquist bins of a real signal are purely real
        if let Some(dc) = self.spectrum.first_mut() {
            dc.im = 0.0;
        }
        if self.fft_size % 2 == 0 {
            if let Some(nyquist) = self.spectrum.last_mut() {
                nyquist.im = 0.0;
            }
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.time, &mut self.inverse_scratch)
    }
}

impl Effect for MonoConvolution {
    fn info(&self) -> &EffectInfo {
        &self.info
    }

    fn set(&mut self, index: usize, value: i32) -> EffectResult<()> {
        match index {
            CABINET => self.select_cabinet(value),
            WET => {
                self.set_wet(value as f32 * 0.01);
                Ok(())
            }
            _ => Err(EffectError::UnknownParam(index)),
        }
    }

    fn get(&self, index: usize) -> EffectResult<i32> {
        match index {
            CABINET => Ok(self.cabinet),
            WET => Ok((self.wet * 100.0).round() as i32),
            _ => Err(EffectError::UnknownParam(index)),
        }
    }

    /// Mono path; when `right` is given it receives a copy of the result
    fn process(&mut self, left: &mut [Sample], right: Option<&mut [Sample]>) {
        match right {
            Some(right) => self.mono_to_stereo(left, right),
            None => self.process_block(left),
        }
    }

    fn reset(&mut self) {
        self.clear_overlap();
    }

    /// Load the first cabinet if none was chosen yet
    fn activate(&mut self) {
        if self.cabinet >= 0 || self.db.size() == 0 {
            return;
        }
        if let Err(e) = self.select_cabinet(0) {
            log::warn!("Convolution: could not load default cabinet: {}", e);
        }
    }
}

/// Stereo convolution: two independent mono instances
///
/// Each side keeps its own overlap tail. Settings go to both sides; reads
/// come from the left.
pub struct Convolution {
    left: MonoConvolution,
    right: MonoConvolution,
}

impl Convolution {
    pub fn new(frame_size: usize, fft_size: usize, db: Arc<dyn IrProvider>) -> Self {
        Self {
            left: MonoConvolution::new(frame_size, fft_size, Arc::clone(&db)),
            right: MonoConvolution::new(frame_size, fft_size, db),
        }
    }

    pub fn from_config(config: &DspConfig, db: Arc<dyn IrProvider>) -> Self {
        Self::new(config.frame_size, config.fft_size, db)
    }

    pub fn left(&self) -> &MonoConvolution {
        &self.left
    }

    pub fn right(&self) -> &MonoConvolution {
        &self.right
    }
}

impl Effect for Convolution {
    fn info(&self) -> &EffectInfo {
        self.left.info()
    }

    fn set(&mut self, index: usize, value: i32) -> EffectResult<()> {
        self.left.set(index, value)?;
        self.right.set(index, value)
    }

    fn get(&self, index: usize) -> EffectResult<i32> {
        self.left.get(index)
    }

    fn process(&mut self, left: &mut [Sample], right: Option<&mut [Sample]>) {
        self.left.process_block(left);
        if let Some(right) = right {
            self.right.process_block(right);
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn activate(&mut self) {
        self.left.activate();
        self.right.activate();
    }
}
