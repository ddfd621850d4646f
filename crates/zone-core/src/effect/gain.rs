//! Gain effect - volume and pan with click-free smoothing
//!
//! Gain changes are never applied as a step at a block boundary. Each
//! `process` call ramps linearly, per sample, from the gain the previous
//! block ended on to the newly requested target. The ramp origin is kept in
//! shadow state so consecutive blocks join up exactly.

use crate::dsp;
use crate::effect::{Effect, EffectError, EffectInfo, EffectResult, ParamInfo};
use crate::types::Sample;

/// Parameter index of the volume (0..100)
pub const VOLUME: usize = 0;

/// Parameter index of the pan (0..100, 50 = center)
pub const PAN: usize = 1;

const DEFAULT_GAIN: f32 = 0.5;
const CENTER: f32 = 0.5;

/// Pan positions inside this band count as centered
const BALANCE_DEADBAND: (f32, f32) = (0.49, 0.51);

/// Volume and pan with smoothed application
///
/// Two stages multiply together: a pre stage (preamp × pan law, per
/// channel) and a post stage (the volume). Both are ramped.
pub struct Gain {
    info: EffectInfo,
    /// Volume, 0..1
    gain: f32,
    /// Pan, 0..1 with 0.5 = center
    pan: f32,
    preamp: f32,

    // Values the last ramp ended on
    pre_left: f32,
    pre_right: f32,
    post: f32,
}

impl Gain {
    pub fn new() -> Self {
        let info = EffectInfo::new("Gain")
            .with_param(ParamInfo::new("Volume", 50))
            .with_param(ParamInfo::new("Pan", 50));

        Self {
            info,
            gain: DEFAULT_GAIN,
            pan: CENTER,
            preamp: 1.0,
            pre_left: 1.0,
            pre_right: 1.0,
            post: 1.0,
        }
    }

    /// Set the volume (clamped to 0..1)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the pan (clamped to 0..1)
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(0.0, 1.0);
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Set the preamp factor applied with the pan law
    pub fn set_preamp(&mut self, preamp: f32) {
        self.preamp = preamp;
    }

    pub fn preamp(&self) -> f32 {
        self.preamp
    }

    /// Whether pan/balance is engaged (pan away from center)
    pub fn is_active(&self) -> bool {
        self.pan < BALANCE_DEADBAND.0 || self.pan > BALANCE_DEADBAND.1
    }

    /// Disengaging pan/balance re-centers it
    pub fn set_active(&mut self, active: bool) {
        if !active {
            self.pan = CENTER;
        }
    }

    /// Target pre-stage gain of the left channel
    ///
    /// Unity at center. Panning left gives the left side a mild boost (up to
    /// 1.1 hard left); panning right fades it linearly to 0.
    pub fn left_gain(&self) -> f32 {
        if self.pan < CENTER {
            (1.0 + (CENTER - self.pan) * 0.2) * self.preamp
        } else {
            2.0 * (1.0 - self.pan) * self.preamp
        }
    }

    /// Target pre-stage gain of the right channel (mirror of [`Self::left_gain`])
    pub fn right_gain(&self) -> f32 {
        if self.pan > CENTER {
            (1.0 + (self.pan - CENTER) * 0.2) * self.preamp
        } else {
            2.0 * self.pan * self.preamp
        }
    }

    /// Apply preamp × volume without smoothing or pan
    pub fn process_mono_flat(&self, mono: &mut [Sample]) {
        dsp::scale(mono, self.preamp * self.gain);
    }

    /// Ramp only the pre stage (preamp and pan) on a stereo pair
    pub fn preamp_stage(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let (target_left, target_right) = (self.left_gain(), self.right_gain());
        dsp::ramp(left, self.pre_left, target_left);
        dsp::ramp(right, self.pre_right, target_right);
        self.pre_left = target_left;
        self.pre_right = target_right;
    }

    /// Ramp only the post stage (volume) on a stereo pair
    pub fn post_stage(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let target = self.gain;
        dsp::ramp(left, self.post, target);
        dsp::ramp(right, self.post, target);
        self.post = target;
    }

    fn process_mono(&mut self, mono: &mut [Sample]) {
        let target_pre = self.left_gain();
        let target_post = self.gain;
        let n = mono.len();
        if n == 0 {
            return;
        }

        let step_pre = (target_pre - self.pre_left) / n as f32;
        let step_post = (target_post - self.post) / n as f32;
        let (mut pre, mut post) = (self.pre_left, self.post);
        for s in mono.iter_mut() {
            *s *= pre * post;
            pre += step_pre;
            post += step_post;
        }

        self.pre_left = target_pre;
        self.pre_right = target_pre;
        self.post = target_post;
    }

    fn process_stereo(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let target_left = self.left_gain();
        let target_right = self.right_gain();
        let target_post = self.gain;
        let n = left.len().min(right.len());
        if n == 0 {
            return;
        }

        let frames = n as f32;
        let step_left = (target_left - self.pre_left) / frames;
        let step_right = (target_right - self.pre_right) / frames;
        let step_post = (target_post - self.post) / frames;

        let (mut pre_l, mut pre_r, mut post) = (self.pre_left, self.pre_right, self.post);
        for (l, r) in left[..n].iter_mut().zip(right[..n].iter_mut()) {
            *l *= pre_l * post;
            *r *= pre_r * post;
            pre_l += step_left;
            pre_r += step_right;
            post += step_post;
        }

        self.pre_left = target_left;
        self.pre_right = target_right;
        self.post = target_post;
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Gain {
    fn info(&self) -> &EffectInfo {
        &self.info
    }

    fn set(&mut self, index: usize, value: i32) -> EffectResult<()> {
        match index {
            VOLUME => self.set_gain(value as f32 * 0.01),
            PAN => self.set_pan(value as f32 * 0.01),
            _ => return Err(EffectError::UnknownParam(index)),
        }
        Ok(())
    }

    fn get(&self, index: usize) -> EffectResult<i32> {
        match index {
            VOLUME => Ok((self.gain * 100.0).round() as i32),
            PAN => Ok((self.pan * 100.0).round() as i32),
            _ => Err(EffectError::UnknownParam(index)),
        }
    }

    fn process(&mut self, left: &mut [Sample], right: Option<&mut [Sample]>) {
        match right {
            Some(right) => self.process_stereo(left, right),
            None => self.process_mono(left),
        }
    }

    fn reset(&mut self) {
        self.gain = DEFAULT_GAIN;
        self.pan = CENTER;
        self.preamp = 1.0;
        self.pre_left = 1.0;
        self.pre_right = 1.0;
        self.post = 1.0;
    }
}
