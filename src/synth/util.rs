//! Small DSP helpers (denorm flush, panning, phase stepping).

use std::f32::consts::{FRAC_PI_2, TAU};

const DENORM_THRESH: f32 = 1.0e-20;

/// Flush denormals and non-finite values to zero.
#[inline(always)]
pub fn flush_denorm(x: f32) -> f32 {
    if !x.is_finite() || x.abs() < DENORM_THRESH {
        0.0
    } else {
        x
    }
}

/// Equal-power stereo gains for `pan` in -1 ..= 1.
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let p = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
    let theta = (p + 1.0) * 0.5 * FRAC_PI_2;
    (theta.cos(), theta.sin())
}

/// Phase increment (radians per sample) of `freq_hz` at `fs`.
#[inline]
pub fn phase_step(freq_hz: f32, fs: f32) -> f32 {
    if !freq_hz.is_finite() || freq_hz <= 0.0 || fs <= 0.0 {
        return 0.0;
    }
    TAU * freq_hz / fs
}

#[inline(always)]
pub fn wrap_phase(phase: f32) -> f32 {
    if phase >= TAU { phase - TAU } else { phase }
}
