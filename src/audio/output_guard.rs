use std::env;

use crate::config::OutputGuardSetting;

const CEILING: f32 = 0.98;
const SOFT_DRIVE: f32 = 1.5;
const LIMITER_ATTACK_MS: f32 = 0.5;
const LIMITER_RELEASE_MS: f32 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputGuardMode {
    None,
    SoftClip { ceiling: f32, drive: f32 },
    PeakLimiter { ceiling: f32, attack_ms: f32, release_ms: f32 },
}

impl OutputGuardMode {
    pub fn from_setting(setting: &OutputGuardSetting) -> Self {
        match setting {
            OutputGuardSetting::None => Self::None,
            OutputGuardSetting::SoftClip => Self::SoftClip {
                ceiling: CEILING,
                drive: SOFT_DRIVE,
            },
            OutputGuardSetting::PeakLimiter => Self::PeakLimiter {
                ceiling: CEILING,
                attack_ms: LIMITER_ATTACK_MS,
                release_ms: LIMITER_RELEASE_MS,
            },
        }
    }

    /// `COSMOPHONE_OUTPUT_GUARD` (none / soft / limiter) overrides the config file.
    pub fn from_env_or(setting: &OutputGuardSetting) -> Self {
        let fallback = Self::from_setting(setting);
        let Ok(value) = env::var("COSMOPHONE_OUTPUT_GUARD") else {
            return fallback;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "0" => Self::from_setting(&OutputGuardSetting::None),
            "soft" | "softclip" | "soft_clip" | "soft-clip" => {
                Self::from_setting(&OutputGuardSetting::SoftClip)
            }
            "limiter" | "peak" | "peak_limiter" | "peak-limiter" => {
                Self::from_setting(&OutputGuardSetting::PeakLimiter)
            }
            _ => fallback,
        }
    }
}

/// Per-block peak statistics, reset on every `process_interleaved` call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OutputGuardStats {
    pub max_abs_in: f32,
    pub max_abs_out: f32,
    pub num_over: u64,
}

/// Keeps the mixed signal under the ceiling before it reaches the device or the WAV file.
/// The limiter gain is linked across channels so the stereo image does not shift.
#[derive(Debug)]
pub struct OutputGuard {
    mode: OutputGuardMode,
    channels: usize,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
    stats: OutputGuardStats,
}

impl OutputGuard {
    pub fn new(mode: OutputGuardMode, sample_rate: u32, channels: usize) -> Self {
        let fs = (sample_rate as f32).max(1.0);
        let (attack_coeff, release_coeff) = match mode {
            OutputGuardMode::PeakLimiter {
                attack_ms,
                release_ms,
                ..
            } => (time_to_coeff(attack_ms, fs), time_to_coeff(release_ms, fs)),
            _ => (0.0, 0.0),
        };
        Self {
            mode,
            channels: channels.max(1),
            gain: 1.0,
            attack_coeff,
            release_coeff,
            stats: OutputGuardStats::default(),
        }
    }

    pub fn mode(&self) -> OutputGuardMode {
        self.mode
    }

    pub fn stats(&self) -> OutputGuardStats {
        self.stats
    }

    pub fn process_interleaved(&mut self, frames: &mut [f32]) {
        self.stats = OutputGuardStats::default();
        match self.mode {
            OutputGuardMode::None => {
                for s in frames.iter_mut() {
                    if !s.is_finite() {
                        *s = 0.0;
                    }
                    self.stats.max_abs_in = self.stats.max_abs_in.max(s.abs());
                }
                self.stats.max_abs_out = self.stats.max_abs_in;
            }
            OutputGuardMode::SoftClip { ceiling, drive } => {
                let ceiling = ceiling.abs().max(1e-6);
                let drive = drive.max(1e-3);
                for s in frames.iter_mut() {
                    let x = if s.is_finite() { *s } else { 0.0 };
                    self.observe_in(x.abs(), ceiling);
                    // tanh(drive·x)/drive keeps unity slope near zero.
                    let y = ((x * drive / ceiling).tanh() / drive * ceiling).clamp(-ceiling, ceiling);
                    self.stats.max_abs_out = self.stats.max_abs_out.max(y.abs());
                    *s = y;
                }
            }
            OutputGuardMode::PeakLimiter { ceiling, .. } => {
                let ceiling = ceiling.abs().max(1e-6);
                for frame in frames.chunks_mut(self.channels) {
                    let mut peak = 0.0f32;
                    for s in frame.iter_mut() {
                        if !s.is_finite() {
                            *s = 0.0;
                        }
                        peak = peak.max(s.abs());
                    }
                    let target = if peak > ceiling { ceiling / peak } else { 1.0 };
                    let coeff = if target < self.gain {
                        self.attack_coeff
                    } else {
                        self.release_coeff
                    };
                    self.gain = coeff * self.gain + (1.0 - coeff) * target;
                    for s in frame.iter_mut() {
                        self.observe_in(s.abs(), ceiling);
                        let y = (*s * self.gain).clamp(-ceiling, ceiling);
                        self.stats.max_abs_out = self.stats.max_abs_out.max(y.abs());
                        *s = y;
                    }
                }
            }
        }
    }

    fn observe_in(&mut self, abs_in: f32, ceiling: f32) {
        self.stats.max_abs_in = self.stats.max_abs_in.max(abs_in);
        if abs_in > ceiling {
            self.stats.num_over += 1;
        }
    }
}

fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_s = time_ms.max(0.0) * 0.001;
    if time_s <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_s * sample_rate)).exp()
    }
}
