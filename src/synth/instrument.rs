//! One-shot note voices for the melody instruments.
//!
//! piano: two-operator FM, modulator at 3x with a decaying index.
//! strings: amplitude modulation at 3x.
//! flute: plain sine.
//! brass: six inharmonic partials with a long decay ("metal").

use std::f32::consts::TAU;

use super::SynthError;
use super::util::{equal_power_pan, flush_denorm, phase_step, wrap_phase};
use crate::melody::Instrument;

const FM_HARMONICITY: f32 = 3.0;
const FM_INDEX: f32 = 10.0;
const AM_HARMONICITY: f32 = 3.0;
const METAL_RATIOS: [f32; 6] = [1.0, 1.483, 1.932, 2.546, 2.630, 3.897];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Adsr {
    pub fn for_instrument(instrument: Instrument) -> Self {
        match instrument {
            Instrument::Piano => Self {
                attack: 0.01,
                decay: 0.01,
                sustain: 1.0,
                release: 0.5,
            },
            Instrument::Strings => Self {
                attack: 0.01,
                decay: 0.01,
                sustain: 1.0,
                release: 0.5,
            },
            Instrument::Flute => Self {
                attack: 0.005,
                decay: 0.1,
                sustain: 0.3,
                release: 1.0,
            },
            Instrument::Brass => Self {
                attack: 0.001,
                decay: 1.4,
                sustain: 0.0,
                release: 0.2,
            },
        }
    }

    fn held_level(&self, t: f32) -> f32 {
        if t < self.attack {
            return t / self.attack.max(1e-6);
        }
        let td = t - self.attack;
        if td < self.decay {
            return 1.0 - (1.0 - self.sustain) * td / self.decay.max(1e-6);
        }
        self.sustain
    }

    /// Envelope level at `t` seconds for a note released at `off`.
    pub fn level(&self, t: f32, off: f32) -> f32 {
        if t < off {
            return self.held_level(t);
        }
        let from = self.held_level(off);
        let tr = t - off;
        if tr >= self.release {
            0.0
        } else {
            from * (1.0 - tr / self.release.max(1e-6))
        }
    }
}

/// A single sounding note. Renders additively into a stereo interleaved buffer.
#[derive(Debug, Clone)]
pub struct NoteVoice {
    instrument: Instrument,
    env: Adsr,
    gain_l: f32,
    gain_r: f32,
    dt: f32,
    t: f32,
    off: f32,
    carrier_step: f32,
    mod_step: f32,
    carrier: f32,
    modulator: f32,
    partial_steps: [f32; 6],
    partials: [f32; 6],
}

impl NoteVoice {
    pub fn new(
        fs: f32,
        instrument: Instrument,
        freq_hz: f32,
        duration_sec: f32,
        pan: f32,
        velocity: f32,
    ) -> Result<Self, SynthError> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(SynthError::InvalidSampleRate);
        }
        if !freq_hz.is_finite() || freq_hz <= 0.0 {
            return Err(SynthError::InvalidFrequency);
        }
        let (l, r) = equal_power_pan(pan);
        let vel = velocity.clamp(0.0, 1.0);
        let harmonicity = match instrument {
            Instrument::Piano => FM_HARMONICITY,
            Instrument::Strings => AM_HARMONICITY,
            _ => 1.0,
        };
        let mut partial_steps = [0.0; 6];
        for (step, ratio) in partial_steps.iter_mut().zip(METAL_RATIOS) {
            *step = phase_step(freq_hz * ratio, fs);
        }
        Ok(Self {
            instrument,
            env: Adsr::for_instrument(instrument),
            gain_l: l * vel,
            gain_r: r * vel,
            dt: 1.0 / fs,
            t: 0.0,
            off: duration_sec.max(0.0),
            carrier_step: phase_step(freq_hz, fs),
            mod_step: phase_step(freq_hz * harmonicity, fs),
            carrier: 0.0,
            modulator: 0.0,
            partial_steps,
            partials: [0.0; 6],
        })
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn is_finished(&self) -> bool {
        self.t >= self.off + self.env.release
    }

    fn next_sample(&mut self) -> f32 {
        let s = match self.instrument {
            Instrument::Piano => {
                let index = FM_INDEX * (-self.t * 6.0).exp();
                (self.carrier + index * self.modulator.sin()).sin()
            }
            Instrument::Strings => self.carrier.sin() * (0.5 + 0.5 * self.modulator.sin()),
            Instrument::Flute => self.carrier.sin(),
            Instrument::Brass => {
                let sum: f32 = self.partials.iter().map(|p| p.sin()).sum();
                sum / METAL_RATIOS.len() as f32
            }
        };
        self.carrier = wrap_phase(self.carrier + self.carrier_step);
        self.modulator = wrap_phase(self.modulator + self.mod_step);
        if self.instrument == Instrument::Brass {
            for (p, step) in self.partials.iter_mut().zip(self.partial_steps) {
                *p = (*p + step) % TAU;
            }
        }
        s
    }

    /// Add this note to `out` (stereo interleaved). Returns false once silent.
    pub fn render_add(&mut self, out: &mut [f32]) -> bool {
        for frame in out.chunks_exact_mut(2) {
            if self.is_finished() {
                return false;
            }
            let level = self.env.level(self.t, self.off);
            let s = flush_denorm(self.next_sample() * level);
            frame[0] += s * self.gain_l;
            frame[1] += s * self.gain_r;
            self.t += self.dt;
        }
        !self.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let env = Adsr::for_instrument(Instrument::Piano);
        assert_eq!(env.level(0.0, 0.25), 0.0);
        assert!((env.level(0.1, 0.25) - 1.0).abs() < 1e-6);
        assert!((env.level(0.5, 0.25) - 0.5).abs() < 1e-3);
        assert_eq!(env.level(0.8, 0.25), 0.0);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            NoteVoice::new(0.0, Instrument::Flute, 440.0, 0.25, 0.0, 0.5).err(),
            Some(SynthError::InvalidSampleRate)
        );
        assert_eq!(
            NoteVoice::new(48_000.0, Instrument::Flute, -1.0, 0.25, 0.0, 0.5).err(),
            Some(SynthError::InvalidFrequency)
        );
    }

    #[test]
    fn every_instrument_sounds_then_ends() {
        let fs = 8_000.0;
        for instrument in Instrument::ALL {
            let mut note = NoteVoice::new(fs, instrument, 440.0, 0.25, 0.0, 0.5).unwrap();
            let mut buf = vec![0.0f32; 2 * 8_000];
            let alive = note.render_add(&mut buf);
            let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak > 0.01, "{instrument:?} is silent");
            assert!(peak <= 1.0, "{instrument:?} peak {peak}");
            assert!(buf.iter().all(|s| s.is_finite()));
            // Longest tail is 0.25 s hold + 1.0 s release.
            if alive {
                let mut rest = vec![0.0f32; 2 * 16_000];
                assert!(!note.render_add(&mut rest));
            }
            assert!(note.is_finished());
        }
    }

    #[test]
    fn hard_left_note_stays_left() {
        let mut note = NoteVoice::new(8_000.0, Instrument::Flute, 440.0, 0.1, -1.0, 1.0).unwrap();
        let mut buf = vec![0.0f32; 2 * 400];
        note.render_add(&mut buf);
        let right: f32 = buf.iter().skip(1).step_by(2).map(|s| s.abs()).sum();
        let left: f32 = buf.iter().step_by(2).map(|s| s.abs()).sum();
        assert!(left > 1.0);
        assert!(right < 1e-3);
    }
}
