use std::collections::HashMap;

use tracing::warn;

use super::{NoteTrigger, VoiceId, VoiceParams};
use crate::synth::instrument::NoteVoice;
use crate::synth::util::{equal_power_pan, flush_denorm, phase_step, wrap_phase};

/// Instructions from the control side to the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixerCommand {
    StartVoice { id: VoiceId, params: VoiceParams },
    StopVoice { id: VoiceId },
    StopAll,
    Note(NoteTrigger),
}

/// Continuous sine voice with a declick ramp on start and stop.
#[derive(Debug, Clone)]
struct SineVoice {
    phase: f32,
    step: f32,
    gain_l: f32,
    gain_r: f32,
    level: f32,
    target: f32,
}

impl SineVoice {
    fn new(params: VoiceParams, fs: f32) -> Self {
        let (l, r) = equal_power_pan(params.pan);
        let gain = if params.gain.is_finite() { params.gain.max(0.0) } else { 0.0 };
        Self {
            phase: 0.0,
            step: phase_step(params.freq_hz, fs),
            gain_l: l * gain,
            gain_r: r * gain,
            level: 0.0,
            target: 1.0,
        }
    }

    fn is_silent(&self) -> bool {
        self.target == 0.0 && self.level <= 0.0
    }
}

/// Sums body voices and melody notes into stereo interleaved blocks.
pub struct Mixer {
    fs: f32,
    ramp_step: f32,
    voices: HashMap<VoiceId, SineVoice>,
    notes: Vec<NoteVoice>,
}

impl Mixer {
    pub fn new(fs: f32, declick_ms: f32) -> Self {
        let ramp_samples = (declick_ms.max(0.0) * 0.001 * fs).max(1.0);
        Self {
            fs,
            ramp_step: 1.0 / ramp_samples,
            voices: HashMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.fs
    }

    pub fn apply(&mut self, cmd: MixerCommand) {
        match cmd {
            MixerCommand::StartVoice { id, params } => {
                self.voices.insert(id, SineVoice::new(params, self.fs));
            }
            MixerCommand::StopVoice { id } => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.target = 0.0;
                }
            }
            MixerCommand::StopAll => {
                for v in self.voices.values_mut() {
                    v.target = 0.0;
                }
                self.notes.clear();
            }
            MixerCommand::Note(n) => {
                match NoteVoice::new(
                    self.fs,
                    n.instrument,
                    n.freq_hz,
                    n.duration_sec,
                    n.pan,
                    n.velocity,
                ) {
                    Ok(note) => self.notes.push(note),
                    Err(err) => warn!("dropping note {n:?}: {err:?}"),
                }
            }
        }
    }

    /// Voices that are sounding or still fading out.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Voices that have not been asked to stop.
    pub fn held_voice_count(&self) -> usize {
        self.voices.values().filter(|v| v.target > 0.0).count()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Overwrite `out` (stereo interleaved) with the next block.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let ramp = self.ramp_step;
        for v in self.voices.values_mut() {
            for frame in out.chunks_exact_mut(2) {
                if v.level < v.target {
                    v.level = (v.level + ramp).min(v.target);
                } else if v.level > v.target {
                    v.level = (v.level - ramp).max(v.target);
                }
                let s = flush_denorm(v.phase.sin() * v.level);
                frame[0] += s * v.gain_l;
                frame[1] += s * v.gain_r;
                v.phase = wrap_phase(v.phase + v.step);
            }
        }
        self.voices.retain(|_, v| !v.is_silent());
        self.notes.retain_mut(|n| n.render_add(out));
    }
}
