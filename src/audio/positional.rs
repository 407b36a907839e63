//! Body positions → continuous voices.
//!
//! Every tick the whole voice set is replaced: each previous voice is stopped
//! and one new voice per body is started from that tick's [`AudioFrame`].

use std::sync::Arc;

use tracing::trace;

use super::{VoiceId, VoiceParams, VoiceSink};
use crate::sim::snapshot::{BodyState, Snapshot};

/// |x| at which a body is hard left/right.
pub const PAN_RANGE: f64 = 400.0;
/// Gain of a body sitting on the origin.
pub const GAIN_AT_ORIGIN: f64 = 0.5;
/// Distance at which the gain has halved.
pub const GAIN_DISTANCE_SCALE: f64 = 200.0;
/// Distant bodies stay faintly audible.
pub const GAIN_FLOOR: f64 = 0.1;

pub fn pan_for_x(x: f64) -> f32 {
    if x.is_nan() {
        return 0.0;
    }
    (x / PAN_RANGE).clamp(-1.0, 1.0) as f32
}

pub fn gain_for_distance(distance: f64) -> f32 {
    let d = if distance.is_nan() { f64::INFINITY } else { distance.abs() };
    (GAIN_AT_ORIGIN / (1.0 + d / GAIN_DISTANCE_SCALE)).max(GAIN_FLOOR) as f32
}

pub fn voice_for_body(body: &BodyState) -> VoiceParams {
    VoiceParams {
        freq_hz: body.tone as f32,
        pan: pan_for_x(body.x),
        gain: gain_for_distance(body.distance_from_origin()),
    }
}

/// Voice parameters of every body for one tick, in snapshot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioFrame {
    pub voices: Vec<VoiceParams>,
}

impl AudioFrame {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            voices: snapshot.iter().map(voice_for_body).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

pub struct PositionalAudioEngine {
    sink: Arc<dyn VoiceSink>,
    active: Vec<VoiceId>,
    frame: AudioFrame,
}

impl PositionalAudioEngine {
    pub fn new(sink: Arc<dyn VoiceSink>) -> Self {
        Self {
            sink,
            active: Vec::new(),
            frame: AudioFrame::default(),
        }
    }

    /// Replace every sounding voice with one voice per body of `snapshot`.
    pub fn resynthesize(&mut self, snapshot: &Snapshot) -> &AudioFrame {
        self.stop_all();
        self.frame = AudioFrame::from_snapshot(snapshot);
        for params in &self.frame.voices {
            self.active.push(self.sink.start_voice(*params));
        }
        trace!(voices = self.active.len(), "resynthesized");
        &self.frame
    }

    pub fn stop_all(&mut self) {
        for id in self.active.drain(..) {
            self.sink.stop_voice(id);
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.active.len()
    }

    pub fn frame(&self) -> &AudioFrame {
        &self.frame
    }
}

impl Drop for PositionalAudioEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}
