//! Image-sonification melodies: events, their schedule, and the playback thread.

pub mod player;
pub mod timeline;

use serde::{Deserialize, Serialize};

/// Synthesizer voice a note is played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Piano,
    Strings,
    Flute,
    Brass,
}

impl Instrument {
    pub const ALL: [Instrument; 4] = [
        Instrument::Piano,
        Instrument::Strings,
        Instrument::Flute,
        Instrument::Brass,
    ];
}

/// One note of a precomputed melody.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Seconds from melody start.
    pub time_offset: f64,
    /// MIDI note number.
    pub note: u8,
    pub instrument: Instrument,
    pub pan: f32,
}

pub fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}
