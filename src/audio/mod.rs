//! Audio side: voice/note sinks, the mixer and its render thread, the device.

pub mod engine;
pub mod mixer;
pub mod output;
pub mod output_guard;
pub mod positional;
pub mod writer;

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::melody::{Instrument, NoteEvent, midi_to_hz};

pub type VoiceId = u64;

/// Parameters of one continuous body voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub freq_hz: f32,
    /// -1 (left) ..= 1 (right).
    pub pan: f32,
    pub gain: f32,
}

/// A fixed-length note on one of the melody instruments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteTrigger {
    pub instrument: Instrument,
    pub freq_hz: f32,
    pub duration_sec: f32,
    pub pan: f32,
    pub velocity: f32,
}

impl NoteTrigger {
    pub fn from_event(event: &NoteEvent, duration_sec: f32) -> Self {
        Self {
            instrument: event.instrument,
            freq_hz: midi_to_hz(event.note),
            duration_sec,
            pan: event.pan,
            velocity: 0.5,
        }
    }
}

/// Destination of continuous per-body voices.
pub trait VoiceSink: Send + Sync {
    fn start_voice(&self, params: VoiceParams) -> VoiceId;
    fn stop_voice(&self, id: VoiceId);
}

/// Destination of one-shot melody notes.
pub trait NoteSink: Send + Sync {
    fn trigger(&self, note: NoteTrigger);
}

/// Sink used when no output device could be opened: visualization only.
#[derive(Debug, Default)]
pub struct NullSink {
    next_id: AtomicU64,
}

impl VoiceSink for NullSink {
    fn start_voice(&self, _params: VoiceParams) -> VoiceId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn stop_voice(&self, _id: VoiceId) {}
}

impl NoteSink for NullSink {
    fn trigger(&self, _note: NoteTrigger) {}
}

/// What a recording sink observed, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Start(VoiceId, VoiceParams),
    Stop(VoiceId),
    Note(NoteTrigger),
}

/// In-memory sink that logs every call and tracks live voices.
#[derive(Debug, Default)]
pub struct RecordingSink {
    next_id: AtomicU64,
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, ev: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(ev);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn notes(&self) -> Vec<NoteTrigger> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Note(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Voices started and not yet stopped.
    pub fn active_voices(&self) -> Vec<(VoiceId, VoiceParams)> {
        let mut live: Vec<(VoiceId, VoiceParams)> = Vec::new();
        for ev in self.events() {
            match ev {
                SinkEvent::Start(id, p) => live.push((id, p)),
                SinkEvent::Stop(id) => live.retain(|(v, _)| *v != id),
                SinkEvent::Note(_) => {}
            }
        }
        live
    }
}

impl VoiceSink for RecordingSink {
    fn start_voice(&self, params: VoiceParams) -> VoiceId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.push(SinkEvent::Start(id, params));
        id
    }

    fn stop_voice(&self, id: VoiceId) {
        self.push(SinkEvent::Stop(id));
    }
}

impl NoteSink for RecordingSink {
    fn trigger(&self, note: NoteTrigger) {
        self.push(SinkEvent::Note(note));
    }
}
