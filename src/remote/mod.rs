//! Contracts of the two backend services the client depends on.

pub mod http;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::melody::{Instrument, NoteEvent};
use crate::sim::body::Body;
use crate::sim::snapshot::Snapshot;

/// The remote N-body integrator.
pub trait Integrator: Send {
    /// Submit the bodies of a new run and return their initial positions.
    fn start(&mut self, bodies: &[Body]) -> Result<Snapshot, FetchError>;
    /// Advance the running simulation by `dt` time units.
    fn step(&mut self, dt: f64) -> Result<Snapshot, FetchError>;
}

/// The image-to-melody analysis service.
pub trait SonificationService: Send + Sync {
    fn sonify(&self, image_id: &str) -> Result<SonifyResponse, FetchError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StartRequest<'a> {
    pub bodies: &'a [Body],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundDatum {
    pub note: f64,
    #[serde(default)]
    pub pan: f32,
    pub instrument: Instrument,
    /// Seconds from melody start; the service usually leaves it out.
    #[serde(default)]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SonifyResponse {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sound_data: Vec<SoundDatum>,
}

impl SonifyResponse {
    /// Turn the service payload into playable events. Data without a time
    /// is laid out at `index * spacing`.
    pub fn events(&self, spacing: f64) -> Vec<NoteEvent> {
        self.sound_data
            .iter()
            .enumerate()
            .map(|(i, d)| NoteEvent {
                time_offset: d.time.filter(|t| t.is_finite() && *t >= 0.0).unwrap_or(i as f64 * spacing),
                note: d.note.round().clamp(0.0, 127.0) as u8,
                instrument: d.instrument,
                pan: if d.pan.is_finite() { d.pan.clamp(-1.0, 1.0) } else { 0.0 },
            })
            .collect()
    }
}
