//! Threaded melody playback.
//!
//! Each `play` spawns one `melody` thread that walks a [`MelodyTimeline`]
//! against the wall clock. The previous playback is cancelled and joined first,
//! so at most one timeline is ever live.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::NoteEvent;
use super::timeline::{MelodyTimeline, TimelineAction};
use crate::audio::{NoteSink, NoteTrigger};
use crate::clock::timer::{CancelHandle, CancelToken, cancel_pair};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Finished,
    Cancelled,
}

impl PlaybackState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Playing,
            2 => Self::Finished,
            3 => Self::Cancelled,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Playing => 1,
            Self::Finished => 2,
            Self::Cancelled => 3,
        }
    }
}

/// Progress and state readable from the UI without locking.
#[derive(Debug)]
struct Shared {
    progress_bits: AtomicU32,
    state: AtomicU8,
}

impl Shared {
    fn set_progress(&self, pct: f32) {
        self.progress_bits
            .store(pct.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

struct Playback {
    cancel: CancelHandle,
    handle: JoinHandle<()>,
}

pub struct MelodyPlayer {
    sink: Arc<dyn NoteSink>,
    note_duration: f32,
    spacing: f64,
    shared: Arc<Shared>,
    current: Mutex<Option<Playback>>,
}

impl MelodyPlayer {
    pub fn new(sink: Arc<dyn NoteSink>, spacing: f64, note_duration: f32) -> Self {
        Self {
            sink,
            note_duration,
            spacing,
            shared: Arc::new(Shared {
                progress_bits: AtomicU32::new(0.0f32.to_bits()),
                state: AtomicU8::new(PlaybackState::Idle.as_u8()),
            }),
            current: Mutex::new(None),
        }
    }

    /// Replace any running melody with `events`.
    pub fn play(&self, events: &[NoteEvent]) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = current.take() {
            Self::cancel_and_join(prev);
        }
        self.shared.set_progress(0.0);

        let timeline = MelodyTimeline::new(events, self.spacing);
        info!(
            "melody: {} notes over {:.2}s",
            timeline.note_count(),
            timeline.total_duration().as_secs_f64()
        );
        let (cancel, token) = cancel_pair();
        let sink = self.sink.clone();
        let shared = self.shared.clone();
        let duration = self.note_duration;
        shared.set_state(PlaybackState::Playing);
        let spawned = thread::Builder::new()
            .name("melody".into())
            .spawn(move || run_timeline(timeline, sink, shared, token, duration));
        match spawned {
            Ok(handle) => *current = Some(Playback { cancel, handle }),
            Err(e) => {
                warn!("could not spawn melody thread: {e}");
                self.shared.set_state(PlaybackState::Idle);
            }
        }
    }

    /// Cancel the running melody, if any, and wait for its thread.
    pub fn stop(&self) {
        let prev = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(prev) = prev {
            Self::cancel_and_join(prev);
        }
    }

    /// Wait for the running melody to end on its own.
    pub fn join(&self) {
        let prev = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(prev) = prev {
            let _ = prev.handle.join();
        }
    }

    /// Percent complete, 0 ..= 100.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress_bits.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    fn cancel_and_join(mut prev: Playback) {
        prev.cancel.cancel();
        if prev.handle.join().is_err() {
            warn!("melody thread panicked");
        }
    }
}

impl Drop for MelodyPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_timeline(
    mut timeline: MelodyTimeline,
    sink: Arc<dyn NoteSink>,
    shared: Arc<Shared>,
    token: CancelToken,
    note_duration: f32,
) {
    let start = Instant::now();
    while let Some(at) = timeline.next_at() {
        let cancelled = match start.checked_add(at) {
            Some(deadline) => token.sleep_until(deadline),
            None => token.sleep(at),
        };
        if cancelled {
            debug!("melody cancelled");
            shared.set_state(PlaybackState::Cancelled);
            return;
        }
        for action in timeline.due(at.max(start.elapsed())) {
            match action {
                TimelineAction::Note {
                    event, progress, ..
                } => {
                    sink.trigger(NoteTrigger::from_event(&event, note_duration));
                    shared.set_progress(progress);
                }
                TimelineAction::Finish => {
                    shared.set_progress(100.0);
                    shared.set_state(PlaybackState::Finished);
                }
            }
        }
    }
    debug_assert!(timeline.is_done());
}
