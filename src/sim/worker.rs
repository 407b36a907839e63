use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, never, select};
use tracing::{debug, warn};

use super::body::{BodyForm, collect_bodies};
use super::controller::{LoopSettings, LoopState, SimFrame, SimulationLoop};
use super::fetcher::SnapshotFetcher;
use crate::audio::VoiceSink;
use crate::audio::positional::PositionalAudioEngine;
use crate::config::AppConfig;
use crate::error::{ControlError, FetchError, StartError, ValidationError};
use crate::remote::Integrator;
use crate::render::Renderer;
use crate::sim::body::Body;

/// How long the loop thread sleeps when no tick is armed.
const IDLE_WAIT: Duration = Duration::from_millis(250);
/// The UI only ever wants the newest frames.
const FRAME_QUEUE: usize = 8;

enum Control {
    Start {
        bodies: Vec<Body>,
        reply: Sender<Result<(), StartError>>,
    },
    Stop {
        ack: Sender<()>,
    },
    SetSpeed {
        speed: f64,
        reply: Sender<Result<(), ValidationError>>,
    },
    Shutdown,
}

/// Reply channel for a queued start.
pub type PendingStart = Receiver<Result<(), StartError>>;

/// Handle to the `sim-loop` thread.
pub struct SimulationController {
    tx: Sender<Control>,
    frames: Receiver<SimFrame>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulationController {
    pub fn spawn(
        integrator: Box<dyn Integrator>,
        voices: Arc<dyn VoiceSink>,
        cfg: &AppConfig,
    ) -> std::io::Result<Self> {
        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE);
        Self::spawn_with_frames(integrator, voices, cfg, frame_tx, frame_rx)
    }

    /// Like [`spawn`](Self::spawn) with a caller-supplied frame channel.
    pub fn spawn_with_frames(
        integrator: Box<dyn Integrator>,
        voices: Arc<dyn VoiceSink>,
        cfg: &AppConfig,
        frame_tx: Sender<SimFrame>,
        frame_rx: Receiver<SimFrame>,
    ) -> std::io::Result<Self> {
        let fetcher = SnapshotFetcher::spawn(integrator)?;
        let sim = SimulationLoop::new(
            LoopSettings::from_config(&cfg.simulation),
            fetcher,
            Renderer::from_config(&cfg.canvas),
            PositionalAudioEngine::new(voices),
            frame_tx,
        );
        let (tx, rx) = bounded(16);
        let running = Arc::new(AtomicBool::new(false));
        let running_loop = running.clone();
        let thread = thread::Builder::new()
            .name("sim-loop".into())
            .spawn(move || control_loop(sim, rx, running_loop))?;
        Ok(Self {
            tx,
            frames: frame_rx,
            running,
            thread: Some(thread),
        })
    }

    /// Validate the form and start a run, waiting for the initial fetch.
    pub fn start(&self, forms: &[BodyForm]) -> Result<(), StartError> {
        let bodies = collect_bodies(forms)?;
        self.start_bodies(bodies)
    }

    pub fn start_bodies(&self, bodies: Vec<Body>) -> Result<(), StartError> {
        let pending = self.request_start_bodies(bodies)?;
        pending.recv().map_err(|_| FetchError::Disconnected)?
    }

    /// Validate the form and queue a start without waiting for the initial
    /// fetch. The outcome arrives on the returned channel; a disconnect means
    /// the simulation thread is gone.
    pub fn request_start(&self, forms: &[BodyForm]) -> Result<PendingStart, StartError> {
        let bodies = collect_bodies(forms)?;
        self.request_start_bodies(bodies)
    }

    fn request_start_bodies(&self, bodies: Vec<Body>) -> Result<PendingStart, StartError> {
        let (reply, reply_rx) = bounded(1);
        self.tx
            .send(Control::Start { bodies, reply })
            .map_err(|_| FetchError::Disconnected)?;
        Ok(reply_rx)
    }

    /// Returns once the timer is cancelled and every voice is released.
    pub fn stop(&self) {
        let (ack, ack_rx) = bounded(1);
        if self.tx.send(Control::Stop { ack }).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Queue a stop without waiting for it. Commands are handled in order, so
    /// a start queued earlier is torn down too.
    pub fn request_stop(&self) {
        let (ack, _) = bounded(1);
        if self.tx.send(Control::Stop { ack }).is_err() {
            debug!("stop requested after sim-loop exit");
        }
    }

    pub fn set_speed(&self, speed: f64) -> Result<(), ControlError> {
        let (reply, reply_rx) = bounded(1);
        self.tx
            .send(Control::SetSpeed { speed, reply })
            .map_err(|_| ControlError::Disconnected)?;
        let result = reply_rx.recv().map_err(|_| ControlError::Disconnected)?;
        Ok(result?)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn frames(&self) -> &Receiver<SimFrame> {
        &self.frames
    }

    pub fn shutdown(&mut self) {
        let _ = self.tx.send(Control::Shutdown);
        if let Some(h) = self.thread.take() {
            if h.join().is_err() {
                warn!("sim-loop thread panicked");
            }
        }
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn control_loop(mut sim: SimulationLoop, rx: Receiver<Control>, running: Arc<AtomicBool>) {
    let mut responses = sim.responses();
    loop {
        let wait = sim
            .next_deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT);
        select! {
            recv(rx) -> msg => match msg {
                Ok(Control::Start { bodies, reply }) => {
                    let result = sim.start(&bodies, Instant::now());
                    if let Err(e) = &result {
                        warn!("start failed: {e}");
                    }
                    running.store(sim.state() == LoopState::Running, Ordering::Release);
                    let _ = reply.send(result);
                }
                Ok(Control::Stop { ack }) => {
                    sim.stop();
                    running.store(false, Ordering::Release);
                    let _ = ack.send(());
                }
                Ok(Control::SetSpeed { speed, reply }) => {
                    let _ = reply.send(sim.set_speed(speed, Instant::now()));
                }
                Ok(Control::Shutdown) | Err(_) => break,
            },
            recv(responses) -> resp => match resp {
                Ok(resp) => sim.on_fetch(resp),
                Err(_) => {
                    warn!("fetch thread disconnected");
                    responses = never();
                }
            },
            default(wait) => sim.on_timer(Instant::now()),
        }
        running.store(sim.state() == LoopState::Running, Ordering::Release);
    }
    sim.stop();
    running.store(false, Ordering::Release);
    debug!("sim-loop thread exiting");
}
