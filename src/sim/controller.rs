use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, trace, warn};

use super::fetcher::{FetchResponse, SnapshotFetcher};
use crate::audio::positional::{AudioFrame, PositionalAudioEngine};
use crate::clock::timer::RepeatingTask;
use crate::config::SimulationConfig;
use crate::error::{FetchError, StartError, ValidationError};
use crate::render::{DisplayList, Renderer};
use crate::sim::body::Body;
use crate::sim::snapshot::Snapshot;
use crate::sim::trajectory::TrajectoryBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub base_step: f64,
    pub base_interval: Duration,
    pub trail_capacity: usize,
    pub start_timeout: Duration,
}

impl LoopSettings {
    pub fn from_config(cfg: &SimulationConfig) -> Self {
        let base_interval_ms = if cfg.base_interval_ms.is_finite() && cfg.base_interval_ms > 0.0 {
            cfg.base_interval_ms
        } else {
            100.0
        };
        Self {
            base_step: cfg.base_step,
            base_interval: Duration::from_micros((base_interval_ms * 1000.0).round() as u64),
            trail_capacity: cfg.trail_capacity,
            start_timeout: Duration::from_millis(cfg.start_timeout_ms.max(1)),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

/// One fully applied tick, published for the UI.
#[derive(Debug, Clone)]
pub struct SimFrame {
    pub seq: u64,
    pub display: DisplayList,
    pub audio: AudioFrame,
    pub snapshot: Snapshot,
    pub speed: f64,
}

/// The Idle/Running state machine. Not thread-aware itself: the owner feeds it
/// timer polls and fetch responses from one thread.
pub struct SimulationLoop {
    settings: LoopSettings,
    state: LoopState,
    speed: f64,
    interval: Duration,
    body_count: usize,
    fetcher: SnapshotFetcher,
    trajectories: TrajectoryBuffer,
    renderer: Renderer,
    audio: PositionalAudioEngine,
    timer: RepeatingTask,
    frames: Sender<SimFrame>,
    frame_seq: u64,
}

impl SimulationLoop {
    pub fn new(
        settings: LoopSettings,
        fetcher: SnapshotFetcher,
        renderer: Renderer,
        audio: PositionalAudioEngine,
        frames: Sender<SimFrame>,
    ) -> Self {
        let trajectories = TrajectoryBuffer::new(settings.trail_capacity);
        Self {
            interval: settings.base_interval,
            settings,
            state: LoopState::Idle,
            speed: 1.0,
            body_count: 0,
            fetcher,
            trajectories,
            renderer,
            audio,
            timer: RepeatingTask::new(),
            frames,
            frame_seq: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn dt(&self) -> f64 {
        self.settings.base_step * self.speed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.next_deadline()
    }

    pub fn responses(&self) -> Receiver<FetchResponse> {
        self.fetcher.responses()
    }

    pub fn trajectories(&self) -> &TrajectoryBuffer {
        &self.trajectories
    }

    /// Begin a new run. A running simulation is torn down first; on failure the
    /// loop is left Idle.
    pub fn start(&mut self, bodies: &[Body], now: Instant) -> Result<(), StartError> {
        if bodies.is_empty() {
            return Err(ValidationError::NoActiveBodies.into());
        }
        if self.state == LoopState::Running {
            info!("restarting simulation");
            self.stop();
        }
        self.trajectories.reset(bodies.len());
        self.body_count = bodies.len();

        let snapshot = self.fetcher.start(bodies, self.settings.start_timeout)?;
        if snapshot.len() != bodies.len() {
            return Err(FetchError::Shape {
                expected: bodies.len(),
                got: snapshot.len(),
            }
            .into());
        }

        // Initial frame: markers only, no voices until the first step.
        let mut display = DisplayList::new();
        self.renderer
            .render(&mut display, &snapshot, &self.trajectories);
        self.publish(display, AudioFrame::default(), snapshot);

        self.state = LoopState::Running;
        self.timer.arm(now, self.interval());
        info!(
            bodies = bodies.len(),
            speed = self.speed,
            "simulation running"
        );
        Ok(())
    }

    /// Fire the tick timer if due.
    pub fn on_timer(&mut self, now: Instant) {
        if self.state != LoopState::Running || !self.timer.poll(now) {
            return;
        }
        let dt = self.dt();
        if let Some(seq) = self.fetcher.request_step(dt) {
            trace!(seq, dt, "step requested");
        }
    }

    /// Apply one response: history, drawing and voices all see the same snapshot.
    pub fn on_fetch(&mut self, resp: FetchResponse) {
        if !self.fetcher.accept(&resp) {
            return;
        }
        if self.state != LoopState::Running {
            debug!(seq = resp.seq, "response after stop ignored");
            return;
        }
        let snapshot = match resp.result {
            Ok(s) if s.len() == self.body_count => s,
            Ok(s) => {
                warn!(
                    "{}; tick skipped",
                    FetchError::Shape {
                        expected: self.body_count,
                        got: s.len(),
                    }
                );
                return;
            }
            Err(e) => {
                warn!("step fetch failed: {e}; tick skipped");
                return;
            }
        };

        self.trajectories.append(&snapshot);
        let mut display = DisplayList::new();
        self.renderer
            .render(&mut display, &snapshot, &self.trajectories);
        let audio = self.audio.resynthesize(&snapshot).clone();
        self.publish(display, audio, snapshot);
    }

    pub fn set_speed(&mut self, speed: f64, now: Instant) -> Result<(), ValidationError> {
        if !speed.is_finite() || speed <= 0.0 || !(self.settings.base_step * speed).is_finite() {
            return Err(ValidationError::InvalidSpeed(speed));
        }
        let interval = Duration::try_from_secs_f64(self.settings.base_interval.as_secs_f64() / speed)
            .map_err(|_| ValidationError::InvalidSpeed(speed))?;
        self.speed = speed;
        self.interval = interval;
        if self.state == LoopState::Running {
            self.timer.arm(now, self.interval());
        }
        debug!(speed, interval_ms = self.interval().as_secs_f64() * 1e3, "speed changed");
        Ok(())
    }

    /// Cancel the timer, silence every voice, drop outstanding fetches and
    /// discard the trails.
    pub fn stop(&mut self) {
        self.timer.cancel();
        self.audio.stop_all();
        self.fetcher.invalidate();
        self.trajectories.clear();
        if self.state == LoopState::Running {
            info!("simulation stopped");
        }
        self.state = LoopState::Idle;
    }

    fn publish(&mut self, display: DisplayList, audio: AudioFrame, snapshot: Snapshot) {
        self.frame_seq += 1;
        let frame = SimFrame {
            seq: self.frame_seq,
            display,
            audio,
            snapshot,
            speed: self.speed,
        };
        match self.frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("frame queue full; frame dropped"),
            Err(TrySendError::Disconnected(_)) => trace!("no frame consumer"),
        }
    }
}

impl Drop for SimulationLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;
    use crate::audio::RecordingSink;
    use crate::remote::Integrator;
    use crate::sim::snapshot::BodyState;

    /// Moves every body one unit right per step.
    struct Drift {
        bodies: Vec<BodyState>,
    }

    impl Integrator for Drift {
        fn start(&mut self, bodies: &[Body]) -> Result<Snapshot, FetchError> {
            self.bodies = bodies
                .iter()
                .map(|b| BodyState::at(b.id.clone(), b.x, b.y, b.tone))
                .collect();
            Ok(Snapshot::new(self.bodies.clone()))
        }

        fn step(&mut self, _dt: f64) -> Result<Snapshot, FetchError> {
            for b in &mut self.bodies {
                b.x += 1.0;
            }
            Ok(Snapshot::new(self.bodies.clone()))
        }
    }

    fn body(id: &str, x: f64) -> Body {
        Body {
            id: id.into(),
            mass: 1.0,
            x,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            tone: 220.0,
        }
    }

    fn make() -> (SimulationLoop, Arc<RecordingSink>, Receiver<SimFrame>) {
        let sink = Arc::new(RecordingSink::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let fetcher = SnapshotFetcher::spawn(Box::new(Drift { bodies: vec![] })).unwrap();
        let sim = SimulationLoop::new(
            LoopSettings::default(),
            fetcher,
            Renderer::default(),
            PositionalAudioEngine::new(sink.clone()),
            tx,
        );
        (sim, sink, rx)
    }

    fn tick(sim: &mut SimulationLoop, now: Instant) -> Instant {
        let next = now + sim.interval();
        sim.on_timer(next);
        let resp = sim
            .responses()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        sim.on_fetch(resp);
        next
    }

    #[test]
    fn start_publishes_markers_without_voices() {
        let (mut sim, sink, frames) = make();
        sim.start(&[body("A", 0.0), body("B", 50.0)], Instant::now())
            .unwrap();
        assert_eq!(sim.state(), LoopState::Running);
        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.display.marker_count(), 2);
        assert_eq!(frame.display.polyline_count(), 0);
        assert!(frame.audio.is_empty());
        assert!(sink.active_voices().is_empty());
    }

    #[test]
    fn empty_body_list_is_rejected() {
        let (mut sim, _, _) = make();
        assert_eq!(
            sim.start(&[], Instant::now()),
            Err(StartError::Validation(ValidationError::NoActiveBodies))
        );
        assert_eq!(sim.state(), LoopState::Idle);
    }

    #[test]
    fn ticks_feed_history_render_and_audio() {
        let (mut sim, sink, frames) = make();
        let mut now = Instant::now();
        sim.start(&[body("A", 0.0)], now).unwrap();
        for _ in 0..3 {
            now = tick(&mut sim, now);
        }
        let last = frames.try_iter().last().unwrap();
        assert_eq!(last.snapshot.bodies[0].x, 3.0);
        assert_eq!(last.display.polyline_count(), 1);
        assert_eq!(sim.trajectories().trail(0).unwrap().len(), 3);
        assert_eq!(sink.active_voices().len(), 1);
    }

    #[test]
    fn speed_scales_interval_and_step() {
        let (mut sim, _, _) = make();
        let now = Instant::now();
        sim.set_speed(2.0, now).unwrap();
        assert_abs_diff_eq!(sim.interval().as_secs_f64(), 0.05, epsilon = 1e-6);
        assert_relative_eq!(sim.dt(), 0.2);
        assert_eq!(
            sim.set_speed(0.0, now),
            Err(ValidationError::InvalidSpeed(0.0))
        );
        assert!(sim.set_speed(f64::NAN, now).is_err());
        assert_eq!(sim.speed(), 2.0);
    }

    #[test]
    fn unrepresentable_interval_is_rejected() {
        let (mut sim, _, _) = make();
        let now = Instant::now();
        sim.start(&[body("A", 0.0)], now).unwrap();
        assert_eq!(
            sim.set_speed(1e-30, now),
            Err(ValidationError::InvalidSpeed(1e-30))
        );
        assert_eq!(sim.speed(), 1.0);
        assert_eq!(sim.interval(), LoopSettings::default().base_interval);
        assert_eq!(sim.state(), LoopState::Running);
        assert!(sim.set_speed(1e6, now).is_ok());
        assert!(sim.interval() < Duration::from_micros(1));
    }

    #[test]
    fn empty_restart_keeps_the_running_simulation() {
        let (mut sim, sink, _) = make();
        let mut now = Instant::now();
        sim.start(&[body("A", 0.0), body("B", 10.0)], now).unwrap();
        now = tick(&mut sim, now);
        assert_eq!(sink.active_voices().len(), 2);

        assert_eq!(
            sim.start(&[], now),
            Err(StartError::Validation(ValidationError::NoActiveBodies))
        );
        assert_eq!(sim.state(), LoopState::Running);
        assert_eq!(sink.active_voices().len(), 2);
        assert_eq!(sim.trajectories().trail(0).unwrap().len(), 1);
        assert!(sim.next_deadline().is_some());
    }

    #[test]
    fn stop_releases_voices_and_discards_late_responses() {
        let (mut sim, sink, frames) = make();
        let now = Instant::now();
        sim.start(&[body("A", 0.0)], now).unwrap();
        let now = tick(&mut sim, now);
        assert_eq!(sink.active_voices().len(), 1);

        sim.on_timer(now + sim.interval());
        let late = sim
            .responses()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        sim.stop();
        assert!(sink.active_voices().is_empty());
        assert_eq!(sim.next_deadline(), None);
        assert_eq!(sim.trajectories().len(), 0);

        let before = frames.try_iter().count();
        sim.on_fetch(late);
        assert_eq!(frames.try_iter().count(), 0);
        assert!(before > 0);
        assert!(sink.active_voices().is_empty());
    }
}
