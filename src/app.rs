use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use egui::{Key, ViewportCommand};
use tracing::{debug, error, info, warn};

use crate::audio::engine::AudioEngine;
use crate::audio::{NoteSink, NoteTrigger, NullSink, VoiceSink};
use crate::cli::Args;
use crate::config::AppConfig;
use crate::error::{FetchError, StartError};
use crate::melody::Instrument;
use crate::melody::player::{MelodyPlayer, PlaybackState};
use crate::remote::http::HttpBackend;
use crate::remote::{SonificationService, SonifyResponse};
use crate::render::Renderer;
use crate::sim::body::{BodyForm, default_forms, load_bodies};
use crate::sim::controller::SimFrame;
use crate::sim::worker::{PendingStart, SimulationController};
use crate::ui::windows::{ControlPanel, UiAction, main_window};

pub const BODY_SLOTS: usize = 4;
const PREVIEW_SEC: f32 = 0.5;

/// Audio sinks and the backend client, shared by the GUI and headless runs.
pub struct Services {
    pub audio: Option<AudioEngine>,
    pub voices: Arc<dyn VoiceSink>,
    pub notes: Arc<dyn NoteSink>,
    pub backend: HttpBackend,
}

impl Services {
    /// Audio failures degrade to a silent sink; the simulation still runs.
    pub fn build(cfg: &AppConfig, args: &Args) -> Self {
        let audio = if args.play || args.wav.is_some() {
            match AudioEngine::start(&cfg.audio, args.play, args.wav.clone()) {
                Ok(engine) => Some(engine),
                Err(e) => {
                    warn!("{e}; continuing without audio");
                    None
                }
            }
        } else {
            None
        };
        let (voices, notes): (Arc<dyn VoiceSink>, Arc<dyn NoteSink>) = match &audio {
            Some(engine) => {
                let handle = Arc::new(engine.handle());
                (handle.clone(), handle)
            }
            None => {
                let null = Arc::new(NullSink::default());
                (null.clone(), null)
            }
        };
        Self {
            audio,
            voices,
            notes,
            backend: HttpBackend::new(&cfg.server.base_url, cfg.server.timeout()),
        }
    }
}

/// Form slots from `--bodies`, or the built-in two-body system.
pub fn initial_forms(args: &Args) -> Vec<BodyForm> {
    let Some(path) = &args.bodies else {
        return default_forms(BODY_SLOTS);
    };
    match load_bodies(path) {
        Ok(bodies) => {
            let mut forms: Vec<BodyForm> = bodies.iter().map(BodyForm::from_body).collect();
            let n = forms.len();
            forms.extend((n + 1..=BODY_SLOTS).map(|i| BodyForm::new(format!("Body {i}"))));
            forms
        }
        Err(e) => {
            warn!("{e}; using the default bodies");
            default_forms(BODY_SLOTS)
        }
    }
}

type SonifyResult = (u64, Result<SonifyResponse, FetchError>);

pub struct App {
    cfg: AppConfig,
    panel: ControlPanel,
    last_frame: Option<SimFrame>,
    controller: SimulationController,
    pending_start: Option<PendingStart>,
    melody: MelodyPlayer,
    backend: HttpBackend,
    notes: Arc<dyn NoteSink>,
    sonify_tx: Sender<SonifyResult>,
    sonify_rx: Receiver<SonifyResult>,
    sonify_gen: u64,
    stop_key: Key,
    exiting: Arc<AtomicBool>,
    audio: Option<AudioEngine>,
}

impl App {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        cfg: AppConfig,
        args: Args,
        stop_flag: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let services = Services::build(&cfg, &args);
        let controller = SimulationController::spawn(
            Box::new(services.backend.clone()),
            services.voices.clone(),
            &cfg,
        )?;
        let melody = MelodyPlayer::new(
            services.notes.clone(),
            cfg.melody.event_spacing_sec,
            cfg.melody.note_duration_sec,
        );

        let mut panel = ControlPanel::new(initial_forms(&args));
        if let Some(speed) = args.speed {
            match controller.set_speed(speed) {
                Ok(()) => panel.speed = speed,
                Err(e) => warn!("{e}"),
            }
        }
        if let Some(id) = &args.sonify {
            panel.image_id = id.clone();
        }
        let stop_key = Key::from_name(&cfg.simulation.stop_key.trim().to_ascii_uppercase())
            .unwrap_or(Key::S);

        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        let (sonify_tx, sonify_rx) = unbounded();

        let mut app = Self {
            cfg,
            panel,
            last_frame: None,
            controller,
            pending_start: None,
            melody,
            backend: services.backend,
            notes: services.notes,
            sonify_tx,
            sonify_rx,
            sonify_gen: 0,
            stop_key,
            exiting: stop_flag,
            audio: services.audio,
        };
        if args.sonify.is_some() {
            app.request_sonify();
        }
        Ok(app)
    }

    /// Queue a start; the initial fetch completes on the simulation thread.
    fn start(&mut self) {
        match self.controller.request_start(&self.panel.forms) {
            Ok(pending) => {
                self.pending_start = Some(pending);
                self.panel.error = None;
            }
            Err(e) => self.report_start(Err(e)),
        }
    }

    fn stop(&mut self) {
        self.pending_start = None;
        self.controller.request_stop();
    }

    fn poll_start(&mut self) {
        let Some(pending) = &self.pending_start else {
            return;
        };
        let result = match pending.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(FetchError::Disconnected.into()),
        };
        self.pending_start = None;
        self.report_start(result);
    }

    fn report_start(&mut self, result: Result<(), StartError>) {
        match result {
            Ok(()) => self.panel.error = None,
            Err(e) => {
                if let StartError::Fetch(_) = &e {
                    error!("{e}");
                }
                self.panel.error = Some(e.to_string());
            }
        }
    }

    fn preview_tone(&mut self, slot: usize) {
        let Some(form) = self.panel.forms.get(slot) else {
            return;
        };
        match form.parse() {
            Ok(body) => self.notes.trigger(NoteTrigger {
                instrument: Instrument::Flute,
                freq_hz: body.tone as f32,
                duration_sec: PREVIEW_SEC,
                pan: 0.0,
                velocity: 0.5,
            }),
            Err(e) => self.panel.error = Some(e.to_string()),
        }
    }

    /// Only the newest request may start a melody.
    fn request_sonify(&mut self) {
        let image_id = self.panel.image_id.trim().to_string();
        if image_id.is_empty() {
            return;
        }
        self.sonify_gen += 1;
        let generation = self.sonify_gen;
        let backend = self.backend.clone();
        let tx = self.sonify_tx.clone();
        let spawned = thread::Builder::new()
            .name("sonify".into())
            .spawn(move || {
                let _ = tx.send((generation, backend.sonify(&image_id)));
            });
        if let Err(e) = spawned {
            warn!("could not spawn sonify request: {e}");
        }
    }

    fn poll_sonify(&mut self) {
        while let Ok((generation, result)) = self.sonify_rx.try_recv() {
            if generation != self.sonify_gen {
                debug!(generation, "stale sonify response dropped");
                continue;
            }
            match result {
                Ok(resp) => {
                    let events = resp.events(self.cfg.melody.event_spacing_sec);
                    self.panel.melody_description = resp.description.clone();
                    self.melody.play(&events);
                }
                Err(e) => self.panel.error = Some(format!("sonify failed: {e}")),
            }
        }
    }

    fn handle(&mut self, action: UiAction) {
        match action {
            UiAction::Start => self.start(),
            UiAction::Stop => self.stop(),
            UiAction::SetSpeed(speed) => {
                if let Err(e) = self.controller.set_speed(speed) {
                    self.panel.error = Some(e.to_string());
                }
            }
            UiAction::PreviewTone(slot) => self.preview_tone(slot),
            UiAction::Sonify => self.request_sonify(),
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.exiting.load(Ordering::SeqCst) {
            info!("SIGINT received: closing window.");
            ctx.send_viewport_cmd(ViewportCommand::Close);
            return;
        }

        let (stop_pressed, esc_pressed) =
            ctx.input(|i| (i.key_pressed(self.stop_key), i.key_pressed(Key::Escape)));
        if esc_pressed {
            ctx.send_viewport_cmd(ViewportCommand::Close);
        }
        if stop_pressed && !ctx.wants_keyboard_input() {
            self.stop();
        }

        // Pull newest frame (drain to latest)
        while let Ok(f) = self.controller.frames().try_recv() {
            self.last_frame = Some(f);
        }
        self.poll_start();
        self.poll_sonify();

        let starting = self.pending_start.is_some();
        self.panel.running = starting || self.controller.is_running();
        self.panel.status = if starting {
            "Starting…".to_string()
        } else if self.panel.running {
            format!("Running ×{}", self.panel.speed)
        } else {
            "Idle".to_string()
        };
        self.panel.melody_progress = self.melody.progress();

        let viewport = Renderer::from_config(&self.cfg.canvas).viewport();
        let actions = main_window(
            ctx,
            &mut self.panel,
            self.last_frame.as_ref(),
            viewport,
            &self.cfg.simulation.stop_key,
        );
        for action in actions {
            self.handle(action);
        }
        ctx.request_repaint_after(Duration::from_millis(16));
    }
}

impl Drop for App {
    fn drop(&mut self) {
        info!("App drop. Finalizing..");
        self.melody.stop();
        self.controller.shutdown();
        if let Some(mut audio) = self.audio.take() {
            audio.shutdown();
        }
    }
}

/// End of a `--duration` run. Lengths that are not positive, or too long to
/// represent, mean "until interrupted".
fn run_deadline(duration: Option<f64>, now: Instant) -> Option<Instant> {
    let secs = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    let span = Duration::try_from_secs_f64(secs).ok()?;
    now.checked_add(span)
}

/// Run a simulation (and optionally a melody) without a window.
pub fn run_headless(
    cfg: &AppConfig,
    args: &Args,
    stop_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut services = Services::build(cfg, args);
    let mut controller =
        SimulationController::spawn(Box::new(services.backend.clone()), services.voices.clone(), cfg)?;
    if let Some(speed) = args.speed {
        controller.set_speed(speed)?;
    }
    controller.start(&initial_forms(args))?;

    let melody = MelodyPlayer::new(
        services.notes.clone(),
        cfg.melody.event_spacing_sec,
        cfg.melody.note_duration_sec,
    );
    if let Some(id) = &args.sonify {
        match services.backend.sonify(id) {
            Ok(resp) => melody.play(&resp.events(cfg.melody.event_spacing_sec)),
            Err(e) => warn!("sonify {id} failed: {e}"),
        }
    }

    let deadline = run_deadline(args.duration, Instant::now());
    let mut ticks = 0u64;
    while !stop_flag.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match controller.frames().recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                ticks += 1;
                debug!(
                    seq = frame.seq,
                    voices = frame.audio.len(),
                    "frame"
                );
                if ticks % 50 == 0 {
                    info!("{ticks} frames");
                }
            }
            Err(_) if !controller.is_running() && melody.state() != PlaybackState::Playing => {
                info!("nothing left to run");
                break;
            }
            Err(_) => {}
        }
    }

    melody.stop();
    controller.stop();
    controller.shutdown();
    if let Some(mut audio) = services.audio.take() {
        audio.shutdown();
    }
    info!("headless run finished after {ticks} frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_deadline_bounds() {
        let now = Instant::now();
        assert_eq!(
            run_deadline(Some(1.5), now),
            Some(now + Duration::from_millis(1500))
        );
        assert_eq!(run_deadline(None, now), None);
        assert_eq!(run_deadline(Some(0.0), now), None);
        assert_eq!(run_deadline(Some(f64::INFINITY), now), None);
        assert_eq!(run_deadline(Some(1e300), now), None);
    }
}
