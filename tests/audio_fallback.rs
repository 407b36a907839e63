use std::time::{Duration, Instant};

use clap::Parser;
use cosmophone::app::{BODY_SLOTS, Services, initial_forms};
use cosmophone::cli::Args;
use cosmophone::config::AppConfig;
use cosmophone::error::FetchError;
use cosmophone::remote::Integrator;
use cosmophone::sim::body::Body;
use cosmophone::sim::snapshot::{BodyState, Snapshot};
use cosmophone::sim::worker::SimulationController;

/// Bodies that never move.
struct Frozen(Vec<BodyState>);

impl Integrator for Frozen {
    fn start(&mut self, bodies: &[Body]) -> Result<Snapshot, FetchError> {
        self.0 = bodies
            .iter()
            .map(|b| BodyState::at(b.id.clone(), b.x, b.y, b.tone))
            .collect();
        Ok(Snapshot::new(self.0.clone()))
    }

    fn step(&mut self, _dt: f64) -> Result<Snapshot, FetchError> {
        Ok(Snapshot::new(self.0.clone()))
    }
}

#[test]
fn silent_services_still_drive_the_simulation() {
    let args = Args::parse_from(["cosmophone", "--nogui", "--play", "false"]);
    let mut cfg = AppConfig::default();
    cfg.simulation.base_interval_ms = 10.0;

    let services = Services::build(&cfg, &args);
    assert!(services.audio.is_none());

    let forms = initial_forms(&args);
    assert_eq!(forms.len(), BODY_SLOTS);

    let controller =
        SimulationController::spawn(Box::new(Frozen(Vec::new())), services.voices.clone(), &cfg)
            .unwrap();
    controller.start(&forms).unwrap();
    assert!(controller.is_running());

    let until = Instant::now() + Duration::from_secs(5);
    let mut voiced = false;
    while Instant::now() < until && !voiced {
        if let Ok(frame) = controller.frames().recv_timeout(Duration::from_millis(100)) {
            voiced = !frame.audio.is_empty();
        }
    }
    assert!(voiced, "no tick reached the audio stage");
    controller.stop();
    assert!(!controller.is_running());
}

#[test]
fn unreadable_bodies_file_falls_back_to_defaults() {
    let args = Args::parse_from([
        "cosmophone",
        "--bodies",
        "/nonexistent/cosmophone-bodies.toml",
    ]);
    let forms = initial_forms(&args);
    assert_eq!(forms.len(), BODY_SLOTS);
    assert!(forms.iter().any(|f| f.active));
}
