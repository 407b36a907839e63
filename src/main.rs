// Entry point: launches the egui/eframe app (or a headless run) and its worker threads.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use cosmophone::app::{App, run_headless};
use cosmophone::cli::Args;
use cosmophone::config::AppConfig;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cosmophone=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    let mut cfg = AppConfig::load_or_default(&args.config);
    args.apply_overrides(&mut cfg);
    info!("backend: {}", cfg.server.base_url);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_for_ctrlc = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_for_ctrlc.store(true, Ordering::SeqCst);
    })?;

    if args.nogui {
        return run_headless(&cfg, &args, stop_flag).inspect_err(|e| error!("{e}"));
    }

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([cfg.canvas.width + 300.0, cfg.canvas.height + 60.0]),
        ..Default::default()
    };

    eframe::run_native(
        "cosmophone",
        native_options,
        Box::new(|cc| match App::new(cc, cfg, args, stop_flag) {
            Ok(app) => Ok(Box::new(app)),
            Err(e) => Err(e.into()),
        }),
    )?;
    Ok(())
}
