use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML
    #[arg(long, default_value = "cosmophone.toml")]
    pub config: String,

    /// Backend base URL (overrides config)
    #[arg(long)]
    pub server: Option<String>,

    /// Run without GUI (headless)
    #[arg(long, default_value_t = false)]
    pub nogui: bool,

    /// Initial bodies (.toml with [[bodies]] or JSON {"bodies": [...]})
    #[arg(long)]
    pub bodies: Option<PathBuf>,

    /// Initial speed multiplier
    #[arg(long)]
    pub speed: Option<f64>,

    /// Headless run length in seconds (default: until Ctrl-C)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Fetch and play the melody of this image id
    #[arg(long)]
    pub sonify: Option<String>,

    /// Write audio to wav file
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Play audio in realtime
    #[arg(long, default_value_t = true, num_args = 0..=1, default_missing_value = "true")]
    pub play: bool,
}

impl Args {
    /// Fold command-line overrides into the loaded config.
    pub fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(server) = &self.server {
            cfg.server.base_url = server.clone();
        }
    }
}
