use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ServerConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ServerConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:5000".to_string()
    }
    fn default_timeout_ms() -> u64 {
        2_000
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulated time per tick at speed 1.
    #[serde(default = "SimulationConfig::default_base_step")]
    pub base_step: f64,
    /// Wall-clock tick interval at speed 1.
    #[serde(default = "SimulationConfig::default_base_interval_ms")]
    pub base_interval_ms: f64,
    #[serde(default = "SimulationConfig::default_trail_capacity")]
    pub trail_capacity: usize,
    #[serde(default = "SimulationConfig::default_stop_key")]
    pub stop_key: String,
    #[serde(default = "SimulationConfig::default_start_timeout_ms")]
    pub start_timeout_ms: u64,
}

impl SimulationConfig {
    fn default_base_step() -> f64 {
        0.1
    }
    fn default_base_interval_ms() -> f64 {
        100.0
    }
    fn default_trail_capacity() -> usize {
        50
    }
    fn default_stop_key() -> String {
        "s".to_string()
    }
    fn default_start_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_step: Self::default_base_step(),
            base_interval_ms: Self::default_base_interval_ms(),
            trail_capacity: Self::default_trail_capacity(),
            stop_key: Self::default_stop_key(),
            start_timeout_ms: Self::default_start_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "CanvasConfig::default_width")]
    pub width: f32,
    #[serde(default = "CanvasConfig::default_height")]
    pub height: f32,
    #[serde(default = "CanvasConfig::default_marker_radius")]
    pub marker_radius: f32,
}

impl CanvasConfig {
    fn default_width() -> f32 {
        800.0
    }
    fn default_height() -> f32 {
        600.0
    }
    fn default_marker_radius() -> f32 {
        5.0
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            marker_radius: Self::default_marker_radius(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "AudioConfig::default_latency_ms")]
    pub latency_ms: f32,
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub output_guard: OutputGuardSetting,
    /// Fade applied when a voice starts or stops.
    #[serde(default = "AudioConfig::default_declick_ms")]
    pub declick_ms: f32,
}

impl AudioConfig {
    fn default_latency_ms() -> f32 {
        50.0
    }
    fn default_sample_rate() -> u32 {
        48_000
    }
    fn default_declick_ms() -> f32 {
        5.0
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            latency_ms: Self::default_latency_ms(),
            sample_rate: Self::default_sample_rate(),
            output_guard: OutputGuardSetting::default(),
            declick_ms: Self::default_declick_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputGuardSetting {
    None,
    SoftClip,
    #[default]
    PeakLimiter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelodyConfig {
    #[serde(default = "MelodyConfig::default_event_spacing_sec")]
    pub event_spacing_sec: f64,
    #[serde(default = "MelodyConfig::default_note_duration_sec")]
    pub note_duration_sec: f32,
}

impl MelodyConfig {
    fn default_event_spacing_sec() -> f64 {
        0.1
    }
    fn default_note_duration_sec() -> f32 {
        0.25
    }
}

impl Default for MelodyConfig {
    fn default() -> Self {
        Self {
            event_spacing_sec: Self::default_event_spacing_sec(),
            note_duration_sec: Self::default_note_duration_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub melody: MelodyConfig,
}

/// Shortest decimal for a float read back from `f32` (0.10000000149 -> 0.1).
fn tidy_float(rhs: &str) -> Option<String> {
    if !rhs.contains(['.', 'e', 'E']) || rhs.starts_with('"') {
        return None;
    }
    let val: f64 = rhs.parse().ok()?;
    let mut s = format!("{val:.6}");
    let trimmed = s.trim_end_matches('0').len();
    s.truncate(trimmed);
    if s.ends_with('.') {
        s.push('0');
    }
    Some(s)
}

impl AppConfig {
    /// The defaults as a TOML document with every key commented out, so the
    /// file documents the knobs without pinning them.
    fn commented_defaults(&self) -> Result<String, toml::ser::Error> {
        let text = toml::to_string_pretty(self)?;
        let mut out = String::with_capacity(text.len() + 64);
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('[') {
                out.push_str(line);
            } else {
                out.push_str("# ");
                match line.split_once('=') {
                    Some((key, rhs)) => match tidy_float(rhs.trim()) {
                        Some(v) => out.push_str(&format!("{} = {v}", key.trim())),
                        None => out.push_str(line),
                    },
                    None => out.push_str(line),
                }
            }
            out.push('\n');
        }
        Ok(out)
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        warn!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        let default_cfg = Self::default();
        match default_cfg.commented_defaults() {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, text) {
                    warn!("Failed to write default config to {path}: {err}");
                }
            }
            Err(err) => warn!("Failed to serialize default config: {err}"),
        }
        default_cfg
    }
}
