use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BodiesFileError, ValidationError};

pub const DEFAULT_MASS: f64 = 1.0;
/// Middle C.
pub const DEFAULT_TONE_HZ: f64 = 261.63;

/// A point mass as submitted to the integrator when a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: String,
    pub mass: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    pub tone: f64,
}

/// Raw text of one body slot in the input form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodyForm {
    pub label: String,
    pub active: bool,
    pub mass: String,
    pub x: String,
    pub y: String,
    pub vx: String,
    pub vy: String,
    pub tone: String,
}

impl BodyForm {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn from_body(body: &Body) -> Self {
        Self {
            label: body.id.clone(),
            active: true,
            mass: body.mass.to_string(),
            x: body.x.to_string(),
            y: body.y.to_string(),
            vx: body.vx.to_string(),
            vy: body.vy.to_string(),
            tone: body.tone.to_string(),
        }
    }

    fn field(&self, name: &'static str, raw: &str, default: f64) -> Result<f64, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(default);
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ValidationError::InvalidField {
                body: self.label.clone(),
                field: name,
                value: raw.to_string(),
            }),
        }
    }

    /// Parse the slot. Empty fields fall back to the usual defaults.
    pub fn parse(&self) -> Result<Body, ValidationError> {
        let mass = self.field("mass", &self.mass, DEFAULT_MASS)?;
        let x = self.field("x", &self.x, 0.0)?;
        let y = self.field("y", &self.y, 0.0)?;
        let vx = self.field("vx", &self.vx, 0.0)?;
        let vy = self.field("vy", &self.vy, 0.0)?;
        let tone = self.field("tone", &self.tone, DEFAULT_TONE_HZ)?;
        if mass <= 0.0 {
            return Err(ValidationError::NonPositive {
                body: self.label.clone(),
                field: "mass",
            });
        }
        if tone <= 0.0 {
            return Err(ValidationError::NonPositive {
                body: self.label.clone(),
                field: "tone",
            });
        }
        Ok(Body {
            id: self.label.clone(),
            mass,
            x,
            y,
            vx,
            vy,
            tone,
        })
    }
}

/// Collect the bodies of every active slot, in slot order.
pub fn collect_bodies(forms: &[BodyForm]) -> Result<Vec<Body>, ValidationError> {
    let mut bodies = Vec::new();
    let mut seen = HashSet::new();
    for form in forms.iter().filter(|f| f.active) {
        let body = form.parse()?;
        if !seen.insert(body.id.clone()) {
            return Err(ValidationError::DuplicateId(body.id));
        }
        bodies.push(body);
    }
    if bodies.is_empty() {
        return Err(ValidationError::NoActiveBodies);
    }
    Ok(bodies)
}

#[derive(Debug, Deserialize)]
struct BodiesFile {
    bodies: Vec<Body>,
}

/// Read initial bodies from a `.toml` (`[[bodies]]` tables) or JSON (`{"bodies": [...]}`) file.
pub fn load_bodies(path: &Path) -> Result<Vec<Body>, BodiesFileError> {
    let shown = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| BodiesFileError::Io {
        path: shown.clone(),
        reason: e.to_string(),
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed: Result<BodiesFile, String> = if is_toml {
        toml::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    };
    parsed.map(|f| f.bodies).map_err(|reason| BodiesFileError::Parse {
        path: shown,
        reason,
    })
}

/// The default form: a heavy central body and a light orbiter.
pub fn default_forms(slots: usize) -> Vec<BodyForm> {
    let mut forms: Vec<BodyForm> = (1..=slots).map(|i| BodyForm::new(format!("Body {i}"))).collect();
    if let Some(sun) = forms.get_mut(0) {
        sun.active = true;
        sun.mass = "100".into();
        sun.tone = "130.81".into();
    }
    if let Some(planet) = forms.get_mut(1) {
        planet.active = true;
        planet.mass = "1".into();
        planet.x = "150".into();
        planet.vy = "25".into();
        planet.tone = "392".into();
    }
    forms
}
