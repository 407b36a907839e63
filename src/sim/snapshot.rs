use serde::{Deserialize, Serialize};

fn default_mass() -> f64 {
    1.0
}

/// One body's state as reported by the integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub tone: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
}

impl BodyState {
    pub fn at(id: impl Into<String>, x: f64, y: f64, tone: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            tone,
            vx: 0.0,
            vy: 0.0,
            mass: default_mass(),
        }
    }

    pub fn distance_from_origin(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// Positions of every body for one tick, aligned with the submitted body order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "positions")]
    pub bodies: Vec<BodyState>,
}

impl Snapshot {
    pub fn new(bodies: Vec<BodyState>) -> Self {
        Self { bodies }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BodyState> {
        self.bodies.iter()
    }
}
