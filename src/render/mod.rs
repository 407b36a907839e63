//! Snapshot → drawing commands.
//!
//! The renderer talks to a [`Canvas`]; the simulation thread records into a
//! [`DisplayList`] which the UI replays onto egui.

use crate::config::CanvasConfig;
use crate::sim::snapshot::Snapshot;
use crate::sim::trajectory::TrajectoryBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const GREEN: Color = Color::rgb(0x00, 0xff, 0x00);
    pub const BLUE: Color = Color::rgb(0x00, 0x00, 0xff);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Trail and marker colors alternate by body index.
pub const TRAIL_COLORS: [Color; 2] = [Color::GREEN, Color::BLUE];
pub const LABEL_COLOR: Color = Color::WHITE;
pub const TRAIL_WIDTH: f32 = 1.0;
pub const LABEL_OFFSET: f32 = 10.0;

pub fn color_for(index: usize) -> Color {
    TRAIL_COLORS[index % TRAIL_COLORS.len()]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// World coordinates (origin at the center, y up) to canvas pixels (y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn to_canvas(&self, x: f64, y: f64) -> Point {
        Point {
            x: self.width * 0.5 + x as f32,
            y: self.height * 0.5 - y as f32,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

pub trait Canvas {
    fn clear(&mut self);
    fn polyline(&mut self, points: &[Point], color: Color, width: f32);
    fn disc(&mut self, center: Point, radius: f32, color: Color);
    fn text(&mut self, at: Point, text: &str, color: Color);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Polyline {
        points: Vec<Point>,
        color: Color,
        width: f32,
    },
    Disc {
        center: Point,
        radius: f32,
        color: Color,
    },
    Text {
        at: Point,
        text: String,
        color: Color,
    },
}

/// Recorded frame, replayable onto any other canvas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn marker_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Disc { .. }))
            .count()
    }

    pub fn polyline_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Polyline { .. }))
            .count()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn replay(&self, canvas: &mut dyn Canvas) {
        for cmd in &self.commands {
            match cmd {
                DrawCommand::Clear => canvas.clear(),
                DrawCommand::Polyline {
                    points,
                    color,
                    width,
                } => canvas.polyline(points, *color, *width),
                DrawCommand::Disc {
                    center,
                    radius,
                    color,
                } => canvas.disc(*center, *radius, *color),
                DrawCommand::Text { at, text, color } => canvas.text(*at, text, *color),
            }
        }
    }
}

impl Canvas for DisplayList {
    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn polyline(&mut self, points: &[Point], color: Color, width: f32) {
        self.commands.push(DrawCommand::Polyline {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn disc(&mut self, center: Point, radius: f32, color: Color) {
        self.commands.push(DrawCommand::Disc {
            center,
            radius,
            color,
        });
    }

    fn text(&mut self, at: Point, text: &str, color: Color) {
        self.commands.push(DrawCommand::Text {
            at,
            text: text.to_string(),
            color,
        });
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    viewport: Viewport,
    marker_radius: f32,
}

impl Renderer {
    pub fn new(viewport: Viewport, marker_radius: f32) -> Self {
        Self {
            viewport,
            marker_radius: marker_radius.max(0.5),
        }
    }

    pub fn from_config(cfg: &CanvasConfig) -> Self {
        Self::new(
            Viewport {
                width: cfg.width,
                height: cfg.height,
            },
            cfg.marker_radius,
        )
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Clear and redraw: every trail with two or more points, then every body.
    pub fn render(&self, canvas: &mut dyn Canvas, snapshot: &Snapshot, trails: &TrajectoryBuffer) {
        canvas.clear();
        for (i, trail) in trails.trails().enumerate() {
            if trail.len() < 2 {
                continue;
            }
            let points: Vec<Point> = trail
                .iter()
                .map(|p| self.viewport.to_canvas(p.x, p.y))
                .collect();
            canvas.polyline(&points, color_for(i), TRAIL_WIDTH);
        }
        for (i, body) in snapshot.iter().enumerate() {
            let center = self.viewport.to_canvas(body.x, body.y);
            canvas.disc(center, self.marker_radius, color_for(i));
            let label = Point {
                x: center.x + LABEL_OFFSET,
                y: center.y,
            };
            canvas.text(label, &body.id, LABEL_COLOR);
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Viewport::default(), 5.0)
    }
}
