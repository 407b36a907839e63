use egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Shape, Stroke};

use crate::render::{Canvas, Color, DisplayList, Point, Viewport};

/// Paints recorded frames into an egui rect, scaled to fit the world viewport.
pub struct EguiCanvas<'a> {
    painter: &'a Painter,
    rect: Rect,
    scale: f32,
}

impl<'a> EguiCanvas<'a> {
    pub fn new(painter: &'a Painter, rect: Rect, viewport: Viewport) -> Self {
        let sx = rect.width() / viewport.width.max(1.0);
        let sy = rect.height() / viewport.height.max(1.0);
        Self {
            painter,
            rect,
            scale: sx.min(sy),
        }
    }

    fn pos(&self, p: Point) -> Pos2 {
        Pos2::new(
            self.rect.min.x + p.x * self.scale,
            self.rect.min.y + p.y * self.scale,
        )
    }
}

fn color32(c: Color) -> Color32 {
    Color32::from_rgb(c.r, c.g, c.b)
}

impl Canvas for EguiCanvas<'_> {
    fn clear(&mut self) {
        self.painter.rect_filled(self.rect, 0.0, Color32::BLACK);
    }

    fn polyline(&mut self, points: &[Point], color: Color, width: f32) {
        let pts: Vec<Pos2> = points.iter().map(|p| self.pos(*p)).collect();
        self.painter
            .add(Shape::line(pts, Stroke::new(width, color32(color))));
    }

    fn disc(&mut self, center: Point, radius: f32, color: Color) {
        self.painter
            .circle_filled(self.pos(center), radius * self.scale, color32(color));
    }

    fn text(&mut self, at: Point, text: &str, color: Color) {
        self.painter.text(
            self.pos(at),
            Align2::LEFT_CENTER,
            text,
            FontId::proportional(12.0),
            color32(color),
        );
    }
}

/// Allocate the simulation view and paint `display` (or a blank field).
pub fn sim_view(ui: &mut egui::Ui, display: Option<&DisplayList>, viewport: Viewport) {
    let avail = ui.available_size();
    let aspect = viewport.height / viewport.width.max(1.0);
    let width = avail.x.min(avail.y / aspect.max(1e-3)).max(100.0);
    let size = egui::vec2(width, width * aspect);
    let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
    let mut canvas = EguiCanvas::new(&painter, response.rect, viewport);
    match display {
        Some(list) => list.replay(&mut canvas),
        None => canvas.clear(),
    }
}
