use egui::{CentralPanel, Color32, ProgressBar, RichText, SidePanel, TextEdit, TopBottomPanel};

use crate::render::Viewport;
use crate::sim::body::BodyForm;
use crate::sim::controller::SimFrame;

pub const SPEED_PRESETS: [f64; 4] = [0.5, 1.0, 2.0, 4.0];

/// Something the user asked for this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Start,
    Stop,
    SetSpeed(f64),
    PreviewTone(usize),
    Sonify,
}

/// Editable state behind the side panel.
#[derive(Debug, Clone)]
pub struct ControlPanel {
    pub forms: Vec<BodyForm>,
    pub speed: f64,
    pub image_id: String,
    pub status: String,
    pub error: Option<String>,
    pub running: bool,
    pub melody_progress: f32,
    pub melody_description: Option<String>,
}

impl ControlPanel {
    pub fn new(forms: Vec<BodyForm>) -> Self {
        Self {
            forms,
            speed: 1.0,
            image_id: String::new(),
            status: "Idle".into(),
            error: None,
            running: false,
            melody_progress: 0.0,
            melody_description: None,
        }
    }
}

fn body_slot(ui: &mut egui::Ui, index: usize, form: &mut BodyForm, actions: &mut Vec<UiAction>) {
    ui.horizontal(|ui| {
        ui.checkbox(&mut form.active, "");
        ui.add(TextEdit::singleline(&mut form.label).desired_width(70.0));
        if ui.small_button("♪").on_hover_text("Preview tone").clicked() {
            actions.push(UiAction::PreviewTone(index));
        }
    });
    egui::Grid::new(("body_grid", index))
        .num_columns(6)
        .spacing([4.0, 2.0])
        .show(ui, |ui| {
            for (name, value) in [
                ("mass", &mut form.mass),
                ("x", &mut form.x),
                ("y", &mut form.y),
            ] {
                ui.label(name);
                ui.add(TextEdit::singleline(value).desired_width(56.0));
            }
            ui.end_row();
            for (name, value) in [
                ("vx", &mut form.vx),
                ("vy", &mut form.vy),
                ("tone", &mut form.tone),
            ] {
                ui.label(name);
                ui.add(TextEdit::singleline(value).desired_width(56.0));
            }
            ui.end_row();
        });
}

fn speed_controls(ui: &mut egui::Ui, panel: &mut ControlPanel, actions: &mut Vec<UiAction>) {
    ui.horizontal(|ui| {
        ui.label("Speed");
        for preset in SPEED_PRESETS {
            let selected = (panel.speed - preset).abs() < 1e-9;
            if ui.selectable_label(selected, format!("×{preset}")).clicked() {
                panel.speed = preset;
                actions.push(UiAction::SetSpeed(preset));
            }
        }
    });
    let slider = egui::Slider::new(&mut panel.speed, 0.1..=8.0)
        .logarithmic(true)
        .text("×");
    if ui.add(slider).changed() {
        actions.push(UiAction::SetSpeed(panel.speed));
    }
}

fn melody_controls(ui: &mut egui::Ui, panel: &mut ControlPanel, actions: &mut Vec<UiAction>) {
    ui.heading("Image melody");
    ui.horizontal(|ui| {
        ui.add(
            TextEdit::singleline(&mut panel.image_id)
                .hint_text("image id")
                .desired_width(120.0),
        );
        let enabled = !panel.image_id.trim().is_empty();
        if ui.add_enabled(enabled, egui::Button::new("Sonify")).clicked() {
            actions.push(UiAction::Sonify);
        }
    });
    ui.add(ProgressBar::new(panel.melody_progress / 100.0).show_percentage());
    if let Some(desc) = &panel.melody_description {
        ui.label(RichText::new(desc).italics());
    }
}

/// Side panel with the form and controls, central panel with the simulation view.
pub fn main_window(
    ctx: &egui::Context,
    panel: &mut ControlPanel,
    frame: Option<&SimFrame>,
    viewport: Viewport,
    stop_key: &str,
) -> Vec<UiAction> {
    let mut actions = Vec::new();

    TopBottomPanel::bottom("status").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.label(&panel.status);
            if let Some(frame) = frame {
                ui.separator();
                ui.label(format!("tick {}  bodies {}", frame.seq, frame.snapshot.len()));
            }
            if let Some(err) = &panel.error {
                ui.separator();
                ui.label(RichText::new(err).color(Color32::LIGHT_RED));
            }
        });
    });

    SidePanel::left("controls")
        .resizable(false)
        .min_width(260.0)
        .show(ctx, |ui| {
            ui.heading("Bodies");
            egui::ScrollArea::vertical()
                .max_height(ui.available_height() * 0.6)
                .show(ui, |ui| {
                    for (i, form) in panel.forms.iter_mut().enumerate() {
                        body_slot(ui, i, form, &mut actions);
                        ui.separator();
                    }
                });
            ui.horizontal(|ui| {
                if ui.button("Start").clicked() {
                    actions.push(UiAction::Start);
                }
                if ui
                    .add_enabled(panel.running, egui::Button::new("Stop"))
                    .on_hover_text(format!("or press {}", stop_key.to_uppercase()))
                    .clicked()
                {
                    actions.push(UiAction::Stop);
                }
            });
            speed_controls(ui, panel, &mut actions);
            ui.separator();
            melody_controls(ui, panel, &mut actions);
        });

    CentralPanel::default()
        .frame(egui::Frame::NONE.fill(Color32::from_gray(16)))
        .show(ctx, |ui| {
            super::canvas::sim_view(ui, frame.map(|f| &f.display), viewport);
        });

    actions
}
