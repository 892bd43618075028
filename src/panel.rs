//! The egui control panel.
//!
//! The panel never touches simulation state directly. It reads a
//! [`FrameStatus`] and the current [`SimulationParameters`], and every edit
//! becomes a [`Command`] on the queue, applied at the start of the next frame.

use egui::{RichText, Ui};
use glam::Vec3;

use crate::control::{Command, CommandQueue, ParamUpdate};
use crate::driver::RunState;
use crate::frame::FrameStatus;
use crate::params::SimulationParameters;

/// Largest count the panel offers.
const MAX_PARTICLES: u32 = 16_000_000;

/// Window with run controls, every parameter and a status line.
#[derive(Debug)]
pub struct ControlPanel {
    /// Count typed into the panel, applied with the "Resize" button.
    pending_count: u32,
}

impl ControlPanel {
    pub fn new(particle_count: u32) -> Self {
        Self {
            pending_count: particle_count,
        }
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        status: &FrameStatus,
        params: &SimulationParameters,
        commands: &mut CommandQueue,
    ) {
        egui::Window::new("Swarm")
            .default_pos([12.0, 12.0])
            .default_width(280.0)
            .resizable(false)
            .show(ctx, |ui| {
                self.run_controls(ui, status, commands);
                ui.separator();
                egui::CollapsingHeader::new("Attractors")
                    .default_open(true)
                    .show(ui, |ui| attractor_controls(ui, params, commands));
                egui::CollapsingHeader::new("Bounds")
                    .default_open(false)
                    .show(ui, |ui| bounds_controls(ui, params, commands));
                egui::CollapsingHeader::new("Color")
                    .default_open(false)
                    .show(ui, |ui| color_controls(ui, params, commands));
                ui.separator();
                status_line(ui, status);
            });
    }

    fn run_controls(&mut self, ui: &mut Ui, status: &FrameStatus, commands: &mut CommandQueue) {
        ui.horizontal(|ui| {
            let label = match status.state {
                RunState::Running => "Pause",
                RunState::Stopped => "Run",
            };
            if ui.button(label).on_hover_text("P").clicked() {
                commands.push(Command::ToggleRunning);
            }
            if ui.button("Reverse").on_hover_text("T").clicked() {
                commands.push(Command::ReverseTime);
            }
            if ui.button("Restart").on_hover_text("R").clicked() {
                commands.push(Command::Restart);
            }
        });

        ui.horizontal(|ui| {
            ui.add(
                egui::DragValue::new(&mut self.pending_count)
                    .range(1..=MAX_PARTICLES)
                    .speed(1000.0)
                    .prefix("particles: "),
            );
            if ui.button("Resize").clicked() {
                commands.push(Command::SetParticleCount(self.pending_count));
            }
        });

        let mut camera_input = status.camera_input;
        if ui
            .checkbox(&mut camera_input, "Camera input")
            .on_hover_text("C")
            .changed()
        {
            commands.push(Command::SetCameraInput(camera_input));
        }
    }
}

fn attractor_controls(ui: &mut Ui, params: &SimulationParameters, commands: &mut CommandQueue) {
    let orbit = &params.attractors;
    if let Some(v) = slider(ui, params.sim_speed, -4.0..=4.0, "Sim speed") {
        commands.push(ParamUpdate::SimSpeed(v));
    }
    if let Some(v) = vec3(ui, "Center", orbit.center) {
        commands.push(ParamUpdate::AttractorCenter(v));
    }
    if let Some(v) = slider(ui, orbit.horizontal_displacement, 0.0..=10.0, "Horizontal") {
        commands.push(ParamUpdate::HorizontalDisplacement(v));
    }
    if let Some(v) = slider(ui, orbit.vertical_displacement, 0.0..=10.0, "Vertical") {
        commands.push(ParamUpdate::VerticalDisplacement(v));
    }
    if let Some(v) = slider(ui, orbit.angular_speed, -5.0..=5.0, "Angular speed") {
        commands.push(ParamUpdate::AngularSpeed(v));
    }
    if let Some(v) = slider(ui, orbit.gravity, 0.0..=20.0, "Gravity") {
        commands.push(ParamUpdate::Gravity(v));
    }
}

fn bounds_controls(ui: &mut Ui, params: &SimulationParameters, commands: &mut CommandQueue) {
    let mut sphere_enabled = params.sphere.enabled;
    if ui.checkbox(&mut sphere_enabled, "Bounding sphere").changed() {
        commands.push(ParamUpdate::SphereEnabled(sphere_enabled));
    }
    ui.add_enabled_ui(sphere_enabled, |ui| {
        if let Some(v) = vec3(ui, "Center", params.sphere.center) {
            commands.push(ParamUpdate::SphereCenter(v));
        }
        if let Some(v) = slider(ui, params.sphere.radius(), 0.1..=50.0, "Radius") {
            commands.push(ParamUpdate::SphereRadius(v));
        }
    });

    let mut floor_enabled = params.floor.enabled;
    if ui.checkbox(&mut floor_enabled, "Floor").changed() {
        commands.push(ParamUpdate::FloorEnabled(floor_enabled));
    }
    ui.add_enabled_ui(floor_enabled, |ui| {
        if let Some(v) = slider(ui, params.floor.y, -20.0..=20.0, "Height") {
            commands.push(ParamUpdate::FloorY(v));
        }
    });
}

fn color_controls(ui: &mut Ui, params: &SimulationParameters, commands: &mut CommandQueue) {
    let gradient = &params.gradient;
    ui.label(RichText::new("Slow particles drift between").small().weak());
    if let Some(v) = color(ui, "Slow A", gradient.low_speed_a) {
        commands.push(ParamUpdate::LowSpeedColorA(v));
    }
    if let Some(v) = color(ui, "Slow B", gradient.low_speed_b) {
        commands.push(ParamUpdate::LowSpeedColorB(v));
    }
    ui.label(RichText::new("Fast particles drift between").small().weak());
    if let Some(v) = color(ui, "Fast A", gradient.high_speed_a) {
        commands.push(ParamUpdate::HighSpeedColorA(v));
    }
    if let Some(v) = color(ui, "Fast B", gradient.high_speed_b) {
        commands.push(ParamUpdate::HighSpeedColorB(v));
    }
    if let Some(v) = slider(ui, gradient.speed, 0.0..=5.0, "Drift speed") {
        commands.push(ParamUpdate::ColorSpeed(v));
    }
    if let Some(v) = slider(ui, gradient.scale, 0.0..=2.0, "Speed scale") {
        commands.push(ParamUpdate::ColorScale(v));
    }
    if let Some(v) = slider(ui, params.particle_size, 0.001..=0.2, "Particle size") {
        commands.push(ParamUpdate::ParticleSize(v));
    }
}

fn status_line(ui: &mut Ui, status: &FrameStatus) {
    let state = match status.state {
        RunState::Running => "running",
        RunState::Stopped => "stopped",
    };
    ui.label(format!(
        "{} | t = {:.2} | {} particles | {:.0} fps",
        state, status.sim_time, status.particle_count, status.fps
    ));
    if let Some(error) = &status.last_error {
        ui.label(RichText::new(error).color(egui::Color32::LIGHT_RED));
    }
    for mismatch in &status.mismatches {
        ui.label(RichText::new(mismatch).small().color(egui::Color32::YELLOW));
    }
}

/// A labeled slider; `Some` with the new value when it moved.
fn slider(ui: &mut Ui, value: f32, range: std::ops::RangeInclusive<f32>, label: &str) -> Option<f32> {
    let mut v = value;
    ui.add(egui::Slider::new(&mut v, range).text(label))
        .changed()
        .then_some(v)
}

fn vec3(ui: &mut Ui, label: &str, value: Vec3) -> Option<Vec3> {
    let mut v = value.to_array();
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        for component in &mut v {
            changed |= ui
                .add(egui::DragValue::new(component).speed(0.05))
                .changed();
        }
    });
    changed.then(|| Vec3::from_array(v))
}

fn color(ui: &mut Ui, label: &str, value: Vec3) -> Option<Vec3> {
    let mut rgb = value.to_array();
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed = ui.color_edit_button_rgb(&mut rgb).changed();
    });
    changed.then(|| Vec3::from_array(rgb))
}
