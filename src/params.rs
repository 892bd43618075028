//! Live-tunable simulation parameters.
//!
//! [`SimulationParameters`] is plain data. The control surface mutates it in
//! place between frames; the drivers read it once per tick/draw.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Vec3, Vec4};

/// Constant added to the sine term of the first gradient weight.
///
/// It is added outside the sine (`k + sin(x)`), not as a phase inside it.
pub const GRADIENT_WEIGHT_OFFSET: f32 = FRAC_PI_2;

/// The two phase-opposed attractors share every orbital constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttractorOrbit {
    /// Orbital center (x, y, z offset).
    pub center: Vec3,
    /// Radius of the horizontal circle both attractors travel.
    pub horizontal_displacement: f32,
    /// Height above (attractor 1) or below (attractor 2) the center.
    pub vertical_displacement: f32,
    /// Radians of orbit per unit of simulated time.
    pub angular_speed: f32,
    /// Pull magnitude, shared by both attractors.
    pub gravity: f32,
}

impl AttractorOrbit {
    /// Positions of both attractors at simulated time `sim_time`.
    pub fn positions(&self, sim_time: f32) -> (Vec3, Vec3) {
        let phase = sim_time * self.angular_speed;
        let first = self.center
            + Vec3::new(
                self.horizontal_displacement * phase.sin(),
                self.vertical_displacement,
                self.horizontal_displacement * phase.cos(),
            );

        let opposed = phase + PI;
        let second = self.center
            + Vec3::new(
                self.horizontal_displacement * opposed.sin(),
                -self.vertical_displacement,
                self.horizontal_displacement * opposed.cos(),
            );

        (first, second)
    }
}

/// Spherical boundary particles bounce off from the inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    radius: f32,
    pub enabled: bool,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32, enabled: bool) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
            enabled,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Set the radius. Negative values clamp to zero.
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius.max(0.0);
    }

    /// Packed as `center.xyz` + `radius` for the update kernel.
    pub fn packed(&self) -> Vec4 {
        self.center.extend(self.radius)
    }
}

/// Horizontal floor plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Floor {
    pub y: f32,
    pub enabled: bool,
}

/// Speed-mapped color gradient whose endpoints drift over wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorGradient {
    pub low_speed_a: Vec3,
    pub low_speed_b: Vec3,
    pub high_speed_a: Vec3,
    pub high_speed_b: Vec3,
    /// How fast the endpoints drift between their A and B colors.
    pub speed: f32,
    /// Multiplier from particle speed to gradient position.
    pub scale: f32,
}

impl ColorGradient {
    /// Blend weights `(w1, w2)` at wall-clock time `clock`.
    pub fn weights(&self, clock: f32) -> (f32, f32) {
        let s = (clock * self.speed).sin();
        ((GRADIENT_WEIGHT_OFFSET + s).abs(), s.abs())
    }

    /// Gradient `(start, end)` colors at wall-clock time `clock`.
    pub fn endpoints(&self, clock: f32) -> (Vec3, Vec3) {
        let (w1, w2) = self.weights(clock);
        (
            self.low_speed_a * w1 + self.low_speed_b * w2,
            self.high_speed_a * w1 + self.high_speed_b * w2,
        )
    }
}

/// Every tunable the update and render passes consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParameters {
    /// Signed time scale; a negative value runs simulated time backwards.
    pub sim_speed: f32,
    pub attractors: AttractorOrbit,
    pub sphere: BoundingSphere,
    pub floor: Floor,
    pub gradient: ColorGradient,
    pub particle_size: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            sim_speed: 1.0,
            attractors: AttractorOrbit {
                center: Vec3::ZERO,
                horizontal_displacement: 3.0,
                vertical_displacement: 1.0,
                angular_speed: 0.5,
                gravity: 2.0,
            },
            sphere: BoundingSphere::new(Vec3::ZERO, 6.0, true),
            floor: Floor {
                y: -4.0,
                enabled: false,
            },
            gradient: ColorGradient {
                low_speed_a: Vec3::new(0.82, 0.705, 0.549),
                low_speed_b: Vec3::new(0.1, 0.2, 0.6),
                high_speed_a: Vec3::new(1.0, 0.35, 0.1),
                high_speed_b: Vec3::new(0.9, 0.9, 1.0),
                speed: 0.2,
                scale: 0.25,
            },
            particle_size: 0.01,
        }
    }
}

/// One write to one [`SimulationParameters`] field.
///
/// Every field the control surface can edit has a variant here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamUpdate {
    SimSpeed(f32),
    AttractorCenter(Vec3),
    HorizontalDisplacement(f32),
    VerticalDisplacement(f32),
    AngularSpeed(f32),
    Gravity(f32),
    SphereCenter(Vec3),
    SphereRadius(f32),
    SphereEnabled(bool),
    FloorY(f32),
    FloorEnabled(bool),
    LowSpeedColorA(Vec3),
    LowSpeedColorB(Vec3),
    HighSpeedColorA(Vec3),
    HighSpeedColorB(Vec3),
    ColorSpeed(f32),
    ColorScale(f32),
    ParticleSize(f32),
}

impl SimulationParameters {
    /// Apply a single field write. Takes effect on the next tick/draw.
    pub fn apply(&mut self, update: ParamUpdate) {
        match update {
            ParamUpdate::SimSpeed(v) => self.sim_speed = v,
            ParamUpdate::AttractorCenter(v) => self.attractors.center = v,
            ParamUpdate::HorizontalDisplacement(v) => self.attractors.horizontal_displacement = v,
            ParamUpdate::VerticalDisplacement(v) => self.attractors.vertical_displacement = v,
            ParamUpdate::AngularSpeed(v) => self.attractors.angular_speed = v,
            ParamUpdate::Gravity(v) => self.attractors.gravity = v,
            ParamUpdate::SphereCenter(v) => self.sphere.center = v,
            ParamUpdate::SphereRadius(v) => self.sphere.set_radius(v),
            ParamUpdate::SphereEnabled(v) => self.sphere.enabled = v,
            ParamUpdate::FloorY(v) => self.floor.y = v,
            ParamUpdate::FloorEnabled(v) => self.floor.enabled = v,
            ParamUpdate::LowSpeedColorA(v) => self.gradient.low_speed_a = v,
            ParamUpdate::LowSpeedColorB(v) => self.gradient.low_speed_b = v,
            ParamUpdate::HighSpeedColorA(v) => self.gradient.high_speed_a = v,
            ParamUpdate::HighSpeedColorB(v) => self.gradient.high_speed_b = v,
            ParamUpdate::ColorSpeed(v) => self.gradient.speed = v,
            ParamUpdate::ColorScale(v) => self.gradient.scale = v,
            ParamUpdate::ParticleSize(v) => self.particle_size = v,
        }
    }
}
