//! # swarm
//!
//! A GPU particle swarm: up to millions of particles pulled around by two
//! orbiting attractors, optionally confined by a bounding sphere and a floor,
//! and colored by speed.
//!
//! The crate is the host side of that simulation. It owns the particle
//! buffers, compiles the update and render kernels, drives them once per
//! frame and exposes every tunable to an operator.
//!
//! ## Quick Start
//!
//! ```ignore
//! use swarm::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     Simulation::new()
//!         .with_particle_count(500_000)
//!         .run()
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### The frame
//!
//! [`FrameDriver`] runs one frame at a time: queued [`Command`]s are
//! applied, the [`SimulationDriver`] ticks (upload, dispatch, barrier) and the
//! [`RenderDriver`] draws. The simulation starts stopped; press **P** to run.
//!
//! ### Devices
//!
//! Everything talks to the GPU through the [`GpuDevice`](gpu::GpuDevice)
//! trait. [`WgpuDevice`](gpu::WgpuDevice) renders to a window;
//! [`RecordingDevice`](gpu::RecordingDevice) keeps buffers in memory and
//! records each command, so the whole loop can be tested headless.
//!
//! ### Parameters
//!
//! Kernels receive their inputs as a WGSL uniform struct. The fields the host
//! writes are described by a `#[derive(ParamContract)]` struct and matched to
//! the compiled kernel by name:
//!
//! ```ignore
//! #[derive(ParamContract, Clone, Copy)]
//! struct Wind {
//!     direction: Vec3,   // -> direction: vec3<f32>
//!     gust_strength: f32, // -> gustStrength: f32
//! }
//! ```
//!
//! A name the kernel does not declare is logged once and skipped; see
//! [`ParamBlock`].
//!
//! ## Controls
//!
//! | Key | Action |
//! |-----|--------|
//! | P | Run / pause |
//! | T | Reverse time |
//! | R | Reseed particles |
//! | C | Toggle camera input |
//! | WASD, Space, Shift | Fly |
//! | Right mouse + drag | Look |
//! | Esc | Quit |
//!
//! Build with `--features egui` for a control panel with every parameter.

extern crate self as swarm;

pub mod config;
pub mod control;
pub mod driver;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod input;
#[cfg(feature = "egui")]
pub mod panel;
pub mod params;
pub mod render;
pub mod sampler;
pub mod shader;
mod simulation;
pub mod store;
pub mod time;
pub mod uniforms;

pub use bytemuck;
pub use config::SimulationConfig;
pub use control::{Command, CommandQueue, KeyBindings};
pub use driver::{RunState, SimulationDriver, Tick};
pub use error::{AllocationError, GpuError, KernelError, SimulationError};
pub use frame::{FrameDriver, FrameReport, FrameStatus};
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use params::{ParamUpdate, SimulationParameters};
pub use render::RenderDriver;
pub use sampler::UniformBallSampler;
pub use shader::{KernelSource, KernelStage};
pub use simulation::Simulation;
pub use store::ParticleStateStore;
pub use swarm_derive::ParamContract;
pub use uniforms::{ParamBlock, ParamLayout, ParamMismatch, ParamValue};

/// Trait implemented by `#[derive(ParamContract)]`.
///
/// Maps a Rust struct onto a kernel's uniform struct. The derive macro
/// generates the logical names, a matching WGSL declaration and the code
/// that writes every field into a [`ParamBlock`].
///
/// # Do Not Implement Manually
///
/// The generated names and WGSL must agree with each other; derive it.
pub trait ParamContract {
    /// Logical parameter names, in field order.
    const NAMES: &'static [&'static str];

    /// `struct Name { ... };` with every parameter, ready to prepend to a
    /// kernel.
    const WGSL_STRUCT: &'static str;

    /// Write every field by name. Names the block's kernel does not declare
    /// are recorded as mismatches and skipped.
    fn write_params(&self, block: &mut ParamBlock);
}

/// Convenient re-exports for common usage.
///
/// # Usage
///
/// ```ignore
/// use swarm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::SimulationConfig;
    pub use crate::control::{Command, ParamUpdate};
    pub use crate::error::SimulationError;
    pub use crate::gpu::camera::{Camera, FlyCamera};
    pub use crate::params::SimulationParameters;
    pub use crate::simulation::Simulation;
    pub use crate::ParamContract;
    pub use glam::{Vec2, Vec3, Vec4};
}
