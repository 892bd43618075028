//! Run configuration.

use glam::Vec3;

use crate::control::KeyBindings;
use crate::driver::DEFAULT_WORKGROUP_SIZE;
use crate::gpu::camera::FlyCamera;
use crate::params::SimulationParameters;
use crate::shader::{KernelSource, KernelStage};

/// Everything a run is configured with.
///
/// Use method chaining to configure:
///
/// ```ignore
/// let config = SimulationConfig::new()
///     .with_particle_count(250_000)
///     .with_seed(42);
/// ```
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub particle_count: u32,
    pub workgroup_size: u32,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub title: String,
    pub window_size: (u32, u32),
    pub clear_color: Vec3,
    pub camera: FlyCamera,
    pub params: SimulationParameters,
    pub key_bindings: KeyBindings,
    update_kernel: Option<String>,
    render_kernel: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: 1_000_000,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            seed: None,
            title: "swarm".to_string(),
            window_size: (1280, 720),
            clear_color: Vec3::splat(0.18),
            camera: FlyCamera::default(),
            params: SimulationParameters::default(),
            key_bindings: KeyBindings::default(),
            update_kernel: None,
            render_kernel: None,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial number of particles.
    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    /// Set the update kernel's workgroup size.
    pub fn with_workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = size.max(1);
        self
    }

    /// Make seeding reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    pub fn with_clear_color(mut self, color: Vec3) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the initial camera pose and projection.
    pub fn with_camera(mut self, camera: FlyCamera) -> Self {
        self.camera = camera;
        self
    }

    /// Set the initial simulation parameters.
    pub fn with_params(mut self, params: SimulationParameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_key_bindings(mut self, bindings: KeyBindings) -> Self {
        self.key_bindings = bindings;
        self
    }

    /// Replace the update kernel with custom WGSL.
    ///
    /// It must declare `@compute fn main`, read the particle buffers at
    /// bindings 0-2 and its parameters at binding 3.
    pub fn with_update_kernel(mut self, wgsl: impl Into<String>) -> Self {
        self.update_kernel = Some(wgsl.into());
        self
    }

    /// Replace the render kernel with custom WGSL.
    pub fn with_render_kernel(mut self, wgsl: impl Into<String>) -> Self {
        self.render_kernel = Some(wgsl.into());
        self
    }

    pub fn update_source(&self) -> KernelSource {
        match &self.update_kernel {
            Some(wgsl) => KernelSource::custom("Update Kernel", KernelStage::Update, wgsl.as_str()),
            None => KernelSource::update(self.workgroup_size),
        }
    }

    pub fn render_source(&self) -> KernelSource {
        match &self.render_kernel {
            Some(wgsl) => KernelSource::custom("Render Kernel", KernelStage::Render, wgsl.as_str()),
            None => KernelSource::render(),
        }
    }
}
