//! Drawing the particles.

use crate::driver::{param_block, Bound};
use crate::error::SimulationError;
use crate::gpu::camera::Camera;
use crate::gpu::{GpuDevice, Program};
use crate::params::SimulationParameters;
use crate::shader::KernelSource;
use crate::store::ParticleStateStore;
use crate::uniforms::{ParamBlock, ParamMismatch, RenderParams};

/// Draws every particle as a camera-facing point.
///
/// Points are not depth-sorted, so overlapping translucent particles blend in
/// buffer order.
pub struct RenderDriver<D: GpuDevice> {
    program: Program<D::Kernel>,
    params: ParamBlock,
    bound: Option<Bound<D::Bindings>>,
}

impl<D: GpuDevice> RenderDriver<D> {
    pub fn new(device: &mut D, source: &KernelSource) -> Self {
        let program = Program::compile(device, source);
        let params = param_block(&program);
        Self {
            program,
            params,
            bound: None,
        }
    }

    /// Bind the store's current buffers. Required after every allocation.
    pub fn bind(&mut self, device: &mut D, store: &ParticleStateStore<D::Buffer>) -> Result<(), SimulationError> {
        let Program::Ready { kernel, .. } = &self.program else {
            return Ok(());
        };
        let buffers = store.buffers().ok_or(SimulationError::Unallocated)?;
        self.bound = Some(Bound {
            generation: store.generation(),
            bindings: device.bind(kernel, buffers),
        });
        Ok(())
    }

    /// Draw every particle into the current frame.
    ///
    /// The camera is updated first, by `dt` wall-clock seconds, but only while
    /// it accepts input.
    pub fn draw<C: Camera + ?Sized>(
        &mut self,
        device: &mut D,
        store: &ParticleStateStore<D::Buffer>,
        camera: &mut C,
        params: &SimulationParameters,
        dt: f32,
    ) -> Result<(), SimulationError> {
        let (kernel, _) = self.program.ready()?;

        if camera.input_enabled() {
            camera.update(dt);
        }

        let buffers = store.buffers().ok_or(SimulationError::Unallocated)?;
        let bindings = Bound::current(self.bound.as_ref(), store)?;

        self.params.write(&RenderParams {
            view_matrix: camera.view_matrix(),
            projection_matrix: camera.projection_matrix(),
            particle_size: params.particle_size,
        });
        device.upload_params(kernel, self.params.bytes());
        device.draw_points(kernel, bindings, buffers, store.count())?;
        Ok(())
    }

    pub fn program(&self) -> &Program<D::Kernel> {
        &self.program
    }

    /// Parameter names the render kernel did not accept.
    pub fn mismatches(&self) -> &[ParamMismatch] {
        self.params.mismatches()
    }

    pub fn param_block(&self) -> &ParamBlock {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::camera::FlyCamera;
    use crate::gpu::{Op, RecordingDevice};
    use crate::sampler::UniformBallSampler;
    use glam::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_draw_issues_one_point_per_particle() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        store
            .resize(&mut device, 16, &UniformBallSampler, &mut rng)
            .unwrap();
        let mut render = RenderDriver::new(&mut device, &KernelSource::render());
        render.bind(&mut device, &store).unwrap();
        device.take_ops();

        let mut camera = FlyCamera::default();
        device.begin_frame().unwrap();
        render
            .draw(&mut device, &store, &mut camera, &SimulationParameters::default(), 0.016)
            .unwrap();

        let ops = device.ops();
        assert!(matches!(ops[1], Op::UploadParams { .. }));
        assert!(matches!(ops[2], Op::Draw { count: 16, .. }));
        assert!(render.mismatches().is_empty());
    }

    #[test]
    fn test_camera_frozen_while_input_disabled() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        store
            .resize(&mut device, 4, &UniformBallSampler, &mut rng)
            .unwrap();
        let mut render = RenderDriver::new(&mut device, &KernelSource::render());
        render.bind(&mut device, &store).unwrap();

        let mut camera = FlyCamera::default();
        let mut input = crate::input::Input::new();
        input.press_key(crate::input::KeyCode::W);
        camera.feed(&input);
        camera.disable_input();
        camera.feed(&input);

        device.begin_frame().unwrap();
        render
            .draw(&mut device, &store, &mut camera, &SimulationParameters::default(), 1.0)
            .unwrap();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, -15.0));
    }
}
