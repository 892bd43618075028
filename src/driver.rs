//! The simulation state machine.
//!
//! [`SimulationDriver`] is either stopped or running. Each tick while running
//! advances simulated time, derives the attractor positions and gradient
//! colors from [`SimulationParameters`], uploads them to the update kernel,
//! dispatches it over every particle and then issues the memory barrier that
//! makes the writes visible to the render pass.

use rand::Rng;

use crate::error::SimulationError;
use crate::gpu::{GpuDevice, Program};
use crate::params::SimulationParameters;
use crate::sampler::UniformBallSampler;
use crate::shader::KernelSource;
use crate::store::{check_workgroups, ParticleStateStore};
use crate::time::SimulatedClock;
use crate::uniforms::{ParamBlock, ParamLayout, ParamMismatch, UpdateParams};

/// Default invocations per update workgroup.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Stopped: nothing was uploaded, dispatched or advanced.
    Idle,
    Dispatched { workgroups: u32 },
}

/// Device bindings and the store generation they were made against.
#[derive(Debug)]
pub(crate) struct Bound<B> {
    pub generation: u64,
    pub bindings: B,
}

impl<B> Bound<B> {
    /// The bindings, if they still refer to the store's current buffers.
    pub fn current<'a, S>(
        bound: Option<&'a Self>,
        store: &ParticleStateStore<S>,
    ) -> Result<&'a B, SimulationError> {
        match bound {
            Some(bound) if bound.generation == store.generation() => Ok(&bound.bindings),
            _ => Err(SimulationError::StaleBindings),
        }
    }
}

/// Block for a compiled program, or an empty one when compilation failed.
pub(crate) fn param_block<K>(program: &Program<K>) -> ParamBlock {
    match program {
        Program::Ready { label, layout, .. } => ParamBlock::new(label.clone(), layout.clone()),
        Program::Invalid { label, .. } => ParamBlock::new(label.clone(), ParamLayout::default()),
    }
}

/// See the module docs.
pub struct SimulationDriver<D: GpuDevice> {
    state: RunState,
    clock: SimulatedClock,
    program: Program<D::Kernel>,
    params: ParamBlock,
    bound: Option<Bound<D::Bindings>>,
    workgroup_size: u32,
}

impl<D: GpuDevice> SimulationDriver<D> {
    /// Compile `source`, whose `@workgroup_size` must be `workgroup_size`.
    ///
    /// A kernel that fails to compile leaves the driver holding an invalid
    /// program; the first running tick then fails fatally.
    pub fn new(device: &mut D, source: &KernelSource, workgroup_size: u32) -> Self {
        let program = Program::compile(device, source);
        let params = param_block(&program);
        Self {
            state: RunState::Stopped,
            clock: SimulatedClock::new(),
            program,
            params,
            bound: None,
            workgroup_size: workgroup_size.max(1),
        }
    }

    pub fn start(&mut self) {
        if self.state != RunState::Running {
            log::info!("simulation running");
        }
        self.state = RunState::Running;
    }

    pub fn stop(&mut self) {
        if self.state != RunState::Stopped {
            log::info!("simulation stopped at t={:.3}", self.clock.sim_time());
        }
        self.state = RunState::Stopped;
    }

    pub fn toggle(&mut self) {
        match self.state {
            RunState::Stopped => self.start(),
            RunState::Running => self.stop(),
        }
    }

    /// Negate `sim_speed`. The run state is unchanged.
    pub fn reverse(&self, params: &mut SimulationParameters) {
        params.sim_speed = -params.sim_speed;
        log::info!("time reversed, sim speed {}", params.sim_speed);
    }

    /// Reseed every particle. Neither the run state nor `sim_time` changes.
    pub fn restart<R: Rng + ?Sized>(
        &self,
        device: &mut D,
        store: &mut ParticleStateStore<D::Buffer>,
        sampler: &UniformBallSampler,
        rng: &mut R,
    ) -> Result<(), SimulationError> {
        log::info!("restarting {} particles", store.count());
        store.seed(device, sampler, rng)
    }

    /// Bind the store's current buffers to the update kernel.
    ///
    /// Required after every allocation. Does nothing for an invalid program.
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

    /// Advance one step.
    ///
    /// `real_delta` is wall-clock seconds since the last tick and drives
    /// simulated time; `wall_clock` is total wall-clock seconds and drives
    /// the color drift.
    pub fn tick(
        &mut self,
        device: &mut D,
        store: &ParticleStateStore<D::Buffer>,
        params: &SimulationParameters,
        real_delta: f32,
        wall_clock: f32,
    ) -> Result<Tick, SimulationError> {
        if self.state == RunState::Stopped {
            return Ok(Tick::Idle);
        }

        let (kernel, _) = self.program.ready()?;
        if !store.is_allocated() {
            return Err(SimulationError::Unallocated);
        }
        let bindings = Bound::current(self.bound.as_ref(), store)?;
        let workgroups = check_workgroups(device, store.count(), self.workgroup_size)?;

        let delta_time = self.clock.advance(real_delta, params.sim_speed);
        let (attractor1_position, attractor2_position) =
            params.attractors.positions(self.clock.sim_time());
        let (gradient_start_color, gradient_end_color) = params.gradient.endpoints(wall_clock);

        self.params.write(&UpdateParams {
            delta_time,
            sphere_enabled: params.sphere.enabled,
            attractor1_position,
            attractor2_position,
            attractor_gravity: params.attractors.gravity,
            bounding_sphere: params.sphere.packed(),
            floor_y: params.floor.y,
            floor_enabled: params.floor.enabled,
            gradient_start_color,
            gradient_end_color,
            color_scale: params.gradient.scale,
        });
        device.upload_params(kernel, self.params.bytes());

        device.dispatch(kernel, bindings, workgroups);
        // Nothing may read the particle buffers before this.
        device.memory_barrier();

        log::debug!(
            "tick: dt={:.4} sim_time={:.3} workgroups={}",
            delta_time,
            self.clock.sim_time(),
            workgroups
        );
        Ok(Tick::Dispatched { workgroups })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn sim_time(&self) -> f32 {
        self.clock.sim_time()
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    pub fn program(&self) -> &Program<D::Kernel> {
        &self.program
    }

    /// Parameter names the update kernel did not accept.
    pub fn mismatches(&self) -> &[ParamMismatch] {
        self.params.mismatches()
    }

    /// The parameter bytes last uploaded.
    pub fn param_block(&self) -> &ParamBlock {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocationError;
    use crate::gpu::{Op, RecordingDevice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup(count: u32) -> (
        RecordingDevice,
        ParticleStateStore<crate::gpu::RecordedBuffer>,
        SimulationDriver<RecordingDevice>,
    ) {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(11);
        store
            .resize(&mut device, count, &UniformBallSampler, &mut rng)
            .unwrap();
        let mut driver = SimulationDriver::new(&mut device, &KernelSource::update(256), 256);
        driver.bind(&mut device, &store).unwrap();
        device.take_ops();
        (device, store, driver)
    }

    #[test]
    fn test_starts_stopped() {
        let (_, _, driver) = setup(4);
        assert_eq!(driver.state(), RunState::Stopped);
    }

    #[test]
    fn test_stopped_tick_is_idle() {
        let (mut device, store, mut driver) = setup(4);
        let params = SimulationParameters::default();
        for _ in 0..10 {
            assert_eq!(
                driver.tick(&mut device, &store, &params, 0.5, 0.0).unwrap(),
                Tick::Idle
            );
        }
        assert_eq!(driver.sim_time(), 0.0);
        assert!(device.ops().is_empty());
    }

    #[test]
    fn test_tick_uploads_dispatches_then_barriers() {
        let (mut device, store, mut driver) = setup(1000);
        let params = SimulationParameters::default();
        driver.start();
        let tick = driver.tick(&mut device, &store, &params, 0.1, 0.0).unwrap();
        assert_eq!(tick, Tick::Dispatched { workgroups: 4 });

        let ops = device.ops();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], Op::UploadParams { .. }));
        assert!(matches!(ops[1], Op::Dispatch { workgroups: 4, .. }));
        assert_eq!(ops[2], Op::MemoryBarrier);
    }

    #[test]
    fn test_upload_carries_sim_delta() {
        let (mut device, store, mut driver) = setup(8);
        let mut params = SimulationParameters::default();
        params.sim_speed = 2.0;
        driver.start();
        driver.tick(&mut device, &store, &params, 0.25, 0.0).unwrap();
        assert_eq!(driver.param_block().get_f32("deltaTime"), Some(0.5));
        assert_eq!(driver.param_block().get_f32("colorScale"), Some(params.gradient.scale));
        assert!(driver.mismatches().is_empty());
    }

    #[test]
    fn test_reverse_keeps_state() {
        let (_, _, mut driver) = setup(4);
        let mut params = SimulationParameters::default();
        driver.start();
        driver.reverse(&mut params);
        assert_eq!(params.sim_speed, -1.0);
        assert!(driver.is_running());
    }

    #[test]
    fn test_stale_bindings_are_refused() {
        let (mut device, mut store, mut driver) = setup(4);
        let mut rng = StdRng::seed_from_u64(2);
        store
            .resize(&mut device, 8, &UniformBallSampler, &mut rng)
            .unwrap();
        driver.start();
        let params = SimulationParameters::default();
        assert!(matches!(
            driver.tick(&mut device, &store, &params, 0.1, 0.0),
            Err(SimulationError::StaleBindings)
        ));
        assert_eq!(driver.sim_time(), 0.0);

        driver.bind(&mut device, &store).unwrap();
        assert!(driver.tick(&mut device, &store, &params, 0.1, 0.0).is_ok());
    }

    #[test]
    fn test_bound_follows_store_generation() {
        let (mut device, mut store, _) = setup(4);
        let bound = Bound {
            generation: store.generation(),
            bindings: "bindings",
        };
        assert_eq!(Bound::current(Some(&bound), &store).ok(), Some(&"bindings"));
        assert!(matches!(
            Bound::<&str>::current(None, &store),
            Err(SimulationError::StaleBindings)
        ));

        let mut rng = StdRng::seed_from_u64(4);
        store
            .resize(&mut device, 4, &UniformBallSampler, &mut rng)
            .unwrap();
        assert!(matches!(
            Bound::current(Some(&bound), &store),
            Err(SimulationError::StaleBindings)
        ));
    }

    #[test]
    fn test_oversized_dispatch_is_refused() {
        // Store sized for 256-wide groups, kernel running 64-wide ones.
        let mut device = RecordingDevice::new().with_max_workgroups(4);
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(6);
        store
            .resize(&mut device, 1000, &UniformBallSampler, &mut rng)
            .unwrap();
        let mut driver = SimulationDriver::new(&mut device, &KernelSource::update(64), 64);
        driver.bind(&mut device, &store).unwrap();
        device.take_ops();

        driver.start();
        let err = driver
            .tick(&mut device, &store, &SimulationParameters::default(), 0.1, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Allocation(AllocationError::TooManyWorkgroups {
                workgroups: 16,
                limit: 4,
                ..
            })
        ));
        assert!(!err.is_fatal());
        assert!(device.ops().is_empty());
        assert_eq!(driver.sim_time(), 0.0);
    }
}
