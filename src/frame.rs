//! The per-frame loop body.
//!
//! [`FrameDriver`] owns everything a running simulation needs and runs one
//! frame at a time, in a fixed order:
//!
//! 1. read the wall clock
//! 2. turn key presses into commands and apply every queued command
//! 3. tick the simulation (upload, dispatch, barrier)
//! 4. draw the particles, then any overlay, and present
//!
//! It is generic over the device, the time source and the camera, so the
//! whole loop runs headless against a [`RecordingDevice`](crate::gpu::RecordingDevice)
//! and a [`ManualClock`](crate::time::ManualClock).

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SimulationConfig;
use crate::control::{Command, CommandQueue, KeyBindings};
use crate::driver::{RunState, SimulationDriver, Tick};
use crate::error::{AllocationError, SimulationError};
use crate::gpu::camera::Camera;
use crate::gpu::GpuDevice;
use crate::input::Input;
use crate::params::SimulationParameters;
use crate::render::RenderDriver;
use crate::sampler::UniformBallSampler;
use crate::store::ParticleStateStore;
use crate::time::{FrameTimer, TimeSource};

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Wall-clock seconds since the driver was created.
    pub elapsed: f32,
    /// Wall-clock seconds since the previous frame.
    pub delta: f32,
    pub sim_time: f32,
    /// `None` when the tick was skipped.
    pub tick: Option<Tick>,
    pub drawn: bool,
}

/// A snapshot for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStatus {
    pub state: RunState,
    pub sim_time: f32,
    pub particle_count: u32,
    pub fps: f32,
    pub camera_input: bool,
    pub last_error: Option<String>,
    /// Parameter names either kernel did not accept.
    pub mismatches: Vec<String>,
}

/// See the module docs.
pub struct FrameDriver<D: GpuDevice, T: TimeSource, C: Camera> {
    device: D,
    store: ParticleStateStore<D::Buffer>,
    simulation: SimulationDriver<D>,
    render: RenderDriver<D>,
    params: SimulationParameters,
    camera: C,
    timer: FrameTimer<T>,
    commands: CommandQueue,
    input: Input,
    key_bindings: KeyBindings,
    sampler: UniformBallSampler,
    rng: StdRng,
    last_error: Option<AllocationError>,
    /// Set once the skipped-frame warning has been logged, cleared on reallocation.
    skip_warned: bool,
    exit_requested: bool,
}

impl<D: GpuDevice, T: TimeSource, C: Camera> FrameDriver<D, T, C> {
    /// Compile both kernels, allocate and seed the configured particle count
    /// and bind everything.
    ///
    /// A failed allocation is not an error here: the driver starts with an
    /// empty store, reports the failure through [`last_error`](Self::last_error)
    /// and skips ticks and draws until a later resize succeeds.
    pub fn new(mut device: D, config: &SimulationConfig, time: T, camera: C) -> Self {
        let simulation =
            SimulationDriver::new(&mut device, &config.update_source(), config.workgroup_size);
        let render = RenderDriver::new(&mut device, &config.render_source());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut driver = Self {
            device,
            store: ParticleStateStore::new().with_workgroup_size(config.workgroup_size),
            simulation,
            render,
            params: config.params,
            camera,
            timer: FrameTimer::new(time),
            commands: CommandQueue::new(),
            input: Input::new(),
            key_bindings: config.key_bindings.clone(),
            sampler: UniformBallSampler,
            rng,
            last_error: None,
            skip_warned: false,
            exit_requested: false,
        };
        if let Err(e) = driver.set_particle_count(config.particle_count) {
            log::error!("initial binding failed: {}", e);
        }
        driver
    }

    /// Run one frame.
    pub fn frame(&mut self) -> Result<FrameReport, SimulationError> {
        self.frame_with_overlay(|_| {})
    }

    /// Run one frame, calling `overlay` after the particles are drawn and
    /// before the frame is presented.
    ///
    /// Fatal errors are returned; the caller should stop the loop. Anything
    /// else is logged and the affected step skipped.
    pub fn frame_with_overlay(
        &mut self,
        overlay: impl FnOnce(&mut D),
    ) -> Result<FrameReport, SimulationError> {
        let (elapsed, delta) = self.timer.update();

        self.key_bindings.collect(&self.input, &mut self.commands);
        let pending: Vec<Command> = self.commands.drain().collect();
        for command in pending {
            self.apply(command)?;
        }
        self.camera.feed(&self.input);
        self.input.begin_frame();

        let tick = match self
            .simulation
            .tick(&mut self.device, &self.store, &self.params, delta, elapsed)
        {
            Ok(tick) => Some(tick),
            Err(e) => {
                self.skip(e)?;
                None
            }
        };

        self.device.begin_frame()?;
        let drawn = self.render.draw(
            &mut self.device,
            &self.store,
            &mut self.camera,
            &self.params,
            delta,
        );
        overlay(&mut self.device);
        self.device.end_frame();

        let drawn = match drawn {
            Ok(()) => true,
            Err(e) => {
                self.skip(e)?;
                false
            }
        };

        Ok(FrameReport {
            elapsed,
            delta,
            sim_time: self.simulation.sim_time(),
            tick,
            drawn,
        })
    }

    /// Log a non-fatal error once per allocation; pass fatal ones through.
    fn skip(&mut self, error: SimulationError) -> Result<(), SimulationError> {
        if error.is_fatal() {
            log::error!("{}", error);
            return Err(error);
        }
        if !self.skip_warned {
            log::warn!("skipping frame work: {}", error);
            self.skip_warned = true;
        }
        Ok(())
    }

    /// Apply one command immediately.
    pub fn apply(&mut self, command: Command) -> Result<(), SimulationError> {
        log::debug!("command: {:?}", command);
        match command {
            Command::Start => self.simulation.start(),
            Command::Stop => self.simulation.stop(),
            Command::ToggleRunning => self.simulation.toggle(),
            Command::ReverseTime => self.simulation.reverse(&mut self.params),
            Command::Restart => {
                let restarted = self.simulation.restart(
                    &mut self.device,
                    &mut self.store,
                    &self.sampler,
                    &mut self.rng,
                );
                if let Err(e) = restarted {
                    log::warn!("restart ignored: {}", e);
                }
            }
            Command::SetParticleCount(count) => self.set_particle_count(count)?,
            Command::Set(update) => self.params.apply(update),
            Command::SetCameraInput(true) => self.camera.enable_input(),
            Command::SetCameraInput(false) => self.camera.disable_input(),
            Command::ToggleCameraInput => {
                if self.camera.input_enabled() {
                    self.camera.disable_input();
                } else {
                    self.camera.enable_input();
                }
            }
            Command::Exit => {
                log::info!("exit requested");
                self.exit_requested = true;
            }
        }
        Ok(())
    }

    /// Reallocate for `count` particles, reseed and rebind both kernels.
    ///
    /// The old buffers are released first. If the new allocation fails the
    /// store stays empty and the failure is kept in
    /// [`last_error`](Self::last_error).
    pub fn set_particle_count(&mut self, count: u32) -> Result<(), SimulationError> {
        match self
            .store
            .resize(&mut self.device, count, &self.sampler, &mut self.rng)
        {
            Ok(()) => {
                self.last_error = None;
                self.skip_warned = false;
                self.simulation.bind(&mut self.device, &self.store)?;
                self.render.bind(&mut self.device, &self.store)?;
            }
            Err(e) => self.last_error = Some(e),
        }
        Ok(())
    }

    pub fn status(&self) -> FrameStatus {
        let mismatches = self
            .simulation
            .mismatches()
            .iter()
            .chain(self.render.mismatches())
            .map(|m| m.to_string())
            .collect();
        FrameStatus {
            state: self.simulation.state(),
            sim_time: self.simulation.sim_time(),
            particle_count: self.store.count(),
            fps: self.timer.fps(),
            camera_input: self.camera.input_enabled(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
            mismatches,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn store(&self) -> &ParticleStateStore<D::Buffer> {
        &self.store
    }

    /// Read-only view of the particle store plus the device to read it with.
    pub fn store_and_device(&mut self) -> (&ParticleStateStore<D::Buffer>, &mut D) {
        (&self.store, &mut self.device)
    }

    pub fn simulation(&self) -> &SimulationDriver<D> {
        &self.simulation
    }

    pub fn render_driver(&self) -> &RenderDriver<D> {
        &self.render
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn commands_mut(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut Input {
        &mut self.input
    }

    pub fn timer(&self) -> &FrameTimer<T> {
        &self.timer
    }

    /// The most recent allocation failure, cleared by the next success.
    pub fn last_error(&self) -> Option<&AllocationError> {
        self.last_error.as_ref()
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}
