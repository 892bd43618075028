//! Simulation builder and runner

use std::sync::Arc;

use glam::Vec3;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::config::SimulationConfig;
use crate::error::{GpuError, SimulationError};
use crate::frame::FrameDriver;
use crate::gpu::camera::{Camera, FlyCamera};
use crate::gpu::WgpuDevice;
use crate::params::SimulationParameters;
use crate::time::SystemClock;

#[cfg(feature = "egui")]
use crate::gpu::EguiIntegration;
#[cfg(feature = "egui")]
use crate::panel::ControlPanel;

/// Seconds between window title refreshes.
const TITLE_INTERVAL: f32 = 0.5;

/// A particle swarm builder.
///
/// Use method chaining to configure, then call `.run()` to open a window and
/// loop until it is closed.
///
/// ```ignore
/// Simulation::new()
///     .with_particle_count(500_000)
///     .run()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Set the number of particles.
    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.config = self.config.with_particle_count(count);
        self
    }

    pub fn with_workgroup_size(mut self, size: u32) -> Self {
        self.config = self.config.with_workgroup_size(size);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config = self.config.with_seed(seed);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config = self.config.with_title(title);
        self
    }

    pub fn with_clear_color(mut self, color: Vec3) -> Self {
        self.config = self.config.with_clear_color(color);
        self
    }

    pub fn with_camera(mut self, camera: FlyCamera) -> Self {
        self.config = self.config.with_camera(camera);
        self
    }

    pub fn with_params(mut self, params: SimulationParameters) -> Self {
        self.config = self.config.with_params(params);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run until the window closes or a fatal error occurs.
    pub fn run(self) -> Result<(), SimulationError> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = App {
            config: self.config,
            running: None,
            error: None,
        };
        event_loop.run_app(&mut app)?;

        match app.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Everything that exists once the window is open.
struct Running {
    window: Arc<Window>,
    driver: FrameDriver<WgpuDevice, SystemClock, FlyCamera>,
    last_title_update: f32,
    #[cfg(feature = "egui")]
    egui: EguiIntegration,
    #[cfg(feature = "egui")]
    panel: ControlPanel,
}

struct App {
    config: SimulationConfig,
    running: Option<Running>,
    /// The fatal error that ended the run.
    error: Option<SimulationError>,
}

impl App {
    fn open(&self, event_loop: &ActiveEventLoop) -> Result<Running, SimulationError> {
        let (width, height) = self.config.window_size;
        let window_attrs = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(winit::dpi::LogicalSize::new(width, height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let clear = self.config.clear_color.as_dvec3();
        let device = WgpuDevice::new(
            window.clone(),
            wgpu::Color {
                r: clear.x,
                g: clear.y,
                b: clear.z,
                a: 1.0,
            },
        )?;

        let mut camera = self.config.camera.clone();
        camera.set_aspect(device.aspect());

        #[cfg(feature = "egui")]
        let egui = EguiIntegration::new(device.device(), device.format(), &window);

        let driver = FrameDriver::new(device, &self.config, SystemClock::new(), camera);

        Ok(Running {
            window,
            driver,
            last_title_update: 0.0,
            #[cfg(feature = "egui")]
            egui,
            #[cfg(feature = "egui")]
            panel: ControlPanel::new(self.config.particle_count),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: SimulationError) {
        log::error!("{}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

impl Running {
    #[cfg(feature = "egui")]
    fn frame(&mut self) -> Result<(), SimulationError> {
        let status = self.driver.status();
        let params = *self.driver.params();
        let panel = &mut self.panel;
        let commands = self.driver.commands_mut();
        let output = self
            .egui
            .run(&self.window, |ctx| panel.show(ctx, &status, &params, commands));

        let egui = &mut self.egui;
        self.driver
            .frame_with_overlay(|device| device.paint_overlay(egui, &output))?;
        Ok(())
    }

    #[cfg(not(feature = "egui"))]
    fn frame(&mut self) -> Result<(), SimulationError> {
        self.driver.frame()?;
        Ok(())
    }

    fn update_title(&mut self, title: &str) {
        let elapsed = self.driver.timer().elapsed();
        if elapsed - self.last_title_update < TITLE_INTERVAL {
            return;
        }
        self.last_title_update = elapsed;
        let status = self.driver.status();
        self.window.set_title(&format!(
            "{} | {} particles | {:.0} fps",
            title, status.particle_count, status.fps
        ));
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.open(event_loop) {
            Ok(running) => {
                log::info!("window open, press P to run");
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        #[cfg(feature = "egui")]
        let consumed = running.egui.on_window_event(&running.window, &event);
        #[cfg(not(feature = "egui"))]
        let consumed = false;

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                running
                    .driver
                    .device_mut()
                    .resize_surface(physical_size.width, physical_size.height);
                let aspect = running.driver.device().aspect();
                running.driver.camera_mut().set_aspect(aspect);
            }
            WindowEvent::RedrawRequested => {
                match running.frame() {
                    Ok(()) => {}
                    Err(SimulationError::Gpu(GpuError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    ))) => running.driver.device_mut().reconfigure(),
                    Err(e) if !e.is_fatal() => log::warn!("frame skipped: {}", e),
                    Err(e) => {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                if running.driver.exit_requested() {
                    event_loop.exit();
                    return;
                }
                running.update_title(&self.config.title);
                running.window.request_redraw();
            }
            event => {
                if !consumed {
                    running.driver.input_mut().handle_event(&event);
                }
            }
        }
    }
}
