//! The device seam between host orchestration and the GPU.
//!
//! Everything above this module (store, drivers, frame loop) talks to a
//! [`GpuDevice`]. Two implementations ship:
//!
//! - [`WgpuDevice`] renders to a window through wgpu.
//! - [`RecordingDevice`] keeps buffers in host memory and records every
//!   command, so orchestration can be tested without a GPU.
//!
//! Resource ownership follows wgpu: each buffer and kernel has exactly one
//! owner, and dropping the owner releases the resource.

pub mod camera;
#[cfg(feature = "egui")]
mod egui_integration;
mod program;
mod recording;
mod wgpu_device;

#[cfg(feature = "egui")]
pub use egui_integration::{EguiFrameOutput, EguiIntegration};
pub use program::Program;
pub use recording::{Op, RecordedBindings, RecordedBuffer, RecordedKernel, RecordingDevice};
pub use wgpu_device::{WgpuBindings, WgpuBuffer, WgpuDevice, WgpuKernel};

use crate::error::{AllocationError, GpuError, KernelError};
use crate::shader::KernelSource;
use crate::uniforms::ParamLayout;

/// Binding slots of the three particle buffers, shared by both kernels.
pub const POSITION_SLOT: u32 = 0;
pub const VELOCITY_SLOT: u32 = 1;
pub const COLOR_SLOT: u32 = 2;
/// Binding slot of the update kernel's parameter struct.
pub const UPDATE_PARAMS_SLOT: u32 = 3;
/// Binding slot of the render kernel's parameter struct.
pub const RENDER_PARAMS_SLOT: u32 = 0;

/// The three equal-length per-particle buffers.
#[derive(Debug)]
pub struct ParticleBuffers<B> {
    pub position: B,
    pub velocity: B,
    pub color: B,
}

/// Operations the orchestration layer needs from a GPU.
///
/// Commands are issued synchronously from one host thread; the device may
/// execute them asynchronously, in submission order.
pub trait GpuDevice {
    /// An owned device buffer. Dropping it releases device memory.
    type Buffer;
    /// A compiled kernel (compute or render program).
    type Kernel;
    /// A kernel bound to one generation of particle buffers.
    type Bindings;

    /// Allocate a zero-initialized storage/vertex buffer of `size` bytes.
    fn create_buffer(&mut self, label: &str, size: u64) -> Result<Self::Buffer, AllocationError>;

    /// Queue a write of `data` at the start of `buffer`.
    fn write_buffer(&mut self, buffer: &Self::Buffer, data: &[u8]);

    /// Copy a buffer back to the host, waiting for the device to finish.
    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<u8>, GpuError>;

    /// Build a kernel from validated source. `layout` sizes its parameter buffer.
    fn compile(
        &mut self,
        source: &KernelSource,
        layout: &ParamLayout,
    ) -> Result<Self::Kernel, KernelError>;

    /// Bind the particle buffers to a kernel's fixed slots.
    fn bind(
        &mut self,
        kernel: &Self::Kernel,
        buffers: &ParticleBuffers<Self::Buffer>,
    ) -> Self::Bindings;

    /// Replace a kernel's parameter struct.
    fn upload_params(&mut self, kernel: &Self::Kernel, params: &[u8]);

    /// Most workgroups a single dispatch may launch.
    fn max_workgroups(&self) -> u32;

    /// Run a compute kernel over `workgroups` groups.
    fn dispatch(&mut self, kernel: &Self::Kernel, bindings: &Self::Bindings, workgroups: u32);

    /// Make every buffer write issued so far visible to every command issued
    /// after this call.
    fn memory_barrier(&mut self);

    /// Acquire the target the next draws render into.
    fn begin_frame(&mut self) -> Result<(), GpuError>;

    /// Draw `count` particles as camera-facing points.
    fn draw_points(
        &mut self,
        kernel: &Self::Kernel,
        bindings: &Self::Bindings,
        buffers: &ParticleBuffers<Self::Buffer>,
        count: u32,
    ) -> Result<(), GpuError>;

    /// Submit outstanding work and present the frame.
    fn end_frame(&mut self);
}
