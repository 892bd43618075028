//! Error types for swarm.
//!
//! GPU setup failures, buffer allocation failures (recoverable), kernel
//! compilation failures, and the errors the frame loop can surface.

use std::fmt;

/// Errors that can occur while talking to the GPU.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
    /// Failed to acquire the next surface texture.
    Surface(wgpu::SurfaceError),
    /// The surface reports no usable texture format.
    UnsupportedSurface,
    /// A draw was issued outside of `begin_frame` / `end_frame`.
    NoFrame,
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::Surface(e) => write!(f, "Failed to acquire surface texture: {}", e),
            GpuError::UnsupportedSurface => write!(f, "The window surface supports no texture format"),
            GpuError::NoFrame => write!(f, "Draw issued with no frame in flight"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            GpuError::Surface(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

impl From<wgpu::SurfaceError> for GpuError {
    fn from(e: wgpu::SurfaceError) -> Self {
        GpuError::Surface(e)
    }
}

/// Particle buffers could not be allocated.
///
/// Always recoverable: the operator can retry with a smaller particle count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// A particle count of zero was requested.
    ZeroParticles,
    /// The requested size exceeds what the device allows for a single buffer.
    TooLarge { requested: u64, limit: u64 },
    /// The device ran out of memory while creating a buffer.
    OutOfMemory { label: String, requested: u64 },
    /// Updating this many particles takes more workgroups than one dispatch
    /// allows.
    TooManyWorkgroups { particles: u32, workgroups: u32, limit: u32 },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::ZeroParticles => write!(f, "Particle count must be at least 1"),
            AllocationError::TooLarge { requested, limit } => write!(
                f,
                "Requested {} bytes per buffer, device limit is {} bytes",
                requested, limit
            ),
            AllocationError::OutOfMemory { label, requested } => write!(
                f,
                "Out of device memory allocating {} ({} bytes)",
                label, requested
            ),
            AllocationError::TooManyWorkgroups {
                particles,
                workgroups,
                limit,
            } => write!(
                f,
                "{} particles need {} workgroups per dispatch, device limit is {}",
                particles, workgroups, limit
            ),
        }
    }
}

impl std::error::Error for AllocationError {}

/// A kernel failed to compile or link.
#[derive(Debug, Clone)]
pub enum KernelError {
    /// WGSL did not parse.
    Parse { label: String, diagnostics: String },
    /// WGSL parsed but failed validation.
    Validation { label: String, diagnostics: String },
    /// The device rejected the shader module or pipeline.
    Pipeline { label: String, message: String },
}

impl KernelError {
    /// Label of the kernel that failed.
    pub fn label(&self) -> &str {
        match self {
            KernelError::Parse { label, .. }
            | KernelError::Validation { label, .. }
            | KernelError::Pipeline { label, .. } => label,
        }
    }

    /// Diagnostic text suitable for showing to the operator.
    pub fn diagnostics(&self) -> &str {
        match self {
            KernelError::Parse { diagnostics, .. } | KernelError::Validation { diagnostics, .. } => {
                diagnostics
            }
            KernelError::Pipeline { message, .. } => message,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Parse { label, diagnostics } => {
                write!(f, "{} failed to parse:\n{}", label, diagnostics)
            }
            KernelError::Validation { label, diagnostics } => {
                write!(f, "{} failed validation:\n{}", label, diagnostics)
            }
            KernelError::Pipeline { label, message } => {
                write!(f, "{} pipeline creation failed: {}", label, message)
            }
        }
    }
}

impl std::error::Error for KernelError {}

/// Errors that can occur when running a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// Failed to create event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
    /// GPU initialization or frame acquisition failed.
    Gpu(GpuError),
    /// A dispatch or draw was attempted with a kernel that failed to compile.
    ///
    /// Fatal for the run; the kernel source has to be fixed and the process
    /// restarted.
    InvalidProgram { label: String, diagnostics: String },
    /// The particle store cannot be updated by the current device.
    Allocation(AllocationError),
    /// Particle buffers were used before they were allocated.
    Unallocated,
    /// Bindings refer to buffers from before the last resize.
    StaleBindings,
}

impl SimulationError {
    /// Whether the frame loop must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            SimulationError::Unallocated | SimulationError::Allocation(_) => false,
            // A lost or outdated surface is reconfigured and the frame retried.
            SimulationError::Gpu(GpuError::Surface(e)) => {
                matches!(e, wgpu::SurfaceError::OutOfMemory)
            }
            _ => true,
        }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            SimulationError::Window(e) => write!(f, "Failed to create window: {}", e),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
            SimulationError::InvalidProgram { label, diagnostics } => write!(
                f,
                "{} is not a valid program; fix the kernel source and restart:\n{}",
                label, diagnostics
            ),
            SimulationError::Allocation(e) => write!(f, "Particle store: {}", e),
            SimulationError::Unallocated => write!(f, "Particle buffers are not allocated"),
            SimulationError::StaleBindings => {
                write!(f, "Kernel bindings are stale; re-bind after resizing the particle store")
            }
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::EventLoop(e) => Some(e),
            SimulationError::Window(e) => Some(e),
            SimulationError::Gpu(e) => Some(e),
            SimulationError::Allocation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<winit::error::EventLoopError> for SimulationError {
    fn from(e: winit::error::EventLoopError) -> Self {
        SimulationError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for SimulationError {
    fn from(e: winit::error::OsError) -> Self {
        SimulationError::Window(e)
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

impl From<AllocationError> for SimulationError {
    fn from(e: AllocationError) -> Self {
        SimulationError::Allocation(e)
    }
}
