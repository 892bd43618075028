//! A GPU-free device that records commands.
//!
//! Buffers live in host memory and every command is appended to a log of
//! [`Op`]s. Kernels are never executed, so buffer contents only change
//! through `write_buffer`. This is what the orchestration tests and the
//! seeding benchmark run against.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{GpuDevice, ParticleBuffers};
use crate::error::{AllocationError, GpuError, KernelError};
use crate::shader::{KernelSource, KernelStage};
use crate::uniforms::ParamLayout;

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    CreateBuffer { id: usize, label: String, size: u64 },
    DestroyBuffer { id: usize },
    WriteBuffer { id: usize, len: usize },
    Compile { kernel: usize, label: String, stage: KernelStage },
    Bind { kernel: usize, buffers: [usize; 3] },
    UploadParams { kernel: usize, bytes: Vec<u8> },
    Dispatch { kernel: usize, workgroups: u32, buffers: [usize; 3] },
    MemoryBarrier,
    BeginFrame,
    Draw { kernel: usize, count: u32, buffers: [usize; 3] },
    EndFrame,
}

#[derive(Debug, Default)]
struct Ledger {
    ops: Vec<Op>,
    buffers: HashMap<usize, Vec<u8>>,
    next_buffer: usize,
    live_bytes: u64,
}

/// Owned host-memory buffer. Dropping it records a release.
#[derive(Debug)]
pub struct RecordedBuffer {
    id: usize,
    size: u64,
    ledger: Rc<RefCell<Ledger>>,
}

impl RecordedBuffer {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for RecordedBuffer {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.buffers.remove(&self.id);
        ledger.live_bytes -= self.size;
        ledger.ops.push(Op::DestroyBuffer { id: self.id });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedKernel {
    pub id: usize,
    pub label: String,
    pub stage: KernelStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBindings {
    pub kernel: usize,
    pub buffers: [usize; 3],
}

/// See the module docs.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    ledger: Rc<RefCell<Ledger>>,
    memory_limit: Option<u64>,
    max_workgroups: Option<u32>,
    next_kernel: usize,
    in_frame: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail allocations that would take live buffer memory past `bytes`.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Cap dispatches at `groups` workgroups instead of the wgpu default.
    pub fn with_max_workgroups(mut self, groups: u32) -> Self {
        self.max_workgroups = Some(groups);
        self
    }

    /// Every command recorded so far.
    pub fn ops(&self) -> Vec<Op> {
        self.ledger.borrow().ops.clone()
    }

    /// Return and forget the recorded commands.
    pub fn take_ops(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.ledger.borrow_mut().ops)
    }

    /// Number of buffers currently alive.
    pub fn live_buffers(&self) -> usize {
        self.ledger.borrow().buffers.len()
    }

    pub fn live_bytes(&self) -> u64 {
        self.ledger.borrow().live_bytes
    }

    /// Host copy of a buffer's current contents.
    pub fn contents(&self, buffer: &RecordedBuffer) -> Vec<u8> {
        self.ledger
            .borrow()
            .buffers
            .get(&buffer.id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, op: Op) {
        self.ledger.borrow_mut().ops.push(op);
    }
}

fn ids(buffers: &ParticleBuffers<RecordedBuffer>) -> [usize; 3] {
    [buffers.position.id, buffers.velocity.id, buffers.color.id]
}

impl GpuDevice for RecordingDevice {
    type Buffer = RecordedBuffer;
    type Kernel = RecordedKernel;
    type Bindings = RecordedBindings;

    fn create_buffer(&mut self, label: &str, size: u64) -> Result<RecordedBuffer, AllocationError> {
        let mut ledger = self.ledger.borrow_mut();
        if let Some(limit) = self.memory_limit {
            if ledger.live_bytes + size > limit {
                return Err(AllocationError::OutOfMemory {
                    label: label.to_string(),
                    requested: size,
                });
            }
        }
        let len = usize::try_from(size).map_err(|_| AllocationError::TooLarge {
            requested: size,
            limit: usize::MAX as u64,
        })?;

        let id = ledger.next_buffer;
        ledger.next_buffer += 1;
        ledger.buffers.insert(id, vec![0; len]);
        ledger.live_bytes += size;
        ledger.ops.push(Op::CreateBuffer {
            id,
            label: label.to_string(),
            size,
        });

        Ok(RecordedBuffer {
            id,
            size,
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn write_buffer(&mut self, buffer: &RecordedBuffer, data: &[u8]) {
        let mut ledger = self.ledger.borrow_mut();
        if let Some(contents) = ledger.buffers.get_mut(&buffer.id) {
            contents[..data.len()].copy_from_slice(data);
        }
        ledger.ops.push(Op::WriteBuffer {
            id: buffer.id,
            len: data.len(),
        });
    }

    fn read_buffer(&mut self, buffer: &RecordedBuffer) -> Result<Vec<u8>, GpuError> {
        self.ledger
            .borrow()
            .buffers
            .get(&buffer.id)
            .cloned()
            .ok_or_else(|| GpuError::BufferMapping(format!("buffer {} was released", buffer.id)))
    }

    fn compile(
        &mut self,
        source: &KernelSource,
        _layout: &ParamLayout,
    ) -> Result<RecordedKernel, KernelError> {
        let kernel = RecordedKernel {
            id: self.next_kernel,
            label: source.label.clone(),
            stage: source.stage,
        };
        self.next_kernel += 1;
        self.record(Op::Compile {
            kernel: kernel.id,
            label: kernel.label.clone(),
            stage: kernel.stage,
        });
        Ok(kernel)
    }

    fn bind(
        &mut self,
        kernel: &RecordedKernel,
        buffers: &ParticleBuffers<RecordedBuffer>,
    ) -> RecordedBindings {
        let bindings = RecordedBindings {
            kernel: kernel.id,
            buffers: ids(buffers),
        };
        self.record(Op::Bind {
            kernel: kernel.id,
            buffers: bindings.buffers,
        });
        bindings
    }

    fn upload_params(&mut self, kernel: &RecordedKernel, params: &[u8]) {
        self.record(Op::UploadParams {
            kernel: kernel.id,
            bytes: params.to_vec(),
        });
    }

    fn max_workgroups(&self) -> u32 {
        self.max_workgroups
            .unwrap_or(wgpu::Limits::default().max_compute_workgroups_per_dimension)
    }

    fn dispatch(&mut self, kernel: &RecordedKernel, bindings: &RecordedBindings, workgroups: u32) {
        self.record(Op::Dispatch {
            kernel: kernel.id,
            workgroups,
            buffers: bindings.buffers,
        });
    }

    fn memory_barrier(&mut self) {
        self.record(Op::MemoryBarrier);
    }

    fn begin_frame(&mut self) -> Result<(), GpuError> {
        self.in_frame = true;
        self.record(Op::BeginFrame);
        Ok(())
    }

    fn draw_points(
        &mut self,
        kernel: &RecordedKernel,
        _bindings: &RecordedBindings,
        buffers: &ParticleBuffers<RecordedBuffer>,
        count: u32,
    ) -> Result<(), GpuError> {
        if !self.in_frame {
            return Err(GpuError::NoFrame);
        }
        self.record(Op::Draw {
            kernel: kernel.id,
            count,
            buffers: ids(buffers),
        });
        Ok(())
    }

    fn end_frame(&mut self) {
        self.in_frame = false;
        self.record(Op::EndFrame);
    }
}
