//! The wgpu backend.

use std::sync::mpsc;
use std::sync::Arc;

use winit::window::Window;

use super::{
    GpuDevice, ParticleBuffers, COLOR_SLOT, POSITION_SLOT, RENDER_PARAMS_SLOT, UPDATE_PARAMS_SLOT,
    VELOCITY_SLOT,
};
use crate::error::{AllocationError, GpuError, KernelError};
use crate::shader::{KernelSource, KernelStage};
use crate::store::PARTICLE_STRIDE;
use crate::uniforms::ParamLayout;

#[cfg(feature = "egui")]
use super::{EguiFrameOutput, EguiIntegration};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

static PARTICLE_ATTRIBUTES: [[wgpu::VertexAttribute; 1]; 3] = [
    [wgpu::VertexAttribute {
        offset: 0,
        shader_location: POSITION_SLOT,
        format: wgpu::VertexFormat::Float32x4,
    }],
    [wgpu::VertexAttribute {
        offset: 0,
        shader_location: VELOCITY_SLOT,
        format: wgpu::VertexFormat::Float32x4,
    }],
    [wgpu::VertexAttribute {
        offset: 0,
        shader_location: COLOR_SLOT,
        format: wgpu::VertexFormat::Float32x4,
    }],
];

/// A particle buffer usable as storage (update) and vertex input (render).
#[derive(Debug)]
pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl WgpuBuffer {
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug)]
enum Pipeline {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

/// A pipeline plus the uniform buffer holding its parameter struct.
#[derive(Debug)]
pub struct WgpuKernel {
    label: String,
    pipeline: Pipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
}

/// Bind group tying a kernel to one set of particle buffers.
#[derive(Debug)]
pub struct WgpuBindings {
    bind_group: wgpu::BindGroup,
}

struct Frame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    /// Whether a pass has already cleared the color and depth targets.
    cleared: bool,
}

/// Device, queue and window surface.
///
/// Compute dispatches are recorded into a pending encoder that
/// [`GpuDevice::memory_barrier`] submits. Draws go into the frame's encoder,
/// which [`GpuDevice::end_frame`] submits before presenting.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_texture: wgpu::TextureView,
    clear_color: wgpu::Color,
    compute_encoder: Option<wgpu::CommandEncoder>,
    frame_encoder: Option<wgpu::CommandEncoder>,
    frame: Option<Frame>,
}

impl WgpuDevice {
    /// Open the adapter and device, and configure a surface for `window`.
    pub fn new(window: Arc<Window>, clear_color: wgpu::Color) -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async(window, clear_color))
    }

    async fn new_async(window: Arc<Window>, clear_color: wgpu::Color) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        // Particle buffers are sized by the adapter, not the conservative defaults.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_buffer_size: adapter_limits.max_buffer_size,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(GpuError::UnsupportedSurface)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = create_depth_texture(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_texture,
            clear_color,
            compute_encoder: None,
            frame_encoder: None,
            frame: None,
        })
    }

    /// Reconfigure the surface for a new window size. Zero sizes are ignored.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = create_depth_texture(&self.device, &self.config);
        }
    }

    /// Reconfigure with the current size, after the surface was lost.
    pub fn reconfigure(&mut self) {
        log::warn!("surface lost or outdated, reconfiguring");
        self.surface.configure(&self.device, &self.config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Paint the control panel over the current frame.
    #[cfg(feature = "egui")]
    pub fn paint_overlay(&mut self, egui: &mut EguiIntegration, output: &EguiFrameOutput) {
        self.clear_if_needed();
        let (Some(frame), Some(encoder)) = (self.frame.as_ref(), self.frame_encoder.as_mut()) else {
            return;
        };
        egui.paint(
            &self.device,
            &self.queue,
            encoder,
            &frame.view,
            [self.config.width, self.config.height],
            output,
        );
    }

    fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Begin the frame's render pass, clearing on the first pass only.
    fn begin_render_pass<'a>(
        encoder: &'a mut wgpu::CommandEncoder,
        frame: &mut Frame,
        depth: &wgpu::TextureView,
        clear_color: wgpu::Color,
    ) -> wgpu::RenderPass<'a> {
        let (color_load, depth_load) = if frame.cleared {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        } else {
            (wgpu::LoadOp::Clear(clear_color), wgpu::LoadOp::Clear(1.0))
        };
        frame.cleared = true;

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// A frame with nothing drawn still shows the clear color.
    fn clear_if_needed(&mut self) {
        let (Some(frame), Some(encoder)) = (self.frame.as_mut(), self.frame_encoder.as_mut()) else {
            return;
        };
        if !frame.cleared {
            drop(Self::begin_render_pass(encoder, frame, &self.depth_texture, self.clear_color));
        }
    }

    fn create_compute_pipeline(
        &self,
        source: &KernelSource,
        module: &wgpu::ShaderModule,
    ) -> (Pipeline, wgpu::BindGroupLayout) {
        let storage = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Update Bind Group Layout"),
                entries: &[
                    storage(POSITION_SLOT),
                    storage(VELOCITY_SLOT),
                    storage(COLOR_SLOT),
                    wgpu::BindGroupLayoutEntry {
                        binding: UPDATE_PARAMS_SLOT,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Update Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(source.label.as_str()),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(KernelStage::UPDATE_ENTRY),
                compilation_options: Default::default(),
                cache: None,
            });

        (Pipeline::Compute(pipeline), layout)
    }

    fn create_render_pipeline(
        &self,
        source: &KernelSource,
        module: &wgpu::ShaderModule,
    ) -> (Pipeline, wgpu::BindGroupLayout) {
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Render Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: RENDER_PARAMS_SLOT,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let vertex_buffers = PARTICLE_ATTRIBUTES.each_ref().map(|attributes| wgpu::VertexBufferLayout {
            array_stride: PARTICLE_STRIDE,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes,
        });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(source.label.as_str()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(KernelStage::VERTEX_ENTRY),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(KernelStage::FRAGMENT_ENTRY),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                // Depth-tested but unsorted: overlapping translucent points
                // blend in draw order.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        (Pipeline::Render(pipeline), layout)
    }
}

impl GpuDevice for WgpuDevice {
    type Buffer = WgpuBuffer;
    type Kernel = WgpuKernel;
    type Bindings = WgpuBindings;

    fn create_buffer(&mut self, label: &str, size: u64) -> Result<WgpuBuffer, AllocationError> {
        let limits = self.device.limits();
        let limit = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if size > limit {
            return Err(AllocationError::TooLarge {
                requested: size,
                limit,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(AllocationError::OutOfMemory {
                label: label.to_string(),
                requested: size,
            });
        }

        Ok(WgpuBuffer { buffer, size })
    }

    fn write_buffer(&mut self, buffer: &WgpuBuffer, data: &[u8]) {
        self.queue.write_buffer(&buffer.buffer, 0, data);
    }

    fn read_buffer(&mut self, buffer: &WgpuBuffer) -> Result<Vec<u8>, GpuError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: buffer.size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = match self.compute_encoder.take() {
            Some(encoder) => encoder,
            None => self.create_encoder("Readback Encoder"),
        };
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, buffer.size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn compile(&mut self, source: &KernelSource, layout: &ParamLayout) -> Result<WgpuKernel, KernelError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label.as_str()),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
            });

        let (pipeline, bind_group_layout) = match source.stage {
            KernelStage::Update => self.create_compute_pipeline(source, &module),
            KernelStage::Render => self.create_render_pipeline(source, &module),
        };

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(KernelError::Pipeline {
                label: source.label.clone(),
                message: error.to_string(),
            });
        }

        let params = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(format!("{} Params", source.label).as_str()),
            size: layout.buffer_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!("compiled {}", source.label);

        Ok(WgpuKernel {
            label: source.label.clone(),
            pipeline,
            bind_group_layout,
            params,
        })
    }

    fn bind(&mut self, kernel: &WgpuKernel, buffers: &ParticleBuffers<WgpuBuffer>) -> WgpuBindings {
        let entries: Vec<wgpu::BindGroupEntry> = match kernel.pipeline {
            Pipeline::Compute(_) => vec![
                wgpu::BindGroupEntry {
                    binding: POSITION_SLOT,
                    resource: buffers.position.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: VELOCITY_SLOT,
                    resource: buffers.velocity.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: COLOR_SLOT,
                    resource: buffers.color.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: UPDATE_PARAMS_SLOT,
                    resource: kernel.params.as_entire_binding(),
                },
            ],
            // Render reads the particles as vertex input; only its params are bound here.
            Pipeline::Render(_) => vec![wgpu::BindGroupEntry {
                binding: RENDER_PARAMS_SLOT,
                resource: kernel.params.as_entire_binding(),
            }],
        };

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(format!("{} Bind Group", kernel.label).as_str()),
            layout: &kernel.bind_group_layout,
            entries: &entries,
        });

        WgpuBindings { bind_group }
    }

    fn upload_params(&mut self, kernel: &WgpuKernel, params: &[u8]) {
        self.queue.write_buffer(&kernel.params, 0, params);
    }

    fn max_workgroups(&self) -> u32 {
        self.device.limits().max_compute_workgroups_per_dimension
    }

    fn dispatch(&mut self, kernel: &WgpuKernel, bindings: &WgpuBindings, workgroups: u32) {
        let Pipeline::Compute(pipeline) = &kernel.pipeline else {
            log::error!("{} is not a compute kernel", kernel.label);
            return;
        };

        if self.compute_encoder.is_none() {
            self.compute_encoder = Some(self.create_encoder("Update Encoder"));
        }
        let Some(encoder) = self.compute_encoder.as_mut() else {
            return;
        };

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Update Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, &bindings.bind_group, &[]);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);
    }

    fn memory_barrier(&mut self) {
        // Submissions execute in order, so submitting the compute work makes
        // its writes visible to everything submitted later.
        if let Some(encoder) = self.compute_encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn begin_frame(&mut self) -> Result<(), GpuError> {
        let texture = self.surface.get_current_texture()?;
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(Frame {
            texture,
            view,
            cleared: false,
        });
        self.frame_encoder = Some(self.create_encoder("Render Encoder"));
        Ok(())
    }

    fn draw_points(
        &mut self,
        kernel: &WgpuKernel,
        bindings: &WgpuBindings,
        buffers: &ParticleBuffers<WgpuBuffer>,
        count: u32,
    ) -> Result<(), GpuError> {
        let Pipeline::Render(pipeline) = &kernel.pipeline else {
            log::error!("{} is not a render kernel", kernel.label);
            return Ok(());
        };
        let (Some(frame), Some(encoder)) = (self.frame.as_mut(), self.frame_encoder.as_mut()) else {
            return Err(GpuError::NoFrame);
        };

        let mut render_pass =
            Self::begin_render_pass(encoder, frame, &self.depth_texture, self.clear_color);
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bindings.bind_group, &[]);
        render_pass.set_vertex_buffer(POSITION_SLOT, buffers.position.buffer.slice(..));
        render_pass.set_vertex_buffer(VELOCITY_SLOT, buffers.velocity.buffer.slice(..));
        render_pass.set_vertex_buffer(COLOR_SLOT, buffers.color.buffer.slice(..));
        render_pass.draw(0..6, 0..count);
        Ok(())
    }

    fn end_frame(&mut self) {
        self.clear_if_needed();
        if let Some(encoder) = self.frame_encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(frame) = self.frame.take() {
            frame.texture.present();
        }
    }
}

fn create_depth_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
