//! wgpu implementation of [`GraphicsContext`] drawing onto a window surface.

use super::compile::{SAMPLER_BINDING, TEXTURE_BINDING, UNIFORM_BINDING};
use super::{CompiledStage, GraphicsContext, ProgramInterface, StageInput, StageOutput, StagePass, UniformBlock};
use crate::error::{Error, Result};
use crate::frame::{QuadVertex, Resolution, VideoFrame};
use anyhow::anyhow;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};
use wgpu::util::DeviceExt;
use winit::window::Window;

/// A linked render pipeline and the uniform buffer it reads.
pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
}

/// Off-screen color target in the surface format.
pub struct WgpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct SourceTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Resolution,
}

pub struct WgpuContext {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    source: Option<SourceTexture>,
    window: Arc<Window>,
}

impl WgpuContext {
    /// Creates the device and configures the window's surface.
    pub fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("Failed to find GPU adapter: {:?}", e))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Kinescope Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write display values directly, so avoid an implicit sRGB encode
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!("Surface configured: {:?} {}x{}", surface_format, config.width, config.height);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Stage Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: TEXTURE_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: SAMPLER_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: UNIFORM_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Stage Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Stage Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            bind_group_layout,
            pipeline_layout,
            sampler,
            vertex_buffer,
            index_buffer,
            source: None,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Reconfigures the surface at its current size after it was lost or outdated.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    fn check_size(&self, what: &str, size: Resolution) -> Result<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        if size.is_empty() || size.width > max || size.height > max {
            return Err(Error::ResourceAllocationFailure {
                what: what.to_string(),
                reason: format!("{}x{} is outside 1..={} pixels", size.width, size.height, max),
            });
        }
        Ok(())
    }

    fn create_color_texture(
        &self,
        label: &str,
        size: Resolution,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }
}

impl GraphicsContext for WgpuContext {
    type Program = WgpuProgram;
    type Target = WgpuTarget;

    fn link_program(
        &mut self,
        label: &str,
        vertex: &CompiledStage,
        fragment: &CompiledStage,
        interface: &ProgramInterface,
    ) -> Result<WgpuProgram> {
        let entry = |stage: &CompiledStage| {
            stage.entry_point().map(str::to_string).ok_or_else(|| Error::ProgramLink {
                log: format!("{} stage has no entry point", stage.stage),
            })
        };
        let vertex_entry = entry(vertex)?;
        let fragment_entry = entry(fragment)?;

        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} vertex")),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(vertex.to_wgsl()?)),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} fragment")),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(fragment.to_wgsl()?)),
        });

        let attributes = QuadVertex::attributes(interface.attributes.position, interface.attributes.tex_coord);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(&vertex_entry),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: QuadVertex::STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(&fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: None,
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
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} uniforms")),
            size: UniformBlock::buffer_size(interface.uniforms.size) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(WgpuProgram {
            pipeline,
            uniform_buffer,
        })
    }

    fn release_program(&mut self, program: WgpuProgram) {
        program.uniform_buffer.destroy();
    }

    fn create_target(&mut self, label: &str, size: Resolution) -> Result<WgpuTarget> {
        self.check_size(&format!("render target '{label}'"), size)?;
        let texture = self.create_color_texture(
            label,
            size,
            self.config.format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget { texture, view })
    }

    fn release_target(&mut self, target: WgpuTarget) {
        target.texture.destroy();
    }

    fn upload_source(&mut self, frame: &VideoFrame) -> Result<()> {
        let rgba = frame.to_rgba();
        let size = rgba.resolution();
        self.check_size("source texture", size)?;
        let expected = size.width as usize * size.height as usize * 4;
        if rgba.data.len() != expected {
            return Err(Error::ResourceAllocationFailure {
                what: "source texture upload".to_string(),
                reason: format!("frame has {} bytes, expected {}", rgba.data.len(), expected),
            });
        }

        if self.source.as_ref().map(|s| s.size) != Some(size) {
            debug!("Allocating source texture {}x{}", size.width, size.height);
            let texture = self.create_color_texture(
                "Source Texture",
                size,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            if let Some(old) = self.source.replace(SourceTexture { texture, view, size }) {
                old.texture.destroy();
            }
        }

        let Some(source) = &self.source else {
            return Ok(());
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn resize_surface(&mut self, size: Resolution) {
        if size.is_empty() {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    fn submit(&mut self, passes: &[StagePass<'_, WgpuProgram, WgpuTarget>]) -> Result<()> {
        let source_view = &self
            .source
            .as_ref()
            .ok_or_else(|| Error::ResourceAllocationFailure {
                what: "source texture".to_string(),
                reason: "no frame uploaded".to_string(),
            })?
            .view;

        let output = self
            .surface
            .get_current_texture()
            .map_err(|e| Error::Surface(e.to_string()))?;
        let surface_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Effect Chain Encoder"),
        });

        for pass in passes {
            self.queue
                .write_buffer(&pass.program.uniform_buffer, 0, pass.uniforms.as_bytes());

            let input_view = match pass.input {
                StageInput::Source => source_view,
                StageInput::Target(target) => &target.view,
            };
            let output_view = match pass.output {
                StageOutput::Surface => &surface_view,
                StageOutput::Target(target) => &target.view,
            };

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pass.label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: TEXTURE_BINDING,
                        resource: wgpu::BindingResource::TextureView(input_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: SAMPLER_BINDING,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: UNIFORM_BINDING,
                        resource: pass.program.uniform_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(&pass.program.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
