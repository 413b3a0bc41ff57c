//! wgpu implementation of [`GraphicsContext`] (wgpu 26, winit 0.30 surface).
//!
//! Draw calls are recorded between `begin_frame` and `end_frame` and replayed
//! into a single render pass at the end of the frame. Point size and line
//! width are not supported by wgpu; points and lines rasterize at 1px.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use asset::TextureData;
use bytemuck::{Pod, Zeroable};
use corelib::camera::Camera;
use corelib::{CoreError, CoreResult, Mat4};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, PresentMode, Queue, RenderPipeline,
    Surface, SurfaceConfiguration, SurfaceError, SurfaceTexture, TextureFormat, TextureUsages,
    TextureView, VertexBufferLayout, VertexStepMode,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::context::{
    BufferHandle, DrawCall, GraphicsContext, Primitive, RenderSettings, TextureHandle, WrapMode,
};
use crate::flatten::FlatVertex;

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const FLAT_VERTEX_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: std::mem::size_of::<FlatVertex>() as u64,
    step_mode: VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![
        0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x4
    ],
};

/// Frame UBO (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    light_dir: [f32; 4],
}

struct GpuBuffer {
    vertex: Buffer,
    index: Buffer,
}

struct GpuTexture {
    // Keeps the texture alive for the bind group.
    texture: wgpu::Texture,
    bind_group: BindGroup,
}

struct Pipelines {
    triangles: RenderPipeline,
    lines: RenderPipeline,
    points: RenderPipeline,
}

impl Pipelines {
    fn get(&self, primitive: Primitive) -> &RenderPipeline {
        match primitive {
            Primitive::Triangles => &self.triangles,
            Primitive::Lines => &self.lines,
            Primitive::Points => &self.points,
        }
    }
}

pub struct WgpuContext {
    // Surface
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,

    // Device/queue
    device: Device,
    queue: Queue,

    // Pipelines are built by `configure`.
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Option<Pipelines>,
    clear_color: wgpu::Color,

    frame_bg: BindGroup,
    frame_buf: Buffer,
    texture_bgl: BindGroupLayout,
    fallback_texture: GpuTexture,

    depth_view: TextureView,

    buffers: HashMap<BufferHandle, GpuBuffer>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_id: u32,

    frame: Option<SurfaceTexture>,
    commands: Vec<DrawCall>,
}

impl WgpuContext {
    /// Create the device and a surface bound to `window`.
    pub async fn new(window: Arc<Window>, backends: wgpu::Backends) -> CoreResult<Self> {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        // Instance & surface
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window)
            .map_err(|e| CoreError::MissingGraphicsContext(format!("create_surface failed: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| CoreError::MissingGraphicsContext(format!("no suitable GPU adapter: {e}")))?;
        log::info!("Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("meshview device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| CoreError::MissingGraphicsContext(format!("request_device failed: {e}")))?;

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| CoreError::MissingGraphicsContext("surface has no formats".into()))?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        let depth_view = create_depth_view(&device, &surface_config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh WGSL"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        // ==== Frame BGL/BG ====
        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<FrameUniform>() as u64),
                },
                count: None,
            }],
        });
        let frame_init = FrameUniform {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            light_dir: [0.3, 0.5, 1.0, 0.0],
        };
        let frame_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame UBO"),
            contents: bytemuck::bytes_of(&frame_init),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let frame_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame BG"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buf.as_entire_binding(),
            }],
        });

        // ==== Texture BGL ====
        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh PipelineLayout"),
            bind_group_layouts: &[&frame_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        let fallback_texture = upload_texture(
            &device,
            &queue,
            &texture_bgl,
            &TextureData::solid([255, 255, 255, 255]),
            WrapMode::Repeat,
        )?;

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            shader,
            pipeline_layout,
            pipelines: None,
            clear_color: wgpu::Color::BLACK,
            frame_bg,
            frame_buf,
            texture_bgl,
            fallback_texture,
            depth_view,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
            frame: None,
            commands: Vec::new(),
        })
    }

    /// Blocking variant of [`WgpuContext::new`].
    pub fn new_blocking(window: Arc<Window>, backends: wgpu::Backends) -> CoreResult<Self> {
        pollster::block_on(Self::new(window, backends))
    }

    pub fn set_view_proj(&mut self, view_proj: Mat4) {
        let uniform = FrameUniform {
            view_proj: view_proj.to_cols_array_2d(),
            light_dir: [0.3, 0.5, 1.0, 0.0],
        };
        self.queue
            .write_buffer(&self.frame_buf, 0, bytemuck::bytes_of(&uniform));
    }

    /// Point the camera at the box `min..max`.
    pub fn look_at_bounds(&mut self, min: [f32; 3], max: [f32; 3]) {
        let aspect = self.surface_config.width as f32 / self.surface_config.height as f32;
        self.set_view_proj(Camera::framing(min, max, aspect).proj_view());
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_pipelines(&self, depth_test: bool) -> Pipelines {
        let make = |label: &str, topology: wgpu::PrimitiveTopology, fs_entry: &str| {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &self.shader,
                        entry_point: Some("vs_main"),
                        buffers: &[FLAT_VERTEX_LAYOUT],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &self.shader,
                        entry_point: Some(fs_entry),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.surface_config.format,
                            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology,
                        // OBJ windings are not reliable.
                        cull_mode: None,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: depth_test,
                        depth_compare: if depth_test {
                            wgpu::CompareFunction::LessEqual
                        } else {
                            wgpu::CompareFunction::Always
                        },
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
        };

        Pipelines {
            triangles: make("Triangle Pipeline", wgpu::PrimitiveTopology::TriangleList, "fs_main"),
            lines: make("Line Pipeline", wgpu::PrimitiveTopology::LineList, "fs_unlit"),
            points: make("Point Pipeline", wgpu::PrimitiveTopology::PointList, "fs_unlit"),
        }
    }

    fn acquire(&mut self) -> Result<SurfaceTexture, SurfaceError> {
        match self.surface.get_current_texture() {
            Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                log::warn!("Surface lost/outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                self.surface.get_current_texture()
            }
            other => other,
        }
    }
}

impl GraphicsContext for WgpuContext {
    fn configure(&mut self, settings: &RenderSettings) -> CoreResult<()> {
        let [r, g, b, a] = settings.clear_color.map(f64::from);
        self.clear_color = wgpu::Color { r, g, b, a };
        self.pipelines = Some(self.create_pipelines(settings.depth_test));
        self.resize(settings.width, settings.height);
        Ok(())
    }

    /// Reconfigure the surface and recreate the depth view.
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    fn begin_frame(&mut self) -> CoreResult<bool> {
        if self.pipelines.is_none() {
            return Err(CoreError::MissingGraphicsContext("context not configured".into()));
        }
        self.commands.clear();
        match self.acquire() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(true)
            }
            Err(SurfaceError::Timeout) => {
                log::debug!("Surface timeout, skipping frame");
                Ok(false)
            }
            Err(SurfaceError::Lost) => Err(CoreError::MissingGraphicsContext("surface lost".into())),
            Err(SurfaceError::OutOfMemory) => {
                Err(CoreError::MissingGraphicsContext("out of GPU memory".into()))
            }
            Err(e) => {
                log::warn!("Surface unavailable ({e}), skipping frame");
                Ok(false)
            }
        }
    }

    fn end_frame(&mut self) -> CoreResult<()> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        let Some(pipelines) = self.pipelines.as_ref() else {
            return Err(CoreError::MissingGraphicsContext("context not configured".into()));
        };
        let view = frame.texture.create_view(&Default::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("MainPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            rpass.set_bind_group(0, &self.frame_bg, &[]);
            for call in &self.commands {
                let Some(buffer) = self.buffers.get(&call.buffer) else {
                    log::debug!("Draw with released buffer {:?} ignored", call.buffer);
                    continue;
                };
                let texture = self
                    .textures
                    .get(&call.texture)
                    .unwrap_or(&self.fallback_texture);
                rpass.set_pipeline(pipelines.get(call.primitive));
                rpass.set_bind_group(1, &texture.bind_group, &[]);
                rpass.set_vertex_buffer(0, buffer.vertex.slice(..));
                rpass.set_index_buffer(buffer.index.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(call.first..call.first + call.count, 0, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        self.commands.clear();
        Ok(())
    }

    fn create_buffer(&mut self, vertices: &[FlatVertex], indices: &[u32]) -> CoreResult<BufferHandle> {
        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh VB"),
                contents: bytemuck::cast_slice(vertices),
                usage: BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh IB"),
                contents: bytemuck::cast_slice(indices),
                usage: BufferUsages::INDEX,
            });
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(handle, GpuBuffer { vertex, index });
        Ok(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if let Some(gpu) = self.buffers.remove(&buffer) {
            gpu.vertex.destroy();
            gpu.index.destroy();
        }
    }

    fn create_texture(&mut self, image: &TextureData, wrap: WrapMode) -> CoreResult<TextureHandle> {
        let texture = upload_texture(&self.device, &self.queue, &self.texture_bgl, image, wrap)?;
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(gpu) = self.textures.remove(&texture) {
            gpu.texture.destroy();
        }
    }

    fn draw(&mut self, call: &DrawCall) {
        if self.frame.is_some() {
            self.commands.push(*call);
        }
    }
}

fn upload_texture(
    device: &Device,
    queue: &Queue,
    layout: &BindGroupLayout,
    image: &TextureData,
    wrap: WrapMode,
) -> CoreResult<GpuTexture> {
    if !image.is_valid() {
        return Err(CoreError::Gpu(format!(
            "invalid {}x{} texture ({} bytes)",
            image.width,
            image.height,
            image.data.len()
        )));
    }
    let size = wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Diffuse"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &image.data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(image.bytes_per_pixel() * image.width),
            rows_per_image: Some(image.height),
        },
        size,
    );

    let address_mode = match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Diffuse Sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Diffuse BG"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    Ok(GpuTexture {
        texture,
        bind_group,
    })
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("DepthTex"),
        size: wgpu::Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&wgpu::TextureViewDescriptor::default())
}
