//! wgpu effect backend.
//!
//! Scratch images are offscreen textures that can be both rendered to and
//! sampled from. Each pass of a processor is a fullscreen-triangle render
//! pipeline built from the shader's `fs_pass{N}` entry point, created the first
//! time that pass writes to a given target format.
//!
//! # Binding layout
//!
//! | binding | resource                                   |
//! |---------|--------------------------------------------|
//! | 0       | `Params` uniform block (texel size, scalars) |
//! | 1       | source texture                             |
//! | 2       | linear clamp sampler                       |
//! | 3..     | named textures, in declaration order       |
//!
//! A named texture that was never set, or that is the destination of the
//! current pass, is replaced by a 1x1 black texture for that pass. Textures
//! are sampled with a filtering sampler, so `Rgba32Float` images need the
//! `FLOAT32_FILTERABLE` device feature.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::depth_of_field::DepthTextureHost;
use crate::effect::{EffectBackend, EffectProcessor, EffectShader, ParameterBlock, StageError};
use crate::frame::{FrameImage, ImageDesc, ImageFormat};
use crate::gpu::GpuContext;
use crate::pool::{AllocError, ImageAllocator};

/// Uniforms shared by every pass of a processor.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct EffectUniforms {
    /// `(1/w, 1/h, w, h)` of the source image.
    texel: [f32; 4],
    /// Declared scalars, four per row.
    values: [[f32; 4]; 4],
}

struct GpuImageInner {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
    desc: ImageDesc,
}

/// Shared handle to a GPU texture and its view.
#[derive(Clone)]
pub struct GpuImage {
    inner: Arc<GpuImageInner>,
}

impl GpuImage {
    /// Wraps a texture owned by the render host (a scene color target or the
    /// swapchain image).
    ///
    /// Sources need `TEXTURE_BINDING` usage and destinations `RENDER_ATTACHMENT`;
    /// `COPY_SRC`/`COPY_DST` enable exact copies for pass-through frames.
    /// Returns `None` for formats the pipelines cannot render to.
    pub fn from_texture(texture: wgpu::Texture) -> Option<Self> {
        let format = ImageFormat::from_wgpu(texture.format())?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let desc = ImageDesc::new(texture.width(), texture.height(), format);
        Some(Self {
            inner: Arc::new(GpuImageInner {
                texture,
                view,
                depth: None,
                desc,
            }),
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.inner.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.inner.view
    }

    /// The attached depth buffer, for images allocated with `depth_bits > 0`.
    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.inner.depth.as_ref().map(|(_, view)| view)
    }

    fn same_texture(&self, other: &GpuImage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl FrameImage for GpuImage {
    fn desc(&self) -> ImageDesc {
        self.inner.desc
    }
}

fn depth_format(bits: u32) -> Option<wgpu::TextureFormat> {
    match bits {
        0 => None,
        1..=16 => Some(wgpu::TextureFormat::Depth16Unorm),
        17..=24 => Some(wgpu::TextureFormat::Depth24Plus),
        _ => Some(wgpu::TextureFormat::Depth32Float),
    }
}

fn create_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn draw_fullscreen(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
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
    });
    render_pass.set_pipeline(pipeline);
    render_pass.set_bind_group(0, bind_group, &[]);
    render_pass.draw(0..3, 0..1);
}

/// Resampling copy used when an exact texture copy is not possible.
struct Blitter {
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl Blitter {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_SHADER.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[
                texture_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        Self {
            shader,
            bind_group_layout,
            pipeline_layout,
            sampler: create_sampler(device, "Blit Sampler"),
            pipelines: HashMap::new(),
        }
    }

    fn blit(&mut self, gpu: &GpuContext, src: &GpuImage, dst: &GpuImage) {
        let device = &gpu.device;
        let format = dst.texture().format();
        let pipeline = self.pipelines.entry(format).or_insert_with(|| {
            fullscreen_pipeline(device, "Blit Pipeline", &self.pipeline_layout, &self.shader, "fs", format)
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Blit Encoder"),
        });
        draw_fullscreen(&mut encoder, "Blit Pass", dst.view(), pipeline, &bind_group);
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// An effect processor backed by wgpu render pipelines.
pub struct GpuEffectProcessor {
    gpu: Arc<GpuContext>,
    label: String,
    pass_count: u32,
    scalar_names: Vec<&'static str>,
    texture_names: Vec<&'static str>,
    params: ParameterBlock<GpuImage>,
    shader: wgpu::ShaderModule,
    uniform_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    fallback: wgpu::TextureView,
    pipelines: HashMap<(u32, wgpu::TextureFormat), wgpu::RenderPipeline>,
    warned_unset: HashSet<&'static str>,
}

impl GpuEffectProcessor {
    fn new(gpu: Arc<GpuContext>, shader: &EffectShader) -> Result<Self, StageError> {
        let creation_error = |reason: String| StageError::ProcessorCreation {
            label: shader.label.clone(),
            reason,
        };
        if shader.scalars.len() > EffectShader::MAX_SCALARS {
            return Err(creation_error(format!(
                "{} scalars declared, at most {} fit the uniform block",
                shader.scalars.len(),
                EffectShader::MAX_SCALARS
            )));
        }

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(shader.source.as_str().into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(creation_error(error.to_string()));
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Effect Uniforms"),
            size: std::mem::size_of::<EffectUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut entries = vec![
            // Uniforms
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            // Source texture
            texture_entry(1),
            // Sampler
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend((0..shader.textures.len() as u32).map(|i| texture_entry(3 + i)));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Effect Bind Group Layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Effect Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let fallback = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Effect Fallback Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = create_sampler(device, "Effect Sampler");

        Ok(Self {
            label: shader.label.clone(),
            pass_count: shader.pass_count,
            scalar_names: shader.scalars.clone(),
            texture_names: shader.textures.clone(),
            params: ParameterBlock::new(),
            shader: module,
            uniform_buffer,
            bind_group_layout,
            pipeline_layout,
            sampler,
            fallback,
            pipelines: HashMap::new(),
            warned_unset: HashSet::new(),
            gpu,
        })
    }

    pub fn params(&self) -> &ParameterBlock<GpuImage> {
        &self.params
    }

    fn ensure_pipeline(&mut self, pass: u32, format: wgpu::TextureFormat) -> Result<(), StageError> {
        if self.pipelines.contains_key(&(pass, format)) {
            return Ok(());
        }
        let device = &self.gpu.device;
        let label = format!("{} Pass {pass}", self.label);
        let entry = format!("fs_pass{pass}");

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = fullscreen_pipeline(
            device,
            &label,
            &self.pipeline_layout,
            &self.shader,
            &entry,
            format,
        );
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(StageError::Invoke {
                pass,
                reason: error.to_string(),
            });
        }
        log::debug!("Built pipeline `{label}` for {format:?}");
        self.pipelines.insert((pass, format), pipeline);
        Ok(())
    }

    fn uniforms(&mut self, src: &ImageDesc) -> EffectUniforms {
        let mut values = [[0.0f32; 4]; 4];
        for (i, &name) in self.scalar_names.iter().enumerate() {
            let value = match self.params.scalar(name) {
                Some(value) => value,
                None => {
                    if self.warned_unset.insert(name) {
                        log::warn!("{}: scalar `{name}` used before it was set", self.label);
                    }
                    0.0
                }
            };
            values[i / 4][i % 4] = value;
        }
        let (w, h) = (src.width as f32, src.height as f32);
        EffectUniforms {
            texel: [1.0 / w, 1.0 / h, w, h],
            values,
        }
    }

    /// The bound textures for one pass, with unset or aliased entries replaced.
    fn bound_textures(&mut self, dst: &GpuImage) -> Vec<Option<GpuImage>> {
        let mut bound = Vec::with_capacity(self.texture_names.len());
        for &name in &self.texture_names {
            match self.params.texture(name) {
                Some(image) if image.same_texture(dst) => {
                    log::trace!("{}: `{name}` is the pass target, binding fallback", self.label);
                    bound.push(None);
                }
                Some(image) => bound.push(Some(image.clone())),
                None => {
                    if self.warned_unset.insert(name) {
                        log::warn!("{}: texture `{name}` not set, binding fallback", self.label);
                    }
                    bound.push(None);
                }
            }
        }
        bound
    }
}

impl EffectProcessor for GpuEffectProcessor {
    type Image = GpuImage;

    fn set_scalar(&mut self, name: &'static str, value: f32) {
        self.params.set_scalar(name, value);
    }

    fn set_texture(&mut self, name: &'static str, image: &GpuImage) {
        self.params.set_texture(name, image);
    }

    fn clear_texture(&mut self, name: &'static str) {
        self.params.remove(name);
    }

    fn invoke(&mut self, src: &GpuImage, dst: &GpuImage, pass: u32) -> Result<(), StageError> {
        if pass >= self.pass_count {
            return Err(StageError::UnknownPass {
                pass,
                passes: self.pass_count,
            });
        }
        if src.same_texture(dst) {
            return Err(StageError::Invoke {
                pass,
                reason: "source and destination are the same texture".to_string(),
            });
        }

        let format = dst.texture().format();
        self.ensure_pipeline(pass, format)?;
        let uniforms = self.uniforms(&src.desc());
        let bound = self.bound_textures(dst);
        log::trace!("{} pass {pass}: {} -> {}", self.label, src.desc(), dst.desc());

        let gpu = &self.gpu;
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(src.view()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (i, image) in bound.iter().enumerate() {
            let view = image.as_ref().map_or(&self.fallback, |image| image.view());
            entries.push(wgpu::BindGroupEntry {
                binding: 3 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Effect Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let pipeline = self
            .pipelines
            .get(&(pass, format))
            .ok_or_else(|| StageError::Invoke {
                pass,
                reason: format!("no pipeline for {format:?}"),
            })?;

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Effect Encoder"),
            });
        draw_fullscreen(&mut encoder, &self.label, dst.view(), pipeline, &bind_group);
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

/// wgpu implementation of [`EffectBackend`].
pub struct GpuBackend {
    gpu: Arc<GpuContext>,
    blitter: Option<Blitter>,
    depth_texture_requested: bool,
    scene_depth: Option<GpuImage>,
}

impl GpuBackend {
    pub fn new(gpu: Arc<GpuContext>) -> Self {
        Self {
            gpu,
            blitter: None,
            depth_texture_requested: false,
            scene_depth: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Whether a depth-of-field pipeline asked for scene depth. Hosts check this
    /// to decide whether to produce [`set_scene_depth`](Self::set_scene_depth).
    pub fn depth_texture_requested(&self) -> bool {
        self.depth_texture_requested
    }

    /// Supplies this frame's scene depth as a sampleable color image
    /// (linear depth in the red channel, e.g. `R16Float`).
    pub fn set_scene_depth(&mut self, depth: Option<GpuImage>) {
        self.scene_depth = depth;
    }
}

impl ImageAllocator for GpuBackend {
    type Image = GpuImage;

    fn allocate(&mut self, desc: &ImageDesc) -> Result<GpuImage, AllocError> {
        let device = &self.gpu.device;
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Scratch Buffer"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let depth = depth_format(desc.depth_bits).map(|format| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Scratch Depth Buffer"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(error) = validation.or(out_of_memory) {
            return Err(AllocError(error.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuImage {
            inner: Arc::new(GpuImageInner {
                texture,
                view,
                depth,
                desc: *desc,
            }),
        })
    }
}

impl EffectBackend for GpuBackend {
    type Processor = GpuEffectProcessor;

    fn create_processor(&mut self, shader: &EffectShader) -> Result<GpuEffectProcessor, StageError> {
        GpuEffectProcessor::new(self.gpu.clone(), shader)
    }

    fn blit(&mut self, src: &GpuImage, dst: &GpuImage) -> Result<(), StageError> {
        if src.same_texture(dst) {
            return Ok(());
        }
        let (s, d) = (src.desc(), dst.desc());
        let copyable = s.width == d.width
            && s.height == d.height
            && src.texture().format() == dst.texture().format()
            && src.texture().usage().contains(wgpu::TextureUsages::COPY_SRC)
            && dst.texture().usage().contains(wgpu::TextureUsages::COPY_DST);

        if copyable {
            let mut encoder = self
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Copy Encoder"),
                });
            encoder.copy_texture_to_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: src.texture(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyTextureInfo {
                    texture: dst.texture(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: s.width,
                    height: s.height,
                    depth_or_array_layers: 1,
                },
            );
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
            return Ok(());
        }

        if !dst
            .texture()
            .usage()
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            return Err(StageError::Blit(format!(
                "{d} destination is neither copyable nor renderable"
            )));
        }
        let gpu = &self.gpu;
        self.blitter
            .get_or_insert_with(|| Blitter::new(&gpu.device))
            .blit(gpu, src, dst);
        Ok(())
    }
}

impl DepthTextureHost for GpuBackend {
    fn request_depth_texture(&mut self) {
        if !self.depth_texture_requested {
            log::debug!("Scene depth requested by depth of field");
        }
        self.depth_texture_requested = true;
    }

    fn scene_depth(&self) -> Option<GpuImage> {
        self.scene_depth.clone()
    }
}

const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}

@vertex
fn vs(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    let uv = vec2f(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var out: VertexOutput;
    out.position = vec4f(uv * vec2f(2.0, -2.0) + vec2f(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    return textureSample(source_texture, source_sampler, in.uv);
}
"#;
