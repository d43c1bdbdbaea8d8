//! Everything at once: the spinning cube with a second bind group. Vertices
//! interleave a position and a UV (20 bytes apiece), group 0 carries the
//! per-frame MVP uniform into the vertex stage, and group 1 hands a sampler
//! plus texture view to the fragment stage. Both layouts are explicit so the
//! pipeline layout spells out the full binding model.

use std::borrow::Cow;
use std::f32::consts::FRAC_PI_3;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::{DeviceExt, TextureDataOrder};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::DemoConfig;

/// 36 vertices of five floats each: xyz position, then uv.
#[rustfmt::skip]
const CUBE_VERTICES: [f32; 180] = [
    // bottom
     1.0, -1.0,  1.0,  1.0, 1.0,   -1.0, -1.0,  1.0,  0.0, 1.0,   -1.0, -1.0, -1.0,  0.0, 0.0,
     1.0, -1.0, -1.0,  1.0, 0.0,    1.0, -1.0,  1.0,  1.0, 1.0,   -1.0, -1.0, -1.0,  0.0, 0.0,
    // right
     1.0,  1.0,  1.0,  1.0, 1.0,    1.0, -1.0,  1.0,  1.0, 0.0,    1.0, -1.0, -1.0,  0.0, 0.0,
     1.0,  1.0, -1.0,  0.0, 1.0,    1.0,  1.0,  1.0,  1.0, 1.0,    1.0, -1.0, -1.0,  0.0, 0.0,
    // top
    -1.0,  1.0,  1.0,  0.0, 1.0,    1.0,  1.0,  1.0,  1.0, 1.0,    1.0,  1.0, -1.0,  1.0, 0.0,
    -1.0,  1.0, -1.0,  0.0, 0.0,   -1.0,  1.0,  1.0,  0.0, 1.0,    1.0,  1.0, -1.0,  1.0, 0.0,
    // left
    -1.0, -1.0,  1.0,  1.0, 0.0,   -1.0,  1.0,  1.0,  1.0, 1.0,   -1.0,  1.0, -1.0,  0.0, 1.0,
    -1.0, -1.0, -1.0,  0.0, 0.0,   -1.0, -1.0,  1.0,  1.0, 0.0,   -1.0,  1.0, -1.0,  0.0, 1.0,
    // front
     1.0,  1.0,  1.0,  1.0, 0.0,   -1.0,  1.0,  1.0,  0.0, 0.0,   -1.0, -1.0,  1.0,  0.0, 1.0,
    -1.0, -1.0,  1.0,  0.0, 1.0,    1.0, -1.0,  1.0,  1.0, 1.0,    1.0,  1.0,  1.0,  1.0, 0.0,
    // back
     1.0, -1.0, -1.0,  0.0, 1.0,   -1.0, -1.0, -1.0,  1.0, 1.0,   -1.0,  1.0, -1.0,  1.0, 0.0,
     1.0,  1.0, -1.0,  0.0, 0.0,    1.0, -1.0, -1.0,  0.0, 1.0,   -1.0,  1.0, -1.0,  1.0, 0.0,
];

/// Bytes per vertex: three position floats plus two UV floats.
const VERTEX_STRIDE: u64 = (5 * std::mem::size_of::<f32>()) as u64;
/// Byte offset of the UV attribute inside one vertex.
const UV_OFFSET: u64 = (3 * std::mem::size_of::<f32>()) as u64;

const FOV_Y: f32 = FRAC_PI_3;
const Z_NEAR: f32 = 1.0;
const Z_FAR: f32 = 100.0;

const TRANSLATION: Vec3 = Vec3::new(0.0, 0.0, -5.0);
const ROTATION_STEP: Vec3 = Vec3::new(0.01, 0.01, 0.01);

const FALLBACK_SIZE: u32 = 256;
const FALLBACK_TILE: u32 = 16;

const SHADER: &str = r#"
@group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vertex_main(
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
) -> VertexOutput {
    var output: VertexOutput;
    output.position = mvp * vec4<f32>(position, 1.0);
    output.uv = uv;
    return output;
}

@group(1) @binding(0) var cube_sampler: sampler;
@group(1) @binding(1) var cube_texture: texture_2d<f32>;

@fragment
fn fragment_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(cube_texture, cube_sampler, input.uv);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MvpUniform {
    matrix: [f32; 16],
}

fn model_view_projection(aspect: f32, rotation: Vec3) -> Mat4 {
    let projection = Mat4::perspective_rh(FOV_Y, aspect, Z_NEAR, Z_FAR);
    let model = Mat4::from_translation(TRANSLATION)
        * Mat4::from_rotation_x(rotation.x)
        * Mat4::from_rotation_y(rotation.y)
        * Mat4::from_rotation_z(rotation.z)
        * Mat4::from_scale(Vec3::ONE);
    projection * model
}

/// Warm two-tone checkerboard used when no image path is supplied.
fn checkerboard(width: u32, height: u32, tile: u32) -> Vec<u8> {
    let tile = tile.max(1);
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let even = ((x / tile) + (y / tile)) % 2 == 0;
            if even {
                pixels.extend_from_slice(&[245, 240, 225, 255]);
            } else {
                pixels.extend_from_slice(&[190, 80, 50, 255]);
            }
        }
    }
    pixels
}

pub fn run(config: &DemoConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title("gputour: textured cube")
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create demo window")?;
    let window = Arc::new(window);

    let mut state = TexturedCubeState::new(window.clone(), config.image.as_deref())?;

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::RedrawRequested => match state.render_frame() {
                            Ok(()) => {}
                            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                state.reconfigure();
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                tracing::error!("surface out of memory; exiting");
                                elwt.exit();
                            }
                            Err(other) => {
                                tracing::warn!("surface error: {other:?}; retrying next frame");
                            }
                        },
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}

struct TexturedCubeState {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    mvp_buffer: wgpu::Buffer,
    mvp_group: wgpu::BindGroup,
    _texture: wgpu::Texture,
    texture_group: wgpu::BindGroup,
    rotation: Vec3,
}

impl TexturedCubeState {
    fn new(window: Arc<Window>, image: Option<&Path>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let window_handle = window
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = window
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("textured cube device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device, &config);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("textured cube shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
        });

        let mvp_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mvp layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("textured cube pipeline layout"),
            bind_group_layouts: &[&mvp_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("textured cube pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vertex_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: VERTEX_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x2,
                            offset: UV_OFFSET,
                            shader_location: 1,
                        },
                    ],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..wgpu::PrimitiveState::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fragment_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("textured cube vertex buffer"),
            contents: bytemuck::cast_slice(&CUBE_VERTICES),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let mvp_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mvp uniform buffer"),
            size: std::mem::size_of::<MvpUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mvp_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mvp bind group"),
            layout: &mvp_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: mvp_buffer.as_entire_binding(),
            }],
        });

        let texture = create_cube_texture(&device, &queue, image)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cube texture bind group"),
            layout: &texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        });

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            pipeline,
            vertex_buffer,
            mvp_buffer,
            mvp_group,
            _texture: texture,
            texture_group,
            rotation: Vec3::ZERO,
        })
    }

    fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    fn update_uniforms(&mut self) {
        self.rotation += ROTATION_STEP;
        let aspect = self.config.width.max(1) as f32 / self.config.height.max(1) as f32;
        let uniform = MvpUniform {
            matrix: model_view_projection(aspect, self.rotation).to_cols_array(),
        };
        self.queue
            .write_buffer(&self.mvp_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.update_uniforms();

        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("textured cube encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("textured cube pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.5,
                            g: 0.5,
                            b: 0.5,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_bind_group(0, &self.mvp_group, &[]);
            render_pass.set_bind_group(1, &self.texture_group, &[]);
            render_pass.draw(0..36, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn create_cube_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: Option<&Path>,
) -> Result<wgpu::Texture> {
    let (pixels, width, height) = match image {
        Some(path) => {
            let decoded = image::open(path)
                .with_context(|| format!("failed to open image at {}", path.display()))?
                .to_rgba8();
            let (width, height) = decoded.dimensions();
            if width == 0 || height == 0 {
                anyhow::bail!(
                    "image at {} has zero extent ({width}x{height})",
                    path.display()
                );
            }
            tracing::info!(path = %path.display(), width, height, "loaded cube texture");
            (decoded.into_raw(), width, height)
        }
        None => {
            tracing::info!("no image supplied; using generated checkerboard");
            (
                checkerboard(FALLBACK_SIZE, FALLBACK_SIZE, FALLBACK_TILE),
                FALLBACK_SIZE,
                FALLBACK_SIZE,
            )
        }
    };

    Ok(device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("cube texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &pixels,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_table_fills_36_stride_slots() {
        assert_eq!(CUBE_VERTICES.len(), 36 * 5);
        let bytes: &[u8] = bytemuck::cast_slice(&CUBE_VERTICES);
        assert_eq!(bytes.len() as u64, 36 * VERTEX_STRIDE);
        assert_eq!(VERTEX_STRIDE, 20);
        assert_eq!(UV_OFFSET, 12);
    }

    #[test]
    fn every_uv_stays_in_the_unit_square() {
        for vertex in CUBE_VERTICES.chunks_exact(5) {
            let (u, v) = (vertex[3], vertex[4]);
            assert!((0.0..=1.0).contains(&u), "u was {u}");
            assert!((0.0..=1.0).contains(&v), "v was {v}");
        }
    }

    #[test]
    fn positions_sit_on_the_unit_cube() {
        for vertex in CUBE_VERTICES.chunks_exact(5) {
            assert!(vertex[..3].iter().all(|coordinate| coordinate.abs() == 1.0));
        }
    }

    #[test]
    fn near_plane_differs_from_the_plain_cube() {
        // This scene uses a tighter depth range; its center still projects
        // five units out.
        let clip = model_view_projection(1.0, Vec3::ZERO) * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.w - 5.0).abs() < 1e-4);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0, "depth was {depth}");
    }
}
