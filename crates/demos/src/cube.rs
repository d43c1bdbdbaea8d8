//! Projection matrices: a cube of 36 position-only vertices spun by a
//! model-view-projection matrix that is recomputed on the CPU and rewritten
//! into a 64-byte uniform buffer every frame. Back-face culling stands in for
//! a depth buffer, exactly as the scene was originally staged. The bind
//! group layout is spelled out explicitly here rather than derived from the
//! shader; the textured variant builds on the same layout.

use std::borrow::Cow;
use std::f32::consts::FRAC_PI_3;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::DemoConfig;

/// 36 vertices, three floats each; six faces of two triangles. The winding
/// is chosen so back-face culling hides the far side of the cube.
#[rustfmt::skip]
const CUBE_POSITIONS: [f32; 108] = [
    // bottom
    1.0, -1.0, 1.0,   -1.0, -1.0, 1.0,   -1.0, -1.0, -1.0,
    1.0, -1.0, -1.0,   1.0, -1.0, 1.0,   -1.0, -1.0, -1.0,
    // right
    1.0, 1.0, 1.0,     1.0, -1.0, 1.0,    1.0, -1.0, -1.0,
    1.0, 1.0, -1.0,    1.0, 1.0, 1.0,     1.0, -1.0, -1.0,
    // top
    -1.0, 1.0, 1.0,    1.0, 1.0, 1.0,     1.0, 1.0, -1.0,
    -1.0, 1.0, -1.0,  -1.0, 1.0, 1.0,     1.0, 1.0, -1.0,
    // left
    -1.0, -1.0, 1.0,  -1.0, 1.0, 1.0,    -1.0, 1.0, -1.0,
    -1.0, -1.0, -1.0, -1.0, -1.0, 1.0,   -1.0, 1.0, -1.0,
    // front
    1.0, 1.0, 1.0,    -1.0, 1.0, 1.0,    -1.0, -1.0, 1.0,
    -1.0, -1.0, 1.0,   1.0, -1.0, 1.0,    1.0, 1.0, 1.0,
    // back
    1.0, -1.0, -1.0,  -1.0, -1.0, -1.0,  -1.0, 1.0, -1.0,
    1.0, 1.0, -1.0,    1.0, -1.0, -1.0,  -1.0, 1.0, -1.0,
];

/// Bytes per vertex in slot 0: one three-float position.
const VERTEX_STRIDE: u64 = (3 * std::mem::size_of::<f32>()) as u64;

const FOV_Y: f32 = FRAC_PI_3;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 1000.0;

/// The cube sits in front of the camera; leaving it at the origin would wrap
/// the camera inside it and culling would blank the screen.
const TRANSLATION: Vec3 = Vec3::new(0.0, 0.0, -5.0);
const INITIAL_ROTATION: Vec3 = Vec3::new(-0.5, 0.5, 0.0);
const ROTATION_STEP: Vec3 = Vec3::new(0.01, 0.01, 0.0);

const SHADER: &str = r#"
@group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vertex_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var output: VertexOutput;
    output.position = mvp * vec4<f32>(position, 1.0);
    output.color = vec4<f32>(position * 0.5 + vec3<f32>(0.5), 1.0);
    return output;
}

@fragment
fn fragment_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return input.color;
}
"#;

/// CPU mirror of the shader's `mat4x4<f32>` uniform, column-major.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MvpUniform {
    matrix: [f32; 16],
}

impl MvpUniform {
    fn from_mat4(matrix: Mat4) -> Self {
        Self {
            matrix: matrix.to_cols_array(),
        }
    }
}

/// Projection × translate × rotateX × rotateY × rotateZ × scale, the same
/// composition order the scene animates.
fn model_view_projection(aspect: f32, rotation: Vec3) -> Mat4 {
    let projection = Mat4::perspective_rh(FOV_Y, aspect, Z_NEAR, Z_FAR);
    let model = Mat4::from_translation(TRANSLATION)
        * Mat4::from_rotation_x(rotation.x)
        * Mat4::from_rotation_y(rotation.y)
        * Mat4::from_rotation_z(rotation.z)
        * Mat4::from_scale(Vec3::ONE);
    projection * model
}

pub fn run(config: &DemoConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title("gputour: cube")
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create demo window")?;
    let window = Arc::new(window);

    let mut state = CubeState::new(window.clone())?;

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

struct CubeState {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    mvp_buffer: wgpu::Buffer,
    mvp_group: wgpu::BindGroup,
    rotation: Vec3,
}

impl CubeState {
    fn new(window: Arc<Window>) -> Result<Self> {
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
        tracing::debug!(info = ?adapter.get_info(), "selected GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("cube device"),
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
            label: Some("cube shader"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cube pipeline layout"),
            bind_group_layouts: &[&mvp_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("cube pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vertex_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: VERTEX_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
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
            label: Some("cube vertex buffer"),
            contents: bytemuck::cast_slice(&CUBE_POSITIONS),
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
            rotation: INITIAL_ROTATION,
        })
    }

    fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    fn update_uniforms(&mut self) {
        self.rotation += ROTATION_STEP;
        let aspect = self.config.width.max(1) as f32 / self.config.height.max(1) as f32;
        let uniform = MvpUniform::from_mat4(model_view_projection(aspect, self.rotation));
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
                label: Some("cube encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("cube pass"),
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
            render_pass.draw(0..36, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_36_vertices() {
        assert_eq!(CUBE_POSITIONS.len(), 36 * 3);
        let bytes: &[u8] = bytemuck::cast_slice(&CUBE_POSITIONS);
        assert_eq!(bytes.len() as u64, 36 * VERTEX_STRIDE);
    }

    #[test]
    fn uniform_matches_a_mat4() {
        assert_eq!(std::mem::size_of::<MvpUniform>(), 64);
    }

    #[test]
    fn cube_center_projects_onto_the_view_axis() {
        let mvp = model_view_projection(16.0 / 9.0, Vec3::ZERO);
        let clip = mvp * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.x.abs() < 1e-6);
        assert!(clip.y.abs() < 1e-6);
        // The center sits five units in front of the camera.
        assert!((clip.w - 5.0).abs() < 1e-4);
        // Normalized depth lands inside wgpu's [0, 1] range.
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0, "depth was {depth}");
    }

    #[test]
    fn rotation_advances_x_and_y_only() {
        let rotation = INITIAL_ROTATION + ROTATION_STEP;
        assert!((rotation.x - -0.49).abs() < 1e-6);
        assert!((rotation.y - 0.51).abs() < 1e-6);
        assert_eq!(rotation.z, 0.0);
    }
}
