//! Sampling a moving source: the frames of an animated GIF are decoded up
//! front, and every time the animation advances the demo uploads the new
//! frame with `queue.write_texture` and rebuilds the texture bind group
//! before drawing. Rebinding on every source change is the point of the
//! lesson; the pipeline itself never varies. With no `--animation` given,
//! a generated loop of sliding stripes plays instead.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::DemoConfig;

const FALLBACK_SIZE: u32 = 256;
const FALLBACK_FRAMES: usize = 24;
const FALLBACK_DELAY: Duration = Duration::from_millis(40);

/// Some encoders write a zero inter-frame delay; clamp so playback never
/// degenerates into a busy spin.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(10);

const SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vertex_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-0.8, 0.8),
        vec2<f32>(-0.8, -0.8),
        vec2<f32>(0.8, -0.8),
        vec2<f32>(-0.8, 0.8),
        vec2<f32>(0.8, -0.8),
        vec2<f32>(0.8, 0.8),
    );
    var uvs = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(1.0, 0.0),
    );

    var output: VertexOutput;
    output.position = vec4<f32>(positions[index], 0.0, 1.0);
    output.uv = uvs[index];
    return output;
}

@group(0) @binding(0) var frame_sampler: sampler;
@group(0) @binding(1) var frame_texture: texture_2d<f32>;

@fragment
fn fragment_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(frame_texture, frame_sampler, input.uv);
}
"#;

/// One decoded animation frame, ready for `write_texture`.
struct AnimationFrame {
    pixels: Vec<u8>,
    delay: Duration,
}

/// A fully decoded animation. Every frame shares the same extent, so the
/// GPU texture can be allocated once and rewritten in place.
struct Animation {
    width: u32,
    height: u32,
    frames: Vec<AnimationFrame>,
}

fn normalized_delay(raw: Duration) -> Duration {
    raw.max(MIN_FRAME_DELAY)
}

/// Decodes every frame of a GIF, rejecting animations whose frames disagree
/// on dimensions or whose pixel payloads do not match width × height × 4.
fn load_animation(path: &Path) -> Result<Animation> {
    let file = File::open(path)
        .with_context(|| format!("failed to open animation at {}", path.display()))?;
    let decoder = GifDecoder::new(BufReader::new(file))
        .with_context(|| format!("failed to decode GIF header at {}", path.display()))?;
    let raw_frames = decoder
        .into_frames()
        .collect_frames()
        .with_context(|| format!("failed to decode GIF frames at {}", path.display()))?;

    if raw_frames.is_empty() {
        anyhow::bail!("animation at {} contains no frames", path.display());
    }

    let mut width = 0;
    let mut height = 0;
    let mut frames = Vec::with_capacity(raw_frames.len());
    for (index, frame) in raw_frames.into_iter().enumerate() {
        let delay = normalized_delay(Duration::from(frame.delay()));
        let buffer = frame.into_buffer();
        if index == 0 {
            width = buffer.width();
            height = buffer.height();
            if width == 0 || height == 0 {
                anyhow::bail!("animation at {} has zero extent", path.display());
            }
        } else if buffer.width() != width || buffer.height() != height {
            anyhow::bail!(
                "frame {index} is {}x{}, expected {width}x{height}",
                buffer.width(),
                buffer.height()
            );
        }
        let pixels = buffer.into_raw();
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        frames.push(AnimationFrame { pixels, delay });
    }

    Ok(Animation {
        width,
        height,
        frames,
    })
}

/// Fallback animation: a bright stripe sliding across a dark field.
fn stripe_frames(size: u32, count: usize) -> Animation {
    let stripe = (size / 8).max(1);
    let mut frames = Vec::with_capacity(count);
    for step in 0..count {
        let offset = (step as u32 * size) / count.max(1) as u32;
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let band = (x + y + size - offset) % size;
                if band < stripe {
                    pixels.extend_from_slice(&[255, 210, 60, 255]);
                } else {
                    pixels.extend_from_slice(&[25, 25, 35, 255]);
                }
            }
        }
        frames.push(AnimationFrame {
            pixels,
            delay: FALLBACK_DELAY,
        });
    }
    Animation {
        width: size,
        height: size,
        frames,
    }
}

pub fn run(config: &DemoConfig) -> Result<()> {
    let animation = match config.animation.as_deref() {
        Some(path) => {
            let animation = load_animation(path)?;
            tracing::info!(
                path = %path.display(),
                frames = animation.frames.len(),
                width = animation.width,
                height = animation.height,
                "loaded animation"
            );
            animation
        }
        None => {
            tracing::info!("no animation supplied; using generated stripe loop");
            stripe_frames(FALLBACK_SIZE, FALLBACK_FRAMES)
        }
    };

    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title("gputour: animated quad")
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create demo window")?;
    let window = Arc::new(window);

    let mut state = AnimatedQuadState::new(window.clone(), animation)?;

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                Event::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::RedrawRequested => {
                            state.advance_if_due();
                            match state.render_frame() {
                                Ok(()) => {}
                                Err(
                                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                                ) => state.reconfigure(),
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    tracing::error!("surface out of memory; exiting");
                                    elwt.exit();
                                }
                                Err(other) => {
                                    tracing::warn!(
                                        "surface error: {other:?}; retrying next frame"
                                    );
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    // Keep frames flowing; the animation decides when to flip.
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}

struct AnimatedQuadState {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    animation: Animation,
    frame_index: usize,
    last_flip: Instant,
    texture: wgpu::Texture,
    sampler: wgpu::Sampler,
    texture_group: wgpu::BindGroup,
}

impl AnimatedQuadState {
    fn new(window: Arc<Window>, animation: Animation) -> Result<Self> {
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
            label: Some("animated quad device"),
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
            label: Some("animated quad shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("animated quad pipeline"),
            layout: None,
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vertex_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
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

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("animation frame texture"),
            size: wgpu::Extent3d {
                width: animation.width,
                height: animation.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_group = build_frame_bind_group(&device, &pipeline, &texture, &sampler);

        let mut state = Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            pipeline,
            animation,
            frame_index: 0,
            last_flip: Instant::now(),
            texture,
            sampler,
            texture_group,
        };
        state.upload_current_frame();
        Ok(state)
    }

    fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Flips to the next animation frame once its predecessor's delay has
    /// elapsed, then re-uploads and re-binds the texture.
    fn advance_if_due(&mut self) {
        if self.animation.frames.len() < 2 {
            return;
        }
        let now = Instant::now();
        let due = self.animation.frames[self.frame_index].delay;
        if now.duration_since(self.last_flip) < due {
            return;
        }

        self.frame_index = (self.frame_index + 1) % self.animation.frames.len();
        self.last_flip = now;
        self.upload_current_frame();
        self.texture_group =
            build_frame_bind_group(&self.device, &self.pipeline, &self.texture, &self.sampler);
    }

    fn upload_current_frame(&mut self) {
        let frame = &self.animation.frames[self.frame_index];
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.animation.width),
                rows_per_image: Some(self.animation.height),
            },
            wgpu::Extent3d {
                width: self.animation.width,
                height: self.animation.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("animated quad encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("animated quad pass"),
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
            render_pass.set_bind_group(0, &self.texture_group, &[]);
            render_pass.draw(0..6, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn build_frame_bind_group(
    device: &wgpu::Device,
    pipeline: &wgpu::RenderPipeline,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("animation frame bind group"),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, RgbaImage};

    #[test]
    fn stripe_frames_share_one_extent() {
        let animation = stripe_frames(16, 4);
        assert_eq!(animation.frames.len(), 4);
        for frame in &animation.frames {
            assert_eq!(frame.pixels.len(), 16 * 16 * 4);
            assert_eq!(frame.delay, FALLBACK_DELAY);
        }
    }

    #[test]
    fn stripe_frames_actually_move() {
        let animation = stripe_frames(16, 4);
        assert_ne!(animation.frames[0].pixels, animation.frames[1].pixels);
    }

    #[test]
    fn zero_delays_are_clamped() {
        assert_eq!(normalized_delay(Duration::ZERO), MIN_FRAME_DELAY);
        let half_second = Duration::from_millis(500);
        assert_eq!(normalized_delay(half_second), half_second);
    }

    #[test]
    fn gif_round_trips_through_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gif");

        {
            let file = File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            let frames = (0..3u8).map(|step| {
                let image = RgbaImage::from_pixel(4, 4, image::Rgba([step * 40, 0, 0, 255]));
                Frame::from_parts(image, 0, 0, Delay::from_numer_denom_ms(40, 1))
            });
            encoder.encode_frames(frames).unwrap();
        }

        let animation = load_animation(&path).unwrap();
        assert_eq!(animation.width, 4);
        assert_eq!(animation.height, 4);
        assert_eq!(animation.frames.len(), 3);
        for frame in &animation.frames {
            assert_eq!(frame.pixels.len(), 4 * 4 * 4);
            assert!(frame.delay >= MIN_FRAME_DELAY);
        }
    }

    #[test]
    fn missing_animation_is_an_error() {
        assert!(load_animation(Path::new("/nonexistent/clip.gif")).is_err());
    }
}
