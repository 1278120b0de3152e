mod camera;
mod egui_overlay;
pub mod pick;
mod pipeline;
mod resources;

pub use camera::CameraController;
pub use pipeline::FrameLighting;
pub use resources::GpuResources;

use crate::app::egui_host::EguiFrameOutput;
use crate::scene::{EnvironmentHandle, GeometryHandle, Material, MaterialHandle, ModelScene};
use bytemuck::Zeroable;
use egui_overlay::EguiOverlay;
use glam::Vec3;
use pipeline::{FrameUniform, ObjectUniform, PipelineKind, SceneLayouts, ScenePipelines, DEPTH_FORMAT};
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
    #[error("GPU is out of memory")]
    OutOfMemory,
}

/// Everything the scene pass draws in one frame.
pub struct SceneFrame<'a> {
    pub camera: &'a CameraController,
    pub lighting: FrameLighting,
    /// Sky map and its yaw in radians.
    pub sky: Option<(EnvironmentHandle, f32)>,
    /// Scene-wide reflections for lit materials that carry no map of their own.
    pub environment: Option<EnvironmentHandle>,
    pub models: &'a [&'a ModelScene],
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DrawItem {
    object: u32,
    geometry: GeometryHandle,
    material: MaterialHandle,
    environment: Option<EnvironmentHandle>,
    kind: PipelineKind,
    depth: f32,
}

/// Reflection map for one material: its own slot first, then the scene-wide
/// environment unless the material is unlit.
fn draw_environment(material: &Material, scene: Option<EnvironmentHandle>) -> Option<EnvironmentHandle> {
    material
        .reflections
        .as_ref()
        .and_then(|slot| slot.map)
        .or_else(|| scene.filter(|_| !material.unlit))
}

/// Object uniforms and draw calls for every uploaded primitive. Blended
/// primitives come last, back to front.
fn collect_draws(
    models: &[&ModelScene],
    eye: Vec3,
    environment: Option<EnvironmentHandle>,
) -> (Vec<ObjectUniform>, Vec<DrawItem>) {
    let mut objects = Vec::new();
    let mut draws = Vec::new();
    for model in models {
        for instance in model.surface_instances() {
            let surface = &model.surfaces[instance.surface];
            for (group_index, group) in surface.groups.iter().enumerate() {
                let Some(geometry) = group.handle else {
                    continue;
                };
                let Some(material) = surface
                    .materials
                    .for_group(group_index)
                    .and_then(|m| model.materials.get(m))
                else {
                    continue;
                };
                let Some(material_handle) = material.handle else {
                    continue;
                };
                // One object slot per draw: the reflection flag differs per material.
                let environment = draw_environment(material, environment);
                let object = objects.len() as u32;
                objects.push(ObjectUniform::new(instance.world, environment.is_some()));
                draws.push(DrawItem {
                    object,
                    geometry,
                    material: material_handle,
                    environment,
                    kind: PipelineKind::for_material(material),
                    depth: instance.world.w_axis.truncate().distance(eye),
                });
            }
        }
    }
    // Opaque order is irrelevant with depth testing; blended ones sort far to near.
    let (mut blended, mut ordered): (Vec<DrawItem>, Vec<DrawItem>) = draws
        .into_iter()
        .partition(|draw| draw.kind == PipelineKind::Blend);
    blended.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    ordered.extend(blended);
    (objects, ordered)
}

struct ObjectBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: u64,
}

impl ObjectBuffer {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u64) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let size = std::mem::size_of::<ObjectUniform>() as u64;
        // Dynamic offsets must be multiples of the device alignment.
        let stride = size.div_ceil(align) * align;
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniforms"),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(size),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            stride,
            capacity,
        }
    }

    fn write(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        objects: &[ObjectUniform],
    ) {
        let count = objects.len() as u64;
        if count > self.capacity {
            // Grow geometrically so a slowly rising count does not rebuild every frame.
            *self = Self::new(device, layout, count.next_power_of_two());
        }
        if objects.is_empty() {
            return;
        }
        let mut bytes = vec![0u8; (self.stride * count) as usize];
        for (i, object) in objects.iter().enumerate() {
            let start = i * self.stride as usize;
            let src = bytemuck::bytes_of(object);
            bytes[start..start + src.len()].copy_from_slice(src);
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

pub struct RenderContext {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    layouts: Arc<SceneLayouts>,
    pipelines: ScenePipelines,
    depth_view: wgpu::TextureView,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    objects: ObjectBuffer,
    overlay: EguiOverlay,
    window: Arc<Window>,
}

impl RenderContext {
    /// Create the GPU context and the resource owner that shares its device.
    pub fn new(window: Arc<Window>) -> Result<(Self, GpuResources), RenderError> {
        pollster::block_on(Self::new_async(window))
    }

    async fn new_async(window: Arc<Window>) -> Result<(Self, GpuResources), RenderError> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Viewer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(RenderError::NoSurfaceFormat)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let layouts = Arc::new(SceneLayouts::new(&device));
        let pipelines = ScenePipelines::new(&device, &layouts, format);
        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniform"),
            contents: bytemuck::bytes_of(&FrameUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });
        let objects = ObjectBuffer::new(&device, &layouts.object, 64);
        let depth_view = create_depth_view(&device, width, height);
        let overlay = EguiOverlay::new(&device, format);
        let resources = GpuResources::new(device.clone(), queue.clone(), layouts.clone());

        Ok((
            Self {
                surface,
                device,
                queue,
                config,
                layouts,
                pipelines,
                depth_view,
                frame_buffer,
                frame_bind_group,
                objects,
                overlay,
                window,
            },
            resources,
        ))
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, new_size.width, new_size.height);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn max_texture_side(&self) -> usize {
        self.device.limits().max_texture_dimension_2d as usize
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn render(
        &mut self,
        resources: &GpuResources,
        scene: &SceneFrame<'_>,
        ui: &EguiFrameOutput,
    ) -> Result<(), RenderError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return Ok(());
            }
        };
        let target = output.texture.create_view(&Default::default());

        // Non-sRGB swapchains get the transfer function applied in the shader.
        let encode_srgb = !self.config.format.is_srgb();
        let aspect = self.config.width as f32 / self.config.height.max(1) as f32;
        // A handle whose upload failed draws as no sky at all.
        let sky = scene
            .sky
            .filter(|(handle, _)| resources.has_environment(*handle));
        let eye = scene.camera.position();
        let frame = FrameUniform::new(
            scene.camera.view_proj(aspect),
            eye,
            &scene.lighting,
            sky.map(|(_, yaw)| yaw),
            encode_srgb,
        );
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        let environment = scene
            .environment
            .filter(|handle| resources.has_environment(*handle));
        let (objects, draws) = collect_draws(scene.models, eye, environment);
        self.objects
            .write(&self.device, &self.queue, &self.layouts.object, &objects);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        let screen = self.overlay.prepare(&self.device, &self.queue, &mut encoder, ui);

        let background = scene.lighting.background;
        let clear = if encode_srgb {
            background.to_array().map(linear_to_srgb)
        } else {
            background.to_array()
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear[0] as f64,
                            g: clear[1] as f64,
                            b: clear[2] as f64,
                            a: 1.0,
                        }),
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
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            if let Some((handle, _)) = sky {
                pass.set_pipeline(&self.pipelines.sky);
                pass.set_bind_group(1, resources.environment_bind_group(Some(handle)), &[]);
                pass.draw(0..3, 0..1);
            }

            let mut current = None;
            for draw in &draws {
                let (Some(geometry), Some(material)) = (
                    resources.geometry(draw.geometry),
                    resources.material(draw.material),
                ) else {
                    continue;
                };
                let (indices, count) = if draw.kind == PipelineKind::Wireframe {
                    (&geometry.edges, geometry.edge_count)
                } else {
                    (&geometry.indices, geometry.index_count)
                };
                if count == 0 {
                    continue;
                }
                if current != Some(draw.kind) {
                    pass.set_pipeline(self.pipelines.get(draw.kind));
                    current = Some(draw.kind);
                }
                pass.set_bind_group(1, &material.bind_group, &[]);
                pass.set_bind_group(2, resources.environment_bind_group(draw.environment), &[]);
                let offset = (draw.object as u64 * self.objects.stride) as u32;
                pass.set_bind_group(3, &self.objects.bind_group, &[offset]);
                pass.set_vertex_buffer(0, geometry.vertices.slice(..));
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..count, 0, 0..1);
            }
        }
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("UI Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();
            self.overlay.draw(&mut pass, ui, &screen);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.overlay.finish(ui);
        Ok(())
    }
}
