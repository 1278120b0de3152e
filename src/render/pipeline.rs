//! Bind group layouts, uniform blocks and render pipelines for the scene pass.

use crate::scene::{AlphaMode, Geometry, Material};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub const TEX_BASE_COLOR: u32 = 1;
pub const TEX_METALLIC_ROUGHNESS: u32 = 1 << 1;
pub const TEX_NORMAL: u32 = 1 << 2;
pub const TEX_OCCLUSION: u32 = 1 << 3;
pub const TEX_EMISSIVE: u32 = 1 << 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Interleave a geometry for upload, preferring the skinned pose.
pub fn interleave(geometry: &Geometry) -> Vec<MeshVertex> {
    let (positions, normals) = match &geometry.pose {
        Some(pose) => (&pose.positions, &pose.normals),
        None => (&geometry.positions, &geometry.normals),
    };
    positions
        .iter()
        .enumerate()
        .map(|(i, &position)| MeshVertex {
            position,
            normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            uv: geometry.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
        })
        .collect()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    /// xyz camera position, w exposure.
    pub camera: [f32; 4],
    /// xyz key light position, w intensity.
    pub key_light: [f32; 4],
    /// rgb ambient, w unused.
    pub ambient: [f32; 4],
    /// rgb background, w sky yaw in radians.
    pub background: [f32; 4],
    /// x: sky present, y: encode sRGB in the shader.
    pub flags: [u32; 4],
}

/// Per-frame lighting inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLighting {
    pub background: Vec3,
    pub key_position: Vec3,
    pub key_intensity: f32,
    pub ambient: f32,
    pub exposure: f32,
}

impl FrameUniform {
    pub fn new(
        view_proj: Mat4,
        camera_position: Vec3,
        lighting: &FrameLighting,
        sky_yaw: Option<f32>,
        encode_srgb: bool,
    ) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            // The sky pass turns screen positions back into view rays.
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera: camera_position.extend(lighting.exposure).to_array(),
            key_light: lighting.key_position.extend(lighting.key_intensity).to_array(),
            ambient: Vec3::splat(lighting.ambient.max(0.0)).extend(0.0).to_array(),
            background: lighting.background.extend(sky_yaw.unwrap_or(0.0)).to_array(),
            flags: [sky_yaw.is_some() as u32, encode_srgb as u32, 0, 0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    /// rgb already scaled by intensity.
    pub emissive: [f32; 4],
    /// metallic, roughness, alpha cutoff, unused.
    pub params: [f32; 4],
    /// x: texture bits, y: unlit, z: unused, w: alpha mode.
    pub flags: [u32; 4],
}

impl MaterialUniform {
    pub fn from_material(material: &Material, texture_bits: u32) -> Self {
        let emissive = material
            .emissive
            .as_ref()
            .map(|e| [e.color[0] * e.intensity, e.color[1] * e.intensity, e.color[2] * e.intensity, 0.0])
            .unwrap_or([0.0; 4]);
        let (alpha_mode, cutoff) = match material.alpha_mode {
            AlphaMode::Opaque => (0, 0.0),
            AlphaMode::Mask(cutoff) => (1, cutoff),
            AlphaMode::Blend => (2, 0.0),
        };
        Self {
            base_color: material.base_color,
            emissive,
            params: [
                material.metallic.clamp(0.0, 1.0),
                material.roughness.clamp(0.04, 1.0),
                cutoff,
                0.0,
            ],
            flags: [texture_bits, material.unlit as u32, 0, alpha_mode],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    /// x: an environment map is bound for this draw.
    pub flags: [u32; 4],
}

impl ObjectUniform {
    pub fn new(world: Mat4, reflective: bool) -> Self {
        let normal = if world.determinant().abs() > f32::EPSILON {
            world.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
        Self {
            model: world.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
            flags: [reflective as u32, 0, 0, 0],
        }
    }
}

/// Which scene pipeline draws a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Opaque,
    DoubleSided,
    Blend,
    Wireframe,
}

impl PipelineKind {
    pub fn for_material(material: &Material) -> Self {
        if material.wireframe {
            Self::Wireframe
        } else if material.alpha_mode == AlphaMode::Blend {
            Self::Blend
        } else if material.double_sided {
            Self::DoubleSided
        } else {
            Self::Opaque
        }
    }
}

/// Layouts shared by the pipelines and the resource owner.
pub struct SceneLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub environment: wgpu::BindGroupLayout,
    pub object: wgpu::BindGroupLayout,
}

fn uniform_entry(binding: u32, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
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

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

impl SceneLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[uniform_entry(0, false)],
        });
        // Base color, metallic-roughness, normal, occlusion, emissive.
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                uniform_entry(0, false),
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                texture_entry(4),
                texture_entry(5),
                sampler_entry(6),
            ],
        });
        let environment = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Environment Bind Group Layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });
        let object = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Object Bind Group Layout"),
            entries: &[uniform_entry(0, true)],
        });
        Self {
            frame,
            material,
            environment,
            object,
        }
    }
}

pub struct ScenePipelines {
    opaque: wgpu::RenderPipeline,
    double_sided: wgpu::RenderPipeline,
    blend: wgpu::RenderPipeline,
    wireframe: wgpu::RenderPipeline,
    pub sky: wgpu::RenderPipeline,
}

impl ScenePipelines {
    pub fn new(device: &wgpu::Device, layouts: &SceneLayouts, format: wgpu::TextureFormat) -> Self {
        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });
        let sky_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sky Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sky.wgsl").into()),
        });

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[
                &layouts.frame,
                &layouts.material,
                &layouts.environment,
                &layouts.object,
            ],
            push_constant_ranges: &[],
        });
        let sky_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sky Pipeline Layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.environment],
            push_constant_ranges: &[],
        });

        let mesh = |label: &str,
                    topology: wgpu::PrimitiveTopology,
                    cull_mode: Option<wgpu::Face>,
                    blend: Option<wgpu::BlendState>,
                    depth_write: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&mesh_layout),
                vertex: wgpu::VertexState {
                    module: &mesh_shader,
                    entry_point: Some("vs_main"),
                    buffers: &[MeshVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &mesh_shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: depth_write,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let triangles = wgpu::PrimitiveTopology::TriangleList;
        let opaque = mesh(
            "Mesh Pipeline (Opaque)",
            triangles,
            Some(wgpu::Face::Back),
            Some(wgpu::BlendState::REPLACE),
            true,
        );
        let double_sided = mesh(
            "Mesh Pipeline (Double Sided)",
            triangles,
            None,
            Some(wgpu::BlendState::REPLACE),
            true,
        );
        // Blended surfaces test depth but leave it for the surfaces behind them.
        let blend = mesh(
            "Mesh Pipeline (Blend)",
            triangles,
            None,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            false,
        );
        let wireframe = mesh(
            "Mesh Pipeline (Wireframe)",
            wgpu::PrimitiveTopology::LineList,
            None,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            true,
        );

        let sky = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sky Pipeline"),
            layout: Some(&sky_layout),
            vertex: wgpu::VertexState {
                module: &sky_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &sky_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            // Drawn first as a fullscreen triangle, so depth is neither tested nor written.
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            opaque,
            double_sided,
            blend,
            wireframe,
            sky,
        }
    }

    pub fn get(&self, kind: PipelineKind) -> &wgpu::RenderPipeline {
        match kind {
            PipelineKind::Opaque => &self.opaque,
            PipelineKind::DoubleSided => &self.double_sided,
            PipelineKind::Blend => &self.blend,
            PipelineKind::Wireframe => &self.wireframe,
        }
    }
}
