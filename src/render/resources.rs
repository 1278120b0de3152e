use super::pipeline::{
    interleave, MaterialUniform, SceneLayouts, TEX_BASE_COLOR, TEX_EMISSIVE, TEX_METALLIC_ROUGHNESS,
    TEX_NORMAL, TEX_OCCLUSION,
};
use crate::assets::environment::RadianceMap;
use crate::scene::{EnvironmentHandle, GeometryHandle, MaterialHandle, ModelScene, TextureHandle};
use crate::viewer::{BackendError, ResourceCounts, SceneBackend};
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub struct GpuMaterial {
    uniform: wgpu::Buffer,
    texture_bits: u32,
    pub bind_group: wgpu::BindGroup,
}

pub struct GpuGeometry {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub index_count: u32,
    pub edges: wgpu::Buffer,
    pub edge_count: u32,
}

pub struct GpuEnvironment {
    _texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
}

struct Fallbacks {
    white_srgb: wgpu::TextureView,
    white_linear: wgpu::TextureView,
    flat_normal: wgpu::TextureView,
    environment: wgpu::BindGroup,
    _black: wgpu::Texture,
}

/// Owns every GPU object created for models and environments.
pub struct GpuResources {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    layouts: Arc<SceneLayouts>,
    material_sampler: wgpu::Sampler,
    environment_sampler: wgpu::Sampler,
    fallbacks: Fallbacks,
    textures: HashMap<TextureHandle, GpuTexture>,
    materials: HashMap<MaterialHandle, GpuMaterial>,
    geometries: HashMap<GeometryHandle, GpuGeometry>,
    environments: HashMap<EnvironmentHandle, GpuEnvironment>,
    next_id: u32,
}

impl GpuResources {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, layouts: Arc<SceneLayouts>) -> Self {
        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let environment_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let solid = |label: &str, format: wgpu::TextureFormat, texel: [u8; 4]| {
            create_rgba8(&device, &queue, label, format, 1, 1, &texel).view
        };
        let black = create_environment_texture(&device, &queue, &RadianceMap::from_texels(
            "black",
            1,
            1,
            vec![[0.0, 0.0, 0.0, 1.0]],
        ));
        let environment = environment_bind_group(&device, &layouts, &black.1, &environment_sampler);
        let fallbacks = Fallbacks {
            white_srgb: solid("White (sRGB)", wgpu::TextureFormat::Rgba8UnormSrgb, [255; 4]),
            white_linear: solid("White (Linear)", wgpu::TextureFormat::Rgba8Unorm, [255; 4]),
            flat_normal: solid("Flat Normal", wgpu::TextureFormat::Rgba8Unorm, [128, 128, 255, 255]),
            environment,
            _black: black.0,
        };

        Self {
            device,
            queue,
            layouts,
            material_sampler,
            environment_sampler,
            fallbacks,
            textures: HashMap::new(),
            materials: HashMap::new(),
            geometries: HashMap::new(),
            environments: HashMap::new(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&GpuMaterial> {
        self.materials.get(&handle)
    }

    pub fn geometry(&self, handle: GeometryHandle) -> Option<&GpuGeometry> {
        self.geometries.get(&handle)
    }

    /// Bind group for a reflection map; black when absent or released.
    pub fn environment_bind_group(&self, handle: Option<EnvironmentHandle>) -> &wgpu::BindGroup {
        handle
            .and_then(|h| self.environments.get(&h))
            .map(|env| &env.bind_group)
            .unwrap_or(&self.fallbacks.environment)
    }

    pub fn has_environment(&self, handle: EnvironmentHandle) -> bool {
        self.environments.contains_key(&handle)
    }

    fn upload_texture(&mut self, model: &mut ModelScene, index: usize) -> Result<(), BackendError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        let data = &model.textures[index];
        if data.width > limit || data.height > limit {
            return Err(BackendError::TextureTooLarge {
                name: data.name.clone(),
                width: data.width,
                height: data.height,
                limit,
            });
        }
        let expected = data.width as usize * data.height as usize * 4;
        if data.rgba.len() != expected || expected == 0 {
            return Err(BackendError::TextureSize {
                name: data.name.clone(),
                actual: data.rgba.len(),
                expected,
            });
        }
        let format = if data.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let texture = create_rgba8(
            &self.device,
            &self.queue,
            &data.name,
            format,
            data.width,
            data.height,
            &data.rgba,
        );
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, texture);
        model.textures[index].handle = Some(handle);
        Ok(())
    }

    fn texture_view(
        &self,
        model: &ModelScene,
        index: Option<usize>,
        bit: u32,
        bits: &mut u32,
    ) -> Option<&wgpu::TextureView> {
        let handle = index
            .and_then(|i| model.textures.get(i))
            .and_then(|t| t.handle)?;
        let texture = self.textures.get(&handle)?;
        *bits |= bit;
        Some(&texture.view)
    }

    fn upload_material(&mut self, model: &mut ModelScene, index: usize) {
        let material = &model.materials[index];
        let mut bits = 0;
        let base = self
            .texture_view(model, material.base_color_texture, TEX_BASE_COLOR, &mut bits)
            .unwrap_or(&self.fallbacks.white_srgb);
        let metallic_roughness = self
            .texture_view(
                model,
                material.metallic_roughness_texture,
                TEX_METALLIC_ROUGHNESS,
                &mut bits,
            )
            .unwrap_or(&self.fallbacks.white_linear);
        let normal = self
            .texture_view(model, material.normal_texture, TEX_NORMAL, &mut bits)
            .unwrap_or(&self.fallbacks.flat_normal);
        let occlusion = self
            .texture_view(model, material.occlusion_texture, TEX_OCCLUSION, &mut bits)
            .unwrap_or(&self.fallbacks.white_linear);
        let emissive = self
            .texture_view(
                model,
                material.emissive.as_ref().and_then(|e| e.texture),
                TEX_EMISSIVE,
                &mut bits,
            )
            .unwrap_or(&self.fallbacks.white_srgb);

        let uniform = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Uniform"),
            contents: bytemuck::bytes_of(&MaterialUniform::from_material(material, bits)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &self.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(base),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(metallic_roughness),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(normal),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(occlusion),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(emissive),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                },
            ],
        });

        let handle = MaterialHandle(self.next_id());
        self.materials.insert(
            handle,
            GpuMaterial {
                uniform,
                texture_bits: bits,
                bind_group,
            },
        );
        let material = &mut model.materials[index];
        material.handle = Some(handle);
        material.needs_update = false;
    }
}

impl SceneBackend for GpuResources {
    fn upload_model(&mut self, model: &mut ModelScene) -> Result<(), BackendError> {
        // Textures first: material bind groups reference their views.
        for index in model.referenced_texture_ids() {
            if model.textures[index].handle.is_none() {
                self.upload_texture(model, index)?;
            }
        }
        for index in model.surface_material_ids() {
            if model.materials[index].handle.is_none() {
                self.upload_material(model, index);
            }
        }
        for surface_index in 0..model.surfaces.len() {
            for group_index in 0..model.surfaces[surface_index].groups.len() {
                if model.surfaces[surface_index].groups[group_index].handle.is_some() {
                    continue;
                }
                let handle = GeometryHandle(self.next_id());
                let geometry = &mut model.surfaces[surface_index].groups[group_index];
                let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Mesh Vertices"),
                    contents: bytemuck::cast_slice(&interleave(geometry)),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                });
                let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Mesh Indices"),
                    contents: bytemuck::cast_slice(&geometry.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                let edge_list = geometry.edge_indices();
                let edges = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Mesh Edges"),
                    contents: bytemuck::cast_slice(&edge_list),
                    usage: wgpu::BufferUsages::INDEX,
                });
                self.geometries.insert(
                    handle,
                    GpuGeometry {
                        vertices,
                        indices,
                        index_count: geometry.indices.len() as u32,
                        edges,
                        edge_count: edge_list.len() as u32,
                    },
                );
                geometry.handle = Some(handle);
                // The initial upload already interleaved the current pose.
                geometry.pose_dirty = false;
            }
        }
        log::debug!(
            "uploaded '{}': {} textures, {} materials, {} geometries live",
            model.name,
            self.textures.len(),
            self.materials.len(),
            self.geometries.len()
        );
        Ok(())
    }

    fn sync_model(&mut self, model: &mut ModelScene) {
        for material in &mut model.materials {
            if !material.needs_update {
                continue;
            }
            if let Some(gpu) = material.handle.and_then(|h| self.materials.get(&h)) {
                let uniform = MaterialUniform::from_material(material, gpu.texture_bits);
                self.queue
                    .write_buffer(&gpu.uniform, 0, bytemuck::bytes_of(&uniform));
            }
            material.needs_update = false;
        }
        for surface in &mut model.surfaces {
            for geometry in &mut surface.groups {
                if !geometry.pose_dirty {
                    continue;
                }
                // Same vertex count as at upload, so the buffer is rewritten in place.
                if let Some(gpu) = geometry.handle.and_then(|h| self.geometries.get(&h)) {
                    self.queue
                        .write_buffer(&gpu.vertices, 0, bytemuck::cast_slice(&interleave(geometry)));
                }
                geometry.pose_dirty = false;
            }
        }
    }

    fn upload_environment(&mut self, map: &RadianceMap) -> Result<EnvironmentHandle, BackendError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if map.width() > limit || map.height() > limit {
            return Err(BackendError::TextureTooLarge {
                name: map.name.clone(),
                width: map.width(),
                height: map.height(),
                limit,
            });
        }
        let (texture, view) = create_environment_texture(&self.device, &self.queue, map);
        let bind_group = environment_bind_group(
            &self.device,
            &self.layouts,
            &view,
            &self.environment_sampler,
        );
        let handle = EnvironmentHandle(self.next_id());
        self.environments.insert(
            handle,
            GpuEnvironment {
                _texture: texture,
                bind_group,
            },
        );
        log::info!(
            "uploaded environment '{}' ({}x{}, {} levels)",
            map.name,
            map.width(),
            map.height(),
            map.level_count()
        );
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.remove(&handle) {
            texture.texture.destroy();
        }
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        if let Some(material) = self.materials.remove(&handle) {
            material.uniform.destroy();
        }
    }

    fn release_geometry(&mut self, handle: GeometryHandle) {
        if let Some(geometry) = self.geometries.remove(&handle) {
            geometry.vertices.destroy();
            geometry.indices.destroy();
            geometry.edges.destroy();
        }
    }

    fn live_resources(&self) -> ResourceCounts {
        ResourceCounts {
            textures: self.textures.len(),
            materials: self.materials.len(),
            geometries: self.geometries.len(),
            environments: self.environments.len(),
        }
    }
}

fn create_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> GpuTexture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&Default::default());
    GpuTexture { texture, view }
}

/// Rgba16Float equirect texture carrying every level of the map.
fn create_environment_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    map: &RadianceMap,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&map.name),
        size: wgpu::Extent3d {
            width: map.width(),
            height: map.height(),
            depth_or_array_layers: 1,
        },
        mip_level_count: map.level_count().max(1),
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba16Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (mip, level) in map.levels.iter().enumerate() {
        let texels = map.level_as_f16(mip);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: mip as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                // Four f16 channels per texel.
                bytes_per_row: Some(level.width * 8),
                rows_per_image: Some(level.height),
            },
            wgpu::Extent3d {
                width: level.width,
                height: level.height,
                depth_or_array_layers: 1,
            },
        );
    }
    let view = texture.create_view(&Default::default());
    (texture, view)
}

fn environment_bind_group(
    device: &wgpu::Device,
    layouts: &SceneLayouts,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Environment Bind Group"),
        layout: &layouts.environment,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
