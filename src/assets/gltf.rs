//! glTF 2.0 (`.gltf` / `.glb`) import into an owned [`ModelScene`].

use super::{fetch_bytes, AssetError, AssetLocator};
use crate::scene::{
    compute_normals, AlphaMode, AnimationClip, Channel, ChannelValues, Emissive, Geometry,
    Interpolation, Material, ModelScene, Node, ReflectionSlot, Skin, SkinWeights, Surface,
    SurfaceMaterials, TextureData, Transform,
};
use ::gltf::animation::util::ReadOutputs;
use ::gltf::image::Format;
use glam::{Mat4, Quat, Vec3};
use std::collections::BTreeSet;

/// Load a model from disk or over HTTP.
///
/// Remote `.gltf` files must be self-contained (GLB or data URIs); local files
/// may reference sibling buffers and images.
pub fn load_model(locator: &AssetLocator) -> Result<ModelScene, AssetError> {
    let imported = match locator {
        AssetLocator::File(path) => ::gltf::import(path),
        AssetLocator::Remote(_) => {
            if locator.extension().as_deref() == Some("gltf") {
                log::debug!("{locator}: remote .gltf must embed its buffers and images");
            }
            let bytes = fetch_bytes(locator)?;
            ::gltf::import_slice(&bytes)
        }
    };
    let (document, buffers, images) = imported.map_err(|source| AssetError::ParseGltf {
        locator: locator.display_name(),
        source,
    })?;
    convert(&document, &buffers, &images, &model_name(locator), &locator.display_name())
}

/// Parse an in-memory GLB or embedded glTF.
#[cfg(test)]
pub fn parse_model(bytes: &[u8], name: &str) -> Result<ModelScene, AssetError> {
    let (document, buffers, images) =
        ::gltf::import_slice(bytes).map_err(|source| AssetError::ParseGltf {
            locator: name.to_string(),
            source,
        })?;
    convert(&document, &buffers, &images, name, name)
}

fn model_name(locator: &AssetLocator) -> String {
    let raw = match locator {
        AssetLocator::File(path) => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
        AssetLocator::Remote(url) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            let last = path.rsplit('/').next().unwrap_or(path);
            last.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(last).to_string()
        }
    };
    if raw.is_empty() {
        "model".to_string()
    } else {
        raw
    }
}

fn convert(
    document: &::gltf::Document,
    buffers: &[::gltf::buffer::Data],
    images: &[::gltf::image::Data],
    name: &str,
    locator: &str,
) -> Result<ModelScene, AssetError> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::NoScene {
            locator: locator.to_string(),
        })?;

    let mut model = ModelScene::new(name);
    model.textures = convert_textures(document, images, locator)?;
    model.materials = document.materials().map(convert_material).collect();
    let mut default_material: Option<usize> = None;

    for mesh in document.meshes() {
        let mut groups = Vec::new();
        let mut materials = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != ::gltf::mesh::Mode::Triangles {
                log::debug!(
                    "{locator}: skipping non-triangle primitive in mesh {}",
                    mesh.index()
                );
                continue;
            }
            let Some(geometry) = read_geometry(&primitive, buffers) else {
                continue;
            };
            // Primitives without a material share one default, created lazily.
            let material = match primitive.material().index() {
                Some(index) => index,
                None => *default_material
                    .get_or_insert_with(|| model.add_material(Material::standard("default"))),
            };
            groups.push(geometry);
            materials.push(material);
        }
        let materials = if materials.len() == 1 {
            SurfaceMaterials::Single(materials[0])
        } else {
            SurfaceMaterials::Multi(materials)
        };
        model.surfaces.push(Surface {
            name: mesh.name().unwrap_or("mesh").to_string(),
            groups,
            materials,
        });
    }

    model.nodes = document
        .nodes()
        .map(|node| {
            let (t, r, s) = node.transform().decomposed();
            Node {
                name: node.name().unwrap_or("").to_string(),
                local: Transform {
                    translation: Vec3::from(t),
                    rotation: Quat::from_array(r),
                    scale: Vec3::from(s),
                },
                children: node.children().map(|child| child.index()).collect(),
                surface: node.mesh().map(|mesh| mesh.index()),
                skin: node.skin().map(|skin| skin.index()),
            }
        })
        .collect();
    model.roots = scene.nodes().map(|node| node.index()).collect();

    model.skins = document
        .skins()
        .map(|skin| {
            let reader = skin.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let inverse_bind: Vec<Mat4> = reader
                .read_inverse_bind_matrices()
                .map(|matrices| matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_default();
            Skin {
                joints: skin.joints().map(|joint| joint.index()).collect(),
                inverse_bind,
            }
        })
        .collect();

    model.animations = document
        .animations()
        .map(|animation| convert_animation(&animation, buffers))
        .collect();

    log::info!(
        "parsed '{}': {} nodes, {} surfaces, {} materials, {} textures, {} clips",
        name,
        model.nodes.len(),
        model.surfaces.len(),
        model.materials.len(),
        model.textures.len(),
        model.animations.len()
    );
    Ok(model)
}

fn read_geometry(
    primitive: &::gltf::Primitive<'_>,
    buffers: &[::gltf::buffer::Data],
) -> Option<Geometry> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    if positions.is_empty() {
        return None;
    }
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        // Non-indexed: every three vertices form a triangle.
        None => (0..positions.len() as u32).collect(),
    };
    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(normals) => normals.collect(),
        None => compute_normals(&positions, &indices),
    };
    let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(uvs) => uvs.into_f32().collect(),
        None => vec![[0.0, 0.0]; positions.len()],
    };
    let skin = match (reader.read_joints(0), reader.read_weights(0)) {
        (Some(joints), Some(weights)) => Some(SkinWeights {
            joints: joints.into_u16().collect(),
            weights: weights.into_f32().collect(),
        }),
        _ => None,
    };

    let mut geometry = Geometry::new(positions, normals, indices);
    geometry.uvs = uvs;
    geometry.skin = skin;
    Some(geometry)
}

fn convert_material(material: ::gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("material-{}", material.index().unwrap_or(0)));

    if material.unlit() {
        let mut unlit = Material::unlit(name, pbr.base_color_factor());
        unlit.base_color_texture = pbr.base_color_texture().map(|info| info.texture().index());
        unlit.double_sided = material.double_sided();
        unlit.alpha_mode = alpha_mode(&material);
        return unlit;
    }

    Material {
        base_color: pbr.base_color_factor(),
        base_color_texture: pbr.base_color_texture().map(|info| info.texture().index()),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        metallic_roughness_texture: pbr
            .metallic_roughness_texture()
            .map(|info| info.texture().index()),
        normal_texture: material.normal_texture().map(|info| info.texture().index()),
        occlusion_texture: material.occlusion_texture().map(|info| info.texture().index()),
        emissive: Some(Emissive {
            color: material.emissive_factor(),
            intensity: material.emissive_strength().unwrap_or(1.0),
            texture: material.emissive_texture().map(|info| info.texture().index()),
        }),
        reflections: Some(ReflectionSlot::default()),
        double_sided: material.double_sided(),
        alpha_mode: alpha_mode(&material),
        ..Material::standard(name)
    }
}

fn alpha_mode(material: &::gltf::Material<'_>) -> AlphaMode {
    match material.alpha_mode() {
        ::gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        ::gltf::material::AlphaMode::Mask => AlphaMode::Mask(material.alpha_cutoff().unwrap_or(0.5)),
        ::gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    }
}

fn convert_textures(
    document: &::gltf::Document,
    images: &[::gltf::image::Data],
    locator: &str,
) -> Result<Vec<TextureData>, AssetError> {
    // Colour textures are sampled as sRGB; data textures stay linear.
    let mut srgb = BTreeSet::new();
    for material in document.materials() {
        if let Some(info) = material.pbr_metallic_roughness().base_color_texture() {
            srgb.insert(info.texture().index());
        }
        if let Some(info) = material.emissive_texture() {
            srgb.insert(info.texture().index());
        }
    }

    document
        .textures()
        .map(|texture| {
            let source = texture.source().index();
            let image = images.get(source).ok_or_else(|| AssetError::PixelFormat {
                locator: locator.to_string(),
                format: format!("missing image {source}"),
            })?;
            Ok(TextureData {
                name: texture
                    .name()
                    .or_else(|| texture.source().name())
                    .unwrap_or("texture")
                    .to_string(),
                width: image.width,
                height: image.height,
                rgba: to_rgba8(image, locator)?,
                srgb: srgb.contains(&texture.index()),
                handle: None,
            })
        })
        .collect()
}

fn to_rgba8(image: &::gltf::image::Data, locator: &str) -> Result<Vec<u8>, AssetError> {
    let (channels, bytes_per_channel, float) = match image.format {
        Format::R8 => (1, 1, false),
        Format::R8G8 => (2, 1, false),
        Format::R8G8B8 => (3, 1, false),
        Format::R8G8B8A8 => (4, 1, false),
        Format::R16 => (1, 2, false),
        Format::R16G16 => (2, 2, false),
        Format::R16G16B16 => (3, 2, false),
        Format::R16G16B16A16 => (4, 2, false),
        Format::R32G32B32FLOAT => (3, 4, true),
        Format::R32G32B32A32FLOAT => (4, 4, true),
    };
    if channels == 4 && bytes_per_channel == 1 {
        return Ok(image.pixels.clone());
    }

    // Everything else is widened to RGBA8.

    let stride = channels * bytes_per_channel;
    let pixel_count = (image.width as usize) * (image.height as usize);
    if image.pixels.len() < pixel_count * stride {
        return Err(AssetError::PixelFormat {
            locator: locator.to_string(),
            format: format!("{:?} with short pixel buffer", image.format),
        });
    }

    let read = |bytes: &[u8]| -> u8 {
        match (bytes_per_channel, float) {
            (1, _) => bytes[0],
            // High byte of a little-endian u16.
            (2, _) => bytes[1],
            _ => {
                let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (value.clamp(0.0, 1.0) * 255.0).round() as u8
            }
        }
    };

    let mut rgba = Vec::with_capacity(pixel_count * 4);
    for pixel in image.pixels.chunks_exact(stride).take(pixel_count) {
        let channel = |c: usize| read(&pixel[c * bytes_per_channel..(c + 1) * bytes_per_channel]);
        let out = match channels {
            1 => {
                let l = channel(0);
                [l, l, l, 255]
            }
            2 => [channel(0), channel(1), 0, 255],
            3 => [channel(0), channel(1), channel(2), 255],
            _ => [channel(0), channel(1), channel(2), channel(3)],
        };
        rgba.extend_from_slice(&out);
    }
    Ok(rgba)
}

fn convert_animation(
    animation: &::gltf::Animation<'_>,
    buffers: &[::gltf::buffer::Data],
) -> AnimationClip {
    let mut channels = Vec::new();
    for channel in animation.channels() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();
        let values = match reader.read_outputs() {
            Some(ReadOutputs::Translations(values)) => {
                ChannelValues::Translation(values.map(Vec3::from).collect())
            }
            Some(ReadOutputs::Rotations(values)) => {
                ChannelValues::Rotation(values.into_f32().map(Quat::from_array).collect())
            }
            Some(ReadOutputs::Scales(values)) => {
                ChannelValues::Scale(values.map(Vec3::from).collect())
            }
            // Morph targets are not rendered.
            Some(ReadOutputs::MorphTargetWeights(_)) | None => continue,
        };
        let interpolation = match channel.sampler().interpolation() {
            ::gltf::animation::Interpolation::Step => Interpolation::Step,
            ::gltf::animation::Interpolation::Linear => Interpolation::Linear,
            ::gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        };
        channels.push(Channel {
            node: channel.target().node().index(),
            interpolation,
            times,
            values,
        });
    }
    AnimationClip::new(animation.name().unwrap_or("clip"), channels)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    fn push_f32s(bin: &mut Vec<u8>, values: &[f32]) {
        for value in values {
            bin.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn pad(bytes: &mut Vec<u8>, fill: u8) {
        while bytes.len() % 4 != 0 {
            bytes.push(fill);
        }
    }

    /// A GLB holding one triangle spanning (0,0,0)..(2,1,0) plus a slide clip.
    pub(crate) fn triangle_glb() -> Vec<u8> {
        let mut bin = Vec::new();
        push_f32s(&mut bin, &[0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        for index in [0u16, 1, 2] {
            bin.extend_from_slice(&index.to_le_bytes());
        }
        pad(&mut bin, 0);
        let times_offset = bin.len();
        push_f32s(&mut bin, &[0.0, 1.0]);
        let translations_offset = bin.len();
        push_f32s(&mut bin, &[0.0, 0.0, 0.0, 0.0, 3.0, 0.0]);

        let document = json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "tri", "mesh": 0, "translation": [1.0, 0.0, 0.0] }],
            "meshes": [{ "name": "tri", "primitives": [{
                "attributes": { "POSITION": 0 },
                "indices": 1,
                "material": 0
            }]}],
            "materials": [{
                "name": "glow",
                "emissiveFactor": [1.0, 0.5, 0.0],
                "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.5, 0.5, 1.0] }
            }],
            "animations": [{
                "name": "bob",
                "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }],
                "samplers": [{ "input": 2, "output": 3, "interpolation": "LINEAR" }]
            }],
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 },
                { "buffer": 0, "byteOffset": times_offset, "byteLength": 8 },
                { "buffer": 0, "byteOffset": translations_offset, "byteLength": 24 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                  "min": [0.0, 0.0, 0.0], "max": [2.0, 1.0, 0.0] },
                { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
                { "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR",
                  "min": [0.0], "max": [1.0] },
                { "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }
            ]
        });
        let mut json_chunk = serde_json::to_vec(&document).expect("serialize glTF json");
        pad(&mut json_chunk, b' ');

        let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_chunk);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }

    #[test]
    fn parses_triangle_glb() {
        let model = parse_model(&triangle_glb(), "tri").expect("parse glb");
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.roots, vec![0]);
        assert_eq!(model.surfaces.len(), 1);
        assert_eq!(model.surfaces[0].materials, SurfaceMaterials::Single(0));

        let geometry = &model.surfaces[0].groups[0];
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert_eq!(geometry.normals.len(), 3);
        assert!((Vec3::from(geometry.normals[0]) - Vec3::Z).length() < 1e-5);
        assert_eq!(model.nodes[0].local.translation, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn keeps_emissive_and_clip() {
        let model = parse_model(&triangle_glb(), "tri").expect("parse glb");
        let emissive = model.materials[0].emissive.expect("lit material has emissive");
        assert_eq!(emissive.color, [1.0, 0.5, 0.0]);
        assert!(model.materials[0].reflections.is_some());

        assert_eq!(model.animations.len(), 1);
        assert_eq!(model.animations[0].duration, 1.0);
        assert_eq!(model.animations[0].channels[0].node, 0);
    }

    #[test]
    fn garbage_bytes_report_parse_error() {
        let result = parse_model(b"definitely not gltf", "junk");
        assert!(matches!(result, Err(AssetError::ParseGltf { .. })));
    }

    #[test]
    fn loads_from_file_locator() {
        let dir = std::env::temp_dir().join(format!("vitrine-gltf-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("ship.glb");
        std::fs::write(&path, triangle_glb()).expect("write glb");

        let model = load_model(&AssetLocator::File(path)).expect("load glb");
        assert_eq!(model.name, "ship");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn expands_grey_pixels_to_rgba() {
        let image = ::gltf::image::Data {
            pixels: vec![10, 20],
            format: Format::R8,
            width: 2,
            height: 1,
        };
        let rgba = to_rgba8(&image, "grey").expect("convert");
        assert_eq!(rgba, vec![10, 10, 10, 255, 20, 20, 20, 255]);
    }
}
