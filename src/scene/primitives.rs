use super::{Geometry, Material, ModelScene, Node, Surface, SurfaceMaterials};
use glam::Vec3;

/// A single-node model holding an axis-aligned box centered on its origin.
pub fn box_model(name: &str, size: Vec3, color: [f32; 4]) -> ModelScene {
    let mut model = ModelScene::new(name);
    let mut material = Material::standard(format!("{name}-material"));
    material.base_color = color;
    material.metallic = 0.0;
    material.roughness = 0.6;
    let material = model.add_material(material);
    let surface = model.add_surface(Surface {
        name: name.to_string(),
        groups: vec![box_geometry(size)],
        materials: SurfaceMaterials::Single(material),
    });
    let mut node = Node::new(name);
    node.surface = Some(surface);
    model.add_node(node, None);
    model
}

pub fn box_geometry(size: Vec3) -> Geometry {
    let h = size * 0.5;
    // (normal, tangent u, tangent v) per face
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = positions.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (normal + u * su + v * sv) * h;
            positions.push(p.to_array());
            normals.push(normal.to_array());
            // Image v runs top to bottom.
            uvs.push([(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    let mut geometry = Geometry::new(positions, normals, indices);
    geometry.uvs = uvs;
    geometry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::bounds::model_bounds;

    #[test]
    fn box_bounds_match_requested_size() {
        let model = box_model("b", Vec3::new(2.0, 1.0, 0.5), [1.0; 4]);
        let bounds = model_bounds(&model);
        assert!((bounds.size() - Vec3::new(2.0, 1.0, 0.5)).length() < 1e-6);
        assert!(bounds.center().length() < 1e-6);
    }

    #[test]
    fn box_faces_wind_outward() {
        let geometry = box_geometry(Vec3::ONE);
        for tri in geometry.indices.chunks_exact(3) {
            let a = Vec3::from(geometry.positions[tri[0] as usize]);
            let b = Vec3::from(geometry.positions[tri[1] as usize]);
            let c = Vec3::from(geometry.positions[tri[2] as usize]);
            let face = (b - a).cross(c - a);
            let normal = Vec3::from(geometry.normals[tri[0] as usize]);
            assert!(face.dot(normal) > 0.0);
        }
    }
}
