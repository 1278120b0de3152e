pub mod animation;
pub mod bounds;
pub mod materials;
pub mod normalize;
pub mod primitives;

use glam::{Mat4, Quat, Vec3};
use std::collections::BTreeSet;

pub use animation::{AnimationClip, AnimationMixer, Channel, ChannelValues, Interpolation, Skin};
pub use bounds::Aabb;

/// Backend-assigned id of an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Backend-assigned id of an uploaded material (uniforms + bindings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u32);

/// Backend-assigned id of an uploaded vertex/index buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryHandle(pub u32);

/// Backend-assigned id of a reflection-ready radiance map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Decoded RGBA8 image owned by a model until upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub srgb: bool,
    pub handle: Option<TextureHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emissive {
    pub color: [f32; 3],
    pub intensity: f32,
    pub texture: Option<usize>,
}

impl Emissive {
    pub fn is_lit(&self) -> bool {
        self.color[0] + self.color[1] + self.color[2] > 0.001
    }
}

/// Per-material reflection map reference. Present only on materials that can
/// sample an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReflectionSlot {
    pub map: Option<EnvironmentHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaMode {
    Opaque,
    Mask(f32),
    Blend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub base_color_texture: Option<usize>,
    pub metallic: f32,
    pub roughness: f32,
    pub metallic_roughness_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
    pub emissive: Option<Emissive>,
    pub reflections: Option<ReflectionSlot>,
    pub unlit: bool,
    pub wireframe: bool,
    pub double_sided: bool,
    pub alpha_mode: AlphaMode,
    /// Set whenever a field the GPU copy mirrors has changed.
    pub needs_update: bool,
    pub handle: Option<MaterialHandle>,
}

impl Material {
    /// Lit metallic-roughness material with emissive and reflection support.
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            base_color_texture: None,
            metallic: 1.0,
            roughness: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive: Some(Emissive {
                color: [0.0, 0.0, 0.0],
                intensity: 1.0,
                texture: None,
            }),
            reflections: Some(ReflectionSlot::default()),
            unlit: false,
            wireframe: false,
            double_sided: false,
            alpha_mode: AlphaMode::Opaque,
            needs_update: true,
            handle: None,
        }
    }

    /// Flat-shaded material; no emissive or reflection capability.
    pub fn unlit(name: impl Into<String>, color: [f32; 4]) -> Self {
        Self {
            base_color: color,
            emissive: None,
            reflections: None,
            unlit: true,
            ..Self::standard(name)
        }
    }

    /// Indices into `ModelScene::textures` referenced by this material.
    pub fn texture_indices(&self) -> impl Iterator<Item = usize> + '_ {
        [
            self.base_color_texture,
            self.metallic_roughness_texture,
            self.normal_texture,
            self.occlusion_texture,
            self.emissive.and_then(|emissive| emissive.texture),
        ]
        .into_iter()
        .flatten()
    }
}

/// Vertex joint influences for skinned geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinWeights {
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

/// CPU-skinned vertex data, expressed in model space.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub skin: Option<SkinWeights>,
    pub pose: Option<Pose>,
    pub pose_dirty: bool,
    pub handle: Option<GeometryHandle>,
}

impl Geometry {
    pub fn new(positions: Vec<[f32; 3]>, normals: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        let uvs = vec![[0.0, 0.0]; positions.len()];
        Self {
            positions,
            normals,
            uvs,
            indices,
            skin: None,
            pose: None,
            pose_dirty: false,
            handle: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Unique undirected triangle edges, used for wireframe drawing.
    pub fn edge_indices(&self) -> Vec<u32> {
        let mut seen = BTreeSet::new();
        let mut edges = Vec::with_capacity(self.indices.len() * 2);
        for tri in self.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                // Undirected: shared edges of adjacent triangles are drawn once.
                let key = if a < b { (a, b) } else { (b, a) };
                if seen.insert(key) {
                    edges.push(key.0);
                    edges.push(key.1);
                }
            }
        }
        edges
    }
}

/// Smooth vertex normals from triangle faces, for geometry shipped without them.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (ia, ib, ic) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if ia >= positions.len() || ib >= positions.len() || ic >= positions.len() {
            continue;
        }
        let a = Vec3::from(positions[ia]);
        let b = Vec3::from(positions[ib]);
        let c = Vec3::from(positions[ic]);
        // Unnormalized, so larger faces weigh more.
        let face = (b - a).cross(c - a);
        accum[ia] += face;
        accum[ib] += face;
        accum[ic] += face;
    }
    accum
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

/// Material assignment of a surface: one material for every group, or one
/// material per geometry group.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceMaterials {
    Single(usize),
    Multi(Vec<usize>),
}

impl SurfaceMaterials {
    pub fn for_group(&self, group: usize) -> Option<usize> {
        match self {
            Self::Single(material) => Some(*material),
            Self::Multi(materials) => materials.get(group).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let slice: &[usize] = match self {
            Self::Single(material) => std::slice::from_ref(material),
            Self::Multi(materials) => materials,
        };
        slice.iter().copied()
    }
}

/// A drawable: geometry groups sharing one node transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub name: String,
    pub groups: Vec<Geometry>,
    pub materials: SurfaceMaterials,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub local: Transform,
    pub children: Vec<usize>,
    pub surface: Option<usize>,
    pub skin: Option<usize>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: Transform::IDENTITY,
            children: Vec::new(),
            surface: None,
            skin: None,
        }
    }
}

/// One surface placed in the world by the node that references it.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceInstance {
    pub node: usize,
    pub surface: usize,
    pub world: Mat4,
    pub skinned: bool,
}

/// An owned 3D asset: node hierarchy plus everything it draws with.
///
/// World placement is `root * translate(pivot) * node_global`; the pivot is
/// where normalization puts the recentering offset so that `root.rotation`
/// spins the model about its own vertical axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScene {
    pub name: String,
    pub root: Transform,
    pub pivot: Vec3,
    pub nodes: Vec<Node>,
    pub roots: Vec<usize>,
    pub surfaces: Vec<Surface>,
    pub materials: Vec<Material>,
    pub textures: Vec<TextureData>,
    pub animations: Vec<AnimationClip>,
    pub skins: Vec<Skin>,
}

impl ModelScene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Transform::IDENTITY,
            pivot: Vec3::ZERO,
            nodes: Vec::new(),
            roots: Vec::new(),
            surfaces: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            animations: Vec::new(),
            skins: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Node, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent_node) => parent_node.children.push(index),
            None => self.roots.push(index),
        }
        index
    }

    pub fn add_surface(&mut self, surface: Surface) -> usize {
        self.surfaces.push(surface);
        self.surfaces.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// `root * translate(pivot)`: maps model space into the world.
    pub fn placement(&self) -> Mat4 {
        self.root.to_matrix() * Mat4::from_translation(self.pivot)
    }

    /// Global node matrices in model space (root and pivot excluded).
    pub fn node_globals(&self) -> Vec<Mat4> {
        let mut globals = vec![Mat4::IDENTITY; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, Mat4)> =
            self.roots.iter().map(|&root| (root, Mat4::IDENTITY)).collect();
        while let Some((index, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            // Guards against cycles in malformed files.
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            let global = parent * node.local.to_matrix();
            globals[index] = global;
            for &child in &node.children {
                stack.push((child, global));
            }
        }
        globals
    }

    /// Every reachable surface with its world matrix. Skinned surfaces carry
    /// the placement only: their posed vertices are already in model space.
    pub fn surface_instances(&self) -> Vec<SurfaceInstance> {
        let placement = self.placement();
        let globals = self.node_globals();
        let mut instances = Vec::new();
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        let mut visited = vec![false; self.nodes.len()];
        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            if let Some(surface) = node.surface.filter(|&s| s < self.surfaces.len()) {
                let skinned = node.skin.is_some()
                    && self.surfaces[surface]
                        .groups
                        .iter()
                        .any(|group| group.pose.is_some());
                let world = if skinned {
                    placement
                } else {
                    placement * globals[index]
                };
                instances.push(SurfaceInstance {
                    node: index,
                    surface,
                    world,
                    skinned,
                });
            }
            stack.extend(node.children.iter().rev());
        }
        instances
    }

    /// Materials used by reachable surfaces, deduplicated.
    pub fn surface_material_ids(&self) -> BTreeSet<usize> {
        self.surface_instances()
            .iter()
            .flat_map(|instance| self.surfaces[instance.surface].materials.iter())
            .filter(|&material| material < self.materials.len())
            .collect()
    }

    /// Textures referenced by the materials of reachable surfaces.
    pub fn referenced_texture_ids(&self) -> BTreeSet<usize> {
        self.surface_material_ids()
            .into_iter()
            .flat_map(|material| self.materials[material].texture_indices().collect::<Vec<_>>())
            .filter(|&texture| texture < self.textures.len())
            .collect()
    }

    pub fn geometry_count(&self) -> usize {
        self.surfaces.iter().map(|surface| surface.groups.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::primitives::box_model;
    use super::*;

    #[test]
    fn surface_materials_variants_iterate_all_slots() {
        let single = SurfaceMaterials::Single(3);
        assert_eq!(single.iter().collect::<Vec<_>>(), vec![3]);
        assert_eq!(single.for_group(5), Some(3));

        let multi = SurfaceMaterials::Multi(vec![1, 2]);
        assert_eq!(multi.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(multi.for_group(1), Some(2));
        assert_eq!(multi.for_group(2), None);
    }

    #[test]
    fn child_nodes_inherit_parent_transform() {
        let mut model = ModelScene::new("hierarchy");
        let mut parent = Node::new("parent");
        parent.local = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let parent_index = model.add_node(parent, None);
        let mut child = Node::new("child");
        child.local = Transform::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let child_index = model.add_node(child, Some(parent_index));

        let globals = model.node_globals();
        let origin = globals[child_index].transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn edge_indices_share_diagonal_once() {
        let quad = Geometry::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 4],
            vec![0, 1, 2, 0, 2, 3],
        );
        assert_eq!(quad.edge_indices().len(), 5 * 2);
    }

    #[test]
    fn computed_normals_face_outward_for_ccw_triangle() {
        let normals = compute_normals(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[0, 1, 2],
        );
        for normal in normals {
            assert!((Vec3::from(normal) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn referenced_textures_follow_surface_materials() {
        let mut model = box_model("crate", Vec3::ONE, [1.0; 4]);
        model.textures.push(TextureData {
            name: "albedo".to_string(),
            width: 1,
            height: 1,
            rgba: vec![255; 4],
            srgb: true,
            handle: None,
        });
        model.textures.push(TextureData {
            name: "orphan".to_string(),
            width: 1,
            height: 1,
            rgba: vec![255; 4],
            srgb: false,
            handle: None,
        });
        model.materials[0].base_color_texture = Some(0);
        assert_eq!(model.referenced_texture_ids().into_iter().collect::<Vec<_>>(), vec![0]);
    }
}
