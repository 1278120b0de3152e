use crate::assets::environment::RadianceMap;
use crate::scene::{EnvironmentHandle, GeometryHandle, MaterialHandle, ModelScene, TextureHandle};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("texture '{name}' is {width}x{height}, above the device limit of {limit}")]
    TextureTooLarge {
        name: String,
        width: u32,
        height: u32,
        limit: u32,
    },
    #[error("texture '{name}' has {actual} bytes, expected {expected}")]
    TextureSize {
        name: String,
        actual: usize,
        expected: usize,
    },
}

/// Live graphics objects held by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub textures: usize,
    pub materials: usize,
    pub geometries: usize,
    pub environments: usize,
}

impl ResourceCounts {
    pub fn model_resources(&self) -> usize {
        self.textures + self.materials + self.geometries
    }
}

/// Graphics-side owner of uploaded model resources.
///
/// `upload_model` assigns handles into the model; the viewer releases them
/// one by one when the model is replaced.
pub trait SceneBackend {
    fn upload_model(&mut self, model: &mut ModelScene) -> Result<(), BackendError>;
    /// Push material and pose changes flagged on the model.
    fn sync_model(&mut self, model: &mut ModelScene);
    fn upload_environment(&mut self, map: &RadianceMap) -> Result<EnvironmentHandle, BackendError>;
    fn release_texture(&mut self, handle: TextureHandle);
    fn release_material(&mut self, handle: MaterialHandle);
    fn release_geometry(&mut self, handle: GeometryHandle);
    fn live_resources(&self) -> ResourceCounts;
}

/// Release every handle reachable from the model's surfaces: textures
/// referenced by its materials (once each), materials, then geometry.
pub fn release_model<B: SceneBackend + ?Sized>(backend: &mut B, model: &mut ModelScene) {
    for texture in model.referenced_texture_ids() {
        // `take` leaves the model without handles, so a second release is a no-op.
        if let Some(handle) = model.textures[texture].handle.take() {
            backend.release_texture(handle);
        }
    }
    for material in model.surface_material_ids() {
        if let Some(handle) = model.materials[material].handle.take() {
            backend.release_material(handle);
        }
    }
    for surface in &mut model.surfaces {
        for geometry in &mut surface.groups {
            if let Some(handle) = geometry.handle.take() {
                backend.release_geometry(handle);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingBackend;
    use super::*;
    use crate::scene::primitives::box_model;
    use crate::scene::{Material, SurfaceMaterials, TextureData};
    use glam::Vec3;

    fn textured_model() -> ModelScene {
        let mut model = box_model("textured", Vec3::ONE, [1.0; 4]);
        model.textures.push(TextureData {
            name: "shared".to_string(),
            width: 1,
            height: 1,
            rgba: vec![255; 4],
            srgb: true,
            handle: None,
        });
        let second = model.add_material(Material::standard("second"));
        model.materials[0].base_color_texture = Some(0);
        model.materials[second].emissive = model.materials[second]
            .emissive
            .map(|e| crate::scene::Emissive { texture: Some(0), ..e });
        let group = model.surfaces[0].groups[0].clone();
        model.surfaces[0].groups.push(group);
        model.surfaces[0].materials = SurfaceMaterials::Multi(vec![0, second]);
        model
    }

    #[test]
    fn release_frees_shared_texture_once() {
        let mut backend = RecordingBackend::default();
        let mut model = textured_model();
        backend.upload_model(&mut model).unwrap();
        assert_eq!(
            backend.live_resources(),
            ResourceCounts {
                textures: 1,
                materials: 2,
                geometries: 2,
                environments: 0
            }
        );

        release_model(&mut backend, &mut model);
        assert_eq!(backend.live_resources().model_resources(), 0);
        assert!(model.materials.iter().all(|m| m.handle.is_none()));
    }

    #[test]
    fn release_is_idempotent() {
        let mut backend = RecordingBackend::default();
        let mut model = textured_model();
        backend.upload_model(&mut model).unwrap();
        release_model(&mut backend, &mut model);
        release_model(&mut backend, &mut model);
        assert_eq!(backend.live_resources().model_resources(), 0);
    }
}
