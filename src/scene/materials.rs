use super::{EnvironmentHandle, ModelScene};

/// Default intensity applied to materials that ship a non-black emissive.
pub const DEFAULT_EMISSIVE_BOOST: f32 = 10.0;

/// Switch every surface material between filled and edge rendering.
/// Returns the number of materials whose mode changed.
pub fn set_wireframe(model: &mut ModelScene, enabled: bool) -> usize {
    let mut changed = 0;
    for id in model.surface_material_ids() {
        let material = &mut model.materials[id];
        if material.wireframe != enabled {
            material.wireframe = enabled;
            material.needs_update = true;
            changed += 1;
        }
    }
    changed
}

/// Point every reflection-capable material at `environment`, or clear the
/// slot when disabled. Lit materials without a map fall back to the
/// scene-wide environment when the renderer collects its draws.
pub fn apply_environment(
    model: &mut ModelScene,
    environment: Option<EnvironmentHandle>,
    enabled: bool,
) -> usize {
    let map = if enabled { environment } else { None };
    let mut changed = 0;
    for id in model.surface_material_ids() {
        let material = &mut model.materials[id];
        if let Some(slot) = material.reflections.as_mut() {
            if slot.map != map {
                slot.map = map;
                material.needs_update = true;
                changed += 1;
            }
        }
    }
    changed
}

/// Raise the intensity of emissive materials so that glowing parts read
/// under the viewer's lighting.
pub fn boost_emissive(model: &mut ModelScene, intensity: f32) -> usize {
    let mut boosted = 0;
    for material in &mut model.materials {
        if let Some(emissive) = material.emissive.as_mut() {
            // Black emissive stays dark whatever the intensity.
            if emissive.is_lit() {
                emissive.intensity = intensity;
                material.needs_update = true;
                boosted += 1;
            }
        }
    }
    boosted
}
