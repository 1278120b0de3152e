use crate::config::HighlightConfig;
use crate::scene::ModelScene;
use glam::Vec3;
use std::collections::BTreeMap;

/// Parse `#rrggbb` into linear RGB.
pub fn parse_hex_color(hex: &str) -> Option<[f32; 3]> {
    let digits = hex.trim().strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| -> Option<f32> {
        let value = u8::from_str_radix(&digits[i..i + 2], 16).ok()?;
        Some(srgb_to_linear(value as f32 / 255.0))
    };
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightStyle {
    pub color: [f32; 3],
    pub emissive_intensity: f32,
    pub scale: f32,
}

impl HighlightStyle {
    pub fn from_config(config: &HighlightConfig) -> Self {
        let color = parse_hex_color(&config.color).unwrap_or_else(|| {
            log::warn!("invalid highlight colour '{}'", config.color);
            [1.0, 0.68, 0.07]
        });
        Self {
            color,
            emissive_intensity: config.emissive_intensity,
            scale: config.scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SavedLook {
    color: [f32; 4],
    emissive: Option<[f32; 3]>,
    emissive_intensity: f32,
}

/// Hover feedback for one hotspot prop: grow it and tint its materials,
/// then put back exactly what was there.
#[derive(Debug, Clone)]
pub struct HoverHighlight {
    style: HighlightStyle,
    rest_scale: Vec3,
    saved: BTreeMap<usize, SavedLook>,
    active: bool,
}

impl HoverHighlight {
    pub fn new(style: HighlightStyle, prop: &ModelScene) -> Self {
        Self {
            style,
            rest_scale: prop.root.scale,
            saved: BTreeMap::new(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn enter(&mut self, prop: &mut ModelScene) {
        self.active = true;
        prop.root.scale = self.rest_scale * self.style.scale;
        for id in prop.surface_material_ids() {
            let material = &mut prop.materials[id];
            // Keep the first saved look so repeated enters never save a tint.
            let saved = *self.saved.entry(id).or_insert_with(|| SavedLook {
                color: material.base_color,
                emissive: material.emissive.map(|e| e.color),
                emissive_intensity: material.emissive.map_or(1.0, |e| e.intensity),
            });
            match material.emissive.as_mut() {
                Some(emissive) => {
                    emissive.color = self.style.color;
                    emissive.intensity = saved.emissive_intensity.max(self.style.emissive_intensity);
                }
                // Unlit materials have no emissive; tint the base colour.
                None => {
                    let [r, g, b] = self.style.color;
                    material.base_color = [r, g, b, material.base_color[3]];
                }
            }
            material.needs_update = true;
        }
    }

    pub fn leave(&mut self, prop: &mut ModelScene) {
        self.active = false;
        prop.root.scale = self.rest_scale;
        for (id, saved) in std::mem::take(&mut self.saved) {
            let Some(material) = prop.materials.get_mut(id) else {
                continue;
            };
            if let (Some(emissive), Some(color)) = (material.emissive.as_mut(), saved.emissive) {
                emissive.color = color;
                emissive.intensity = saved.emissive_intensity;
            }
            material.base_color = saved.color;
            material.needs_update = true;
        }
    }

    /// Apply `hovered`, doing nothing if the state is unchanged.
    pub fn set_hovered(&mut self, prop: &mut ModelScene, hovered: bool) -> bool {
        if hovered == self.is_active() {
            return false;
        }
        if hovered {
            self.enter(prop);
        } else {
            self.leave(prop);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::primitives::box_model;
    use crate::scene::{Material, SurfaceMaterials};

    fn style() -> HighlightStyle {
        HighlightStyle::from_config(&HighlightConfig::default())
    }

    fn prop() -> ModelScene {
        let mut prop = box_model("jukebox", Vec3::ONE, [0.2, 0.3, 0.4, 1.0]);
        if let Some(emissive) = prop.materials[0].emissive.as_mut() {
            emissive.color = [0.1, 0.0, 0.0];
            emissive.intensity = 0.5;
        }
        let flat = prop.add_material(Material::unlit("label", [0.9, 0.9, 0.9, 0.5]));
        let group = prop.surfaces[0].groups[0].clone();
        prop.surfaces[0].groups.push(group);
        prop.surfaces[0].materials = SurfaceMaterials::Multi(vec![0, flat]);
        prop.root.scale = Vec3::splat(2.0);
        prop
    }

    #[test]
    fn hex_colour_parses_to_linear() {
        let [r, g, b] = parse_hex_color("#ffd54a").unwrap();
        assert!((r - 1.0).abs() < 1e-6);
        assert!(g > 0.6 && g < 0.7);
        assert!(b > 0.05 && b < 0.08);
        assert!(parse_hex_color("ffd54a").is_none());
        assert!(parse_hex_color("#ffd5").is_none());
    }

    #[test]
    fn highlight_round_trip_restores_exact_look() {
        let mut prop = prop();
        let before = prop.clone();
        let mut highlight = HoverHighlight::new(style(), &prop);

        highlight.enter(&mut prop);
        assert!((prop.root.scale - Vec3::splat(2.12)).length() < 1e-5);
        let emissive = prop.materials[0].emissive.unwrap();
        assert_eq!(emissive.color, style().color);
        assert_eq!(emissive.intensity, 0.8);
        assert_eq!(&prop.materials[1].base_color[..3], &style().color[..]);
        assert_eq!(prop.materials[1].base_color[3], 0.5);

        highlight.leave(&mut prop);
        assert_eq!(prop.root.scale, before.root.scale);
        for (after, original) in prop.materials.iter().zip(&before.materials) {
            assert_eq!(after.base_color, original.base_color);
            assert_eq!(after.emissive, original.emissive);
        }
    }

    #[test]
    fn repeated_enter_keeps_first_snapshot() {
        let mut prop = prop();
        let original = prop.materials[0].emissive;
        let mut highlight = HoverHighlight::new(style(), &prop);
        highlight.enter(&mut prop);
        highlight.enter(&mut prop);
        highlight.leave(&mut prop);
        assert_eq!(prop.materials[0].emissive, original);
    }

    #[test]
    fn intensity_never_drops_below_original() {
        let mut prop = prop();
        if let Some(emissive) = prop.materials[0].emissive.as_mut() {
            emissive.intensity = 3.0;
        }
        let mut highlight = HoverHighlight::new(style(), &prop);
        assert!(highlight.set_hovered(&mut prop, true));
        assert!(!highlight.set_hovered(&mut prop, true));
        assert_eq!(prop.materials[0].emissive.unwrap().intensity, 3.0);
        assert!(highlight.set_hovered(&mut prop, false));
        assert!(!highlight.is_active());
    }
}
