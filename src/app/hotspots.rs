use crate::config::{HighlightConfig, HotspotConfig};
use crate::render::pick::{pick_nearest, Ray};
use crate::scene::bounds::model_bounds;
use crate::scene::primitives::box_model;
use crate::scene::{ModelScene, Transform};
use crate::ui::hover::{parse_hex_color, HighlightStyle, HoverHighlight};
use crate::ui::panes::PaneKind;
use crate::viewer::{release_model, BackendError, SceneBackend};
use glam::Vec3;

const FALLBACK_COLOR: [f32; 3] = [0.1, 0.12, 0.16];

pub struct Hotspot {
    pub kind: PaneKind,
    pub model: ModelScene,
    highlight: HoverHighlight,
}

/// Clickable props placed beside the model, each opening one pane.
pub struct Hotspots {
    items: Vec<Hotspot>,
    hovered: Option<usize>,
}

impl Hotspots {
    pub fn from_config(configs: &[HotspotConfig], highlight: &HighlightConfig) -> Self {
        let style = HighlightStyle::from_config(highlight);
        let items = configs
            .iter()
            .map(|config| {
                let [r, g, b] = parse_hex_color(&config.color).unwrap_or_else(|| {
                    log::warn!("hotspot '{}' has invalid colour '{}'", config.name, config.color);
                    FALLBACK_COLOR
                });
                let mut model = box_model(&config.name, Vec3::from(config.size), [r, g, b, 1.0]);
                model.root = Transform::from_translation(Vec3::from(config.position));
                let highlight = HoverHighlight::new(style, &model);
                Hotspot {
                    kind: PaneKind::from(config.action),
                    model,
                    highlight,
                }
            })
            .collect();
        Self {
            items,
            hovered: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn upload<B: SceneBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        for item in &mut self.items {
            // Props already uploaded stay; only the failed one is released.
            if let Err(err) = backend.upload_model(&mut item.model) {
                release_model(backend, &mut item.model);
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelScene> {
        self.items.iter().map(|item| &item.model)
    }

    pub fn kind(&self, index: usize) -> Option<PaneKind> {
        self.items.get(index).map(|item| item.kind)
    }

    pub fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    pub fn pick(&self, ray: &Ray) -> Option<usize> {
        pick_nearest(
            ray,
            self.items
                .iter()
                .enumerate()
                .map(|(index, item)| (index, model_bounds(&item.model))),
        )
        .map(|(index, _)| index)
    }

    /// Move the highlight to `hit`. Returns true when anything changed.
    pub fn set_hovered<B: SceneBackend + ?Sized>(&mut self, hit: Option<usize>, backend: &mut B) -> bool {
        if hit == self.hovered {
            return false;
        }
        for (index, item) in self.items.iter_mut().enumerate() {
            // Only props whose highlight flipped need a material sync.
            if item.highlight.set_hovered(&mut item.model, Some(index) == hit) {
                backend.sync_model(&mut item.model);
            }
        }
        self.hovered = hit;
        true
    }
}
