use crate::assets::loader::{ThumbnailOutcome, ThumbnailRequest};
use crate::config::{SkyConfig, SkyPreset};
use std::path::Path;

const THUMB_WIDTH: u32 = 160;
const THUMB_HEIGHT: u32 = 80;

/// What the sky backdrop currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyState {
    pub source: Option<String>,
    /// Euler degrees (x, y, z).
    pub rotation: [f32; 3],
}

impl SkyState {
    pub fn from_config(config: &SkyConfig) -> Self {
        Self {
            source: config.source.clone().filter(|s| !s.trim().is_empty()),
            rotation: config.rotation,
        }
    }

    pub fn yaw_deg(&self) -> f32 {
        let yaw = self.rotation[1];
        if yaw.is_finite() {
            yaw
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkyEditorResponse {
    pub close: bool,
    /// Sky the user asked for. The live sky changes only once it has loaded.
    pub requested: Option<SkyState>,
    pub upload_requested: bool,
    pub thumbnail: Option<ThumbnailRequest>,
}

enum Thumbnail {
    Requested(String),
    /// Decoded on the worker, waiting for a texture.
    Decoded(String, Option<egui::ColorImage>),
    Shown(String, Option<egui::TextureHandle>),
}

impl Thumbnail {
    fn source(&self) -> &str {
        match self {
            Self::Requested(source) | Self::Decoded(source, _) | Self::Shown(source, _) => source,
        }
    }
}

pub struct SkyboxEditor {
    original: SkyState,
    presets: Vec<SkyPreset>,
    selected_source: Option<String>,
    preset_choice: Option<usize>,
    rotation_deg: f32,
    thumbnail: Option<Thumbnail>,
}

impl SkyboxEditor {
    pub fn new(initial: &SkyState, presets: Vec<SkyPreset>) -> Self {
        Self {
            original: initial.clone(),
            presets,
            selected_source: initial.source.clone(),
            preset_choice: None,
            rotation_deg: initial.yaw_deg(),
            thumbnail: None,
        }
    }

    /// Called when the pane opens: the slider mirrors the live sky yaw.
    pub fn sync_from(&mut self, current: &SkyState) {
        self.rotation_deg = current.yaw_deg().clamp(0.0, 360.0);
    }

    /// Drop a selection that failed to load and show the live sky again.
    pub fn revert_to(&mut self, live: &SkyState) {
        self.selected_source = live.source.clone();
        self.preset_choice = None;
        self.rotation_deg = live.yaw_deg().clamp(0.0, 360.0);
    }

    pub fn selected_source(&self) -> Option<&str> {
        self.selected_source.as_deref()
    }

    pub fn rotation_deg(&self) -> f32 {
        self.rotation_deg
    }

    pub fn rotation_label(&self) -> String {
        format!("{:.0}°", self.rotation_deg)
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation_deg = if degrees.is_finite() {
            degrees.clamp(0.0, 360.0)
        } else {
            0.0
        };
    }

    pub fn select_preset(&mut self, index: usize) {
        let Some(preset) = self.presets.get(index) else {
            return;
        };
        if preset.source.trim().is_empty() {
            return;
        }
        self.preset_choice = Some(index);
        self.selected_source = Some(preset.source.clone());
    }

    pub fn set_upload(&mut self, path: &Path) {
        self.preset_choice = None;
        self.selected_source = Some(path.display().to_string());
    }

    /// The sky the selection describes. Keeps the current source when
    /// nothing is selected.
    pub fn apply(&self, current: &SkyState) -> SkyState {
        SkyState {
            source: self.selected_source.clone().or_else(|| current.source.clone()),
            rotation: [0.0, self.rotation_deg, 0.0],
        }
    }

    /// Reset the editor to the state captured at startup and return it.
    pub fn reset(&mut self) -> SkyState {
        self.selected_source = self.original.source.clone();
        self.preset_choice = None;
        self.rotation_deg = self.original.yaw_deg();
        self.original.clone()
    }

    /// Accept a preview from the asset worker. Previews for a source that is
    /// no longer selected are dropped.
    pub fn receive_thumbnail(&mut self, outcome: ThumbnailOutcome) -> bool {
        let awaited = matches!(
            &self.thumbnail,
            Some(Thumbnail::Requested(source)) if *source == outcome.source
        );
        if !awaited {
            log::debug!("dropping stale preview for {}", outcome.source);
            return false;
        }
        let image = match outcome.image {
            Ok(rgba) => {
                let size = [rgba.width() as usize, rgba.height() as usize];
                Some(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
            }
            Err(err) => {
                log::warn!("sky preview for {} failed: {err}", outcome.source);
                None
            }
        };
        self.thumbnail = Some(Thumbnail::Decoded(outcome.source, image));
        true
    }

    pub fn show(&mut self, ctx: &egui::Context, current: &SkyState) -> SkyEditorResponse {
        let mut response = SkyEditorResponse {
            thumbnail: self.refresh_thumbnail(ctx),
            ..SkyEditorResponse::default()
        };
        let mut open = true;
        egui::Window::new("Skybox")
            .id(egui::Id::new("sky_pane"))
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(16.0, -16.0))
            .show(ctx, |ui| {
                let preset_label = self
                    .preset_choice
                    .and_then(|i| self.presets.get(i))
                    .map(|p| p.label.clone())
                    .unwrap_or_else(|| "Choose preset".to_string());
                let mut picked = None;
                egui::ComboBox::from_id_salt("sky_preset")
                    .selected_text(preset_label)
                    .show_ui(ui, |ui| {
                        for (i, preset) in self.presets.iter().enumerate() {
                            if ui
                                .selectable_label(self.preset_choice == Some(i), &preset.label)
                                .clicked()
                            {
                                picked = Some(i);
                            }
                        }
                    });
                if let Some(i) = picked {
                    self.select_preset(i);
                }

                if ui.button("Upload...").clicked() {
                    response.upload_requested = true;
                }

                match &self.thumbnail {
                    Some(Thumbnail::Shown(_, Some(texture))) => {
                        ui.image((texture.id(), egui::vec2(THUMB_WIDTH as f32, THUMB_HEIGHT as f32)));
                    }
                    Some(Thumbnail::Shown(source, None)) => {
                        ui.weak(format!("no preview for {source}"));
                    }
                    Some(Thumbnail::Requested(_) | Thumbnail::Decoded(..)) => {
                        ui.spinner();
                    }
                    None => {
                        ui.weak("no sky image");
                    }
                }

                ui.horizontal(|ui| {
                    let mut rotation = self.rotation_deg;
                    ui.add(
                        egui::Slider::new(&mut rotation, 0.0..=360.0)
                            .step_by(1.0)
                            .show_value(false)
                            .text("Rotation"),
                    );
                    self.set_rotation(rotation);
                    ui.monospace(self.rotation_label());
                });

                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        response.requested = Some(self.apply(current));
                    }
                    if ui.button("Reset").clicked() {
                        response.requested = Some(self.reset());
                    }
                });
            });
        response.close = !open;
        response
    }

    /// Request a preview when the selection changed, and turn a decoded
    /// preview into a texture.
    fn refresh_thumbnail(&mut self, ctx: &egui::Context) -> Option<ThumbnailRequest> {
        let Some(source) = self.selected_source.clone() else {
            self.thumbnail = None;
            return None;
        };
        if self.thumbnail.as_ref().map(Thumbnail::source) != Some(source.as_str()) {
            self.thumbnail = Some(Thumbnail::Requested(source.clone()));
            return Some(ThumbnailRequest {
                source,
                width: THUMB_WIDTH,
                height: THUMB_HEIGHT,
            });
        }
        if !matches!(self.thumbnail, Some(Thumbnail::Decoded(..))) {
            return None;
        }
        if let Some(Thumbnail::Decoded(source, image)) = self.thumbnail.take() {
            let texture = image.map(|image| {
                ctx.load_texture(format!("sky-thumb:{source}"), image, egui::TextureOptions::LINEAR)
            });
            self.thumbnail = Some(Thumbnail::Shown(source, texture));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presets() -> Vec<SkyPreset> {
        vec![
            SkyPreset {
                label: "Dusk".to_string(),
                source: "skies/dusk.jpg".to_string(),
            },
            SkyPreset {
                label: "None".to_string(),
                source: String::new(),
            },
        ]
    }

    fn original() -> SkyState {
        SkyState {
            source: Some("skies/default.jpg".to_string()),
            rotation: [0.0, 45.0, 0.0],
        }
    }

    fn preview(source: &str) -> ThumbnailOutcome {
        ThumbnailOutcome {
            source: source.to_string(),
            image: Ok(image::RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]))),
        }
    }

    #[test]
    fn open_initialises_slider_from_live_yaw() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        let live = SkyState {
            source: None,
            rotation: [0.0, 120.0, 0.0],
        };
        editor.sync_from(&live);
        assert_eq!(editor.rotation_deg(), 120.0);
        assert_eq!(editor.rotation_label(), "120°");
    }

    #[test]
    fn apply_describes_source_and_yaw_only() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        let live = SkyState {
            source: Some("skies/default.jpg".to_string()),
            rotation: [10.0, 45.0, 5.0],
        };
        editor.select_preset(0);
        editor.set_rotation(200.0);
        let candidate = editor.apply(&live);
        assert_eq!(candidate.source.as_deref(), Some("skies/dusk.jpg"));
        assert_eq!(candidate.rotation, [0.0, 200.0, 0.0]);
        assert_eq!(live.rotation, [10.0, 45.0, 5.0]);
    }

    #[test]
    fn empty_preset_is_ignored() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        editor.select_preset(1);
        assert_eq!(editor.selected_source(), Some("skies/default.jpg"));
    }

    #[test]
    fn apply_without_selection_keeps_source() {
        let mut editor = SkyboxEditor::new(
            &SkyState {
                source: None,
                rotation: [0.0; 3],
            },
            Vec::new(),
        );
        editor.set_rotation(90.0);
        let candidate = editor.apply(&original());
        assert_eq!(candidate.source.as_deref(), Some("skies/default.jpg"));
        assert_eq!(candidate.rotation[1], 90.0);
    }

    #[test]
    fn reset_restores_startup_state() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        editor.set_upload(Path::new("/tmp/mine.png"));
        editor.set_rotation(300.0);
        assert_eq!(editor.apply(&original()).source.as_deref(), Some("/tmp/mine.png"));

        assert_eq!(editor.reset(), original());
        assert_eq!(editor.selected_source(), Some("skies/default.jpg"));
        assert_eq!(editor.rotation_deg(), 45.0);
    }

    #[test]
    fn failed_selection_reverts_to_live_sky() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        editor.set_upload(Path::new("/tmp/broken.png"));
        editor.set_rotation(10.0);
        editor.revert_to(&original());
        assert_eq!(editor.selected_source(), Some("skies/default.jpg"));
        assert_eq!(editor.rotation_deg(), 45.0);
    }

    #[test]
    fn rotation_is_clamped() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        editor.set_rotation(400.0);
        assert_eq!(editor.rotation_deg(), 360.0);
        editor.set_rotation(f32::NAN);
        assert_eq!(editor.rotation_deg(), 0.0);
    }

    #[test]
    fn preview_is_requested_once_and_stale_ones_dropped() {
        let mut editor = SkyboxEditor::new(&original(), presets());
        let ctx = egui::Context::default();

        let request = editor.refresh_thumbnail(&ctx).expect("preview requested");
        assert_eq!(request.source, "skies/default.jpg");
        assert_eq!((request.width, request.height), (THUMB_WIDTH, THUMB_HEIGHT));
        assert!(editor.refresh_thumbnail(&ctx).is_none());

        editor.select_preset(0);
        assert!(editor.refresh_thumbnail(&ctx).is_some());
        assert!(!editor.receive_thumbnail(preview("skies/default.jpg")));
        assert!(editor.receive_thumbnail(preview("skies/dusk.jpg")));

        assert!(editor.refresh_thumbnail(&ctx).is_none());
        assert!(matches!(
            editor.thumbnail,
            Some(Thumbnail::Shown(ref source, Some(_))) if source == "skies/dusk.jpg"
        ));
    }
}
