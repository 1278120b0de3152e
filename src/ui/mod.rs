pub mod camera_hud;
pub mod hover;
pub mod music;
pub mod panes;
pub mod shop;
pub mod skybox_editor;

use crate::assets::loader::ThumbnailRequest;
use crate::config::{GalleryEntry, MusicConfig, ShopItem, ViewerConfig};
use crate::viewer::ViewerState;
use camera_hud::CameraHud;
use music::{close_music, show_music_pane, MediaPlayer};
use panes::{OverlayPanes, PaneKind};
use skybox_editor::{SkyState, SkyboxEditor};
use std::time::Duration;

/// Everything the overlay reads but does not own, for one frame.
pub struct FrameView<'a> {
    pub gallery: &'a [GalleryEntry],
    pub viewer: &'a ViewerState,
    pub shop: &'a [ShopItem],
    pub music: &'a MusicConfig,
    pub music_position: Duration,
}

/// Requests raised by the overlay during one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiActions {
    pub load: Option<usize>,
    pub wireframe: Option<bool>,
    pub environment: Option<bool>,
    pub auto_rotate: Option<bool>,
    /// Sky to load; the live sky is replaced once it has loaded.
    pub sky: Option<SkyState>,
    pub sky_upload: bool,
    pub sky_preview: Option<ThumbnailRequest>,
    pub dismiss_error: bool,
}

pub struct UiState {
    hud: CameraHud,
    panes: OverlayPanes,
    sky_editor: SkyboxEditor,
}

impl UiState {
    pub fn new(config: &ViewerConfig, sky: &SkyState) -> Self {
        Self {
            hud: CameraHud::new(
                config.hud.enabled,
                Duration::from_millis(config.hud.throttle_ms),
            ),
            panes: OverlayPanes::default(),
            sky_editor: SkyboxEditor::new(sky, config.sky.presets.clone()),
        }
    }

    pub fn hud(&self) -> &CameraHud {
        &self.hud
    }

    pub fn hud_mut(&mut self) -> &mut CameraHud {
        &mut self.hud
    }

    pub fn toggle_hud(&mut self) -> bool {
        let visible = self.hud.toggle();
        log::debug!("camera HUD {}", if visible { "shown" } else { "hidden" });
        visible
    }

    pub fn panes(&self) -> &OverlayPanes {
        &self.panes
    }

    pub fn sky_editor_mut(&mut self) -> &mut SkyboxEditor {
        &mut self.sky_editor
    }

    pub fn open_pane(&mut self, kind: PaneKind, sky: &SkyState) {
        if self.panes.open(kind) {
            log::debug!("opened {kind:?} pane");
        }
        if kind == PaneKind::SkyEditor {
            self.sky_editor.sync_from(sky);
        }
    }

    pub fn close_pane<P: MediaPlayer + ?Sized>(&mut self, kind: PaneKind, player: &mut P) {
        self.panes.close(kind);
        if kind == PaneKind::Music {
            close_music(player);
        }
    }

    /// Escape: close every pane, pausing music if its pane was open.
    pub fn close_all<P: MediaPlayer + ?Sized>(&mut self, player: &mut P) -> Vec<PaneKind> {
        let closed = self.panes.close_all();
        if closed.contains(&PaneKind::Music) {
            close_music(player);
        }
        closed
    }

    pub fn draw<P: MediaPlayer>(
        &mut self,
        ctx: &egui::Context,
        view: &FrameView<'_>,
        player: &mut P,
        sky: &SkyState,
    ) -> UiActions {
        let mut actions = UiActions::default();

        self.hud.show(ctx);
        self.gallery_panel(ctx, view, &mut actions);
        loading_indicator(ctx, view.viewer);
        if let Some(message) = &view.viewer.last_error {
            actions.dismiss_error = error_window(ctx, message);
        }

        if self.panes.is_open(PaneKind::Music) {
            let response = show_music_pane(ctx, player, view.music, view.music_position);
            if response.close {
                self.close_pane(PaneKind::Music, player);
            }
        }
        if self.panes.is_open(PaneKind::Shop) && shop::show_shop_pane(ctx, view.shop) {
            self.panes.close(PaneKind::Shop);
        }
        if self.panes.is_open(PaneKind::SkyEditor) {
            let response = self.sky_editor.show(ctx, sky);
            actions.sky = response.requested;
            actions.sky_upload |= response.upload_requested;
            actions.sky_preview = response.thumbnail;
            if response.close {
                self.panes.close(PaneKind::SkyEditor);
            }
        }
        actions
    }

    fn gallery_panel(&self, ctx: &egui::Context, view: &FrameView<'_>, actions: &mut UiActions) {
        egui::SidePanel::right("gallery")
            .resizable(false)
            .default_width(200.0)
            .show(ctx, |ui| {
                ui.heading(&view.viewer.title);
                ui.separator();
                if view.gallery.is_empty() {
                    ui.weak("No models configured.");
                }
                for (index, entry) in view.gallery.iter().enumerate() {
                    if ui
                        .add_sized([ui.available_width(), 28.0], egui::Button::new(&entry.name))
                        .clicked()
                    {
                        actions.load = Some(index);
                    }
                }
                ui.separator();

                // Checkboxes edit copies; the viewer applies them after the frame.
                let mut environment = view.viewer.environment_enabled;
                if ui.checkbox(&mut environment, "Environment").changed() {
                    actions.environment = Some(environment);
                }
                let mut auto_rotate = view.viewer.auto_rotate;
                if ui.checkbox(&mut auto_rotate, "Auto-rotate").changed() {
                    actions.auto_rotate = Some(auto_rotate);
                }
                let mut wireframe = view.viewer.wireframe;
                if ui.checkbox(&mut wireframe, "Wireframe").changed() {
                    actions.wireframe = Some(wireframe);
                }
                ui.separator();
                ui.weak("C: camera HUD  Esc: close panes");
            });
    }
}

fn loading_indicator(ctx: &egui::Context, state: &ViewerState) {
    if !state.loading {
        return;
    }
    egui::Area::new(egui::Id::new("loading"))
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading...");
                });
            });
        });
}

/// Returns true when dismissed.
fn error_window(ctx: &egui::Context, message: &str) -> bool {
    let mut dismissed = false;
    egui::Window::new("Error")
        .id(egui::Id::new("load_error"))
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 48.0))
        .show(ctx, |ui| {
            ui.label(message);
            ui.label("Check the log for details.");
            if ui.button("OK").clicked() {
                dismissed = true;
            }
        });
    dismissed
}

#[cfg(test)]
mod tests {
    use super::music::{EmbeddedPlayer, PlaybackState};
    use super::*;

    fn state() -> (UiState, SkyState) {
        let config = ViewerConfig::default();
        let sky = SkyState::from_config(&config.sky);
        (UiState::new(&config, &sky), sky)
    }

    #[test]
    fn escape_closes_every_pane_and_pauses_music() {
        let (mut ui, sky) = state();
        let mut player = EmbeddedPlayer::new(MusicConfig::default());
        player.mark_ready();
        player.play();

        ui.open_pane(PaneKind::Music, &sky);
        ui.open_pane(PaneKind::Shop, &sky);
        let closed = ui.close_all(&mut player);
        assert_eq!(closed, vec![PaneKind::Music, PaneKind::Shop]);
        assert!(!ui.panes().any_open());
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn escape_without_music_pane_leaves_playback() {
        let (mut ui, sky) = state();
        let mut player = EmbeddedPlayer::new(MusicConfig::default());
        player.mark_ready();
        player.play();
        ui.open_pane(PaneKind::Shop, &sky);
        ui.close_all(&mut player);
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn opening_sky_editor_reads_live_rotation() {
        let (mut ui, _) = state();
        let live = SkyState {
            source: None,
            rotation: [0.0, 75.0, 0.0],
        };
        ui.open_pane(PaneKind::SkyEditor, &live);
        assert!(ui.panes().is_open(PaneKind::SkyEditor));
        assert_eq!(ui.sky_editor_mut().rotation_deg(), 75.0);
    }

    #[test]
    fn hud_toggle_is_reversible() {
        let (mut ui, _) = state();
        assert!(ui.hud().is_visible());
        ui.toggle_hud();
        assert!(!ui.hud().is_visible());
        ui.toggle_hud();
        assert!(ui.hud().is_visible());
    }

    #[test]
    fn draw_reports_no_actions_on_idle_frame() {
        let (mut ui, sky) = state();
        let config = ViewerConfig::default();
        let viewer = ViewerState {
            auto_rotate: false,
            wireframe: false,
            environment_enabled: true,
            title: "3D Viewer".to_string(),
            loading: true,
            last_error: None,
        };
        let mut player = EmbeddedPlayer::new(MusicConfig::default());
        let ctx = egui::Context::default();
        let mut actions = UiActions::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            let view = FrameView {
                gallery: &config.gallery,
                viewer: &viewer,
                shop: &config.shop,
                music: &config.music,
                music_position: Duration::ZERO,
            };
            actions = ui.draw(ctx, &view, &mut player, &sky);
        });
        assert_eq!(actions, UiActions::default());
    }
}
