pub mod egui_host;
mod hotspots;
mod input;
mod sky;
mod timing;

use crate::assets::loader::AssetLoader;
use crate::config::{save_config_to_file, GalleryEntry, ViewerConfig};
use crate::render::{CameraController, FrameLighting, GpuResources, RenderContext, RenderError, SceneFrame};
use crate::scene::ModelScene;
use crate::ui::hover::parse_hex_color;
use crate::ui::music::EmbeddedPlayer;
use crate::ui::panes::PaneKind;
use crate::ui::skybox_editor::SkyState;
use crate::ui::{FrameView, UiActions, UiState};
use crate::viewer::{LoadDisposition, Viewer};
use egui_host::EguiHost;
use hotspots::Hotspots;
use input::{DragMode, InputAction, InputState};
use sky::{sky_yaw_radians, SkyBackdrop, SkyChange};
use timing::FrameTiming;

use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{CursorIcon, Window, WindowAttributes, WindowId};

/// Trackpad pixels that count as one wheel notch.
const PIXELS_PER_WHEEL_STEP: f32 = 50.0;
const FALLBACK_BACKGROUND: [f32; 3] = [0.006, 0.006, 0.009];
const IMAGE_EXTENSIONS: [&str; 5] = ["hdr", "exr", "png", "jpg", "jpeg"];

/// Everything that needs the window's GPU device.
struct Gpu {
    render: RenderContext,
    egui: EguiHost,
    viewer: Viewer<GpuResources>,
}

pub struct App {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    loader: Option<AssetLoader>,
    hotspots: Hotspots,
    ui: UiState,
    sky: SkyState,
    backdrop: SkyBackdrop,
    player: EmbeddedPlayer,
    camera: CameraController,
    input: InputState,
    timing: FrameTiming,
    lighting: FrameLighting,
    target_frame_duration: Duration,
    next_frame_time: Instant,
}

impl App {
    fn new(config: ViewerConfig, base_dir: Option<PathBuf>) -> Self {
        let loader = match AssetLoader::spawn(base_dir) {
            Ok(loader) => Some(loader),
            Err(err) => {
                log::error!("asset loader unavailable: {err}");
                None
            }
        };
        let sky = SkyState::from_config(&config.sky);
        let background = parse_hex_color(&config.lighting.background).unwrap_or_else(|| {
            log::warn!("invalid background colour '{}'", config.lighting.background);
            FALLBACK_BACKGROUND
        });
        let lighting = FrameLighting {
            background: Vec3::from(background),
            key_position: Vec3::from(config.lighting.key_position),
            key_intensity: config.lighting.key_intensity,
            ambient: config.lighting.ambient,
            exposure: config.lighting.exposure,
        };

        Self {
            hotspots: Hotspots::from_config(&config.hotspots, &config.highlight),
            ui: UiState::new(&config, &sky),
            player: EmbeddedPlayer::new(config.music.clone()),
            camera: CameraController::new(&config.camera),
            backdrop: SkyBackdrop::default(),
            input: InputState::default(),
            timing: FrameTiming::new(Instant::now()),
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
            window: None,
            gpu: None,
            loader,
            sky,
            lighting,
            config,
        }
    }

    fn init_gpu(&mut self, window: &Arc<Window>) -> Result<(), RenderError> {
        let (render, mut resources) = RenderContext::new(window.clone())?;
        let egui = EguiHost::new(window, render.max_texture_side());
        match self.hotspots.upload(&mut resources) {
            Ok(()) if !self.hotspots.is_empty() => {
                log::info!("placed {} hotspot props", self.hotspots.len());
            }
            Ok(()) => {}
            Err(err) => log::warn!("hotspot props unavailable: {err}"),
        }
        let viewer = Viewer::new(resources, &self.config.viewer);
        self.gpu = Some(Gpu {
            render,
            egui,
            viewer,
        });

        // The live sky starts empty and takes the configured one once it loads.
        let configured = self.sky.source.take();
        self.request_sky(SkyState {
            source: configured,
            rotation: self.sky.rotation,
        });
        if let Some(entry) = self.config.initial_gallery_entry().cloned() {
            self.load_entry(&entry);
        }
        Ok(())
    }

    fn update_target_frame_duration(&mut self, window: &Window) {
        let mut target = Duration::from_millis(16);
        if let Some(millihz) = window
            .current_monitor()
            .and_then(|monitor| monitor.refresh_rate_millihertz())
        {
            let hz = millihz as f32 / 1000.0;
            if hz > 1.0 {
                target = Duration::from_secs_f32(1.0 / hz);
            }
        }
        self.target_frame_duration = target;
        self.next_frame_time = Instant::now() + self.target_frame_duration;
    }

    fn load_entry(&mut self, entry: &GalleryEntry) {
        let (Some(gpu), Some(loader)) = (self.gpu.as_mut(), self.loader.as_ref()) else {
            return;
        };
        match gpu.viewer.begin_load(entry) {
            Some(request) => {
                log::info!("loading '{}' from {}", entry.name, entry.model);
                loader.submit(request);
            }
            None => log::warn!("gallery entry '{}' has no loadable model", entry.name),
        }
    }

    fn request_sky(&mut self, candidate: SkyState) {
        match self.backdrop.begin(candidate) {
            SkyChange::Ready(state) => self.commit_sky(state),
            SkyChange::Fetch(request) => match &self.loader {
                Some(loader) => loader.submit_sky(request),
                None => log::warn!("no asset loader, sky {} not loaded", request.source),
            },
        }
    }

    fn commit_sky(&mut self, state: SkyState) {
        match &state.source {
            Some(source) => log::info!("sky set to {source} at {:.0}°", state.yaw_deg()),
            None => log::info!("sky cleared"),
        }
        self.sky = state;
    }

    /// Upload finished sky images and hand previews to the editor.
    fn poll_sky(&mut self) {
        let (Some(loader), Some(gpu)) = (self.loader.as_ref(), self.gpu.as_mut()) else {
            return;
        };
        let mut loaded = None;
        while let Some(outcome) = loader.poll_sky() {
            match self.backdrop.complete(outcome, gpu.viewer.backend_mut()) {
                Ok(Some(state)) => loaded = Some(state),
                Ok(None) => {}
                Err(err) => {
                    log::warn!("sky unavailable, keeping the previous one: {err}");
                    self.ui.sky_editor_mut().revert_to(&self.sky);
                }
            }
        }
        while let Some(outcome) = loader.poll_thumbnail() {
            self.ui.sky_editor_mut().receive_thumbnail(outcome);
        }
        if let Some(state) = loaded {
            self.commit_sky(state);
        }
    }

    fn viewport(&self) -> Option<Vec2> {
        let (width, height) = self.gpu.as_ref()?.render.size();
        Some(Vec2::new(width as f32, height as f32))
    }

    fn pointer_over_ui(&self) -> bool {
        self.gpu.as_ref().is_some_and(|gpu| gpu.egui.wants_pointer())
    }

    fn hotspot_at(&self, cursor: Vec2) -> Option<usize> {
        let ray = self.camera.cursor_ray(cursor, self.viewport()?);
        self.hotspots.pick(&ray)
    }

    fn update_hover(&mut self, hit: Option<usize>) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if !self.hotspots.set_hovered(hit, gpu.viewer.backend_mut()) {
            return;
        }
        if let Some(window) = &self.window {
            window.set_cursor(if self.hotspots.hovered().is_some() {
                CursorIcon::Pointer
            } else {
                CursorIcon::Default
            });
        }
    }

    fn handle_cursor_moved(&mut self, position: Vec2) {
        if let Some((mode, delta)) = self.input.cursor_moved(position) {
            let height = self.viewport().map_or(1.0, |size| size.y);
            match mode {
                DragMode::Orbit => self.camera.rotate(delta, height),
                DragMode::Pan => self.camera.pan(delta, height),
            }
            return;
        }
        let hit = if self.pointer_over_ui() {
            None
        } else {
            self.hotspot_at(position)
        };
        self.update_hover(hit);
    }

    fn handle_click(&mut self, cursor: Vec2) {
        if self.pointer_over_ui() {
            return;
        }
        let Some(kind) = self
            .hotspot_at(cursor)
            .and_then(|index| self.hotspots.kind(index))
        else {
            return;
        };
        if kind == PaneKind::Music {
            self.player.mark_ready();
        }
        self.ui.open_pane(kind, &self.sky);
        log::info!("opened {kind:?} pane");
    }

    fn handle_key(&mut self, event: &winit::event::KeyEvent) {
        let text_focus = self.gpu.as_ref().is_some_and(|gpu| gpu.egui.wants_keyboard());
        let pressed = event.state == ElementState::Pressed;
        match self
            .input
            .handle_key(&event.logical_key, pressed, event.repeat, text_focus)
        {
            InputAction::ToggleHud => {
                self.ui.toggle_hud();
            }
            InputAction::CloseOverlays => {
                if self.ui.panes().any_open() {
                    let closed = self.ui.close_all(&mut self.player);
                    log::debug!("closed {closed:?}");
                }
            }
            InputAction::None => {}
        }
    }

    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let now = Instant::now();
        let dt = self.timing.update(now);
        self.poll_sky();
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        if let Some(loader) = &self.loader {
            while let Some(outcome) = loader.poll() {
                if gpu.viewer.complete_load(outcome) == LoadDisposition::Attached {
                    log_attached(&gpu.viewer);
                }
            }
        }
        gpu.viewer.update(dt);
        self.player.advance(Duration::from_secs_f32(dt));
        self.camera.update();
        if self.ui.hud().is_visible() {
            self.ui.hud_mut().tick(now, &self.camera.pose());
        }

        let view = FrameView {
            gallery: &self.config.gallery,
            viewer: gpu.viewer.state(),
            shop: &self.config.shop,
            music: &self.config.music,
            music_position: self.player.position(),
        };
        let (ui, player, sky) = (&mut self.ui, &mut self.player, &self.sky);
        let mut actions = UiActions::default();
        let output = gpu.egui.run_ui(&window, |ctx| {
            actions = ui.draw(ctx, &view, &mut *player, sky);
        });

        let models: Vec<&ModelScene> = gpu
            .viewer
            .model()
            .into_iter()
            .chain(self.hotspots.models())
            .collect();
        let frame = SceneFrame {
            camera: &self.camera,
            lighting: self.lighting,
            sky: self
                .backdrop
                .active()
                .map(|handle| (handle, sky_yaw_radians(&self.sky))),
            environment: gpu.viewer.scene_environment(),
            models: &models,
        };
        match gpu.render.render(gpu.viewer.backend(), &frame, &output) {
            Ok(()) => {}
            Err(RenderError::OutOfMemory) => {
                log::error!("GPU out of memory, shutting down");
                event_loop.exit();
                return;
            }
            Err(err) => log::warn!("frame skipped: {err}"),
        }

        self.apply_actions(actions);
    }

    fn apply_actions(&mut self, actions: UiActions) {
        if let Some(entry) = actions
            .load
            .and_then(|index| self.config.gallery.get(index))
            .cloned()
        {
            self.load_entry(&entry);
        }
        if actions.sky_upload {
            let picked = rfd::FileDialog::new()
                .set_title("Choose a sky image")
                .add_filter("Images", &IMAGE_EXTENSIONS)
                .pick_file();
            if let Some(path) = picked {
                self.ui.sky_editor_mut().set_upload(&path);
            }
        }
        if let Some(candidate) = actions.sky {
            self.request_sky(candidate);
        }
        if let (Some(request), Some(loader)) = (actions.sky_preview, self.loader.as_ref()) {
            loader.submit_thumbnail(request);
        }

        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if let Some(enabled) = actions.wireframe {
            gpu.viewer.set_wireframe(enabled);
        }
        if let Some(enabled) = actions.environment {
            gpu.viewer.set_environment_enabled(enabled);
        }
        if let Some(enabled) = actions.auto_rotate {
            gpu.viewer.set_auto_rotate(enabled);
        }
        if actions.dismiss_error {
            gpu.viewer.clear_error();
        }
    }
}

fn log_attached(viewer: &Viewer<GpuResources>) {
    let Some(model) = viewer.model() else {
        return;
    };
    let vertices: usize = model
        .surfaces
        .iter()
        .flat_map(|surface| &surface.groups)
        .map(|group| group.vertex_count())
        .sum();
    log::info!(
        "showing '{}': {} meshes, {} vertices{}{}",
        viewer.state().title,
        model.geometry_count(),
        vertices,
        if viewer.has_animation() { ", animated" } else { "" },
        if viewer.scene_environment().is_some() { ", environment map" } else { "" },
    );
}

fn show_fatal(message: &str) {
    log::error!("{message}");
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("Viewer failed to start")
        .set_description(message)
        .show();
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title(self.config.window_title.as_str())
            .with_inner_size(PhysicalSize::new(1280u32, 720u32))
            .with_resizable(true);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                show_fatal(&format!("Could not create a window: {err}"));
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        if let Err(err) = self.init_gpu(&window) {
            show_fatal(&format!("Could not initialise the GPU: {err}"));
            event_loop.exit();
            return;
        }
        self.update_target_frame_duration(&window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if let Some(gpu) = &mut self.gpu {
            gpu.egui.on_window_event(&window, &event);
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Focused(false) => {
                self.input.cursor_left();
                self.update_hover(None);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.render.resize(new_size);
                }
                self.update_target_frame_duration(&window);
            }
            // The window may have moved to a monitor with another refresh rate.
            WindowEvent::Moved(_) => self.update_target_frame_duration(&window),
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => {
                self.input.cursor_left();
                self.update_hover(None);
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                // Drags that start over a panel belong to egui.
                ElementState::Pressed => {
                    if !self.pointer_over_ui() {
                        self.input.button_pressed(button);
                    }
                }
                ElementState::Released => {
                    if let Some(cursor) = self.input.button_released(button) {
                        self.handle_click(cursor);
                    }
                }
            },
            WindowEvent::MouseWheel { delta, .. } => {
                if !self.pointer_over_ui() {
                    let steps = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_WHEEL_STEP,
                    };
                    self.camera.zoom(steps);
                }
            }
            WindowEvent::RedrawRequested => self.render_frame(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(gpu) = &self.gpu {
                gpu.render.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }
}

/// `--write-config <path>` dumps the built-in defaults as a starting point.
fn write_default_config(path: &Path) {
    match save_config_to_file(&ViewerConfig::default(), path) {
        Ok(()) => log::info!("wrote default config to {}", path.display()),
        Err(err) => log::error!("failed to write {}: {err}", path.display()),
    }
}

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("--write-config") {
        match args.get(2) {
            Some(path) => write_default_config(Path::new(path)),
            None => log::error!("usage: vitrine --write-config <path>"),
        }
        return;
    }

    let config_path = ViewerConfig::locate(args);
    let (config, base_dir) = ViewerConfig::load_or_default(config_path.as_deref());
    log::info!("{} starting", config.window_title);
    log::info!("   drag to orbit, right-drag to pan, C toggles the camera HUD");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("failed to create event loop: {err}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config, base_dir);
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("event loop error: {err}");
    }

    log::info!("viewer closed");
}
