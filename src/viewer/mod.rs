//! The viewer context: owns the displayed model, the environment cache, the
//! user-facing flags, and the token of the load currently in flight.

pub mod backend;

pub use backend::{release_model, BackendError, ResourceCounts, SceneBackend};

use crate::assets::environment::RadianceMap;
use crate::assets::loader::{LoadOutcome, LoadRequest, LoadToken};
use crate::assets::AssetError;
use crate::config::{GalleryEntry, ViewerTuning};
use crate::scene::animation::pose_skins;
use crate::scene::materials::{apply_environment, boost_emissive, set_wireframe};
use crate::scene::normalize::center_and_scale;
use crate::scene::{AnimationMixer, EnvironmentHandle, ModelScene};
use glam::Quat;
use std::collections::HashMap;

pub const DEFAULT_TITLE: &str = "3D Viewer";

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub auto_rotate: bool,
    pub wireframe: bool,
    pub environment_enabled: bool,
    pub title: String,
    pub loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerSettings {
    pub target_size: f32,
    pub baseline: f32,
    pub auto_rotate_speed: f32,
    pub emissive_boost: Option<f32>,
}

impl From<&ViewerTuning> for ViewerSettings {
    fn from(tuning: &ViewerTuning) -> Self {
        Self {
            target_size: tuning.target_size,
            baseline: tuning.baseline,
            auto_rotate_speed: tuning.auto_rotate_speed,
            emissive_boost: tuning.emissive_boost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDisposition {
    Attached,
    Failed,
    /// A newer request was started; the outcome was dropped untouched.
    Stale,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    token: LoadToken,
    environment: Option<String>,
}

pub struct Viewer<B: SceneBackend> {
    backend: B,
    settings: ViewerSettings,
    state: ViewerState,
    model: Option<ModelScene>,
    mixer: Option<AnimationMixer>,
    environments: HashMap<String, EnvironmentHandle>,
    active_environment: Option<EnvironmentHandle>,
    next_token: u64,
    pending: Option<PendingLoad>,
}

impl<B: SceneBackend> Viewer<B> {
    pub fn new(backend: B, tuning: &ViewerTuning) -> Self {
        Self {
            backend,
            settings: ViewerSettings::from(tuning),
            state: ViewerState {
                auto_rotate: tuning.auto_rotate,
                wireframe: tuning.wireframe,
                environment_enabled: tuning.environment_enabled,
                title: DEFAULT_TITLE.to_string(),
                loading: false,
                last_error: None,
            },
            model: None,
            mixer: None,
            environments: HashMap::new(),
            active_environment: None,
            next_token: 0,
            pending: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn model(&self) -> Option<&ModelScene> {
        self.model.as_ref()
    }

    pub fn has_animation(&self) -> bool {
        self.mixer.as_ref().is_some_and(AnimationMixer::is_playing)
    }

    /// Environment for lit materials without a map of their own, if enabled.
    pub fn scene_environment(&self) -> Option<EnvironmentHandle> {
        self.active_environment
            .filter(|_| self.state.environment_enabled)
    }

    pub fn clear_error(&mut self) {
        self.state.last_error = None;
    }

    /// Start loading `entry`, superseding any load still in flight.
    /// Returns `None` when the entry names no model.
    pub fn begin_load(&mut self, entry: &GalleryEntry) -> Option<LoadRequest> {
        if entry.model.trim().is_empty() {
            log::warn!("gallery entry '{}' has no model", entry.name);
            return None;
        }
        self.next_token += 1;
        let token = LoadToken(self.next_token);
        if let Some(previous) = self.pending.as_ref() {
            log::debug!("load {:?} supersedes {:?}", token, previous.token);
        }

        let environment = entry
            .environment
            .as_ref()
            .filter(|locator| !locator.trim().is_empty())
            .cloned();
        self.pending = Some(PendingLoad {
            token,
            environment: environment.clone(),
        });
        self.state.loading = true;
        self.state.last_error = None;
        self.state.title = if entry.name.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            entry.name.clone()
        };

        Some(LoadRequest {
            token,
            model: entry.model.clone(),
            // Cached environments are not fetched again.
            environment: environment.filter(|locator| !self.environments.contains_key(locator)),
        })
    }

    pub fn complete_load(&mut self, outcome: LoadOutcome) -> LoadDisposition {
        // Only the newest request may replace the model.
        let current = self.pending.as_ref().map(|pending| pending.token);
        if current != Some(outcome.token) {
            log::debug!("dropping stale load {:?} (current {:?})", outcome.token, current);
            return LoadDisposition::Stale;
        }
        let Some(pending) = self.pending.take() else {
            return LoadDisposition::Stale;
        };
        self.state.loading = false;

        if let Some(locator) = pending.environment.as_deref() {
            self.prepare_environment(locator, outcome.environment);
        }

        // The old model goes even when the new one failed.
        self.dispose_model();

        let model = match outcome.model {
            Ok(model) => model,
            Err(err) => {
                log::error!("model load failed: {err}");
                self.state.last_error = Some(format!("Model failed to load: {err}"));
                return LoadDisposition::Failed;
            }
        };

        match self.attach(model) {
            Ok(()) => LoadDisposition::Attached,
            Err(err) => {
                log::error!("model upload failed: {err}");
                self.state.last_error = Some(format!("Model failed to load: {err}"));
                LoadDisposition::Failed
            }
        }
    }

    fn prepare_environment(
        &mut self,
        locator: &str,
        prepared: Option<Result<RadianceMap, AssetError>>,
    ) {
        if let Some(&handle) = self.environments.get(locator) {
            self.active_environment = Some(handle);
            return;
        }
        match prepared {
            Some(Ok(map)) => match self.backend.upload_environment(&map) {
                Ok(handle) => {
                    log::info!(
                        "environment {locator} ready ({}x{}, {} levels)",
                        map.width(),
                        map.height(),
                        map.level_count()
                    );
                    self.environments.insert(locator.to_string(), handle);
                    self.active_environment = Some(handle);
                }
                Err(err) => log::warn!("environment {locator} upload failed: {err}"),
            },
            Some(Err(err)) => log::warn!("environment {locator} unavailable: {err}"),
            None => log::warn!("environment {locator} was not prepared"),
        }
    }

    fn attach(&mut self, mut model: ModelScene) -> Result<(), BackendError> {
        // Bounds read posed vertices, so skins must be posed before measuring.
        pose_skins(&mut model);
        let normalization =
            center_and_scale(&mut model, self.settings.target_size, self.settings.baseline);

        if let Err(err) = self.backend.upload_model(&mut model) {
            release_model(&mut self.backend, &mut model);
            return Err(err);
        }

        let mut mixer = AnimationMixer::new(&model);
        if let Some(mixer) = mixer.as_mut() {
            mixer.play_all();
        }
        if let Some(intensity) = self.settings.emissive_boost {
            boost_emissive(&mut model, intensity);
        }
        set_wireframe(&mut model, self.state.wireframe);
        apply_environment(
            &mut model,
            self.active_environment,
            self.state.environment_enabled,
        );
        self.backend.sync_model(&mut model);

        log::info!(
            "attached '{}' (scale {:.3}, {} clips)",
            model.name,
            normalization.scale,
            model.animations.len()
        );
        self.model = Some(model);
        self.mixer = mixer;
        Ok(())
    }

    /// Detach the current model and release its graphics resources.
    pub fn dispose_model(&mut self) {
        self.mixer = None;
        if let Some(mut model) = self.model.take() {
            release_model(&mut self.backend, &mut model);
            let live = self.backend.live_resources();
            log::debug!(
                "released '{}'; {} model resources and {} environments still live",
                model.name,
                live.model_resources(),
                live.environments
            );
        }
    }

    /// Per-frame update: animation, auto-rotation, then GPU sync.
    pub fn update(&mut self, dt: f32) {
        let Some(model) = self.model.as_mut() else {
            return;
        };
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.update(model, dt);
        }
        // Spin in world space, so it composes on the left.
        if self.state.auto_rotate {
            let spin = Quat::from_rotation_y(self.settings.auto_rotate_speed * dt);
            model.root.rotation = (spin * model.root.rotation).normalize();
        }
        self.backend.sync_model(model);
    }

    pub fn set_wireframe(&mut self, enabled: bool) {
        self.state.wireframe = enabled;
        if let Some(model) = self.model.as_mut() {
            set_wireframe(model, enabled);
        }
    }

    pub fn set_environment_enabled(&mut self, enabled: bool) {
        self.state.environment_enabled = enabled;
        if let Some(model) = self.model.as_mut() {
            apply_environment(model, self.active_environment, enabled);
        }
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.state.auto_rotate = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::backend::recording::RecordingBackend;
    use super::*;
    use crate::assets::gltf::{parse_model, tests::triangle_glb};
    use crate::scene::bounds::model_bounds;
    use crate::scene::animation::{AnimationClip, Channel, ChannelValues, Interpolation};
    use crate::scene::primitives::box_model;
    use crate::scene::{Skin, SkinWeights};
    use glam::{Mat4, Vec3};

    fn viewer() -> Viewer<RecordingBackend> {
        Viewer::new(RecordingBackend::default(), &ViewerTuning::default())
    }

    fn entry(name: &str, environment: Option<&str>) -> GalleryEntry {
        GalleryEntry {
            name: name.to_string(),
            model: format!("{name}.glb"),
            environment: environment.map(str::to_string),
        }
    }

    fn outcome(request: &LoadRequest, model: ModelScene) -> LoadOutcome {
        LoadOutcome {
            token: request.token,
            model: Ok(model),
            environment: request
                .environment
                .as_ref()
                .map(|_| Ok(RadianceMap::from_texels("env", 2, 1, vec![[1.0; 4]; 2]))),
        }
    }

    /// A unit box bound to its own node, which sits five units off the origin.
    fn skinned_rig() -> ModelScene {
        let mut model = box_model("rig", Vec3::ONE, [1.0; 4]);
        model.nodes[0].local.translation = Vec3::new(5.0, 0.0, 0.0);
        model.skins.push(Skin {
            joints: vec![0],
            inverse_bind: vec![Mat4::IDENTITY],
        });
        model.nodes[0].skin = Some(0);
        let vertex_count = model.surfaces[0].groups[0].vertex_count();
        model.surfaces[0].groups[0].skin = Some(SkinWeights {
            joints: vec![[0; 4]; vertex_count],
            weights: vec![[1.0, 0.0, 0.0, 0.0]; vertex_count],
        });
        model
    }

    fn slide(model: &mut ModelScene, from: Vec3, to: Vec3) {
        model.animations.push(AnimationClip::new(
            "slide",
            vec![Channel {
                node: 0,
                interpolation: Interpolation::Linear,
                times: vec![0.0, 1.0],
                values: ChannelValues::Translation(vec![from, to]),
            }],
        ));
    }

    fn assert_normalized(model: &ModelScene, expected_center_x: f32) {
        let bounds = model_bounds(model);
        assert!((bounds.max_dimension() - 1.8).abs() < 1e-4, "{bounds:?}");
        assert!((bounds.center().x - expected_center_x).abs() < 1e-4, "{bounds:?}");
        assert!(bounds.center().z.abs() < 1e-4, "{bounds:?}");
        assert!(bounds.min.y.abs() < 1e-4, "{bounds:?}");
    }

    #[test]
    fn skinned_model_is_centered_in_posed_space() {
        let mut viewer = viewer();
        let request = viewer.begin_load(&entry("rig", None)).unwrap();
        let result = viewer.complete_load(outcome(&request, skinned_rig()));
        assert_eq!(result, LoadDisposition::Attached);
        assert_normalized(viewer.model().unwrap(), 0.0);
    }

    #[test]
    fn animated_model_keeps_its_normalized_scale() {
        let mut viewer = viewer();
        let request = viewer.begin_load(&entry("slider", None)).unwrap();
        let mut model = box_model("slider", Vec3::ONE, [1.0; 4]);
        slide(&mut model, Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0));
        viewer.complete_load(outcome(&request, model));
        assert_normalized(viewer.model().unwrap(), 0.0);

        // Halfway through the clip the node sits one unit over, scaled by 1.8.
        viewer.update(0.5);
        assert_normalized(viewer.model().unwrap(), 1.8);
    }

    #[test]
    fn animated_skin_moves_from_its_centered_rest() {
        let mut viewer = viewer();
        let request = viewer.begin_load(&entry("rig", None)).unwrap();
        let mut rig = skinned_rig();
        slide(&mut rig, Vec3::new(5.0, 0.0, 0.0), Vec3::new(7.0, 0.0, 0.0));
        viewer.complete_load(outcome(&request, rig));
        assert_normalized(viewer.model().unwrap(), 0.0);

        viewer.update(0.5);
        assert_normalized(viewer.model().unwrap(), 1.8);
    }

    #[test]
    fn ship_without_environment_is_normalized_and_unreflective() {
        let mut viewer = viewer();
        let request = viewer.begin_load(&entry("ship", None)).unwrap();
        assert!(viewer.state().loading);
        assert_eq!(viewer.state().title, "ship");

        let ship = parse_model(&triangle_glb(), "ship").unwrap();
        assert_eq!(viewer.complete_load(outcome(&request, ship)), LoadDisposition::Attached);

        let model = viewer.model().unwrap();
        let bounds = model_bounds(model);
        assert!((bounds.max_dimension() - 1.8).abs() < 1e-4);
        assert!(bounds.center().x.abs() < 1e-4 && bounds.center().z.abs() < 1e-4);
        assert!(bounds.min.y.abs() < 1e-4);
        assert!(model
            .materials
            .iter()
            .all(|m| m.reflections.map_or(true, |slot| slot.map.is_none())));
        assert_eq!(viewer.scene_environment(), None);
        assert!(!viewer.state().loading);
        assert!(viewer.has_animation());
    }

    #[test]
    fn replacing_model_releases_previous_resources() {
        let mut viewer = viewer();
        let first = viewer.begin_load(&entry("a", None)).unwrap();
        viewer.complete_load(outcome(&first, box_model("a", Vec3::ONE, [1.0; 4])));
        let after_a = viewer.backend().live_resources();
        assert_eq!(after_a.materials, 1);
        assert_eq!(after_a.geometries, 1);

        let second = viewer.begin_load(&entry("b", None)).unwrap();
        viewer.complete_load(outcome(&second, box_model("b", Vec3::ONE, [1.0; 4])));
        assert_eq!(viewer.model().map(|m| m.name.as_str()), Some("b"));
        assert_eq!(viewer.backend().live_resources(), after_a);
        assert_eq!(
            viewer.backend().materials.iter().collect::<Vec<_>>(),
            viewer
                .model()
                .unwrap()
                .materials
                .iter()
                .filter_map(|m| m.handle.as_ref())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut viewer = viewer();
        let a = viewer.begin_load(&entry("a", None)).unwrap();
        let b = viewer.begin_load(&entry("b", None)).unwrap();

        let stale = viewer.complete_load(outcome(&a, box_model("a", Vec3::ONE, [1.0; 4])));
        assert_eq!(stale, LoadDisposition::Stale);
        assert!(viewer.model().is_none());
        assert!(viewer.state().loading);
        assert_eq!(viewer.backend().live_resources().model_resources(), 0);

        viewer.complete_load(outcome(&b, box_model("b", Vec3::ONE, [1.0; 4])));
        assert_eq!(viewer.model().map(|m| m.name.as_str()), Some("b"));
        assert!(!viewer.state().loading);
    }

    #[test]
    fn failed_load_clears_model_and_reports() {
        let mut viewer = viewer();
        let a = viewer.begin_load(&entry("a", None)).unwrap();
        viewer.complete_load(outcome(&a, box_model("a", Vec3::ONE, [1.0; 4])));

        let b = viewer.begin_load(&entry("b", None)).unwrap();
        let failed = viewer.complete_load(LoadOutcome {
            token: b.token,
            model: Err(AssetError::EmptyLocator),
            environment: None,
        });
        assert_eq!(failed, LoadDisposition::Failed);
        assert!(viewer.model().is_none());
        assert!(!viewer.state().loading);
        assert!(viewer.state().last_error.is_some());
        assert_eq!(viewer.backend().live_resources().model_resources(), 0);
    }

    #[test]
    fn upload_failure_leaves_no_resources() {
        let mut viewer = viewer();
        viewer.backend_mut().fail_next_upload = true;
        let a = viewer.begin_load(&entry("a", None)).unwrap();
        let result = viewer.complete_load(outcome(&a, box_model("a", Vec3::ONE, [1.0; 4])));
        assert_eq!(result, LoadDisposition::Failed);
        assert_eq!(viewer.backend().live_resources().model_resources(), 0);
    }

    #[test]
    fn environment_is_cached_per_locator() {
        let mut viewer = viewer();
        let first = viewer.begin_load(&entry("a", Some("studio.hdr"))).unwrap();
        assert_eq!(first.environment.as_deref(), Some("studio.hdr"));
        viewer.complete_load(outcome(&first, box_model("a", Vec3::ONE, [1.0; 4])));
        let env = viewer.scene_environment().expect("environment active");
        assert_eq!(
            viewer.model().unwrap().materials[0].reflections.and_then(|r| r.map),
            Some(env)
        );

        let second = viewer.begin_load(&entry("b", Some("studio.hdr"))).unwrap();
        assert_eq!(second.environment, None);
        viewer.complete_load(outcome(&second, box_model("b", Vec3::ONE, [1.0; 4])));
        assert_eq!(viewer.backend().environment_uploads, 1);
        assert_eq!(viewer.scene_environment(), Some(env));
    }

    #[test]
    fn failed_environment_keeps_model() {
        let mut viewer = viewer();
        let request = viewer.begin_load(&entry("a", Some("broken.hdr"))).unwrap();
        let result = viewer.complete_load(LoadOutcome {
            token: request.token,
            model: Ok(box_model("a", Vec3::ONE, [1.0; 4])),
            environment: Some(Err(AssetError::EmptyLocator)),
        });
        assert_eq!(result, LoadDisposition::Attached);
        assert_eq!(viewer.scene_environment(), None);
    }

    #[test]
    fn toggles_follow_new_models() {
        let mut viewer = viewer();
        viewer.set_wireframe(true);
        viewer.set_environment_enabled(false);
        let request = viewer.begin_load(&entry("a", Some("studio.hdr"))).unwrap();
        viewer.complete_load(outcome(&request, box_model("a", Vec3::ONE, [1.0; 4])));

        let model = viewer.model().unwrap();
        assert!(model.materials[0].wireframe);
        assert_eq!(model.materials[0].reflections.and_then(|r| r.map), None);
        assert_eq!(viewer.scene_environment(), None);

        viewer.set_environment_enabled(true);
        assert!(viewer.scene_environment().is_some());
        assert!(viewer.model().unwrap().materials[0]
            .reflections
            .and_then(|r| r.map)
            .is_some());
        viewer.set_wireframe(false);
        assert!(!viewer.model().unwrap().materials[0].wireframe);
    }

    #[test]
    fn auto_rotate_spins_about_vertical_axis() {
        let mut viewer = viewer();
        let request = viewer.begin_load(&entry("a", None)).unwrap();
        viewer.complete_load(outcome(&request, box_model("a", Vec3::ONE, [1.0; 4])));

        viewer.update(1.0);
        assert_eq!(viewer.model().unwrap().root.rotation, Quat::IDENTITY);

        viewer.set_auto_rotate(true);
        viewer.update(1.0);
        let (axis, angle) = viewer.model().unwrap().root.rotation.to_axis_angle();
        assert!((angle - 0.5).abs() < 1e-5);
        assert!((axis - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn entry_without_model_is_ignored() {
        let mut viewer = viewer();
        let empty = GalleryEntry {
            name: "nothing".to_string(),
            model: String::new(),
            environment: None,
        };
        assert!(viewer.begin_load(&empty).is_none());
        assert!(!viewer.state().loading);
    }
}
