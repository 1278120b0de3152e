use crate::scene::materials::DEFAULT_EMISSIVE_BOOST;
use crate::scene::normalize::{DEFAULT_BASELINE, DEFAULT_TARGET_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no config path is passed on the command line.
pub const CONFIG_ENV_VAR: &str = "VITRINE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One gallery card: a model plus the optional radiance image lighting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub name: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerTuning {
    pub target_size: f32,
    pub baseline: f32,
    pub auto_rotate_speed: f32,
    /// Intensity forced onto non-black emissive materials; `null` disables it.
    pub emissive_boost: Option<f32>,
    pub auto_rotate: bool,
    pub wireframe: bool,
    pub environment_enabled: bool,
}

impl Default for ViewerTuning {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            baseline: DEFAULT_BASELINE,
            auto_rotate_speed: 0.5,
            emissive_boost: Some(DEFAULT_EMISSIVE_BOOST),
            auto_rotate: false,
            wireframe: false,
            environment_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub damping: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 50.0,
            near: 0.1,
            far: 100.0,
            position: [2.8, 1.6, 3.2],
            target: [0.0, 0.0, 0.0],
            damping: 0.06,
            rotate_speed: 0.5,
            pan_speed: 0.6,
            zoom_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub background: String,
    pub key_position: [f32; 3],
    pub key_intensity: f32,
    pub ambient: f32,
    pub exposure: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            background: "#0f1117".to_string(),
            key_position: [4.0, 6.0, 4.0],
            key_intensity: 2.0,
            ambient: 0.35,
            exposure: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    pub enabled: bool,
    pub throttle_ms: u64,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            throttle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub color: String,
    pub emissive_intensity: f32,
    pub scale: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            color: "#ffd54a".to_string(),
            emissive_intensity: 0.8,
            scale: 1.06,
        }
    }
}

/// What clicking a hotspot opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotspotAction {
    Music,
    Shop,
    SkyEditor,
}

/// In-scene prop: a box standing in the world that reacts to hover and click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotConfig {
    pub name: String,
    pub action: HotspotAction,
    pub position: [f32; 3],
    #[serde(default = "default_hotspot_size")]
    pub size: [f32; 3],
    #[serde(default = "default_hotspot_color")]
    pub color: String,
}

fn default_hotspot_size() -> [f32; 3] {
    [0.4, 0.6, 0.3]
}

fn default_hotspot_color() -> String {
    "#5a6270".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItem {
    pub name: String,
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyPreset {
    pub label: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyConfig {
    pub source: Option<String>,
    /// Euler degrees; only yaw is edited interactively.
    pub rotation: [f32; 3],
    pub presets: Vec<SkyPreset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    pub title: String,
    pub artist: String,
    pub url: Option<String>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            title: "Untitled track".to_string(),
            artist: String::new(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window_title: String,
    pub gallery: Vec<GalleryEntry>,
    /// Gallery entry loaded at startup.
    pub initial_entry: Option<usize>,
    pub viewer: ViewerTuning,
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    pub hud: HudConfig,
    pub highlight: HighlightConfig,
    pub hotspots: Vec<HotspotConfig>,
    pub shop: Vec<ShopItem>,
    pub sky: SkyConfig,
    pub music: MusicConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "3D Viewer".to_string(),
            gallery: Vec::new(),
            initial_entry: Some(0),
            viewer: ViewerTuning::default(),
            camera: CameraConfig::default(),
            lighting: LightingConfig::default(),
            hud: HudConfig::default(),
            highlight: HighlightConfig::default(),
            hotspots: default_hotspots(),
            shop: default_shop_items(),
            sky: SkyConfig::default(),
            music: MusicConfig::default(),
        }
    }
}

fn default_hotspots() -> Vec<HotspotConfig> {
    vec![
        HotspotConfig {
            name: "jukebox".to_string(),
            action: HotspotAction::Music,
            position: [-1.6, 0.3, -0.6],
            size: [0.45, 0.6, 0.35],
            color: "#7a3b2e".to_string(),
        },
        HotspotConfig {
            name: "shoplink".to_string(),
            action: HotspotAction::Shop,
            position: [1.6, 0.3, -0.6],
            size: [0.5, 0.6, 0.1],
            color: "#2e5a7a".to_string(),
        },
        HotspotConfig {
            name: "skyboxeditor".to_string(),
            action: HotspotAction::SkyEditor,
            position: [0.0, 0.25, -1.8],
            size: [0.6, 0.5, 0.1],
            color: "#3d7a2e".to_string(),
        },
    ]
}

pub fn default_shop_items() -> Vec<ShopItem> {
    [
        ("T-Shirt 1", "$25.00"),
        ("Hoodie", "$45.00"),
        ("Cap", "$20.00"),
        ("Sticker Pack", "$10.00"),
        ("Poster", "$15.00"),
        ("Mug", "$12.00"),
        ("Pin Set", "$8.00"),
        ("Tote Bag", "$18.00"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (name, price))| ShopItem {
        name: name.to_string(),
        price: price.to_string(),
        image: Some(format!("./assets/shop/placeholder{}.jpg", i + 1)),
    })
    .collect()
}

impl ViewerConfig {
    /// Config path from the first CLI argument, else `VITRINE_CONFIG`.
    pub fn locate(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
        // argv[0] is the binary.
        args.into_iter()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Load `path` when given, falling back to defaults on any error.
    /// Returns the config and the directory relative locators resolve against.
    pub fn load_or_default(path: Option<&Path>) -> (Self, Option<PathBuf>) {
        let Some(path) = path else {
            log::info!("no config given; using built-in defaults");
            return (Self::default(), std::env::current_dir().ok());
        };
        // Keep the config's directory even on failure; defaults may name relative assets.
        let base_dir = path.parent().map(Path::to_path_buf);
        match load_config_from_file(path) {
            Ok(config) => {
                log::info!(
                    "loaded config {} ({} gallery entries)",
                    path.display(),
                    config.gallery.len()
                );
                (config, base_dir)
            }
            Err(err) => {
                log::warn!("failed to load config {}: {err}; using defaults", path.display());
                (Self::default(), base_dir)
            }
        }
    }

    pub fn initial_gallery_entry(&self) -> Option<&GalleryEntry> {
        self.initial_entry.and_then(|index| self.gallery.get(index))
    }
}

pub fn save_config_to_file(config: &ViewerConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_config_from_file(path: &Path) -> Result<ViewerConfig> {
    let json = std::fs::read_to_string(path)?;
    let config: ViewerConfig = serde_json::from_str(&json)?;
    Ok(config)
}
