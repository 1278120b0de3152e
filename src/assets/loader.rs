//! Background fetch + decode of gallery entries, sky images and previews.
//!
//! The render thread submits requests and polls outcomes; the worker never
//! touches scene state. A model or sky request whose token has already been
//! superseded when it is dequeued is skipped.

use super::environment::{decode_radiance, load_radiance, load_thumbnail, RadianceMap};
use super::gltf::load_model;
use super::{content_digest, fetch_bytes, AssetError, AssetLocator};
use crate::scene::ModelScene;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Generation of a load request; only the newest one may touch the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub token: LoadToken,
    pub model: String,
    /// Present only when the environment is not cached yet.
    pub environment: Option<String>,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub token: LoadToken,
    pub model: Result<ModelScene, AssetError>,
    pub environment: Option<Result<RadianceMap, AssetError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkyRequest {
    pub token: LoadToken,
    pub source: String,
}

/// A decoded sky plus the digest of its source bytes.
#[derive(Debug)]
pub struct SkyImage {
    pub digest: String,
    pub map: RadianceMap,
}

#[derive(Debug)]
pub struct SkyOutcome {
    pub token: LoadToken,
    pub source: String,
    pub image: Result<SkyImage, AssetError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct ThumbnailOutcome {
    pub source: String,
    pub image: Result<image::RgbaImage, AssetError>,
}

enum WorkerMessage {
    Load(LoadRequest),
    Sky(SkyRequest),
    Thumbnail(ThumbnailRequest),
    Shutdown,
}

struct WorkerOutputs {
    loads: Sender<LoadOutcome>,
    skies: Sender<SkyOutcome>,
    thumbnails: Sender<ThumbnailOutcome>,
}

pub struct AssetLoader {
    requests: Sender<WorkerMessage>,
    outcomes: Receiver<LoadOutcome>,
    sky_outcomes: Receiver<SkyOutcome>,
    thumbnails: Receiver<ThumbnailOutcome>,
    latest: Arc<AtomicU64>,
    latest_sky: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl AssetLoader {
    pub fn spawn(base_dir: Option<PathBuf>) -> Result<Self, AssetError> {
        let (request_tx, request_rx) = unbounded::<WorkerMessage>();
        let (outcome_tx, outcome_rx) = unbounded();
        let (sky_tx, sky_rx) = unbounded();
        let (thumbnail_tx, thumbnail_rx) = unbounded();
        let outputs = WorkerOutputs {
            loads: outcome_tx,
            skies: sky_tx,
            thumbnails: thumbnail_tx,
        };
        let latest = Arc::new(AtomicU64::new(0));
        let latest_sky = Arc::new(AtomicU64::new(0));
        let (worker_latest, worker_latest_sky) = (Arc::clone(&latest), Arc::clone(&latest_sky));
        let worker = std::thread::Builder::new()
            .name("asset-loader".to_string())
            .spawn(move || {
                while let Ok(message) = request_rx.recv() {
                    // A closed outcome channel means the app is gone.
                    let delivered = match message {
                        WorkerMessage::Load(request) => {
                            if request.token.0 < worker_latest.load(Ordering::Acquire) {
                                log::debug!("skipping superseded load {:?}", request.token);
                                continue;
                            }
                            let outcome = run_request(&request, base_dir.as_deref());
                            outputs.loads.send(outcome).is_ok()
                        }
                        WorkerMessage::Sky(request) => {
                            if request.token.0 < worker_latest_sky.load(Ordering::Acquire) {
                                log::debug!("skipping superseded sky {:?}", request.token);
                                continue;
                            }
                            let outcome = run_sky_request(&request, base_dir.as_deref());
                            outputs.skies.send(outcome).is_ok()
                        }
                        WorkerMessage::Thumbnail(request) => {
                            let outcome = run_thumbnail_request(&request, base_dir.as_deref());
                            outputs.thumbnails.send(outcome).is_ok()
                        }
                        WorkerMessage::Shutdown => break,
                    };
                    if !delivered {
                        break;
                    }
                }
                log::debug!("asset loader stopped");
            })
            .map_err(AssetError::Worker)?;
        Ok(Self {
            requests: request_tx,
            outcomes: outcome_rx,
            sky_outcomes: sky_rx,
            thumbnails: thumbnail_rx,
            latest,
            latest_sky,
            worker: Some(worker),
        })
    }

    pub fn submit(&self, request: LoadRequest) {
        self.latest.fetch_max(request.token.0, Ordering::AcqRel);
        log::info!("loading {} ({:?})", request.model, request.token);
        self.send(WorkerMessage::Load(request));
    }

    pub fn submit_sky(&self, request: SkyRequest) {
        self.latest_sky.fetch_max(request.token.0, Ordering::AcqRel);
        log::info!("loading sky {} ({:?})", request.source, request.token);
        self.send(WorkerMessage::Sky(request));
    }

    pub fn submit_thumbnail(&self, request: ThumbnailRequest) {
        log::debug!("previewing {}", request.source);
        self.send(WorkerMessage::Thumbnail(request));
    }

    fn send(&self, message: WorkerMessage) {
        if self.requests.send(message).is_err() {
            log::error!("asset loader is no longer running");
        }
    }

    /// Next finished load, if any.
    pub fn poll(&self) -> Option<LoadOutcome> {
        try_next(&self.outcomes)
    }

    pub fn poll_sky(&self) -> Option<SkyOutcome> {
        try_next(&self.sky_outcomes)
    }

    pub fn poll_thumbnail(&self) -> Option<ThumbnailOutcome> {
        try_next(&self.thumbnails)
    }
}

fn try_next<T>(receiver: &Receiver<T>) -> Option<T> {
    match receiver.try_recv() {
        Ok(outcome) => Some(outcome),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => None,
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("asset loader thread panicked");
            }
        }
    }
}

/// Environment first, then the model, matching the attach order.
pub fn run_request(request: &LoadRequest, base_dir: Option<&Path>) -> LoadOutcome {
    let environment = request.environment.as_deref().map(|raw| {
        AssetLocator::parse(raw, base_dir).and_then(|locator| load_radiance(&locator))
    });
    let model = AssetLocator::parse(&request.model, base_dir).and_then(|locator| load_model(&locator));
    LoadOutcome {
        token: request.token,
        model,
        environment,
    }
}

pub fn run_sky_request(request: &SkyRequest, base_dir: Option<&Path>) -> SkyOutcome {
    let image = AssetLocator::parse(&request.source, base_dir).and_then(|locator| {
        let bytes = fetch_bytes(&locator)?;
        let digest = content_digest(&bytes);
        let map = decode_radiance(&bytes, &locator.display_name())?;
        Ok(SkyImage { digest, map })
    });
    SkyOutcome {
        token: request.token,
        source: request.source.clone(),
        image,
    }
}

pub fn run_thumbnail_request(request: &ThumbnailRequest, base_dir: Option<&Path>) -> ThumbnailOutcome {
    let image = AssetLocator::parse(&request.source, base_dir)
        .and_then(|locator| load_thumbnail(&locator, request.width, request.height));
    ThumbnailOutcome {
        source: request.source.clone(),
        image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::gltf::tests::triangle_glb;
    use std::time::{Duration, Instant};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vitrine-loader-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn wait_for(loader: &AssetLoader) -> LoadOutcome {
        wait_on(|| loader.poll())
    }

    #[test]
    fn run_request_resolves_relative_paths() {
        let dir = temp_dir("relative");
        std::fs::write(dir.join("ship.glb"), triangle_glb()).expect("write glb");

        let outcome = run_request(
            &LoadRequest {
                token: LoadToken(7),
                model: "ship.glb".to_string(),
                environment: None,
            },
            Some(&dir),
        );
        assert_eq!(outcome.token, LoadToken(7));
        assert!(outcome.model.is_ok());
        assert!(outcome.environment.is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_environment_does_not_block_model() {
        let dir = temp_dir("env");
        std::fs::write(dir.join("ship.glb"), triangle_glb()).expect("write glb");

        let outcome = run_request(
            &LoadRequest {
                token: LoadToken(1),
                model: "ship.glb".to_string(),
                environment: Some("missing.hdr".to_string()),
            },
            Some(&dir),
        );
        assert!(outcome.model.is_ok());
        assert!(matches!(outcome.environment, Some(Err(AssetError::Read { .. }))));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn worker_delivers_outcome() {
        let dir = temp_dir("worker");
        std::fs::write(dir.join("a.glb"), triangle_glb()).expect("write glb");
        let loader = AssetLoader::spawn(Some(dir.clone())).expect("spawn loader");

        loader.submit(LoadRequest {
            token: LoadToken(1),
            model: "a.glb".to_string(),
            environment: None,
        });
        let outcome = wait_for(&loader);
        assert_eq!(outcome.token, LoadToken(1));
        assert!(outcome.model.is_ok());

        drop(loader);
        let _ = std::fs::remove_dir_all(dir);
    }

    fn wait_on<T>(poll: impl Fn() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(outcome) = poll() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "loader timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
            .save(path)
            .expect("write png");
    }

    #[test]
    fn sky_and_preview_are_decoded_off_thread() {
        let dir = temp_dir("sky");
        write_png(&dir.join("dusk.png"), 64, 32);
        let loader = AssetLoader::spawn(Some(dir.clone())).expect("spawn loader");

        loader.submit_sky(SkyRequest {
            token: LoadToken(2),
            source: "dusk.png".to_string(),
        });
        loader.submit_thumbnail(ThumbnailRequest {
            source: "dusk.png".to_string(),
            width: 16,
            height: 16,
        });

        let sky = wait_on(|| loader.poll_sky());
        assert_eq!(sky.token, LoadToken(2));
        let image = sky.image.expect("sky decoded");
        assert_eq!(image.map.width(), 64);
        assert_eq!(image.digest.len(), 64);

        let preview = wait_on(|| loader.poll_thumbnail());
        assert_eq!(preview.source, "dusk.png");
        assert_eq!(preview.image.expect("preview decoded").dimensions(), (16, 8));
        assert!(loader.poll().is_none());

        drop(loader);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn sky_request_reports_missing_file() {
        let outcome = run_sky_request(
            &SkyRequest {
                token: LoadToken(1),
                source: "/nonexistent/vitrine/sky.png".to_string(),
            },
            None,
        );
        assert_eq!(outcome.source, "/nonexistent/vitrine/sky.png");
        assert!(matches!(outcome.image, Err(AssetError::Read { .. })));
    }

    #[test]
    fn missing_model_reports_error_outcome() {
        let loader = AssetLoader::spawn(None).expect("spawn loader");
        loader.submit(LoadRequest {
            token: LoadToken(3),
            model: "/nonexistent/vitrine/model.glb".to_string(),
            environment: None,
        });
        let outcome = wait_for(&loader);
        assert!(outcome.model.is_err());
    }
}
