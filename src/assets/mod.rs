pub mod environment;
pub mod gltf;
pub mod loader;

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote bodies larger than this are rejected.
const MAX_REMOTE_BYTES: u64 = 512 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-read stall limit, so a dead server cannot pin the asset worker.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("empty asset locator")]
    EmptyLocator,
    #[error("failed to read asset at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },
    #[error("failed to parse glTF {locator}: {source}")]
    ParseGltf {
        locator: String,
        #[source]
        source: ::gltf::Error,
    },
    #[error("no scene in glTF {locator}")]
    NoScene { locator: String },
    #[error("failed to decode image {locator}: {source}")]
    DecodeImage {
        locator: String,
        #[source]
        source: image::ImageError,
    },
    #[error("unsupported pixel format {format} in {locator}")]
    PixelFormat { locator: String, format: String },
    #[error("failed to start asset worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// Where an asset comes from: the filesystem or an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetLocator {
    File(PathBuf),
    Remote(String),
}

impl AssetLocator {
    /// Relative file paths resolve against `base_dir` when given.
    pub fn parse(raw: &str, base_dir: Option<&Path>) -> Result<Self, AssetError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AssetError::EmptyLocator);
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Remote(raw.to_string()));
        }
        let path = raw.strip_prefix("file://").unwrap_or(raw);
        let path = PathBuf::from(path);
        let path = match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        };
        Ok(Self::File(path))
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Remote(url) => url.clone(),
        }
    }

    /// Lower-cased extension of the final path segment, if any.
    pub fn extension(&self) -> Option<String> {
        let last = match self {
            Self::File(path) => path.file_name()?.to_string_lossy().into_owned(),
            Self::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/').next()?.to_string()
            }
        };
        let (_, ext) = last.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }
}

impl std::fmt::Display for AssetLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

pub fn fetch_bytes(locator: &AssetLocator) -> Result<Vec<u8>, AssetError> {
    match locator {
        AssetLocator::File(path) => std::fs::read(path).map_err(|source| AssetError::Read {
            path: path.display().to_string(),
            source,
        }),
        AssetLocator::Remote(url) => fetch_remote(url),
    }
}

fn fetch_remote(url: &str) -> Result<Vec<u8>, AssetError> {
    log::info!("fetching {url}");
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(READ_TIMEOUT)
        .build();
    let response = agent.get(url).call().map_err(|err| AssetError::Fetch {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    read_capped(response.into_reader(), MAX_REMOTE_BYTES, url)
}

/// Read a whole body, failing instead of truncating when it exceeds `limit`.
fn read_capped(reader: impl Read, limit: u64, url: &str) -> Result<Vec<u8>, AssetError> {
    let mut bytes = Vec::new();
    // One byte past the limit is enough to tell a full body from an oversized one.
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|source| AssetError::Fetch {
            url: url.to_string(),
            message: source.to_string(),
        })?;
    if bytes.len() as u64 > limit {
        return Err(AssetError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    Ok(bytes)
}

/// Hex SHA-256 of `bytes`, used as a cache key for decoded images.
pub fn content_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
