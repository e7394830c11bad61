//! Boundary loader - local files first, then remote URLs

use crate::config::BoundarySourcesConfig;
use crate::FetchError;
use chrono::{DateTime, Utc};
use monitor_parser::BoundarySet;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OnceCell;

/// One failed candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum BoundaryOrigin {
    Local(PathBuf),
    Remote(String),
}

#[derive(Debug, Clone)]
pub struct LoadedBoundaries {
    pub set: BoundarySet,
    pub origin: BoundaryOrigin,
    /// "sha256:<hex>" of the bytes that were parsed
    pub content_hash: String,
    pub size_bytes: usize,
    pub loaded_at: DateTime<Utc>,
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

fn parse(bytes: &[u8], origin: BoundaryOrigin) -> Result<LoadedBoundaries, String> {
    let set = BoundarySet::from_slice(bytes).map_err(|e| e.to_string())?;
    if set.is_empty() {
        return Err("no features".to_string());
    }
    Ok(LoadedBoundaries {
        set,
        origin,
        content_hash: content_hash(bytes),
        size_bytes: bytes.len(),
        loaded_at: Utc::now(),
    })
}

pub struct BoundaryLoader {
    config: BoundarySourcesConfig,
    client: reqwest::Client,
}

impl BoundaryLoader {
    pub fn new(config: BoundarySourcesConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BoundarySourcesConfig {
        &self.config
    }

    /// Local paths in order, then remote URLs. Fails only after every
    /// candidate has been tried.
    pub async fn load(&self) -> Result<LoadedBoundaries, FetchError> {
        let mut attempts = Vec::new();

        for path in &self.config.local_paths {
            match self.try_local(path).await {
                Ok(loaded) => return Ok(loaded),
                Err(reason) => {
                    tracing::debug!(path = %path.display(), %reason, "local boundaries skipped");
                    attempts.push(Attempt {
                        source: path.display().to_string(),
                        reason,
                    });
                }
            }
        }

        self.load_remote(attempts).await
    }

    /// Skip local files and download again, refreshing the on-disk cache.
    pub async fn refresh(&self) -> Result<LoadedBoundaries, FetchError> {
        self.load_remote(Vec::new()).await
    }

    async fn load_remote(&self, mut attempts: Vec<Attempt>) -> Result<LoadedBoundaries, FetchError> {
        for url in &self.config.remote_urls {
            match self.try_remote(url).await {
                Ok((loaded, bytes)) => {
                    self.write_cache(&bytes).await;
                    return Ok(loaded);
                }
                Err(reason) => {
                    tracing::warn!(url = %url, %reason, "boundary download failed");
                    attempts.push(Attempt {
                        source: url.clone(),
                        reason,
                    });
                }
            }
        }
        Err(FetchError::Exhausted { attempts })
    }

    async fn try_local(&self, path: &Path) -> Result<LoadedBoundaries, String> {
        let bytes = fs::read(path).await.map_err(|e| e.to_string())?;
        let loaded = parse(&bytes, BoundaryOrigin::Local(path.to_path_buf()))?;
        tracing::info!(
            path = %path.display(),
            features = loaded.set.len(),
            hash = %loaded.content_hash,
            "loaded local boundaries"
        );
        Ok(loaded)
    }

    async fn try_remote(&self, url: &str) -> Result<(LoadedBoundaries, Vec<u8>), String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        let loaded = parse(&bytes, BoundaryOrigin::Remote(url.to_string()))?;
        tracing::info!(
            url,
            features = loaded.set.len(),
            bytes = bytes.len(),
            hash = %loaded.content_hash,
            "downloaded boundaries"
        );
        Ok((loaded, bytes))
    }

    /// A failed cache write is logged, never fatal.
    async fn write_cache(&self, bytes: &[u8]) {
        let path = &self.config.cache_path;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "cannot create cache dir");
                return;
            }
        }
        match fs::write(path, bytes).await {
            Ok(()) => tracing::info!(path = %path.display(), "cached boundaries"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot write boundary cache"),
        }
    }
}

/// Process-wide boundary data: loaded at most once, success or absence
/// remembered for every later caller.
pub struct BoundaryCache {
    loader: BoundaryLoader,
    cell: OnceCell<Option<Arc<LoadedBoundaries>>>,
}

impl BoundaryCache {
    pub fn new(loader: BoundaryLoader) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Option<Arc<LoadedBoundaries>> {
        self.cell
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(loaded) => Some(Arc::new(loaded)),
                    Err(e) => {
                        tracing::warn!(error = %e, "boundaries unavailable, maps disabled");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// `None` until the first `get` has finished.
    pub fn peek(&self) -> Option<Option<Arc<LoadedBoundaries>>> {
        self.cell.get().cloned()
    }
}
