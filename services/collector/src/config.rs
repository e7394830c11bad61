//! Where the province boundaries come from

use crate::FetchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

fn default_local_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/provincias_ign.geojson"),
        PathBuf::from("data/argentina.geojson"),
        PathBuf::from("provincias_ign.geojson"),
    ]
}

fn default_remote_urls() -> Vec<String> {
    vec![
        "https://raw.githubusercontent.com/codeforgermany/click_that_hood/main/public/data/argentina.geojson".to_string(),
        "https://servicios.ign.gob.ar/geoserver/IGN/ows?service=WFS&version=2.0.0&request=GetFeature&typeName=IGN%3Aprovincias&outputFormat=application%2Fjson&srsName=EPSG%3A4326".to_string(),
    ]
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/provincias_ign.geojson")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "MonitorProvincial/0.1 (tablero de indicadores provinciales)".to_string()
}

/// Candidate sources, tried in order: local paths first, then remote URLs.
/// Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySourcesConfig {
    #[serde(default = "default_local_paths")]
    pub local_paths: Vec<PathBuf>,
    #[serde(default = "default_remote_urls")]
    pub remote_urls: Vec<String>,
    /// A remote download is written here.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BoundarySourcesConfig {
    fn default() -> Self {
        Self {
            local_paths: default_local_paths(),
            remote_urls: default_remote_urls(),
            cache_path: default_cache_path(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl BoundarySourcesConfig {
    /// Load from a JSON file
    pub async fn load(path: &Path) -> Result<Self, FetchError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Config {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|e| FetchError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// `BOUNDARY_CONFIG` names a JSON file; defaults otherwise.
    pub async fn from_env() -> Result<Self, FetchError> {
        match std::env::var("BOUNDARY_CONFIG") {
            Ok(path) => Self::load(Path::new(&path)).await,
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
