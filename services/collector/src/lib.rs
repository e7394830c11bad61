//! Collector - acquires the province boundary dataset
//!
//! Responsibilities:
//! - Try local boundary files, then public URLs, in configured order
//! - Cache the first successful download on disk
//! - Hash what was loaded so runs can be compared
//! - Memoize the outcome for the lifetime of a process

pub mod config;
pub mod loader;

pub use config::BoundarySourcesConfig;
pub use loader::{Attempt, BoundaryCache, BoundaryLoader, BoundaryOrigin, LoadedBoundaries};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot read boundary config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("no boundary source succeeded ({} tried): {}", .attempts.len(), describe(.attempts))]
    Exhausted { attempts: Vec<Attempt> },
}

fn describe(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.source, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
