//! Runtime configuration for the store. See spec §4.G / SPEC_FULL §10.
//!
//! Deliberately tiny: no environment-variable or file parsing lives here.
//! Callers (a CLI, a config-file loader, a test harness) build a
//! [`StoreConfig`] however suits them and hand it to `Store::open`.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub flush_every_ms: Option<u64>,
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: path.into(),
            flush_every_ms: None,
        }
    }

    pub fn with_flush_interval(mut self, ms: u64) -> Self {
        self.flush_every_ms = Some(ms);
        self
    }
}
