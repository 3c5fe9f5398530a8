//! Mediator configuration.

use crate::error::Result;
use crate::mime::MimeConfig;
use crate::subscriptions::HttpNotifierConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Data directory for journals and the lock file.
    pub path: PathBuf,

    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Part classification conventions.
    pub mime: MimeConfig,

    /// Facility for feed batches whose HL7 part names none.
    pub default_facility: Option<String>,

    /// Max document ids kept per pull point (None = unbounded).
    pub pull_point_capacity: Option<usize>,

    /// Outbound notification settings.
    pub notifier: HttpNotifierConfig,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mediator"),
            create_if_missing: true,
            mime: MimeConfig::default(),
            default_facility: None,
            pull_point_capacity: None,
            notifier: HttpNotifierConfig::default(),
        }
    }
}

impl MediatorConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
