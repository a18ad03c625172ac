//! Settings file with parameter defaults
//!
//! Lets a build keep its upload parameters in a JSON file instead of on the
//! command line. Default location:
//! - Linux: ~/.config/s3-upload/settings.json
//! - Windows: %APPDATA%/s3-upload/settings.json
//! - macOS: ~/Library/Application Support/s3-upload/settings.json
//!
//! Keys use the same names as the build-plugin parameters (`bucketName`,
//! `doNotUpload`, ...). Command-line values always win.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Upload parameters read from disk; every field is optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub do_not_upload: Option<bool>,
    pub source: Option<PathBuf>,
    pub bucket_name: Option<String>,
    pub destination: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub recursive: Option<bool>,
    pub show_progress: Option<bool>,
    pub force_path_style: Option<bool>,
    pub concurrency: Option<usize>,
}

impl Settings {
    /// Load settings from an explicit path, or from the default location.
    ///
    /// A missing file at the default location yields defaults; a missing
    /// file that was asked for by name is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let path = match Self::settings_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!("No settings directory available: {:#}", e);
                return Ok(Self::default());
            }
        };

        if !path.exists() {
            tracing::debug!("Settings file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;

        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {:?}", path))?;

        tracing::debug!(
            "Loaded settings from {:?}: bucket={:?}, destination={:?}, profile={:?}",
            path,
            settings.bucket_name,
            settings.destination,
            settings.profile
        );

        Ok(settings)
    }

    /// Get the path to the default settings file
    pub fn settings_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "github.n-orlov", "s3-upload")
            .context("Failed to determine settings directory")?;

        Ok(proj_dirs.config_dir().join("settings.json"))
    }
}
