//! AWS credential selection and profile lookup
//!
//! Credentials come from exactly one of three sources, in precedence order:
//! - Explicit access key / secret key pair
//! - A named profile from ~/.aws/config and ~/.aws/credentials
//! - The SDK default chain (environment, shared config, instance/container metadata)
//!
//! The profile files are also parsed here, but only to produce diagnostics;
//! the SDK does the actual credential resolution.

use anyhow::{Context, Result};
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use directories::BaseDirs;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the credentials for an invocation come from
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSpec {
    /// Static key pair supplied by the caller
    ExplicitKeys {
        access_key: String,
        secret_key: String,
    },
    /// Profile resolved by name from the shared profile files
    NamedProfile(String),
    /// SDK default provider chain
    Default,
}

impl CredentialSpec {
    /// Pick the active source from the optional inputs.
    ///
    /// Explicit keys win only when both halves are present; a lone access key
    /// or secret key is ignored and resolution falls through.
    pub fn from_parts(
        access_key: Option<&str>,
        secret_key: Option<&str>,
        profile: Option<&str>,
    ) -> Self {
        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => {
                return CredentialSpec::ExplicitKeys {
                    access_key: access_key.to_string(),
                    secret_key: secret_key.to_string(),
                };
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Only one of access key / secret key was supplied; ignoring explicit credentials"
                );
            }
            (None, None) => {}
        }

        match profile {
            Some(name) => CredentialSpec::NamedProfile(name.to_string()),
            None => CredentialSpec::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSpec::ExplicitKeys { .. } => "Explicit Keys",
            CredentialSpec::NamedProfile(_) => "Named Profile",
            CredentialSpec::Default => "Default Chain",
        }
    }
}

impl fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSpec::ExplicitKeys { access_key, .. } => f
                .debug_struct("ExplicitKeys")
                .field("access_key", access_key)
                .field("secret_key", &"** redacted **")
                .finish(),
            CredentialSpec::NamedProfile(name) => {
                f.debug_tuple("NamedProfile").field(name).finish()
            }
            CredentialSpec::Default => f.write_str("Default"),
        }
    }
}

/// What the profile files say about a single profile
#[derive(Debug, Clone, Default)]
pub struct ProfileEntry {
    pub name: String,
    pub region: Option<String>,
    pub has_static_credentials: bool,
}

/// Index of the profiles in the shared config and credentials files
pub struct ProfileStore {
    config_path: PathBuf,
    credentials_path: PathBuf,
    explicit_files: bool,
    profiles: HashMap<String, ProfileEntry>,
}

impl ProfileStore {
    /// Load profiles from the locations the SDK would use
    pub fn new() -> Result<Self> {
        let config_path = std::env::var_os("AWS_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::aws_config_dir().join("config"));
        let credentials_path = std::env::var_os("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::aws_config_dir().join("credentials"));

        let mut store = Self {
            config_path,
            credentials_path,
            explicit_files: false,
            profiles: HashMap::new(),
        };
        store.load_profiles()?;
        Ok(store)
    }

    /// Load profiles from specific files.
    ///
    /// Credentials for a named profile are then resolved from exactly these
    /// files instead of the ambient ones.
    pub fn with_files(config_path: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            config_path: config_path.into(),
            credentials_path: credentials_path.into(),
            explicit_files: true,
            profiles: HashMap::new(),
        };
        store.load_profiles()?;
        Ok(store)
    }

    /// Get the AWS config directory path
    fn aws_config_dir() -> PathBuf {
        BaseDirs::new()
            .map(|b| b.home_dir().join(".aws"))
            .unwrap_or_else(|| PathBuf::from(".aws"))
    }

    /// Load profiles from AWS config files
    pub fn load_profiles(&mut self) -> Result<()> {
        self.profiles.clear();

        if self.credentials_path.exists() {
            let path = self.credentials_path.clone();
            self.parse_credentials_file(&path)
                .context("Failed to parse AWS credentials file")?;
        }

        if self.config_path.exists() {
            let path = self.config_path.clone();
            self.parse_config_file(&path)
                .context("Failed to parse AWS config file")?;
        }

        tracing::debug!(
            "Found {} AWS profiles in {:?} and {:?}",
            self.profiles.len(),
            self.config_path,
            self.credentials_path
        );

        Ok(())
    }

    /// Parse the AWS config file
    fn parse_config_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let mut current_profile: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section = line[1..line.len() - 1].trim();
                // sso-session and services sections are not profiles
                current_profile = if section == "default" {
                    Some("default".to_string())
                } else {
                    section
                        .strip_prefix("profile ")
                        .map(|name| name.trim().to_string())
                };

                if let Some(ref name) = current_profile {
                    self.entry(name);
                }
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                if key.trim() != "region" {
                    continue;
                }
                if let Some(ref name) = current_profile {
                    self.entry(name).region = Some(value.trim().to_string());
                }
            }
        }

        Ok(())
    }

    /// Parse the AWS credentials file
    fn parse_credentials_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let mut current_profile: Option<String> = None;
        let mut has_access_key = false;
        let mut has_secret_key = false;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                if let Some(ref name) = current_profile {
                    self.entry(name).has_static_credentials = has_access_key && has_secret_key;
                }

                let name = line[1..line.len() - 1].trim().to_string();
                self.entry(&name);
                current_profile = Some(name);
                has_access_key = false;
                has_secret_key = false;
            } else if let Some((key, _value)) = line.split_once('=') {
                match key.trim() {
                    "aws_access_key_id" => has_access_key = true,
                    "aws_secret_access_key" => has_secret_key = true,
                    _ => {}
                }
            }
        }

        if let Some(ref name) = current_profile {
            self.entry(name).has_static_credentials = has_access_key && has_secret_key;
        }

        Ok(())
    }

    fn entry(&mut self, name: &str) -> &mut ProfileEntry {
        self.profiles
            .entry(name.to_string())
            .or_insert_with(|| ProfileEntry {
                name: name.to_string(),
                ..Default::default()
            })
    }

    /// Get all profile names, "default" first
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.profiles.keys().cloned().collect();
        names.sort();
        if let Some(pos) = names.iter().position(|n| n == "default") {
            names.remove(pos);
            names.insert(0, "default".to_string());
        }
        names
    }

    /// Get a profile by name
    pub fn get_profile(&self, name: &str) -> Option<&ProfileEntry> {
        self.profiles.get(name)
    }

    /// Profile files to hand to the SDK, when this store was built from explicit paths
    pub fn profile_files(&self) -> Option<EnvConfigFiles> {
        if !self.explicit_files {
            return None;
        }

        Some(
            EnvConfigFiles::builder()
                .with_file(EnvConfigFileKind::Config, &self.config_path)
                .with_file(EnvConfigFileKind::Credentials, &self.credentials_path)
                .build(),
        )
    }

    /// Log what is known about a profile before the SDK resolves it
    pub fn check_profile(&self, name: &str) {
        match self.get_profile(name) {
            Some(profile) if profile.has_static_credentials => {
                tracing::debug!(
                    "Profile '{}' has static credentials (profile region: {:?})",
                    name,
                    profile.region
                );
            }
            Some(_) => {
                tracing::debug!(
                    "Profile '{}' has no static credentials; the SDK will resolve its source",
                    name
                );
            }
            None => {
                tracing::warn!(
                    "Profile '{}' not found (known profiles: {})",
                    name,
                    self.profile_names().join(", ")
                );
            }
        }
    }
}
