//! Locating, layering and persisting config files.
//!
//! Two layers are read, lowest precedence first:
//! 1. the user layer, `config.toml` in the user config directory
//!    (`$LSC_CONFIG_DIR`, else `~/.config/lsc` on Linux)
//! 2. the project layer, `lsc.toml` in the working directory
//!
//! Command-line flags are applied on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ConfigError, LscConfig, Result};

const PROJECT_CONFIG_FILE: &str = "lsc.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "LSC_CONFIG_DIR";

/// A config layer, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigLayer {
    User,
    Project,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLayer::User => f.write_str("user"),
            ConfigLayer::Project => f.write_str("project"),
        }
    }
}

/// Outcome of reading one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// No file at the layer's path.
    Missing,
    /// Parsed and merged.
    Loaded,
    /// Present but unreadable or invalid; skipped.
    Rejected(String),
}

/// One layer's file and what happened when it was read.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    pub status: LayerStatus,
}

impl ConfigSource {
    pub fn is_loaded(&self) -> bool {
        self.status == LayerStatus::Loaded
    }
}

/// File locations of the config layers for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// User layer; `None` when no config directory can be determined.
    pub user: Option<PathBuf>,
    pub project: PathBuf,
}

impl ConfigPaths {
    /// Resolve layer paths.
    ///
    /// `config_dir` takes precedence over `LSC_CONFIG_DIR` and the platform
    /// default. `project_dir` defaults to the working directory.
    pub fn resolve(project_dir: Option<&Path>, config_dir: Option<&Path>) -> Self {
        let user = match config_dir {
            Some(dir) => Some(dir.to_path_buf()),
            None => user_config_dir(),
        }
        .map(|dir| dir.join(USER_CONFIG_FILE));
        let project = project_dir
            .map(|dir| dir.join(PROJECT_CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
        Self { user, project }
    }

    /// Read every layer and merge them, skipping files that fail to load.
    pub fn load(&self) -> LoadedConfig {
        let mut config = LscConfig::new();
        let mut sources = Vec::with_capacity(2);

        let layers = self
            .user
            .as_deref()
            .map(|path| (ConfigLayer::User, path))
            .into_iter()
            .chain([(ConfigLayer::Project, self.project.as_path())]);

        for (layer, path) in layers {
            let status = if !path.is_file() {
                LayerStatus::Missing
            } else {
                match read_config_file(path) {
                    Ok(parsed) => {
                        config.merge(parsed);
                        LayerStatus::Loaded
                    }
                    Err(e) => LayerStatus::Rejected(e.to_string()),
                }
            };
            sources.push(ConfigSource {
                layer,
                path: path.to_path_buf(),
                status,
            });
        }

        LoadedConfig {
            config,
            paths: self.clone(),
            sources,
        }
    }
}

/// Merged configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LscConfig,
    pub paths: ConfigPaths,
    /// Every layer that was considered, lowest precedence first.
    pub sources: Vec<ConfigSource>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed to the merged config.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|source| source.is_loaded())
            .map(|source| source.path.as_path())
            .collect()
    }

    /// One message per layer that exists but was skipped.
    pub fn warnings(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|source| match &source.status {
                LayerStatus::Rejected(reason) => Some(format!(
                    "Ignoring {} config {}: {}",
                    source.layer,
                    source.path.display(),
                    reason
                )),
                _ => None,
            })
            .collect()
    }
}

/// Parse and validate a single config file.
pub fn read_config_file(path: &Path) -> Result<LscConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    LscConfig::from_toml(&text)
}

/// Write `config` to `path` as TOML, creating missing parent directories.
pub fn write_config_file(config: &LscConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path, source| ConfigError::WriteFile {
        path: at.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_error(path, e))
}

/// The user config directory: `$LSC_CONFIG_DIR` when set and non-empty,
/// else `lsc` under the platform config directory.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|dir| dir.join("lsc")),
    }
}
