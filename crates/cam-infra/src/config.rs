//! `config.toml` loading and hot reload.
//!
//! Startup is strict: a file that cannot be read, parsed or validated is an
//! error. A missing file is not; the defaults are written out so there is
//! something to edit. After startup, [`watch_config`] re-reads the file on
//! change and swaps it into a [`ConfigHandle`]. A bad edit is logged and the
//! previous config stays active.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};

use cam_core::config::ConfigHandle;
use cam_types::config::MemoryConfig;
use cam_types::error::ConfigError;

/// Debounce window for config file events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Parse and validate TOML config text.
pub fn parse_memory_config(content: &str) -> Result<MemoryConfig, ConfigError> {
    let config: MemoryConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Load the memory config from `path`.
///
/// - Missing file: writes [`MemoryConfig::default()`] to `path` and returns it.
/// - Unreadable, unparsable or invalid file: returns the error.
pub async fn load_memory_config(path: &Path) -> Result<MemoryConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let config = MemoryConfig::default();
            match write_default_config(path, &config).await {
                Ok(()) => tracing::info!("Wrote default config to {}", path.display()),
                Err(err) => tracing::warn!("Could not write default config: {err}"),
            }
            return Ok(config);
        }
        Err(err) => return Err(io_error(path, err)),
    };

    let config = parse_memory_config(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

async fn write_default_config(path: &Path, config: &MemoryConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }
    let text = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
    tokio::fs::write(path, text)
        .await
        .map_err(|e| io_error(path, e))
}

/// Re-read `path` and install it into `handle`.
///
/// On any error the handle keeps its current config.
pub fn reload_config(path: &Path, handle: &ConfigHandle) -> Result<(), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let config = parse_memory_config(&content)?;
    handle.replace(config)
}

/// Errors that can occur while starting the config watcher.
#[derive(Debug, thiserror::Error)]
pub enum ConfigWatchError {
    #[error("watcher creation failed: {0}")]
    WatcherCreation(String),

    #[error("failed to watch path '{path}': {reason}")]
    WatchPath { path: String, reason: String },

    #[error("config path '{0}' has no file name")]
    NoFileName(String),
}

/// Keeps the config watcher alive. Dropping it stops hot reload.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "config watcher dropped");
    }
}

/// Watch `path` and reload it into `handle` whenever it changes.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by replacing the file are still picked up.
pub fn watch_config(
    path: &Path,
    handle: ConfigHandle,
    debounce: Duration,
) -> Result<ConfigWatcher, ConfigWatchError> {
    let file_name: OsString = path
        .file_name()
        .ok_or_else(|| ConfigWatchError::NoFileName(path.display().to_string()))?
        .to_os_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let target = path.to_path_buf();
    let reload_path = target.clone();

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let touched = events
                .iter()
                .any(|e| e.path.file_name() == Some(file_name.as_os_str()));
            if !touched {
                return;
            }
            if let Err(err) = reload_config(&reload_path, &handle) {
                tracing::warn!(
                    path = %reload_path.display(),
                    error = %err,
                    "Config reload rejected, keeping previous config"
                );
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "config watcher error");
        }
    })
    .map_err(|e| ConfigWatchError::WatcherCreation(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| ConfigWatchError::WatchPath {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(path = %target.display(), "config watcher started");

    Ok(ConfigWatcher {
        _debouncer: debouncer,
        path: target,
    })
}
