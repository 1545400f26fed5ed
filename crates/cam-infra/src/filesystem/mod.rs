//! Data directory layout for CAM.
//!
//! ```text
//! {data_dir}/
//!   config.toml     gating thresholds (hot-reloaded)
//!   vector_store/   LanceDB tables
//!   models/         fastembed model cache
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CAM_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CAM_DATA_DIR` environment variable
/// 2. `~/.cam`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".cam");
    }

    // Last resort: current directory
    PathBuf::from(".cam")
}

/// `{data_dir}/config.toml`
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// `{data_dir}/vector_store`
pub fn vector_store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vector_store")
}

/// `{data_dir}/models`
pub fn model_cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let data_dir = PathBuf::from("/home/user/.cam");
        assert_eq!(
            config_path(&data_dir),
            PathBuf::from("/home/user/.cam/config.toml")
        );
        assert_eq!(
            vector_store_path(&data_dir),
            PathBuf::from("/home/user/.cam/vector_store")
        );
        assert_eq!(
            model_cache_path(&data_dir),
            PathBuf::from("/home/user/.cam/models")
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This is the only test touching CAM_DATA_DIR and it restores it immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-cam");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-cam"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
