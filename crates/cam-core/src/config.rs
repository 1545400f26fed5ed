//! Shared, hot-swappable configuration.

use std::sync::{Arc, RwLock};

use cam_types::config::MemoryConfig;
use cam_types::error::ConfigError;

/// Cloneable handle to the live [`MemoryConfig`].
///
/// Each decision takes one snapshot via [`ConfigHandle::current`] and uses it
/// for the whole operation, so a reload never mixes old and new values
/// within a single decision. Only validated configs are ever installed.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<MemoryConfig>>>,
}

impl ConfigHandle {
    /// Validate and wrap a config.
    pub fn new(config: MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Snapshot of the active config.
    pub fn current(&self) -> Arc<MemoryConfig> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Install a new config. An invalid one is rejected and the active
    /// config stays in place.
    pub fn replace(&self, config: MemoryConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
        tracing::info!("Memory config reloaded");
        Ok(())
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(MemoryConfig::default()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid() {
        let mut config = MemoryConfig::default();
        config.retrieval.top_k = 0;
        assert!(ConfigHandle::new(config).is_err());
    }

    #[test]
    fn test_replace_is_visible_to_clones() {
        let handle = ConfigHandle::default();
        let clone = handle.clone();
        let before = handle.current();

        let mut next = MemoryConfig::default();
        next.retrieval.max_distance = 0.5;
        handle.replace(next).unwrap();

        assert!((clone.current().retrieval.max_distance - 0.5).abs() < f32::EPSILON);
        // Snapshots taken earlier are unaffected.
        assert!((before.retrieval.max_distance - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_replace_keeps_previous() {
        let handle = ConfigHandle::default();
        let mut bad = MemoryConfig::default();
        bad.context_decider.continuity_base = f32::INFINITY;
        assert!(handle.replace(bad).is_err());
        assert_eq!(*handle.current(), MemoryConfig::default());
    }
}
