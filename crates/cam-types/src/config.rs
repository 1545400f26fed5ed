//! Configuration types for the memory gating pipeline.
//!
//! `MemoryConfig` represents `config.toml`. A file must name the core
//! thresholds (`retrieval.max_distance`, the continuity base and std
//! factor, and the three usefulness-filter keys); the tuning knobs around
//! them fall back to defaults. Unknown keys are rejected so a misspelled
//! threshold never silently becomes its default. Values are checked by
//! [`MemoryConfig::validate`] before a config is allowed to go live.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    pub retrieval: RetrievalConfig,
    pub context_decider: ContextDeciderConfig,
    pub usefulness_filter: UsefulnessFilterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Distance thresholds for the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Base distance threshold for global-mode retrieval.
    pub max_distance: f32,
    /// Base distance threshold for continuity-mode retrieval (stricter).
    #[serde(default = "default_continuity_max_distance")]
    pub continuity_max_distance: f32,
    /// Added to the mean candidate distance when relaxing.
    #[serde(default = "default_relax_margin")]
    pub relax_margin: f32,
    /// Upper bound on a relaxed threshold.
    #[serde(default = "default_relax_cap")]
    pub relax_cap: f32,
    /// Candidates requested from the store per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_max_distance() -> f32 {
    0.6
}

fn default_continuity_max_distance() -> f32 {
    0.45
}

fn default_relax_margin() -> f32 {
    0.1
}

fn default_relax_cap() -> f32 {
    0.8
}

fn default_top_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            continuity_max_distance: default_continuity_max_distance(),
            relax_margin: default_relax_margin(),
            relax_cap: default_relax_cap(),
            top_k: default_top_k(),
        }
    }
}

/// Parameters of the topic-continuity statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextDeciderConfig {
    /// Floor for the dynamic similarity threshold.
    pub continuity_base: f32,
    /// Weight of the standard deviation subtracted from the mean.
    pub continuity_std_factor: f32,
    /// How many recent records form the continuity sample.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_continuity_base() -> f32 {
    0.45
}

fn default_continuity_std_factor() -> f32 {
    0.15
}

fn default_window() -> usize {
    3
}

impl Default for ContextDeciderConfig {
    fn default() -> Self {
        Self {
            continuity_base: default_continuity_base(),
            continuity_std_factor: default_continuity_std_factor(),
            window: default_window(),
        }
    }
}

/// Rules of the write gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsefulnessFilterConfig {
    pub min_word_count: usize,
    pub min_char_count: usize,
    /// Phrases that disqualify a prompt, checked in order.
    pub blacklist_phrases: Vec<String>,
}

fn default_min_word_count() -> usize {
    3
}

fn default_min_char_count() -> usize {
    15
}

fn default_blacklist_phrases() -> Vec<String> {
    [
        "what did i say",
        "when did i tell you",
        "do you remember",
        "remember that",
        "ok",
        "okay",
        "thanks",
        "thank you",
        "hmm",
        "yes",
        "no",
        "haha",
        "lol",
        "idk",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for UsefulnessFilterConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            min_char_count: default_min_char_count(),
            blacklist_phrases: default_blacklist_phrases(),
        }
    }
}

/// Limits applied to the external calls a pipeline turn makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Timeout for each embedding, judge, or completion call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Reject a threshold that is not a finite number inside `[min, max]`.
fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must be within [{min}, {max}], got {value}"),
        });
    }
    Ok(())
}

impl MemoryConfig {
    /// Check every threshold and count.
    ///
    /// A config that fails here must never be used: at startup the error is
    /// fatal, and on hot reload the previous config stays active.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        // Cosine distance lives in [0, 2].
        check_range("retrieval.max_distance", r.max_distance, 0.0, 2.0)?;
        check_range(
            "retrieval.continuity_max_distance",
            r.continuity_max_distance,
            0.0,
            2.0,
        )?;
        check_range("retrieval.relax_margin", r.relax_margin, 0.0, 2.0)?;
        check_range("retrieval.relax_cap", r.relax_cap, 0.0, 2.0)?;
        if r.continuity_max_distance > r.max_distance {
            return Err(ConfigError::Invalid {
                field: "retrieval.continuity_max_distance",
                reason: format!(
                    "must not be looser than retrieval.max_distance ({})",
                    r.max_distance
                ),
            });
        }
        if r.relax_cap < r.max_distance {
            return Err(ConfigError::Invalid {
                field: "retrieval.relax_cap",
                reason: format!("must be at least retrieval.max_distance ({})", r.max_distance),
            });
        }
        if r.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.top_k",
                reason: "must be at least 1".to_string(),
            });
        }

        let c = &self.context_decider;
        // Cosine similarity lives in [-1, 1].
        check_range("context_decider.continuity_base", c.continuity_base, -1.0, 1.0)?;
        check_range(
            "context_decider.continuity_std_factor",
            c.continuity_std_factor,
            0.0,
            10.0,
        )?;
        if c.window == 0 {
            return Err(ConfigError::Invalid {
                field: "context_decider.window",
                reason: "must be at least 1".to_string(),
            });
        }

        let u = &self.usefulness_filter;
        if u.blacklist_phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "usefulness_filter.blacklist_phrases",
                reason: "phrases must not be empty".to_string(),
            });
        }

        if self.pipeline.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.call_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = MemoryConfig::default();
        assert!((config.retrieval.max_distance - 0.6).abs() < f32::EPSILON);
        assert!((config.context_decider.continuity_base - 0.45).abs() < f32::EPSILON);
        assert!((config.context_decider.continuity_std_factor - 0.15).abs() < f32::EPSILON);
        assert_eq!(config.usefulness_filter.min_word_count, 3);
        assert_eq!(config.usefulness_filter.min_char_count, 15);
        assert_eq!(config.usefulness_filter.blacklist_phrases.len(), 14);
        assert_eq!(config.pipeline.call_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    const CORE_KEYS: &str = r#"
[retrieval]
max_distance = 0.7

[context_decider]
continuity_base = 0.45
continuity_std_factor = 0.15

[usefulness_filter]
min_word_count = 3
min_char_count = 15
blacklist_phrases = ["lol"]
"#;

    #[test]
    fn test_core_keys_with_tuning_defaults() {
        let config: MemoryConfig = toml::from_str(CORE_KEYS).unwrap();
        assert!((config.retrieval.max_distance - 0.7).abs() < f32::EPSILON);
        assert!((config.retrieval.continuity_max_distance - 0.45).abs() < f32::EPSILON);
        assert_eq!(config.context_decider.window, 3);
        assert_eq!(config.usefulness_filter.blacklist_phrases, vec!["lol"]);
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_misspelled_key_is_rejected() {
        let text = CORE_KEYS.replace("max_distance = 0.7", "max_distance = 0.7\nmax_distanse = 0.3");
        let err = toml::from_str::<MemoryConfig>(&text).unwrap_err();
        assert!(err.to_string().contains("max_distanse"));

        let text = format!("{CORE_KEYS}\n[pipline]\ncall_timeout_ms = 5\n");
        assert!(toml::from_str::<MemoryConfig>(&text).is_err());
    }

    #[test]
    fn test_missing_threshold_is_rejected() {
        let err = toml::from_str::<MemoryConfig>("[retrieval]\nmax_distanse = 0.3\n").unwrap_err();
        assert!(err.to_string().contains("max_distanse"));

        let empty_section = CORE_KEYS.replace(
            "continuity_base = 0.45\ncontinuity_std_factor = 0.15\n",
            "",
        );
        let without_base = CORE_KEYS.replace("continuity_base = 0.45\n", "");
        for text in [empty_section, without_base] {
            let err = toml::from_str::<MemoryConfig>(&text).unwrap_err();
            assert!(err.to_string().contains("continuity_base"), "{err}");
        }

        assert!(toml::from_str::<MemoryConfig>("").is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = MemoryConfig::default();
        config.retrieval.max_distance = f32::NAN;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retrieval.max_distance"));
    }

    #[test]
    fn test_validate_rejects_loose_continuity_threshold() {
        let mut config = MemoryConfig::default();
        config.retrieval.continuity_max_distance = 0.9;
        config.retrieval.relax_cap = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = MemoryConfig::default();
        config.context_decider.window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_blacklist_phrase() {
        let mut config = MemoryConfig::default();
        config.usefulness_filter.blacklist_phrases.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = MemoryConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: MemoryConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
