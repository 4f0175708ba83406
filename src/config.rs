use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Target share of the requested count filled from due-for-review items.
    pub due_share: f64,
    /// Target share filled from weak items (mastery below `weak_threshold`).
    pub weak_share: f64,
    /// Target share filled from unseen items when new items are requested.
    pub new_share: f64,
    pub weak_threshold: f64,
    /// A candidate source slower than this degrades to an empty contribution.
    pub source_timeout_ms: u64,
    pub due_priority: u8,
    pub weak_priority: u8,
    pub new_priority: u8,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            due_share: 0.4,
            weak_share: 0.4,
            new_share: 0.2,
            weak_threshold: 70.0,
            source_timeout_ms: 250,
            due_priority: 10,
            weak_priority: 8,
            new_priority: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Observations below this confidence are ignored entirely.
    pub min_observation_confidence: f64,
    pub approval_confidence_boost: f64,
    pub rejection_confidence_penalty: f64,
    /// Rejections never push average confidence below this floor.
    pub confidence_floor: f64,
    /// Sample weight of one human approval in the box statistics.
    pub approval_weight: u32,
    /// Sample weight of one human position correction.
    pub correction_weight: u32,
    pub correction_history_cap: usize,
    /// Below this many samples, quality scoring returns fixed defaults.
    pub min_samples: u64,
    pub min_species_observations: u64,
    pub min_correction_samples: usize,
    pub min_rejection_occurrences: u32,
    /// Added to variances before normalizing distances, so a single-sample
    /// pattern never divides by zero.
    pub distance_epsilon: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_observation_confidence: 0.75,
            approval_confidence_boost: 0.05,
            rejection_confidence_penalty: 0.10,
            confidence_floor: 0.3,
            approval_weight: 2,
            correction_weight: 3,
            correction_history_cap: 50,
            min_samples: 3,
            min_species_observations: 3,
            min_correction_samples: 3,
            min_rejection_occurrences: 2,
            distance_epsilon: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub recommend: RecommendConfig,
    pub patterns: PatternConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_f64("ENGINE_WEAK_THRESHOLD") {
            config.recommend.weak_threshold = value.clamp(0.0, 100.0);
        }
        if let Some(value) = env_u64("ENGINE_SOURCE_TIMEOUT_MS") {
            config.recommend.source_timeout_ms = value;
        }
        if let Some(value) = env_f64("ENGINE_MIN_OBSERVATION_CONFIDENCE") {
            config.patterns.min_observation_confidence = value.clamp(0.0, 1.0);
        }

        config
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse::<f64>().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}
