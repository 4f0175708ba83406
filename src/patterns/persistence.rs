//! Versioned JSON snapshots of learned state, saved through the key-value
//! collaborator. Save and load are best effort: failures are logged and the
//! in-memory state stays authoritative.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    LearnedPattern, PatternKey, PatternLearner, PositionCorrection, RejectionKey, SpeciesStats,
};
use crate::storage::KeyValueStore;

pub const SNAPSHOT_KEY: &str = "patterns:snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub key: PatternKey,
    pub pattern: LearnedPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRecord {
    pub key: PatternKey,
    pub history: Vec<PositionCorrection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub key: RejectionKey,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesRecord {
    pub name: String,
    pub stats: SpeciesStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub patterns: Vec<PatternRecord>,
    pub corrections: Vec<CorrectionRecord>,
    pub rejections: Vec<RejectionRecord>,
    pub species: Vec<SpeciesRecord>,
}

impl PatternLearner {
    /// Point-in-time copy of all learned maps, sorted by key so equal states
    /// serialize identically.
    pub fn snapshot(&self) -> PatternSnapshot {
        let mut patterns: Vec<PatternRecord> = self
            .patterns
            .read()
            .iter()
            .map(|(key, entry)| PatternRecord {
                key: key.clone(),
                pattern: entry.lock().clone(),
            })
            .collect();
        patterns.sort_by(|a, b| {
            (&a.key.feature, &a.key.species).cmp(&(&b.key.feature, &b.key.species))
        });

        let mut corrections: Vec<CorrectionRecord> = self
            .corrections
            .lock()
            .iter()
            .map(|(key, history)| CorrectionRecord {
                key: key.clone(),
                history: history.iter().cloned().collect(),
            })
            .collect();
        corrections.sort_by(|a, b| {
            (&a.key.feature, &a.key.species).cmp(&(&b.key.feature, &b.key.species))
        });

        let mut rejections: Vec<RejectionRecord> = self
            .rejections
            .lock()
            .iter()
            .map(|(key, count)| RejectionRecord {
                key: key.clone(),
                count: *count,
            })
            .collect();
        rejections.sort_by(|a, b| {
            (&a.key.feature, &a.key.species, a.key.category.as_str())
                .cmp(&(&b.key.feature, &b.key.species, b.key.category.as_str()))
        });

        let mut species: Vec<SpeciesRecord> = self
            .species
            .lock()
            .iter()
            .map(|(name, stats)| SpeciesRecord {
                name: name.clone(),
                stats: stats.clone(),
            })
            .collect();
        species.sort_by(|a, b| a.name.cmp(&b.name));

        PatternSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            patterns,
            corrections,
            rejections,
            species,
        }
    }

    /// Replaces all learned maps with the snapshot's content.
    pub fn restore(&self, snapshot: PatternSnapshot) {
        let patterns: HashMap<_, _> = snapshot
            .patterns
            .into_iter()
            .map(|record| {
                (
                    record.key,
                    Arc::new(parking_lot::Mutex::new(record.pattern)),
                )
            })
            .collect();
        *self.patterns.write() = patterns;

        let corrections: HashMap<PatternKey, VecDeque<PositionCorrection>> = snapshot
            .corrections
            .into_iter()
            .map(|record| (record.key, record.history.into_iter().collect()))
            .collect();
        *self.corrections.lock() = corrections;

        let rejections: HashMap<RejectionKey, u32> = snapshot
            .rejections
            .into_iter()
            .map(|record| (record.key, record.count))
            .collect();
        *self.rejections.lock() = rejections;

        let species: HashMap<String, SpeciesStats> = snapshot
            .species
            .into_iter()
            .map(|record| (record.name, record.stats))
            .collect();
        *self.species.lock() = species;
    }
}

/// Serializes the learner's state into the store. Never fails the caller;
/// returns whether the save went through.
pub async fn save_patterns<K: KeyValueStore>(store: &K, learner: &PatternLearner) -> bool {
    let snapshot = learner.snapshot();
    let bytes = match serde_json::to_vec(&snapshot) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to serialize pattern snapshot");
            return false;
        }
    };

    match store.put(SNAPSHOT_KEY, &bytes).await {
        Ok(()) => {
            info!(
                patterns = snapshot.patterns.len(),
                bytes = bytes.len(),
                "pattern snapshot saved"
            );
            true
        }
        Err(err) => {
            warn!(error = %err, "failed to save pattern snapshot, keeping in-memory state");
            false
        }
    }
}

/// Loads the latest snapshot into the learner, if one exists and its version
/// is understood. Returns whether anything was restored.
pub async fn load_patterns<K: KeyValueStore>(store: &K, learner: &PatternLearner) -> bool {
    let bytes = match store.get(SNAPSHOT_KEY).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return false,
        Err(err) => {
            warn!(error = %err, "failed to read pattern snapshot, starting fresh");
            return false;
        }
    };

    let snapshot: PatternSnapshot = match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "failed to parse pattern snapshot, starting fresh");
            return false;
        }
    };

    if snapshot.version != SNAPSHOT_VERSION {
        warn!(
            found = snapshot.version,
            expected = SNAPSHOT_VERSION,
            "unknown snapshot version, starting fresh"
        );
        return false;
    }

    info!(patterns = snapshot.patterns.len(), "pattern snapshot restored");
    learner.restore(snapshot);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use crate::storage::MemoryKvStore;
    use crate::types::{Annotation, BoundingBox};

    fn annotation() -> Annotation {
        Annotation {
            feature: "eye".to_string(),
            species: Some("robin".to_string()),
            bounding_box: BoundingBox::new(0.4, 0.3, 0.1, 0.08),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_learned_state() {
        let store = MemoryKvStore::new();
        let learner = PatternLearner::new(PatternConfig::default());
        for _ in 0..4 {
            learner.observe(&annotation());
        }
        learner.learn_from_rejection(&annotation(), "too large");

        assert!(save_patterns(&store, &learner).await);

        let restored = PatternLearner::new(PatternConfig::default());
        assert!(load_patterns(&store, &restored).await);

        let pattern = restored.pattern_for("eye", Some("robin")).unwrap();
        assert_eq!(pattern.observation_count(), 4);
        assert!((pattern.box_stat.center_x.mean - 0.45).abs() < 1e-9);
        assert_eq!(
            restored.rejection_count(
                "eye",
                Some("robin"),
                crate::patterns::rejection::RejectionCategory::WrongSize
            ),
            1
        );
        assert_eq!(restored.species_stats("robin").unwrap().observations, 4);
    }

    #[tokio::test]
    async fn missing_snapshot_loads_nothing() {
        let store = MemoryKvStore::new();
        let learner = PatternLearner::new(PatternConfig::default());
        assert!(!load_patterns(&store, &learner).await);
        assert_eq!(learner.pattern_count(), 0);
    }

    #[tokio::test]
    async fn unknown_version_is_ignored() {
        let store = MemoryKvStore::new();
        let learner = PatternLearner::new(PatternConfig::default());
        learner.observe(&annotation());

        let mut snapshot = learner.snapshot();
        snapshot.version = 99;
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        store.put(SNAPSHOT_KEY, &bytes).await.unwrap();

        let fresh = PatternLearner::new(PatternConfig::default());
        assert!(!load_patterns(&store, &fresh).await);
        assert_eq!(fresh.pattern_count(), 0);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_ignored() {
        let store = MemoryKvStore::new();
        store.put(SNAPSHOT_KEY, b"not json").await.unwrap();

        let learner = PatternLearner::new(PatternConfig::default());
        assert!(!load_patterns(&store, &learner).await);
    }
}
