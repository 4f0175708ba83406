//! Incremental statistical pattern learner over annotation feedback.
//!
//! One running centroid/variance cluster is kept per (feature, optional
//! species) key. This is intentionally simplistic: a feature that genuinely
//! appears at different positions across images blurs into a single average.
//! Known limitation, not a defect.

pub mod persistence;
pub mod prompt;
pub mod quality;
pub mod rejection;
pub mod stats;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::PatternConfig;
use crate::types::{Annotation, BoundingBox};

use rejection::{KeywordClassifier, RejectionCategory, RejectionClassifier};
use stats::{BoxStat, RunningAverage};

/// Pattern identity: a feature type, optionally narrowed to one species.
/// Observations for a species also feed the species-agnostic key so quality
/// scoring has a fallback when no species is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternKey {
    pub feature: String,
    pub species: Option<String>,
}

impl PatternKey {
    pub fn of(feature: &str, species: Option<&str>) -> Self {
        Self {
            feature: feature.to_string(),
            species: species.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPattern {
    pub box_stat: BoxStat,
    pub confidence: RunningAverage,
    pub last_updated: DateTime<Utc>,
}

impl LearnedPattern {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            box_stat: BoxStat::default(),
            confidence: RunningAverage::default(),
            last_updated: now,
        }
    }

    pub fn average_confidence(&self) -> f64 {
        self.confidence.value
    }

    pub fn observation_count(&self) -> u64 {
        self.confidence.count
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxDelta {
    pub dx: f64,
    pub dy: f64,
    pub dw: f64,
    pub dh: f64,
}

impl BoxDelta {
    pub fn between(original: &BoundingBox, corrected: &BoundingBox) -> Self {
        Self {
            dx: corrected.x - original.x,
            dy: corrected.y - original.y,
            dw: corrected.width - original.width,
            dh: corrected.height - original.height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionCorrection {
    pub original: BoundingBox,
    pub corrected: BoundingBox,
    pub delta: BoxDelta,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionKey {
    pub feature: String,
    pub species: Option<String>,
    pub category: RejectionCategory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesStats {
    pub observations: u64,
    pub feature_counts: HashMap<String, u64>,
}

type PatternEntry = Arc<parking_lot::Mutex<LearnedPattern>>;

/// Thread-safe learner. Pattern entries sit behind per-key mutexes so two
/// writers on the same key never interleave while distinct keys update in
/// parallel; the outer map lock is only held to find or create an entry.
pub struct PatternLearner {
    config: PatternConfig,
    classifier: Box<dyn RejectionClassifier>,
    patterns: parking_lot::RwLock<HashMap<PatternKey, PatternEntry>>,
    corrections: parking_lot::Mutex<HashMap<PatternKey, VecDeque<PositionCorrection>>>,
    rejections: parking_lot::Mutex<HashMap<RejectionKey, u32>>,
    species: parking_lot::Mutex<HashMap<String, SpeciesStats>>,
}

impl PatternLearner {
    pub fn new(config: PatternConfig) -> Self {
        Self::with_classifier(config, Box::new(KeywordClassifier::default()))
    }

    pub fn with_classifier(config: PatternConfig, classifier: Box<dyn RejectionClassifier>) -> Self {
        Self {
            config,
            classifier,
            patterns: parking_lot::RwLock::new(HashMap::new()),
            corrections: parking_lot::Mutex::new(HashMap::new()),
            rejections: parking_lot::Mutex::new(HashMap::new()),
            species: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    fn entry(&self, key: PatternKey) -> PatternEntry {
        if let Some(entry) = self.patterns.read().get(&key) {
            return Arc::clone(entry);
        }
        let mut patterns = self.patterns.write();
        Arc::clone(
            patterns
                .entry(key)
                .or_insert_with(|| Arc::new(parking_lot::Mutex::new(LearnedPattern::empty(Utc::now())))),
        )
    }

    /// Applies `apply` to the (feature, species) pattern and, when a species
    /// is present, to the species-agnostic (feature, None) pattern as well.
    fn touch<F>(&self, feature: &str, species: Option<&str>, apply: F)
    where
        F: Fn(&mut LearnedPattern),
    {
        let specific = self.entry(PatternKey::of(feature, species));
        apply(&mut specific.lock());

        if species.is_some() {
            let generic = self.entry(PatternKey::of(feature, None));
            apply(&mut generic.lock());
        }
    }

    /// Feeds one generated annotation into the running statistics. Returns
    /// false (and changes nothing) when the annotation's confidence is below
    /// the observation threshold.
    pub fn observe(&self, annotation: &Annotation) -> bool {
        if annotation.confidence < self.config.min_observation_confidence {
            trace!(
                feature = %annotation.feature,
                confidence = annotation.confidence,
                "skipping low-confidence observation"
            );
            return false;
        }

        let now = Utc::now();
        self.touch(&annotation.feature, annotation.species.as_deref(), |pattern| {
            pattern.confidence.push(annotation.confidence);
            pattern.box_stat.observe(&annotation.bounding_box);
            pattern.last_updated = now;
        });

        if let Some(species) = annotation.species.as_deref() {
            let mut map = self.species.lock();
            let stats = map.entry(species.to_string()).or_default();
            stats.observations += 1;
            *stats
                .feature_counts
                .entry(annotation.feature.clone())
                .or_insert(0) += 1;
        }

        true
    }

    /// Human approval: small confidence boost plus one weighted pull of the
    /// box statistics toward the approved position.
    pub fn learn_from_approval(&self, annotation: &Annotation) {
        let now = Utc::now();
        let boost = self.config.approval_confidence_boost;
        let weight = self.config.approval_weight;
        self.touch(&annotation.feature, annotation.species.as_deref(), |pattern| {
            pattern.confidence.value = (pattern.confidence.value + boost).min(1.0);
            pattern.confidence.count += 1;
            pattern.box_stat.observe_weighted(&annotation.bounding_box, weight);
            pattern.last_updated = now;
        });
        debug!(feature = %annotation.feature, "approval learned");
    }

    /// Human rejection: confidence penalty (floored) and a categorized
    /// rejection counter increment. Returns the assigned category.
    pub fn learn_from_rejection(&self, annotation: &Annotation, reason: &str) -> RejectionCategory {
        let category = self.classifier.classify(reason);
        let now = Utc::now();
        let penalty = self.config.rejection_confidence_penalty;
        let floor = self.config.confidence_floor;
        self.touch(&annotation.feature, annotation.species.as_deref(), |pattern| {
            pattern.confidence.value = (pattern.confidence.value - penalty).max(floor);
            pattern.last_updated = now;
        });

        let key = RejectionKey {
            feature: annotation.feature.clone(),
            species: annotation.species.clone(),
            category,
        };
        *self.rejections.lock().entry(key).or_insert(0) += 1;

        debug!(feature = %annotation.feature, category = category.as_str(), "rejection learned");
        category
    }

    /// Human position correction: the delta goes into the bounded history and
    /// the box statistics get a strong weighted pull toward the corrected box.
    pub fn learn_from_correction(
        &self,
        feature: &str,
        species: Option<&str>,
        original: &BoundingBox,
        corrected: &BoundingBox,
    ) {
        let now = Utc::now();
        let correction = PositionCorrection {
            original: *original,
            corrected: *corrected,
            delta: BoxDelta::between(original, corrected),
            recorded_at: now,
        };

        {
            let mut map = self.corrections.lock();
            let history = map.entry(PatternKey::of(feature, species)).or_default();
            history.push_back(correction);
            while history.len() > self.config.correction_history_cap {
                history.pop_front();
            }
        }

        let weight = self.config.correction_weight;
        self.touch(feature, species, |pattern| {
            pattern.box_stat.observe_weighted(corrected, weight);
            pattern.last_updated = now;
        });
        debug!(feature, "correction learned");
    }

    /// Snapshot of one pattern, preferring the exact (feature, species) key
    /// and falling back to the species-agnostic one.
    pub fn pattern_for(&self, feature: &str, species: Option<&str>) -> Option<LearnedPattern> {
        let patterns = self.patterns.read();
        let exact = patterns
            .get(&PatternKey::of(feature, species))
            .map(|e| e.lock().clone());
        if exact.is_some() {
            return exact;
        }
        if species.is_some() {
            return patterns
                .get(&PatternKey::of(feature, None))
                .map(|e| e.lock().clone());
        }
        None
    }

    pub fn corrections_for(&self, feature: &str, species: Option<&str>) -> Vec<PositionCorrection> {
        self.corrections
            .lock()
            .get(&PatternKey::of(feature, species))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rejection_count(&self, feature: &str, species: Option<&str>, category: RejectionCategory) -> u32 {
        let key = RejectionKey {
            feature: feature.to_string(),
            species: species.map(str::to_string),
            category,
        };
        self.rejections.lock().get(&key).copied().unwrap_or(0)
    }

    pub fn species_stats(&self, species: &str) -> Option<SpeciesStats> {
        self.species.lock().get(species).cloned()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().len()
    }
}
