//! Facade wiring the scheduler, recommendation blender, and pattern learner
//! together behind the caller-facing API. Collaborators are injected at
//! construction; there is no global state.

use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::mastery::{MasteryStore, ReviewService, ReviewState, StoreError};
use crate::patterns::persistence::{load_patterns, save_patterns};
use crate::patterns::rejection::{RejectionCategory, RejectionClassifier};
use crate::patterns::PatternLearner;
use crate::recommend::RecommendationBlender;
use crate::storage::{KeyValueStore, MemoryKvStore};
use crate::types::{
    Annotation, BoundingBox, EnhanceContext, QualityMetrics, Recommendation, RecommendOptions,
};

pub struct LearningEngine<S: MasteryStore, K: KeyValueStore = MemoryKvStore> {
    reviews: ReviewService<S>,
    recommender: RecommendationBlender<S>,
    patterns: PatternLearner,
    snapshot_store: Option<Arc<K>>,
}

impl<S: MasteryStore, K: KeyValueStore> LearningEngine<S, K> {
    pub fn new(config: EngineConfig, store: Arc<S>, snapshot_store: Option<Arc<K>>) -> Self {
        Self {
            reviews: ReviewService::new(Arc::clone(&store)),
            recommender: RecommendationBlender::new(store, config.recommend),
            patterns: PatternLearner::new(config.patterns),
            snapshot_store,
        }
    }

    pub fn with_classifier(
        config: EngineConfig,
        store: Arc<S>,
        snapshot_store: Option<Arc<K>>,
        classifier: Box<dyn RejectionClassifier>,
    ) -> Self {
        Self {
            reviews: ReviewService::new(Arc::clone(&store)),
            recommender: RecommendationBlender::new(store, config.recommend),
            patterns: PatternLearner::with_classifier(config.patterns, classifier),
            snapshot_store,
        }
    }

    /// Loads the latest pattern snapshot, when a snapshot store is attached.
    /// Best effort: a missing or unreadable snapshot starts the learner fresh.
    pub async fn restore_patterns(&self) -> bool {
        match &self.snapshot_store {
            Some(store) => load_patterns(store.as_ref(), &self.patterns).await,
            None => false,
        }
    }

    /// Persists the current pattern state. Best effort, never an error.
    pub async fn persist_patterns(&self) -> bool {
        match &self.snapshot_store {
            Some(store) => save_patterns(store.as_ref(), &self.patterns).await,
            None => false,
        }
    }

    pub async fn shutdown(&self) {
        let saved = self.persist_patterns().await;
        info!(snapshot_saved = saved, "learning engine shut down");
    }

    pub async fn record_review(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: f64,
        response_time_ms: i64,
    ) -> Result<ReviewState, StoreError> {
        self.reviews
            .record_review(learner_id, item_id, quality, response_time_ms)
            .await
    }

    pub async fn get_recommendations(
        &self,
        learner_id: &str,
        count: usize,
        options: &RecommendOptions,
    ) -> Vec<Recommendation> {
        self.recommender
            .get_recommendations(learner_id, count, options)
            .await
    }

    pub fn observe(&self, annotation: &Annotation) -> bool {
        self.patterns.observe(annotation)
    }

    pub fn learn_from_approval(&self, annotation: &Annotation) {
        self.patterns.learn_from_approval(annotation);
    }

    pub fn learn_from_rejection(&self, annotation: &Annotation, reason: &str) -> RejectionCategory {
        self.patterns.learn_from_rejection(annotation, reason)
    }

    pub fn learn_from_correction(
        &self,
        feature: &str,
        species: Option<&str>,
        original: &BoundingBox,
        corrected: &BoundingBox,
    ) {
        self.patterns
            .learn_from_correction(feature, species, original, corrected);
    }

    pub fn enhance_prompt(&self, base: &str, context: &EnhanceContext) -> String {
        self.patterns.enhance_prompt(base, context)
    }

    pub fn evaluate_quality(&self, annotation: &Annotation, species: Option<&str>) -> QualityMetrics {
        self.patterns.evaluate_quality(annotation, species)
    }

    pub fn patterns(&self) -> &PatternLearner {
        &self.patterns
    }
}
