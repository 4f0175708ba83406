//! Per (learner, item) review state: the store collaborator trait, an
//! in-memory reference store, and the review service that applies scheduler
//! outcomes atomically per key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scheduler::{compute_next_review, DEFAULT_EASE_FACTOR};
use crate::types::{DifficultyRange, ItemMeta};

/// Review history for one learner on one item. Created lazily on first
/// exposure, mutated only through [`ReviewService::record_review`], never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub learner_id: String,
    pub item_id: String,
    pub repetitions: i32,
    pub ease_factor: f64,
    pub interval_days: i64,
    pub next_review_at: Option<DateTime<Utc>>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub mastery_score: f64,
    pub times_correct: i64,
    pub times_incorrect: i64,
    pub avg_response_ms: f64,
}

impl ReviewState {
    pub fn seed(learner_id: &str, item_id: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            repetitions: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 0,
            next_review_at: None,
            last_reviewed_at: None,
            mastery_score: 0.0,
            times_correct: 0,
            times_incorrect: 0,
            avg_response_ms: 0.0,
        }
    }

    pub fn total_reviews(&self) -> i64 {
        self.times_correct + self.times_incorrect
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Collaborator holding review state. Implemented in-process by
/// [`MemoryMasteryStore`]; production backends adapt their database behind
/// the same surface.
#[allow(async_fn_in_trait)]
pub trait MasteryStore: Send + Sync {
    async fn get(&self, learner_id: &str, item_id: &str)
        -> Result<Option<ReviewState>, StoreError>;

    async fn upsert(&self, state: ReviewState) -> Result<ReviewState, StoreError>;

    /// Items with `next_review_at <= now`, ascending by due time.
    async fn find_due(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewState>, StoreError>;

    /// Items with mastery below `threshold`, ascending by mastery then by
    /// last review time, optionally restricted to one item type.
    async fn find_weak(
        &self,
        learner_id: &str,
        threshold: f64,
        focus_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReviewState>, StoreError>;

    /// Catalog items the learner has never reviewed, optionally within a
    /// difficulty range. Order is unspecified.
    async fn find_unseen(
        &self,
        learner_id: &str,
        range: Option<DifficultyRange>,
        limit: usize,
    ) -> Result<Vec<ItemMeta>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    catalog: Vec<ItemMeta>,
    states: HashMap<(String, String), ReviewState>,
}

/// In-memory store over an item catalog. Used as the default collaborator
/// and throughout the test suite.
#[derive(Default)]
pub struct MemoryMasteryStore {
    inner: parking_lot::RwLock<MemoryInner>,
}

impl MemoryMasteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Vec<ItemMeta>) -> Self {
        Self {
            inner: parking_lot::RwLock::new(MemoryInner {
                catalog,
                states: HashMap::new(),
            }),
        }
    }

    pub fn add_item(&self, item: ItemMeta) {
        self.inner.write().catalog.push(item);
    }

    fn item_type(inner: &MemoryInner, item_id: &str) -> Option<String> {
        inner
            .catalog
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.item_type.clone())
    }
}

impl MasteryStore for MemoryMasteryStore {
    async fn get(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> Result<Option<ReviewState>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .states
            .get(&(learner_id.to_string(), item_id.to_string()))
            .cloned())
    }

    async fn upsert(&self, state: ReviewState) -> Result<ReviewState, StoreError> {
        let key = (state.learner_id.clone(), state.item_id.clone());
        self.inner.write().states.insert(key, state.clone());
        Ok(state)
    }

    async fn find_due(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewState>, StoreError> {
        let inner = self.inner.read();
        let mut due: Vec<ReviewState> = inner
            .states
            .values()
            .filter(|s| s.learner_id == learner_id)
            .filter(|s| s.next_review_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_review_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn find_weak(
        &self,
        learner_id: &str,
        threshold: f64,
        focus_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReviewState>, StoreError> {
        let inner = self.inner.read();
        let mut weak: Vec<ReviewState> = inner
            .states
            .values()
            .filter(|s| s.learner_id == learner_id && s.mastery_score < threshold)
            .filter(|s| match focus_type {
                Some(wanted) => {
                    Self::item_type(&inner, &s.item_id).as_deref() == Some(wanted)
                }
                None => true,
            })
            .cloned()
            .collect();
        weak.sort_by(|a, b| {
            a.mastery_score
                .total_cmp(&b.mastery_score)
                .then(a.last_reviewed_at.cmp(&b.last_reviewed_at))
        });
        weak.truncate(limit);
        Ok(weak)
    }

    async fn find_unseen(
        &self,
        learner_id: &str,
        range: Option<DifficultyRange>,
        limit: usize,
    ) -> Result<Vec<ItemMeta>, StoreError> {
        let inner = self.inner.read();
        let unseen: Vec<ItemMeta> = inner
            .catalog
            .iter()
            .filter(|item| {
                !inner
                    .states
                    .contains_key(&(learner_id.to_string(), item.id.clone()))
            })
            .filter(|item| range.map(|r| r.contains(item.difficulty)).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect();
        Ok(unseen)
    }
}

/// Applies review outcomes to stored state. Concurrent reviews for the same
/// (learner, item) key are serialized through a keyed async mutex; different
/// keys proceed independently.
pub struct ReviewService<S: MasteryStore> {
    store: Arc<S>,
    locks: parking_lot::Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: MasteryStore> ReviewService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn key_lock(&self, learner_id: &str, item_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry((learner_id.to_string(), item_id.to_string()))
            .or_default()
            .clone()
    }

    pub async fn record_review(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: f64,
        response_time_ms: i64,
    ) -> Result<ReviewState, StoreError> {
        let lock = self.key_lock(learner_id, item_id);
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .get(learner_id, item_id)
            .await?
            .unwrap_or_else(|| ReviewState::seed(learner_id, item_id));

        let now = Utc::now();
        let outcome = compute_next_review(
            quality,
            state.interval_days,
            state.ease_factor,
            state.repetitions,
            now,
        );

        if outcome.is_failure() {
            state.times_incorrect += 1;
        } else {
            state.times_correct += 1;
        }

        let total = state.total_reviews();
        state.avg_response_ms = (state.avg_response_ms * (total - 1) as f64
            + response_time_ms.max(0) as f64)
            / total as f64;

        state.repetitions = outcome.repetitions;
        state.ease_factor = outcome.ease_factor;
        state.interval_days = outcome.interval_days;
        state.mastery_score = (state.mastery_score + outcome.mastery_delta).clamp(0.0, 100.0);
        state.last_reviewed_at = Some(now);
        state.next_review_at = Some(outcome.next_review);

        debug!(
            learner = learner_id,
            item = item_id,
            quality,
            interval = state.interval_days,
            mastery = state.mastery_score,
            "review recorded"
        );

        self.store.upsert(state).await
    }
}
