//! Blends due, weak, and new candidates into one deduplicated priority list.
//!
//! Category counts (40/40/20 by default) are targets, not guarantees: a
//! source with fewer candidates than requested simply contributes less, the
//! shortfall is never redistributed to the other categories.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::warn;

use crate::config::RecommendConfig;
use crate::mastery::{MasteryStore, StoreError};
use crate::types::{Recommendation, RecommendOptions, RecommendReason};

pub struct RecommendationBlender<S: MasteryStore> {
    store: Arc<S>,
    config: RecommendConfig,
}

impl<S: MasteryStore> RecommendationBlender<S> {
    pub fn new(store: Arc<S>, config: RecommendConfig) -> Self {
        Self { store, config }
    }

    /// Returns at most `count` recommendations, priority descending with an
    /// item-id tiebreak, no duplicate item ids. Source reads run concurrently;
    /// a slow or failing source degrades to an empty contribution.
    pub async fn get_recommendations(
        &self,
        learner_id: &str,
        count: usize,
        options: &RecommendOptions,
    ) -> Vec<Recommendation> {
        if count == 0 {
            return Vec::new();
        }

        let due_count = share_of(count, self.config.due_share);
        let weak_count = share_of(count, self.config.weak_share);
        let new_count = share_of(count, self.config.new_share);

        let budget = Duration::from_millis(self.config.source_timeout_ms);
        let now = Utc::now();

        let due_read = timeout(budget, self.store.find_due(learner_id, now, due_count));
        let weak_read = timeout(
            budget,
            self.store.find_weak(
                learner_id,
                self.config.weak_threshold,
                options.focus_type.as_deref(),
                weak_count,
            ),
        );
        let new_read = async {
            if options.include_new {
                timeout(
                    budget,
                    self.store
                        .find_unseen(learner_id, options.difficulty_range, new_count),
                )
                .await
            } else {
                Ok(Ok(Vec::new()))
            }
        };

        let (due, weak, unseen) = tokio::join!(due_read, weak_read, new_read);
        let due = drain_source("due", due);
        let weak = drain_source("weak", weak);
        let unseen = drain_source("new", unseen);

        let mut merged: HashMap<String, Recommendation> = HashMap::new();
        let mut push = |item_id: String, reason: RecommendReason, priority: u8| {
            match merged.get(&item_id) {
                Some(existing) if existing.priority >= priority => {}
                _ => {
                    merged.insert(
                        item_id.clone(),
                        Recommendation {
                            item_id,
                            reason,
                            priority,
                        },
                    );
                }
            }
        };

        for state in due {
            push(
                state.item_id,
                RecommendReason::DueForReview,
                self.config.due_priority,
            );
        }
        for state in weak {
            push(state.item_id, RecommendReason::Weak, self.config.weak_priority);
        }
        for item in unseen {
            push(item.id, RecommendReason::New, self.config.new_priority);
        }

        let mut result: Vec<Recommendation> = merged.into_values().collect();
        result.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        result.truncate(count);
        result
    }
}

fn share_of(count: usize, share: f64) -> usize {
    ((count as f64) * share).ceil() as usize
}

fn drain_source<T>(
    which: &str,
    outcome: Result<Result<Vec<T>, StoreError>, tokio::time::error::Elapsed>,
) -> Vec<T> {
    match outcome {
        Ok(Ok(items)) => items,
        Ok(Err(err)) => {
            warn!(source = which, error = %err, "candidate source failed, skipping");
            Vec::new()
        }
        Err(_) => {
            warn!(source = which, "candidate source timed out, skipping");
            Vec::new()
        }
    }
}
