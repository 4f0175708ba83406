//! Integration tests for the learning engine facade: review recording,
//! recommendation blending, pattern feedback, and snapshot persistence.

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};

use fieldguide_engine::config::EngineConfig;
use fieldguide_engine::engine::LearningEngine;
use fieldguide_engine::logging::{init_tracing, FileLogGuard};
use fieldguide_engine::mastery::{MasteryStore, MemoryMasteryStore, ReviewState};
use fieldguide_engine::storage::{FileKvStore, MemoryKvStore};
use fieldguide_engine::types::{
    Annotation, BoundingBox, EnhanceContext, ItemMeta, RecommendOptions, RecommendReason,
};

const LEARNER: &str = "learner-1";

static LOGGING: OnceLock<(tempfile::TempDir, Option<FileLogGuard>)> = OnceLock::new();

/// Installs the tracing subscriber once per test binary, with the rolling
/// file sink pointed at a scratch directory so both output paths run.
fn init_logging() {
    LOGGING.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let guard = init_tracing("info", Some(dir.path()));
        (dir, guard)
    });
}

fn item(id: &str, item_type: &str, difficulty: f64) -> ItemMeta {
    ItemMeta {
        id: id.to_string(),
        item_type: item_type.to_string(),
        difficulty,
    }
}

fn catalog() -> Vec<ItemMeta> {
    let mut items = vec![
        item("due-1", "plumage", 0.3),
        item("due-2", "plumage", 0.4),
        item("due-3", "vocal", 0.5),
        item("weak-1", "plumage", 0.5),
        item("weak-2", "vocal", 0.6),
    ];
    for i in 0..10 {
        items.push(item(&format!("new-{i}"), "plumage", 0.1 * i as f64));
    }
    items
}

fn engine(store: Arc<MemoryMasteryStore>) -> LearningEngine<MemoryMasteryStore, MemoryKvStore> {
    init_logging();
    LearningEngine::new(EngineConfig::default(), store, None)
}

async fn seed_state(
    store: &MemoryMasteryStore,
    item_id: &str,
    mastery: f64,
    due_in_days: i64,
) -> ReviewState {
    let mut state = ReviewState::seed(LEARNER, item_id);
    state.mastery_score = mastery;
    state.last_reviewed_at = Some(Utc::now() - Duration::days(3));
    state.next_review_at = Some(Utc::now() + Duration::days(due_in_days));
    store.upsert(state).await.unwrap()
}

fn annotation(feature: &str, species: Option<&str>, bbox: BoundingBox, confidence: f64) -> Annotation {
    Annotation {
        feature: feature.to_string(),
        species: species.map(str::to_string),
        bounding_box: bbox,
        confidence,
    }
}

// ============================================================================
// Review recording
// ============================================================================

#[tokio::test]
async fn review_sequence_follows_sm2_intervals() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine = engine(store);

    let first = engine.record_review(LEARNER, "due-1", 4.0, 1200).await.unwrap();
    assert_eq!(first.interval_days, 1);
    assert_eq!(first.repetitions, 1);

    let second = engine.record_review(LEARNER, "due-1", 4.0, 1200).await.unwrap();
    assert_eq!(second.interval_days, 6);
    assert_eq!(second.repetitions, 2);

    // Ease is still 2.5 after two quality-4 reviews, so the third interval
    // is round(6 * 2.5) = 15.
    let third = engine.record_review(LEARNER, "due-1", 5.0, 1200).await.unwrap();
    assert_eq!(third.interval_days, 15);
    assert!((third.ease_factor - 2.6).abs() < 1e-9);
}

#[tokio::test]
async fn failed_review_resets_progress_but_keeps_history() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine = engine(store);

    for _ in 0..3 {
        engine.record_review(LEARNER, "due-1", 5.0, 900).await.unwrap();
    }
    let failed = engine.record_review(LEARNER, "due-1", 2.0, 4000).await.unwrap();

    assert_eq!(failed.repetitions, 0);
    assert_eq!(failed.interval_days, 1);
    assert_eq!(failed.times_correct, 3);
    assert_eq!(failed.times_incorrect, 1);
    assert!(failed.ease_factor >= 1.3);
}

// ============================================================================
// Recommendation blending
// ============================================================================

#[tokio::test]
async fn recommendations_respect_category_caps_and_order() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    for id in ["due-1", "due-2", "due-3"] {
        seed_state(&store, id, 80.0, -1).await;
    }
    seed_state(&store, "weak-1", 10.0, 5).await;
    seed_state(&store, "weak-2", 20.0, 5).await;

    let engine = engine(Arc::clone(&store));
    let options = RecommendOptions {
        include_new: true,
        ..Default::default()
    };
    let recs = engine.get_recommendations(LEARNER, 10, &options).await;

    // 3 due available (cap 4), 2 weak (cap 4), 10 new capped at 2.
    assert_eq!(recs.len(), 7);

    let due: Vec<_> = recs
        .iter()
        .filter(|r| r.reason == RecommendReason::DueForReview)
        .collect();
    let weak: Vec<_> = recs.iter().filter(|r| r.reason == RecommendReason::Weak).collect();
    let fresh: Vec<_> = recs.iter().filter(|r| r.reason == RecommendReason::New).collect();
    assert_eq!(due.len(), 3);
    assert_eq!(weak.len(), 2);
    assert_eq!(fresh.len(), 2);

    // Priority descending, no duplicates, never more than requested.
    assert!(recs.windows(2).all(|w| w[0].priority >= w[1].priority));
    let mut ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), recs.len());
}

#[tokio::test]
async fn item_both_due_and_weak_keeps_higher_priority() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    // Low mastery and already due: candidate in both source sets.
    seed_state(&store, "weak-1", 15.0, -2).await;

    let engine = engine(Arc::clone(&store));
    let recs = engine
        .get_recommendations(LEARNER, 10, &RecommendOptions::default())
        .await;

    let entries: Vec<_> = recs.iter().filter(|r| r.item_id == "weak-1").collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, RecommendReason::DueForReview);
    assert_eq!(entries[0].priority, 10);
}

#[tokio::test]
async fn new_items_are_omitted_unless_requested() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine = engine(store);

    let without_new = engine
        .get_recommendations(LEARNER, 10, &RecommendOptions::default())
        .await;
    assert!(without_new.is_empty());

    let options = RecommendOptions {
        include_new: true,
        ..Default::default()
    };
    let with_new = engine.get_recommendations(LEARNER, 10, &options).await;
    assert_eq!(with_new.len(), 2);
    assert!(with_new.iter().all(|r| r.reason == RecommendReason::New));
}

#[tokio::test]
async fn result_length_never_exceeds_requested_count() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    for id in ["due-1", "due-2", "due-3"] {
        seed_state(&store, id, 40.0, -1).await;
    }

    let engine = engine(Arc::clone(&store));
    let options = RecommendOptions {
        include_new: true,
        ..Default::default()
    };
    let recs = engine.get_recommendations(LEARNER, 2, &options).await;
    assert_eq!(recs.len(), 2);
    // The highest-priority entry survives truncation.
    assert_eq!(recs[0].priority, 10);
}

// ============================================================================
// Pattern learning through the facade
// ============================================================================

#[tokio::test]
async fn quality_defaults_until_enough_samples_then_tracks_distance() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine = engine(store);
    let bbox = BoundingBox::new(0.4, 0.3, 0.1, 0.08);

    engine.observe(&annotation("eye", Some("robin"), bbox, 0.9));
    let early = engine.evaluate_quality(&annotation("eye", Some("robin"), bbox, 0.9), None);
    assert_eq!(early.bounding_box_quality, 0.7);
    assert_eq!(early.prompt_effectiveness, 0.7);

    for _ in 0..4 {
        engine.observe(&annotation("eye", Some("robin"), bbox, 0.9));
    }
    let learned = engine.evaluate_quality(&annotation("eye", Some("robin"), bbox, 0.9), None);
    assert!(learned.bounding_box_quality > 0.99);
    assert!(learned.score > early.score);
}

#[tokio::test]
async fn enhanced_prompt_reflects_feedback() {
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine = engine(store);
    let bbox = BoundingBox::new(0.4, 0.3, 0.1, 0.08);

    for _ in 0..4 {
        engine.observe(&annotation("eye", Some("robin"), bbox, 0.9));
    }
    engine.learn_from_rejection(&annotation("eye", Some("robin"), bbox, 0.9), "box is misplaced");
    engine.learn_from_rejection(&annotation("eye", Some("robin"), bbox, 0.9), "wrong position again");

    let context = EnhanceContext {
        species: Some("robin".to_string()),
        target_features: vec!["eye".to_string()],
    };
    let prompt = engine.enhance_prompt("Locate the eye.", &context);

    assert!(prompt.starts_with("Locate the eye."));
    assert!(prompt.contains("Typical eye placement"));
    assert!(prompt.contains("wrong_position"));
}

// ============================================================================
// Snapshot persistence
// ============================================================================

#[tokio::test]
async fn patterns_survive_restart_through_file_store() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(FileKvStore::new(dir.path()).await.unwrap());
    let bbox = BoundingBox::new(0.4, 0.3, 0.1, 0.08);

    {
        let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
        let engine: LearningEngine<_, FileKvStore> =
            LearningEngine::new(EngineConfig::default(), store, Some(Arc::clone(&kv)));
        for _ in 0..5 {
            engine.observe(&annotation("eye", Some("robin"), bbox, 0.9));
        }
        engine.shutdown().await;
    }

    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine: LearningEngine<_, FileKvStore> =
        LearningEngine::new(EngineConfig::default(), store, Some(kv));
    assert!(engine.restore_patterns().await);

    let metrics = engine.evaluate_quality(&annotation("eye", Some("robin"), bbox, 0.9), None);
    assert!(metrics.bounding_box_quality > 0.99);
}

#[tokio::test]
async fn persistence_failures_do_not_disturb_learning() {
    // No snapshot store attached at all: persistence degrades to a no-op.
    let store = Arc::new(MemoryMasteryStore::with_catalog(catalog()));
    let engine = engine(store);
    let bbox = BoundingBox::new(0.4, 0.3, 0.1, 0.08);

    engine.observe(&annotation("eye", Some("robin"), bbox, 0.9));
    assert!(!engine.persist_patterns().await);
    assert!(!engine.restore_patterns().await);
    assert!(engine.patterns().pattern_for("eye", Some("robin")).is_some());
}
