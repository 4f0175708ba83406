//! Adaptive learning engine: SM-2 spaced repetition scheduling, blended
//! review recommendations, and incremental statistical pattern learning over
//! annotation feedback.
//!
//! The crate is storage-agnostic: callers inject a [`mastery::MasteryStore`]
//! for per-learner review state and a [`storage::KeyValueStore`] for learned
//! pattern snapshots. All state mutation happens in memory with per-key
//! atomicity; persistence is best effort.

pub mod config;
pub mod engine;
pub mod logging;
pub mod mastery;
pub mod patterns;
pub mod recommend;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use engine::LearningEngine;
pub use mastery::{MasteryStore, MemoryMasteryStore, ReviewState};
pub use patterns::PatternLearner;
pub use storage::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use types::{Annotation, BoundingBox, QualityMetrics, Recommendation};
