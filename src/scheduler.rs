//! SM-2 style review scheduling. Pure functions only; `now` is an explicit
//! argument so outcomes are deterministic under test.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
/// Intervals saturate at a century so a long success streak can never push
/// `next_review` past the representable datetime range.
pub const MAX_INTERVAL_DAYS: i64 = 36500;

const FAILURE_EASE_PENALTY: f64 = 0.2;
const FAILURE_MASTERY_DELTA: f64 = -10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i32,
    pub next_review: DateTime<Utc>,
    pub mastery_delta: f64,
}

impl ReviewOutcome {
    /// A failed recall resets repetitions to zero; anything scheduled as a
    /// success has at least one.
    pub fn is_failure(&self) -> bool {
        self.repetitions == 0
    }
}

/// Computes the next review interval, ease factor, and mastery delta from a
/// recall quality in [0,5]. Out-of-range quality is clamped, never rejected.
///
/// Quality below 3 counts as a failure: repetitions reset, the interval falls
/// back to one day, and the ease factor drops by 0.2 (floored at 1.3).
pub fn compute_next_review(
    quality: f64,
    interval_days: i64,
    ease_factor: f64,
    repetitions: i32,
    now: DateTime<Utc>,
) -> ReviewOutcome {
    let q = if quality.is_finite() {
        quality.clamp(0.0, 5.0)
    } else {
        0.0
    };

    if q < 3.0 {
        let ease = (ease_factor - FAILURE_EASE_PENALTY).max(MIN_EASE_FACTOR);
        return ReviewOutcome {
            interval_days: 1,
            ease_factor: ease,
            repetitions: 0,
            next_review: now + Duration::days(1),
            mastery_delta: FAILURE_MASTERY_DELTA,
        };
    }

    let reps = repetitions.max(0) + 1;
    // The growth step uses the pre-update ease factor.
    let interval = match reps {
        1 => 1,
        2 => 6,
        _ => ((interval_days.max(1) as f64) * ease_factor).round() as i64,
    }
    .clamp(1, MAX_INTERVAL_DAYS);

    let miss = 5.0 - q;
    let ease = (ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR);

    ReviewOutcome {
        interval_days: interval,
        ease_factor: ease,
        repetitions: reps,
        next_review: now + Duration::days(interval),
        mastery_delta: (q - 2.0) * 5.0,
    }
}
