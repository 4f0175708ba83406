//! Composite quality scoring for generated annotations.
//!
//! `score = 0.4·confidence + 0.3·box_quality + 0.3·prompt_effectiveness`.
//! Box quality decays exponentially with the variance-normalized distance of
//! the annotation's center from the learned centroid. Until a pattern has
//! enough samples, both learned components fall back to a fixed default.

use tracing::trace;

use super::PatternLearner;
use crate::types::{Annotation, QualityMetrics};

const CONFIDENCE_WEIGHT: f64 = 0.4;
const BOX_WEIGHT: f64 = 0.3;
const PROMPT_WEIGHT: f64 = 0.3;

/// Component value used while a pattern has fewer samples than the minimum.
pub const LOW_SAMPLE_DEFAULT: f64 = 0.7;

impl PatternLearner {
    pub fn evaluate_quality(&self, annotation: &Annotation, species: Option<&str>) -> QualityMetrics {
        let species = species.or(annotation.species.as_deref());
        let confidence = annotation.confidence.clamp(0.0, 1.0);

        let learned = self
            .pattern_for(&annotation.feature, species)
            .filter(|p| p.box_stat.sample_size >= self.config().min_samples);

        let (bounding_box_quality, prompt_effectiveness) = match learned {
            Some(pattern) => {
                let eps = self.config().distance_epsilon;
                let (cx, cy) = annotation.bounding_box.center();
                let stat = &pattern.box_stat;
                let dx = (cx - stat.center_x.mean) / (stat.center_x.variance + eps).sqrt();
                let dy = (cy - stat.center_y.mean) / (stat.center_y.variance + eps).sqrt();
                let distance = (dx * dx + dy * dy).sqrt();
                let box_quality = (-distance / 2.0).exp();
                (box_quality, pattern.average_confidence().clamp(0.0, 1.0))
            }
            None => {
                trace!(
                    feature = %annotation.feature,
                    "insufficient samples, using default quality components"
                );
                (LOW_SAMPLE_DEFAULT, LOW_SAMPLE_DEFAULT)
            }
        };

        QualityMetrics {
            score: CONFIDENCE_WEIGHT * confidence
                + BOX_WEIGHT * bounding_box_quality
                + PROMPT_WEIGHT * prompt_effectiveness,
            confidence,
            bounding_box_quality,
            prompt_effectiveness,
        }
    }
}
