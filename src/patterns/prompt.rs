//! Deterministic prompt enhancement from learned state. Pure templating: the
//! output depends only on the learner's current maps and the given context,
//! with all orderings made explicit for testability.

use std::collections::HashMap;

use super::{PatternLearner, RejectionCategory};
use crate::types::EnhanceContext;

const MAX_COOCCURRING_FEATURES: usize = 4;
const MAX_REJECTION_NOTES: usize = 3;

impl PatternLearner {
    /// Appends learned hints to `base`: co-occurring features for the target
    /// species, expected box placement for target features, average
    /// correction deltas, and recurring rejection reasons. Sections without
    /// enough data are omitted; with no sections the base prompt is returned
    /// unchanged.
    pub fn enhance_prompt(&self, base: &str, context: &EnhanceContext) -> String {
        let mut sections: Vec<String> = Vec::new();

        if let Some(species) = context.species.as_deref() {
            if let Some(line) = self.cooccurrence_line(species) {
                sections.push(line);
            }
        }

        for feature in &context.target_features {
            if let Some(line) = self.placement_line(feature, context.species.as_deref()) {
                sections.push(line);
            }
            if let Some(line) = self.correction_line(feature, context.species.as_deref()) {
                sections.push(line);
            }
        }

        sections.extend(self.rejection_lines(context));

        if sections.is_empty() {
            return base.to_string();
        }
        format!("{base}\n\n{}", sections.join("\n"))
    }

    fn cooccurrence_line(&self, species: &str) -> Option<String> {
        let stats = self.species_stats(species)?;
        if stats.observations < self.config().min_species_observations {
            return None;
        }

        let mut features: Vec<(&String, &u64)> = stats.feature_counts.iter().collect();
        features.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let names: Vec<&str> = features
            .iter()
            .take(MAX_COOCCURRING_FEATURES)
            .map(|(name, _)| name.as_str())
            .collect();
        if names.is_empty() {
            return None;
        }
        Some(format!(
            "Features frequently annotated for {species}: {}.",
            names.join(", ")
        ))
    }

    fn placement_line(&self, feature: &str, species: Option<&str>) -> Option<String> {
        let pattern = self.pattern_for(feature, species)?;
        if pattern.box_stat.sample_size < self.config().min_samples {
            return None;
        }
        let stat = &pattern.box_stat;
        Some(format!(
            "Typical {feature} placement: center ({:.2}, {:.2}), size {:.2} x {:.2}.",
            stat.center_x.mean, stat.center_y.mean, stat.width.mean, stat.height.mean
        ))
    }

    fn correction_line(&self, feature: &str, species: Option<&str>) -> Option<String> {
        let history = self.corrections_for(feature, species);
        if history.len() < self.config().min_correction_samples {
            return None;
        }
        let n = history.len() as f64;
        let dx: f64 = history.iter().map(|c| c.delta.dx).sum::<f64>() / n;
        let dy: f64 = history.iter().map(|c| c.delta.dy).sum::<f64>() / n;
        Some(format!(
            "Earlier {feature} boxes were typically shifted by ({dx:+.2}, {dy:+.2}); account for that offset."
        ))
    }

    fn rejection_lines(&self, context: &EnhanceContext) -> Vec<String> {
        let mut totals: HashMap<RejectionCategory, u32> = HashMap::new();
        {
            let rejections = self.rejections.lock();
            for (key, count) in rejections.iter() {
                let species_match = context.species.is_none() || key.species == context.species;
                let feature_match = context.target_features.is_empty()
                    || context.target_features.iter().any(|f| *f == key.feature);
                if species_match && feature_match {
                    *totals.entry(key.category).or_insert(0) += count;
                }
            }
        }

        let min = self.config().min_rejection_occurrences;
        let mut recurring: Vec<(RejectionCategory, u32)> = totals
            .into_iter()
            .filter(|(_, count)| *count >= min)
            .collect();
        recurring.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

        recurring
            .into_iter()
            .take(MAX_REJECTION_NOTES)
            .map(|(category, count)| {
                format!(
                    "Avoid a recurring problem: {} ({count} rejections so far).",
                    category.as_str()
                )
            })
            .collect()
    }
}
