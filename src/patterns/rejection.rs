//! Rejection reason categorization. Free-text reasons are inherently fuzzy,
//! so the mapping lives behind a trait; the default implementation does
//! case-insensitive keyword matching.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    WrongPosition,
    WrongSize,
    WrongFeature,
    PoorImageRegion,
    Duplicate,
    Other,
}

impl RejectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongPosition => "wrong_position",
            Self::WrongSize => "wrong_size",
            Self::WrongFeature => "wrong_feature",
            Self::PoorImageRegion => "poor_image_region",
            Self::Duplicate => "duplicate",
            Self::Other => "other",
        }
    }
}

pub trait RejectionClassifier: Send + Sync {
    fn classify(&self, reason: &str) -> RejectionCategory;
}

/// Substring rules checked in order; first hit wins.
pub struct KeywordClassifier {
    rules: Vec<(Vec<&'static str>, RejectionCategory)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                (
                    vec!["position", "location", "misplaced", "off target", "shifted"],
                    RejectionCategory::WrongPosition,
                ),
                (
                    vec!["too large", "too small", "too big", "size", "tiny", "oversized"],
                    RejectionCategory::WrongSize,
                ),
                (
                    vec!["wrong feature", "not a", "mislabel", "different feature"],
                    RejectionCategory::WrongFeature,
                ),
                (
                    vec!["blurry", "blurred", "dark", "occluded", "unclear", "out of focus"],
                    RejectionCategory::PoorImageRegion,
                ),
                (
                    vec!["duplicate", "already annotated", "repeated"],
                    RejectionCategory::Duplicate,
                ),
            ],
        }
    }
}

impl KeywordClassifier {
    pub fn new(rules: Vec<(Vec<&'static str>, RejectionCategory)>) -> Self {
        Self { rules }
    }
}

impl RejectionClassifier for KeywordClassifier {
    fn classify(&self, reason: &str) -> RejectionCategory {
        let lowered = reason.to_lowercase();
        for (keywords, category) in &self.rules {
            if keywords.iter().any(|kw| lowered.contains(kw)) {
                return *category;
            }
        }
        RejectionCategory::Other
    }
}
