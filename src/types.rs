use serde::{Deserialize, Serialize};

/// Normalized [0,1] rectangle over an image, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One generated feature annotation, as produced by the (external) vision
/// pipeline and fed back into the pattern learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub feature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub score: f64,
    pub confidence: f64,
    pub bounding_box_quality: f64,
    pub prompt_effectiveness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendReason {
    DueForReview,
    Weak,
    New,
    Reinforcement,
}

impl RecommendReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DueForReview => "due_for_review",
            Self::Weak => "weak",
            Self::New => "new",
            Self::Reinforcement => "reinforcement",
        }
    }
}

/// Ephemeral recommendation entry, produced per call and never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub item_id: String,
    pub reason: RecommendReason,
    pub priority: u8,
}

/// Catalog metadata for a learnable item. The engine only needs the id, a
/// coarse type tag for focus filtering, and a difficulty in [0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    pub id: String,
    pub item_type: String,
    pub difficulty: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DifficultyRange {
    pub min: f64,
    pub max: f64,
}

impl DifficultyRange {
    pub fn contains(&self, difficulty: f64) -> bool {
        difficulty >= self.min && difficulty <= self.max
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecommendOptions {
    pub focus_type: Option<String>,
    pub difficulty_range: Option<DifficultyRange>,
    pub include_new: bool,
}

/// Context for prompt enhancement: the species the next prompt targets and
/// the features it asks the model to locate.
#[derive(Debug, Clone, Default)]
pub struct EnhanceContext {
    pub species: Option<String>,
    pub target_features: Vec<String>,
}
