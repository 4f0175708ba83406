//! Running statistics over bounding boxes: per-dimension mean/variance via
//! Welford's algorithm, generalized to whole-numbered sample weights so an
//! approval or correction counts as more than one observation in a single
//! O(1) step.

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DimensionStat {
    pub mean: f64,
    pub variance: f64,
}

impl DimensionStat {
    fn update(&mut self, value: f64, prior_weight: u64, weight: u32) {
        let n0 = prior_weight as f64;
        let w = weight as f64;
        let n1 = n0 + w;
        let delta = value - self.mean;
        self.mean += w * delta / n1;
        let delta2 = value - self.mean;
        self.variance = (self.variance * n0 + w * delta * delta2) / n1;
    }
}

/// Per-dimension running statistics for one pattern key. `sample_size` is the
/// total sample weight, so one weight-3 correction advances it by 3.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxStat {
    pub center_x: DimensionStat,
    pub center_y: DimensionStat,
    pub width: DimensionStat,
    pub height: DimensionStat,
    pub sample_size: u64,
}

impl BoxStat {
    pub fn observe(&mut self, bbox: &BoundingBox) {
        self.observe_weighted(bbox, 1);
    }

    pub fn observe_weighted(&mut self, bbox: &BoundingBox, weight: u32) {
        if weight == 0 {
            return;
        }
        let (cx, cy) = bbox.center();
        let n = self.sample_size;
        self.center_x.update(cx, n, weight);
        self.center_y.update(cy, n, weight);
        self.width.update(bbox.width, n, weight);
        self.height.update(bbox.height, n, weight);
        self.sample_size = n + weight as u64;
    }
}

/// Incremental mean: `avg' = (avg * n + x) / (n + 1)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunningAverage {
    pub value: f64,
    pub count: u64,
}

impl RunningAverage {
    pub fn push(&mut self, sample: f64) {
        let n = self.count as f64;
        self.value = (self.value * n + sample) / (n + 1.0);
        self.count += 1;
    }
}
