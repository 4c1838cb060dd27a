use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One dimension's verdict as returned by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
}

/// A normalized news entry.
///
/// Created by the collector, enriched by the scorer, then carried in the
/// rolling store until it ages out of the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub source_label: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    /// Timezone-naive UTC
    pub published: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_scores: Option<BTreeMap<String, DimensionScore>>,
}

impl Item {
    pub fn new(
        source_label: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        summary: impl Into<String>,
        published: NaiveDateTime,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            title: title.into(),
            link: link.into(),
            summary: summary.into(),
            published,
            score: None,
            dimension_scores: None,
        }
    }
}
