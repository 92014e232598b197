//! Classifier seam for AI-assisted categorization.
//!
//! The actual model lives out of process; in-core we only define the
//! interface and a disabled default. Call sites must consult the
//! AI-exclusion gate (`qzwhatnext_kernel::engine::exclusion`) before
//! invoking any implementation — excluded tasks never leave the process
//! for inference.

use async_trait::async_trait;
use std::sync::Arc;

use qzwhatnext_kernel::model::TaskCategory;

/// Minimum confidence below which a suggestion is discarded.
pub const CATEGORY_CONFIDENCE_THRESHOLD: f64 = 0.6;
pub const DURATION_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// A category suggestion with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySuggestion {
    pub category: TaskCategory,
    pub confidence: f64,
}

/// A duration suggestion (minutes) with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationSuggestion {
    pub minutes: u32,
    pub confidence: f64,
}

/// Out-of-process classifier interface.
///
/// Low confidence must degrade, never escalate: an unusable category
/// suggestion becomes `Unknown`, an unusable duration suggestion keeps
/// the caller's default. Suggestions never influence tier assignment.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Suggest a title for free-form notes.
    async fn suggest_title(&self, notes: &str) -> Option<String>;

    async fn suggest_category(&self, title: &str, notes: Option<&str>) -> CategorySuggestion;

    async fn suggest_duration(&self, title: &str, notes: Option<&str>) -> DurationSuggestion;
}

/// The no-AI default: everything degrades to the deterministic baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn suggest_title(&self, _notes: &str) -> Option<String> {
        None
    }

    async fn suggest_category(&self, _title: &str, _notes: Option<&str>) -> CategorySuggestion {
        CategorySuggestion {
            category: TaskCategory::Unknown,
            confidence: 0.0,
        }
    }

    async fn suggest_duration(&self, _title: &str, _notes: Option<&str>) -> DurationSuggestion {
        DurationSuggestion {
            minutes: 0,
            confidence: 0.0,
        }
    }
}

pub type SharedClassifier = Arc<dyn Classifier>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_classifier_degrades_to_unknown() {
        let classifier = DisabledClassifier;
        let suggestion = classifier.suggest_category("anything", None).await;
        assert_eq!(suggestion.category, TaskCategory::Unknown);
        assert!(suggestion.confidence < CATEGORY_CONFIDENCE_THRESHOLD);
        assert!(classifier.suggest_title("notes").await.is_none());
    }
}
