//! Fixture analyzer for dry runs and tests.

use async_trait::async_trait;

use crate::types::{FoodEstimate, NutritionReport};

use super::{AnalysisError, Analyzer};

/// Analyzer that returns a canned estimate without any network call.
///
/// Used by `--dry-run` and by tests that exercise pipeline behavior rather
/// than the HTTP client. Captions containing [`FAIL_MARKER`](Self::FAIL_MARKER)
/// produce an error instead, so failure paths can be driven from input data.
#[derive(Debug, Default)]
pub struct FixtureAnalyzer;

impl FixtureAnalyzer {
    /// Captions containing this marker make the fixture fail the call.
    pub const FAIL_MARKER: &'static str = "[fixture-fail]";

    pub fn new() -> Self {
        Self
    }

    /// Canned single-food estimate scaled by photo count.
    fn canned_report(image_count: usize) -> NutritionReport {
        let per_photo = FoodEstimate {
            description: "estimated meal".to_string(),
            portion: "1 serving".to_string(),
            calories: 500.0,
            protein: 25.0,
            fat: 20.0,
            carbs: 50.0,
        };
        let count = image_count.max(1) as f64;
        let total = FoodEstimate {
            description: "total".to_string(),
            portion: format!("{} serving(s)", image_count.max(1)),
            calories: per_photo.calories * count,
            protein: per_photo.protein * count,
            fat: per_photo.fat * count,
            carbs: per_photo.carbs * count,
        };
        NutritionReport {
            foods: vec![per_photo],
            total,
        }
    }
}

#[async_trait]
impl Analyzer for FixtureAnalyzer {
    async fn analyze(
        &self,
        caption: &str,
        image_urls: &[String],
    ) -> Result<NutritionReport, AnalysisError> {
        if caption.contains(Self::FAIL_MARKER) {
            return Err(AnalysisError::Http("fixture failure requested".to_string()));
        }
        Ok(Self::canned_report(image_urls.len()))
    }

    fn analyzer_name(&self) -> &str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_scales_total_by_photo_count() {
        let analyzer = FixtureAnalyzer::new();
        let urls = vec!["u1".to_string(), "u2".to_string()];
        let report = analyzer.analyze("lunch", &urls).await.expect("canned report");
        assert!((report.total.calories - 1000.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn fail_marker_triggers_error() {
        let analyzer = FixtureAnalyzer::new();
        let urls = vec!["u1".to_string()];
        let err = analyzer
            .analyze("soup [fixture-fail]", &urls)
            .await
            .expect_err("marker should fail the call");
        assert!(matches!(err, AnalysisError::Http(_)));
    }
}
