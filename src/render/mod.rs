//! User-facing text rendering for finished groups.
//!
//! Consumer-side helper: the pipeline core never calls this. The binary's
//! delivery loop renders each dispatched group and discards it.

use std::fmt::Write;

use crate::types::{AnalysisOutcome, FoodEstimate, MediaGroup, NutritionReport};

/// Render a finished group into delivery-ready text.
pub fn render_group(group: &MediaGroup) -> String {
    match &group.outcome {
        Some(AnalysisOutcome::Report(report)) => render_report(report),
        Some(AnalysisOutcome::Failed(err)) => format!("Error processing image: {err}"),
        // Dispatched groups always carry an outcome; this only shows up if a
        // caller renders a group it never ran through the pipeline.
        None => "Analysis pending".to_string(),
    }
}

/// Render a nutrition report: one block per food, then the totals.
pub fn render_report(report: &NutritionReport) -> String {
    let mut out = String::new();
    for food in &report.foods {
        let _ = writeln!(out, "{} ({}):", food.description, food.portion);
        render_macros(&mut out, food);
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "Total:");
    render_macros(&mut out, &report.total);
    out
}

fn render_macros(out: &mut String, food: &FoodEstimate) {
    let _ = writeln!(out, "Calories: {:.2}", food.calories);
    let _ = writeln!(out, "Protein: {:.2}", food.protein);
    let _ = writeln!(out, "Fat: {:.2}", food.fat);
    let _ = writeln!(out, "Carbs: {:.2}", food.carbs);
}
