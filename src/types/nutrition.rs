//! Structured nutrition estimates returned by the analysis collaborator.

use serde::{Deserialize, Serialize};

/// Calorie and macronutrient estimate for a single recognized food.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEstimate {
    /// Short description of the food ("grilled salmon fillet").
    pub description: String,
    /// Estimated portion size ("200 g", "1 cup").
    pub portion: String,
    /// Estimated calories (kcal).
    pub calories: f64,
    /// Estimated protein (g).
    pub protein: f64,
    /// Estimated fat (g).
    pub fat: f64,
    /// Estimated carbohydrates (g).
    pub carbs: f64,
}

/// Full analysis result for one meal: per-food estimates plus a total line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionReport {
    /// Individual foods recognized in the photos.
    pub foods: Vec<FoodEstimate>,
    /// Aggregate estimate across all recognized foods.
    pub total: FoodEstimate,
}
