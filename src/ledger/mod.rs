//! Per-user, per-day running nutrient totals.

pub mod repo;

use std::ops::Add;

use serde::Serialize;
use sqlx::FromRow;
use time::Date;
use uuid::Uuid;

use crate::nutrients::NutrientProfile;

/// The seven headline values carried by the ledger. Missing nutrient values
/// count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutrientTotals {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub sodium_mg: f64,
}

impl From<&NutrientProfile> for NutrientTotals {
    fn from(p: &NutrientProfile) -> Self {
        Self {
            calories: p.calories.unwrap_or(0.0),
            protein_g: p.protein_g.unwrap_or(0.0),
            carbs_g: p.carbs_g.unwrap_or(0.0),
            fat_g: p.fat_g.unwrap_or(0.0),
            fiber_g: p.fiber_g.unwrap_or(0.0),
            sugar_g: p.sugar_g.unwrap_or(0.0),
            sodium_mg: p.sodium_mg.unwrap_or(0.0),
        }
    }
}

impl Add for NutrientTotals {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            calories: self.calories + o.calories,
            protein_g: self.protein_g + o.protein_g,
            carbs_g: self.carbs_g + o.carbs_g,
            fat_g: self.fat_g + o.fat_g,
            fiber_g: self.fiber_g + o.fiber_g,
            sugar_g: self.sugar_g + o.sugar_g,
            sodium_mg: self.sodium_mg + o.sodium_mg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DailySummary {
    pub user_id: Uuid,
    pub date: Date,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub total_fiber: f64,
    pub total_sugar: f64,
    pub total_sodium: f64,
    pub meal_count: i32,
}

impl DailySummary {
    pub fn empty(user_id: Uuid, date: Date) -> Self {
        Self {
            user_id,
            date,
            total_calories: 0.0,
            total_protein: 0.0,
            total_carbs: 0.0,
            total_fat: 0.0,
            total_fiber: 0.0,
            total_sugar: 0.0,
            total_sodium: 0.0,
            meal_count: 0,
        }
    }

    pub fn totals(&self) -> NutrientTotals {
        NutrientTotals {
            calories: self.total_calories,
            protein_g: self.total_protein,
            carbs_g: self.total_carbs,
            fat_g: self.total_fat,
            fiber_g: self.total_fiber,
            sugar_g: self.total_sugar,
            sodium_mg: self.total_sodium,
        }
    }

    /// Adds one committed meal.
    pub fn apply(&mut self, d: &NutrientTotals) {
        self.total_calories += d.calories;
        self.total_protein += d.protein_g;
        self.total_carbs += d.carbs_g;
        self.total_fat += d.fat_g;
        self.total_fiber += d.fiber_g;
        self.total_sugar += d.sugar_g;
        self.total_sodium += d.sodium_mg;
        self.meal_count += 1;
    }

    /// Removes one meal. Every field, the counter included, stops at zero.
    pub fn reverse(&mut self, d: &NutrientTotals) {
        self.total_calories = (self.total_calories - d.calories).max(0.0);
        self.total_protein = (self.total_protein - d.protein_g).max(0.0);
        self.total_carbs = (self.total_carbs - d.carbs_g).max(0.0);
        self.total_fat = (self.total_fat - d.fat_g).max(0.0);
        self.total_fiber = (self.total_fiber - d.fiber_g).max(0.0);
        self.total_sugar = (self.total_sugar - d.sugar_g).max(0.0);
        self.total_sodium = (self.total_sodium - d.sodium_mg).max(0.0);
        self.meal_count = (self.meal_count - 1).max(0);
    }
}

#[cfg(test)]
mod ledger_tests {
    use super::*;
    use time::macros::date;

    fn totals(calories: f64, protein_g: f64, sodium_mg: f64) -> NutrientTotals {
        NutrientTotals {
            calories,
            protein_g,
            sodium_mg,
            ..NutrientTotals::default()
        }
    }

    #[test]
    fn apply_then_reverse_restores_previous_values() {
        let mut s = DailySummary::empty(Uuid::new_v4(), date!(2024 - 03 - 01));
        s.apply(&totals(300.0, 20.0, 400.0));
        let before = s.clone();

        let meal = totals(450.0, 30.0, 900.0);
        s.apply(&meal);
        assert_eq!(s.meal_count, 2);
        assert_eq!(s.total_calories, 750.0);

        s.reverse(&meal);
        assert_eq!(s, before);
    }

    #[test]
    fn reverse_clamps_at_zero() {
        let mut s = DailySummary::empty(Uuid::new_v4(), date!(2024 - 03 - 01));
        s.apply(&totals(100.0, 5.0, 50.0));
        s.reverse(&totals(500.0, 40.0, 800.0));
        assert_eq!(s.total_calories, 0.0);
        assert_eq!(s.total_protein, 0.0);
        assert_eq!(s.total_sodium, 0.0);
        assert_eq!(s.meal_count, 0);

        s.reverse(&totals(10.0, 0.0, 0.0));
        assert_eq!(s.meal_count, 0);
        assert_eq!(s.total_calories, 0.0);
    }

    #[test]
    fn missing_nutrients_count_as_zero() {
        let p = NutrientProfile {
            calories: Some(120.0),
            ..NutrientProfile::default()
        };
        let t = NutrientTotals::from(&p) + totals(30.0, 2.0, 0.0);
        assert_eq!(t.calories, 150.0);
        assert_eq!(t.protein_g, 2.0);
        assert_eq!(t.fat_g, 0.0);
    }
}
