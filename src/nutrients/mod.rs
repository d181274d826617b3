//! Nutrient lookup: a food name and mass in, a mass-scaled nutrient profile out.

pub mod estimate;
pub mod usda;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// The 25 tracked nutrients of one food portion. Every field is nullable:
/// a source may not report a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NutrientProfile {
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub potassium_mg: Option<f64>,
    pub calcium_mg: Option<f64>,
    pub iron_mg: Option<f64>,
    pub vitamin_c_mg: Option<f64>,
    pub vitamin_d_ug: Option<f64>,
    pub vitamin_a_ug: Option<f64>,
    pub vitamin_b12_ug: Option<f64>,
    pub magnesium_mg: Option<f64>,
    pub zinc_mg: Option<f64>,
    pub phosphorus_mg: Option<f64>,
    pub cholesterol_mg: Option<f64>,
    pub saturated_fat_g: Option<f64>,
    pub monounsaturated_fat_g: Option<f64>,
    pub polyunsaturated_fat_g: Option<f64>,
    pub folate_ug: Option<f64>,
    pub vitamin_b6_mg: Option<f64>,
    pub choline_mg: Option<f64>,
    pub selenium_ug: Option<f64>,
}

impl NutrientProfile {
    /// Profile with only the seven headline values set.
    pub fn basic(
        calories: f64,
        protein_g: f64,
        carbs_g: f64,
        fat_g: f64,
        fiber_g: f64,
        sugar_g: f64,
        sodium_mg: f64,
    ) -> Self {
        Self {
            calories: Some(calories),
            protein_g: Some(protein_g),
            carbs_g: Some(carbs_g),
            fat_g: Some(fat_g),
            fiber_g: Some(fiber_g),
            sugar_g: Some(sugar_g),
            sodium_mg: Some(sodium_mg),
            ..Self::default()
        }
    }

    /// Label, unit and value for every field, in display order.
    pub fn entries(&self) -> [(&'static str, &'static str, Option<f64>); 25] {
        [
            ("Calories", "kcal", self.calories),
            ("Protein", "g", self.protein_g),
            ("Carbs", "g", self.carbs_g),
            ("Fat", "g", self.fat_g),
            ("Fiber", "g", self.fiber_g),
            ("Sugar", "g", self.sugar_g),
            ("Sodium", "mg", self.sodium_mg),
            ("Potassium", "mg", self.potassium_mg),
            ("Calcium", "mg", self.calcium_mg),
            ("Iron", "mg", self.iron_mg),
            ("Vitamin C", "mg", self.vitamin_c_mg),
            ("Vitamin D", "ug", self.vitamin_d_ug),
            ("Vitamin A", "ug", self.vitamin_a_ug),
            ("Vitamin B12", "ug", self.vitamin_b12_ug),
            ("Magnesium", "mg", self.magnesium_mg),
            ("Zinc", "mg", self.zinc_mg),
            ("Phosphorus", "mg", self.phosphorus_mg),
            ("Cholesterol", "mg", self.cholesterol_mg),
            ("Saturated fat", "g", self.saturated_fat_g),
            ("Monounsaturated fat", "g", self.monounsaturated_fat_g),
            ("Polyunsaturated fat", "g", self.polyunsaturated_fat_g),
            ("Folate", "ug", self.folate_ug),
            ("Vitamin B6", "mg", self.vitamin_b6_mg),
            ("Choline", "mg", self.choline_mg),
            ("Selenium", "ug", self.selenium_ug),
        ]
    }

    fn values_mut(&mut self) -> [&mut Option<f64>; 25] {
        [
            &mut self.calories,
            &mut self.protein_g,
            &mut self.carbs_g,
            &mut self.fat_g,
            &mut self.fiber_g,
            &mut self.sugar_g,
            &mut self.sodium_mg,
            &mut self.potassium_mg,
            &mut self.calcium_mg,
            &mut self.iron_mg,
            &mut self.vitamin_c_mg,
            &mut self.vitamin_d_ug,
            &mut self.vitamin_a_ug,
            &mut self.vitamin_b12_ug,
            &mut self.magnesium_mg,
            &mut self.zinc_mg,
            &mut self.phosphorus_mg,
            &mut self.cholesterol_mg,
            &mut self.saturated_fat_g,
            &mut self.monounsaturated_fat_g,
            &mut self.polyunsaturated_fat_g,
            &mut self.folate_ug,
            &mut self.vitamin_b6_mg,
            &mut self.choline_mg,
            &mut self.selenium_ug,
        ]
    }

    /// Multiplies every reported value by `factor`.
    pub fn scaled(mut self, factor: f64) -> Self {
        for v in self.values_mut() {
            if let Some(x) = v.as_mut() {
                *x *= factor;
            }
        }
        self
    }

    /// Stores a per-100g value reported under a USDA FoodData Central nutrient id.
    /// Returns false for ids that are not tracked.
    pub fn set_usda(&mut self, nutrient_id: u32, value: f64) -> bool {
        let slot = match nutrient_id {
            1008 => &mut self.calories,
            1003 => &mut self.protein_g,
            1005 => &mut self.carbs_g,
            1004 => &mut self.fat_g,
            1079 => &mut self.fiber_g,
            2000 => &mut self.sugar_g,
            1093 => &mut self.sodium_mg,
            1092 => &mut self.potassium_mg,
            1087 => &mut self.calcium_mg,
            1089 => &mut self.iron_mg,
            1162 => &mut self.vitamin_c_mg,
            1114 => &mut self.vitamin_d_ug,
            1106 => &mut self.vitamin_a_ug,
            1178 => &mut self.vitamin_b12_ug,
            1090 => &mut self.magnesium_mg,
            1095 => &mut self.zinc_mg,
            1091 => &mut self.phosphorus_mg,
            1253 => &mut self.cholesterol_mg,
            1258 => &mut self.saturated_fat_g,
            1292 => &mut self.monounsaturated_fat_g,
            1293 => &mut self.polyunsaturated_fat_g,
            1177 => &mut self.folate_ug,
            1175 => &mut self.vitamin_b6_mg,
            1180 => &mut self.choline_mg,
            1103 => &mut self.selenium_ug,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

#[async_trait]
pub trait NutrientSource: Send + Sync {
    /// Nutrients for `mass_g` grams of `name`, already scaled to that mass.
    async fn lookup(&self, name: &str, mass_g: f64) -> ClientResult<NutrientProfile>;
}
