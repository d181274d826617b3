use super::NutrientProfile;

/// Per-100g values for drinks the database matches poorly. Exact-name match only.
const BEVERAGES: &[(&str, [f64; 4])] = &[
    ("coffee", [2.0, 0.3, 0.0, 0.0]),
    ("black coffee", [2.0, 0.3, 0.0, 0.0]),
    ("water", [0.0, 0.0, 0.0, 0.0]),
    ("tea", [2.0, 0.0, 0.7, 0.0]),
    ("green tea", [2.0, 0.5, 0.0, 0.0]),
    ("diet soda", [0.0, 0.0, 0.0, 0.0]),
    ("sparkling water", [0.0, 0.0, 0.0, 0.0]),
];

struct Category {
    keywords: &'static [&'static str],
    /// calories, protein, carbs, fat, fiber, sugar, sodium per 100g
    per_100g: [f64; 7],
}

const CATEGORIES: &[Category] = &[
    Category {
        keywords: &["chicken", "turkey", "lean meat"],
        per_100g: [165.0, 31.0, 0.0, 3.6, 0.0, 0.0, 70.0],
    },
    Category {
        keywords: &["beef", "steak", "pork"],
        per_100g: [250.0, 26.0, 0.0, 15.0, 0.0, 0.0, 60.0],
    },
    Category {
        keywords: &["fish", "salmon", "tuna"],
        per_100g: [206.0, 22.0, 0.0, 12.0, 0.0, 0.0, 50.0],
    },
    Category {
        keywords: &["rice", "pasta", "noodles"],
        per_100g: [130.0, 2.7, 28.0, 0.3, 0.4, 0.1, 1.0],
    },
    Category {
        keywords: &["bread", "toast"],
        per_100g: [265.0, 9.0, 49.0, 3.2, 2.7, 5.0, 491.0],
    },
    Category {
        keywords: &["egg"],
        per_100g: [155.0, 13.0, 1.1, 11.0, 0.0, 1.1, 124.0],
    },
    Category {
        keywords: &["vegetable", "broccoli", "carrot", "lettuce", "salad"],
        per_100g: [35.0, 2.8, 7.0, 0.4, 2.6, 1.7, 33.0],
    },
    Category {
        keywords: &["fruit", "apple", "banana", "orange"],
        per_100g: [52.0, 0.3, 14.0, 0.2, 2.4, 10.0, 1.0],
    },
];

const GENERIC: [f64; 7] = [150.0, 5.0, 20.0, 5.0, 2.0, 3.0, 100.0];

/// Beverage table hit, scaled to `mass_g`.
pub fn beverage(name: &str, mass_g: f64) -> Option<NutrientProfile> {
    let lower = name.trim().to_lowercase();
    BEVERAGES
        .iter()
        .find(|(n, _)| *n == lower)
        .map(|(_, [cal, protein, carbs, fat])| NutrientProfile {
            calories: Some(*cal),
            protein_g: Some(*protein),
            carbs_g: Some(*carbs),
            fat_g: Some(*fat),
            ..NutrientProfile::default()
        })
        .map(|p| p.scaled(mass_g / 100.0))
}

/// Rough category-based estimate used whenever the database has no answer.
/// Never fails.
pub fn estimate(name: &str, mass_g: f64) -> NutrientProfile {
    let lower = name.to_lowercase();
    let v = CATEGORIES
        .iter()
        .find(|c| c.keywords.iter().any(|k| lower.contains(k)))
        .map(|c| c.per_100g)
        .unwrap_or(GENERIC);
    NutrientProfile::basic(v[0], v[1], v[2], v[3], v[4], v[5], v[6]).scaled(mass_g / 100.0)
}

#[cfg(test)]
mod estimate_tests {
    use super::*;

    #[test]
    fn beverage_requires_exact_name() {
        let p = beverage("Black Coffee", 200.0).unwrap();
        assert_eq!(p.calories, Some(4.0));
        assert!(beverage("coffee cake", 100.0).is_none());
    }

    #[test]
    fn estimate_uses_first_matching_category() {
        let p = estimate("Grilled Chicken Breast", 150.0);
        assert!((p.calories.unwrap() - 247.5).abs() < 1e-9);
        assert!((p.protein_g.unwrap() - 46.5).abs() < 1e-9);
    }

    #[test]
    fn estimate_falls_back_to_generic() {
        let p = estimate("mystery stew", 100.0);
        assert_eq!(p.calories, Some(150.0));
        assert_eq!(p.sodium_mg, Some(100.0));
    }
}
