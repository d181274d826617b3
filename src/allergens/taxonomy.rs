#[derive(Debug)]
pub struct AllergenDef {
    pub key: &'static str,
    pub display: &'static str,
    pub keywords: &'static [&'static str],
}

#[derive(Debug)]
pub struct PreferenceDef {
    pub key: &'static str,
    pub display: &'static str,
    pub excludes: &'static [&'static str],
}

pub const ALLERGENS: &[AllergenDef] = &[
    AllergenDef {
        key: "dairy",
        display: "Dairy",
        keywords: &[
            "milk", "cheese", "butter", "cream", "yogurt", "whey", "casein", "lactose", "ghee",
            "paneer", "mozzarella", "cheddar", "parmesan",
        ],
    },
    AllergenDef {
        key: "gluten",
        display: "Gluten",
        keywords: &[
            "wheat", "bread", "pasta", "flour", "barley", "rye", "couscous", "seitan", "semolina",
            "spelt", "noodle", "tortilla", "pita",
        ],
    },
    AllergenDef {
        key: "nuts",
        display: "Nuts",
        keywords: &[
            "almond", "walnut", "cashew", "pecan", "pistachio", "hazelnut", "macadamia", "peanut",
            "nut",
        ],
    },
    AllergenDef {
        key: "shellfish",
        display: "Shellfish",
        keywords: &[
            "shrimp", "crab", "lobster", "prawn", "crawfish", "clam", "mussel", "oyster", "scallop",
        ],
    },
    AllergenDef {
        key: "fish",
        display: "Fish",
        keywords: &[
            "salmon", "tuna", "cod", "tilapia", "fish", "anchovy", "sardine", "halibut", "trout",
            "bass", "mackerel",
        ],
    },
    AllergenDef {
        key: "eggs",
        display: "Eggs",
        keywords: &["egg", "omelet", "omelette", "scrambled", "mayonnaise", "meringue"],
    },
    AllergenDef {
        key: "soy",
        display: "Soy",
        keywords: &["soy", "tofu", "edamame", "tempeh", "miso", "soy sauce"],
    },
    AllergenDef {
        key: "meat",
        display: "Meat",
        keywords: &[
            "beef", "pork", "chicken", "turkey", "lamb", "veal", "bacon", "ham", "sausage",
            "steak", "meatball", "burger",
        ],
    },
    AllergenDef {
        key: "pork",
        display: "Pork",
        keywords: &["pork", "bacon", "ham", "sausage", "prosciutto", "pepperoni"],
    },
    AllergenDef {
        key: "alcohol",
        display: "Alcohol",
        keywords: &["wine", "beer", "vodka", "rum", "whiskey", "sake", "champagne"],
    },
];

pub const PREFERENCES: &[PreferenceDef] = &[
    PreferenceDef {
        key: "vegetarian",
        display: "Vegetarian",
        excludes: &["meat", "fish", "shellfish"],
    },
    PreferenceDef {
        key: "vegan",
        display: "Vegan",
        excludes: &["meat", "fish", "shellfish", "dairy", "eggs"],
    },
    PreferenceDef {
        key: "pescatarian",
        display: "Pescatarian",
        excludes: &["meat"],
    },
    PreferenceDef {
        key: "halal",
        display: "Halal",
        excludes: &["pork", "alcohol"],
    },
    PreferenceDef {
        key: "kosher",
        display: "Kosher",
        excludes: &["pork", "shellfish"],
    },
];

/// Common spellings users type for a taxonomy key.
const ALIASES: &[(&str, &str)] = &[
    ("nut", "nuts"),
    ("peanut", "nuts"),
    ("peanuts", "nuts"),
    ("tree nuts", "nuts"),
    ("egg", "eggs"),
    ("milk", "dairy"),
    ("lactose", "dairy"),
    ("wheat", "gluten"),
    ("seafood", "shellfish"),
    ("soya", "soy"),
];

pub fn allergen(key: &str) -> Option<&'static AllergenDef> {
    ALLERGENS.iter().find(|a| a.key == key)
}

pub fn preference(key: &str) -> Option<&'static PreferenceDef> {
    PREFERENCES.iter().find(|p| p.key == key)
}

/// Resolves a user-typed token to its canonical key.
pub fn canonical(token: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, key)| *key)
        .unwrap_or(token)
}

#[cfg(test)]
mod taxonomy_tests {
    use super::*;

    #[test]
    fn every_preference_excludes_known_allergens() {
        for p in PREFERENCES {
            for key in p.excludes {
                assert!(allergen(key).is_some(), "{} excludes unknown {}", p.key, key);
            }
        }
    }

    #[test]
    fn aliases_resolve_to_known_allergens() {
        for (_, key) in ALIASES {
            assert!(allergen(key).is_some());
        }
        assert_eq!(canonical("egg"), "eggs");
        assert_eq!(canonical("vegan"), "vegan");
    }
}
