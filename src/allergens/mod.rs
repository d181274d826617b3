//! Allergen screen: decides whether a recognized meal may be logged at all.
//!
//! A meal is blocked as a whole as soon as one candidate matches a restricted
//! allergen, either listed directly by the user or implied by a dietary
//! preference such as `vegan`.

pub mod taxonomy;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::vision::FoodCandidate;
use taxonomy::{AllergenDef, ALLERGENS, PREFERENCES};

/// Parsed form of the user's free-text restriction list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restrictions {
    pub allergens: Vec<&'static str>,
    pub preferences: Vec<&'static str>,
}

impl Restrictions {
    /// Splits on commas, semicolons and newlines. Unknown tokens are ignored.
    pub fn parse(text: &str) -> Self {
        let mut out = Self::default();
        for raw in text.split([',', ';', '\n']) {
            let token = raw.trim().to_lowercase();
            if token.is_empty() {
                continue;
            }
            let key = taxonomy::canonical(&token);
            if let Some(a) = taxonomy::allergen(key) {
                if !out.allergens.contains(&a.key) {
                    out.allergens.push(a.key);
                }
            } else if let Some(p) = taxonomy::preference(key) {
                if !out.preferences.contains(&p.key) {
                    out.preferences.push(p.key);
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.allergens.is_empty() && self.preferences.is_empty()
    }

    /// Canonical comma-separated form, suitable for storage.
    pub fn to_list(&self) -> String {
        self.allergens
            .iter()
            .chain(self.preferences.iter())
            .copied()
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn display(&self) -> String {
        let names: Vec<&str> = self
            .allergens
            .iter()
            .filter_map(|k| taxonomy::allergen(k).map(|a| a.display))
            .chain(
                self.preferences
                    .iter()
                    .filter_map(|k| taxonomy::preference(k).map(|p| p.display)),
            )
            .collect();
        if names.is_empty() {
            "None".into()
        } else {
            names.join(", ")
        }
    }

    /// Explicit allergens plus everything the preferences exclude.
    pub fn restricted(&self) -> BTreeSet<&'static str> {
        let mut set: BTreeSet<&'static str> = self.allergens.iter().copied().collect();
        for key in &self.preferences {
            if let Some(p) = taxonomy::preference(key) {
                set.extend(p.excludes.iter().copied());
            }
        }
        set
    }
}

/// One allergen found in a food, with the text that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub allergen: &'static str,
    pub matched: String,
}

/// Case-insensitive substring match of the name, then every ingredient,
/// against each allergen's keywords. At most one detection per allergen.
pub fn detect(name: &str, ingredients: &[String]) -> Vec<Detection> {
    let name_lower = name.to_lowercase();
    ALLERGENS
        .iter()
        .filter_map(|def| {
            if let Some(kw) = first_keyword(def, &name_lower) {
                return Some(Detection {
                    allergen: def.key,
                    matched: kw.to_string(),
                });
            }
            ingredients
                .iter()
                .find(|ing| first_keyword(def, &ing.to_lowercase()).is_some())
                .map(|ing| Detection {
                    allergen: def.key,
                    matched: ing.clone(),
                })
        })
        .collect()
}

fn first_keyword(def: &AllergenDef, text: &str) -> Option<&'static str> {
    def.keywords.iter().copied().find(|kw| text.contains(kw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Listed by the user directly.
    Allergen,
    /// Implied by a dietary preference only.
    Preference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub food: String,
    pub allergen: &'static str,
    pub allergen_display: &'static str,
    pub matched: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScreenResult {
    pub violations: Vec<Violation>,
    pub safe_foods: Vec<String>,
    pub summary: String,
}

impl ScreenResult {
    pub fn is_blocked(&self) -> bool {
        !self.violations.is_empty()
    }

    /// User-facing alert; `None` when nothing was flagged.
    pub fn alert_message(&self) -> Option<String> {
        if !self.is_blocked() {
            return None;
        }
        let mut msg = String::from("DIETARY ALERT\n\n");

        for (severity, heading) in [
            (Severity::Allergen, "ALLERGEN WARNING:"),
            (Severity::Preference, "DIETARY PREFERENCE:"),
        ] {
            let group: Vec<&Violation> = self
                .violations
                .iter()
                .filter(|v| v.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            msg.push_str(heading);
            msg.push('\n');
            for v in group {
                msg.push_str(&format!(
                    "- {}: Contains {} ({})\n",
                    v.food, v.allergen_display, v.matched
                ));
            }
            msg.push('\n');
        }

        msg.push_str("This meal was not logged.");
        if !self.safe_foods.is_empty() {
            let shown: Vec<&str> = self.safe_foods.iter().take(3).map(String::as_str).collect();
            msg.push_str(&format!("\nSafe items: {}", shown.join(", ")));
            if self.safe_foods.len() > 3 {
                msg.push_str(&format!(" +{} more", self.safe_foods.len() - 3));
            }
        }
        Some(msg)
    }
}

/// Screens every candidate against the restricted set.
pub fn screen(foods: &[FoodCandidate], restrictions: &Restrictions) -> ScreenResult {
    let restricted = restrictions.restricted();
    let mut result = ScreenResult::default();

    for food in foods {
        let hits: Vec<Violation> = detect(&food.name, &food.ingredients)
            .into_iter()
            .filter(|d| restricted.contains(d.allergen))
            .map(|d| Violation {
                food: food.name.clone(),
                allergen: d.allergen,
                allergen_display: taxonomy::allergen(d.allergen)
                    .map(|a| a.display)
                    .unwrap_or(d.allergen),
                matched: d.matched,
                severity: if restrictions.allergens.contains(&d.allergen) {
                    Severity::Allergen
                } else {
                    Severity::Preference
                },
            })
            .collect();

        if hits.is_empty() {
            result.safe_foods.push(food.name.clone());
        } else {
            result.violations.extend(hits);
        }
    }

    result.summary = summarize(&result.violations);
    result
}

/// Groups violations by allergen display name, in order of first appearance,
/// showing up to two distinct triggers each.
fn summarize(violations: &[Violation]) -> String {
    if violations.is_empty() {
        return "All foods are safe".into();
    }
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for v in violations {
        match groups.iter_mut().find(|(name, _)| *name == v.allergen_display) {
            Some((_, triggers)) => {
                if !triggers.contains(&v.matched.as_str()) {
                    triggers.push(v.matched.as_str());
                }
            }
            None => groups.push((v.allergen_display, vec![v.matched.as_str()])),
        }
    }
    let parts: Vec<String> = groups
        .iter()
        .map(|(name, triggers)| {
            let shown: Vec<&str> = triggers.iter().take(2).copied().collect();
            format!("{} ({})", name, shown.join(", "))
        })
        .collect();
    format!("WARNING: Contains {}", parts.join(", "))
}

/// Help text listing accepted restriction tokens.
pub fn supported_restrictions() -> String {
    let allergens: Vec<&str> = ALLERGENS.iter().map(|a| a.key).collect();
    let prefs: Vec<&str> = PREFERENCES.iter().map(|p| p.key).collect();
    format!(
        "Supported allergens: {}\nDietary preferences: {}\n\nExample: \"restrictions: dairy, nuts, vegan\"",
        allergens.join(", "),
        prefs.join(", ")
    )
}
