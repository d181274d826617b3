use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ledger::{DailySummary, NutrientTotals};
use crate::nutrients::NutrientProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealStatus {
    Draft,
    Recognized,
    AwaitingCategory,
    Committed,
    Failed,
}

impl MealStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            MealStatus::Draft => "draft",
            MealStatus::Recognized => "recognized",
            MealStatus::AwaitingCategory => "awaiting_category",
            MealStatus::Committed => "committed",
            MealStatus::Failed => "failed",
        }
    }

    /// Statuses an explicit cancel may remove.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            MealStatus::Draft | MealStatus::Recognized | MealStatus::AwaitingCategory
        )
    }
}

impl std::str::FromStr for MealStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "draft" => MealStatus::Draft,
            "recognized" => MealStatus::Recognized,
            "awaiting_category" => MealStatus::AwaitingCategory,
            "committed" => MealStatus::Committed,
            "failed" => MealStatus::Failed,
            other => anyhow::bail!("unknown meal status {other:?}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoFood,
    RecognitionError,
    AllergenBlocked,
    PersistenceError,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::NoFood => "no_food",
            FailureReason::RecognitionError => "recognition_error",
            FailureReason::AllergenBlocked => "allergen_blocked",
            FailureReason::PersistenceError => "persistence_error",
        }
    }
}

impl std::str::FromStr for FailureReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "no_food" => FailureReason::NoFood,
            "recognition_error" => FailureReason::RecognitionError,
            "allergen_blocked" => FailureReason::AllergenBlocked,
            "persistence_error" => FailureReason::PersistenceError,
            other => anyhow::bail!("unknown failure reason {other:?}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Uncategorized,
}

impl MealCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MealCategory::Breakfast => "breakfast",
            MealCategory::Lunch => "lunch",
            MealCategory::Dinner => "dinner",
            MealCategory::Snack => "snack",
            MealCategory::Uncategorized => "uncategorized",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MealCategory::Breakfast => "Breakfast",
            MealCategory::Lunch => "Lunch",
            MealCategory::Dinner => "Dinner",
            MealCategory::Snack => "Snack",
            MealCategory::Uncategorized => "Uncategorized",
        }
    }

    /// Resolves a user's answer to the category prompt: a lone digit 1-4, or
    /// the first category, in prompt order, with a keyword anywhere in the
    /// text. Never yields `Uncategorized`.
    pub fn parse_reply(text: &str) -> Option<Self> {
        const KEYWORDS: [(MealCategory, &[&str]); 4] = [
            (MealCategory::Breakfast, &["breakfast", "morning"]),
            (MealCategory::Lunch, &["lunch", "noon"]),
            (MealCategory::Dinner, &["dinner", "supper", "evening"]),
            (MealCategory::Snack, &["snack"]),
        ];

        let t = text.trim().to_lowercase();
        match t.as_str() {
            "1" => return Some(MealCategory::Breakfast),
            "2" => return Some(MealCategory::Lunch),
            "3" => return Some(MealCategory::Dinner),
            "4" => return Some(MealCategory::Snack),
            _ => {}
        }
        KEYWORDS
            .iter()
            .find(|(_, kws)| kws.iter().any(|kw| t.contains(kw)))
            .map(|(c, _)| *c)
    }
}

impl std::str::FromStr for MealCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uncategorized" => Ok(MealCategory::Uncategorized),
            other => MealCategory::parse_reply(other)
                .ok_or_else(|| anyhow::anyhow!("unknown meal category {other:?}")),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub photo_ref: Option<String>,
    pub note: Option<String>,
    pub vision_raw: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: MealCategory,
    pub status: MealStatus,
    pub failure_reason: Option<FailureReason>,
    pub photo_ref: Option<String>,
    pub note: Option<String>,
    pub vision_raw: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
}

impl Meal {
    pub fn ledger_date(&self) -> time::Date {
        self.created_at.to_offset(time::UtcOffset::UTC).date()
    }
}

impl TryFrom<MealRow> for Meal {
    type Error = anyhow::Error;

    fn try_from(r: MealRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            category: r.category.parse()?,
            status: r.status.parse()?,
            failure_reason: r.failure_reason.as_deref().map(str::parse).transpose()?,
            photo_ref: r.photo_ref,
            note: r.note,
            vision_raw: r.vision_raw,
            created_at: r.created_at,
        })
    }
}

/// Fields needed to open a draft.
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub user_id: Uuid,
    pub photo_ref: Option<String>,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FoodItem {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub position: i32,
    pub name: String,
    pub mass_g: f64,
    pub confidence: f64,
}

/// A food item together with its nutrient row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodEntry {
    pub item: FoodItem,
    pub nutrients: NutrientProfile,
}

/// Name, mass, confidence and looked-up nutrients for one food, before it has
/// an id.
#[derive(Debug, Clone)]
pub struct AnalyzedFood {
    pub name: String,
    pub mass_g: f64,
    pub confidence: f64,
    pub nutrients: NutrientProfile,
}

pub fn meal_totals(foods: &[FoodEntry]) -> NutrientTotals {
    foods
        .iter()
        .fold(NutrientTotals::default(), |acc, f| acc + NutrientTotals::from(&f.nutrients))
}

#[derive(Debug, Clone, Serialize)]
pub struct CommittedMeal {
    pub meal: Meal,
    pub foods: Vec<FoodEntry>,
    pub totals: NutrientTotals,
    pub summary: DailySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedMeal {
    pub meal: Meal,
    pub totals: NutrientTotals,
    pub summary: Option<DailySummary>,
}

#[cfg(test)]
mod meal_type_tests {
    use super::*;

    #[test]
    fn category_reply_accepts_words_and_digits() {
        assert_eq!(MealCategory::parse_reply("Lunch"), Some(MealCategory::Lunch));
        assert_eq!(MealCategory::parse_reply(" 1 "), Some(MealCategory::Breakfast));
        assert_eq!(MealCategory::parse_reply("supper!"), Some(MealCategory::Dinner));
        assert_eq!(MealCategory::parse_reply("4"), Some(MealCategory::Snack));
        assert_eq!(MealCategory::parse_reply("noon"), Some(MealCategory::Lunch));
        assert_eq!(MealCategory::parse_reply("it was lunch"), Some(MealCategory::Lunch));
        assert_eq!(MealCategory::parse_reply("change to snack"), Some(MealCategory::Snack));
        assert_eq!(MealCategory::parse_reply("5"), None);
        assert_eq!(MealCategory::parse_reply("12"), None);
        assert_eq!(MealCategory::parse_reply("xyz"), None);
        assert_eq!(MealCategory::parse_reply("uncategorized"), None);
    }

    #[test]
    fn category_reply_matches_keywords_inside_words() {
        assert_eq!(MealCategory::parse_reply("this afternoon"), Some(MealCategory::Lunch));
        assert_eq!(MealCategory::parse_reply("dinnertime"), Some(MealCategory::Dinner));
        assert_eq!(MealCategory::parse_reply("Breakfasts"), Some(MealCategory::Breakfast));
        assert_eq!(MealCategory::parse_reply("good morning"), Some(MealCategory::Breakfast));
        assert_eq!(MealCategory::parse_reply("snacking"), Some(MealCategory::Snack));
    }

    #[test]
    fn first_category_in_prompt_order_wins() {
        assert_eq!(
            MealCategory::parse_reply("late lunch or early dinner"),
            Some(MealCategory::Lunch)
        );
        assert_eq!(
            MealCategory::parse_reply("dinner leftovers for breakfast"),
            Some(MealCategory::Breakfast)
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            MealStatus::Draft,
            MealStatus::Recognized,
            MealStatus::AwaitingCategory,
            MealStatus::Committed,
            MealStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<MealStatus>().unwrap(), status);
        }
    }

    #[test]
    fn row_conversion_rejects_unknown_status() {
        let row = MealRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            category: "lunch".into(),
            status: "half_done".into(),
            failure_reason: None,
            photo_ref: None,
            note: None,
            vision_raw: None,
            created_at: OffsetDateTime::now_utc(),
        };
        assert!(Meal::try_from(row).is_err());
    }

    #[test]
    fn row_conversion_parses_enums() {
        let row = MealRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            category: "uncategorized".into(),
            status: "failed".into(),
            failure_reason: Some("allergen_blocked".into()),
            photo_ref: None,
            note: None,
            vision_raw: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let meal = Meal::try_from(row).unwrap();
        assert_eq!(meal.category, MealCategory::Uncategorized);
        assert_eq!(meal.status, MealStatus::Failed);
        assert_eq!(meal.failure_reason, Some(FailureReason::AllergenBlocked));
    }
}
