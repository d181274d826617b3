//! Data access behind one trait, so the pipeline runs the same against
//! Postgres and the in-process store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use crate::ledger::DailySummary;
use crate::meals::repo_types::{
    AnalyzedFood, CommittedMeal, DeletedMeal, FailureReason, FoodEntry, Meal, MealCategory,
    NewMeal,
};
use crate::users::{Goal, GoalKind, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait MealStore: Send + Sync {
    /// Finds the user for a normalized address, creating it on first contact.
    async fn user(&self, address: &str) -> anyhow::Result<User>;
    async fn set_restrictions(&self, user_id: Uuid, restrictions: Option<String>)
        -> anyhow::Result<()>;

    async fn meal(&self, meal_id: Uuid) -> anyhow::Result<Option<Meal>>;
    async fn meal_foods(&self, meal_id: Uuid) -> anyhow::Result<Vec<FoodEntry>>;

    /// Opens a draft and points the user's pending slot at it.
    async fn create_draft(&self, new: NewMeal) -> anyhow::Result<Meal>;
    async fn mark_recognized(&self, meal_id: Uuid, vision_raw: serde_json::Value)
        -> anyhow::Result<()>;
    /// Terminal failure; releases the pending slot if it points at the meal.
    async fn fail_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        reason: FailureReason,
    ) -> anyhow::Result<()>;
    /// Persists every food and nutrient row and moves the meal to
    /// `awaiting_category`, all or nothing.
    async fn store_analysis(
        &self,
        meal_id: Uuid,
        foods: Vec<AnalyzedFood>,
    ) -> anyhow::Result<Vec<FoodEntry>>;
    /// Sets the category, marks the meal committed, applies the ledger and
    /// moves the user's pointers, all or nothing. `None` when the meal is not
    /// awaiting a category.
    async fn commit_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        category: MealCategory,
    ) -> anyhow::Result<Option<CommittedMeal>>;

    /// Deletes the most recent non-terminal meal.
    async fn cancel_open(&self, user_id: Uuid) -> anyhow::Result<Option<Meal>>;
    /// Reverses and deletes the most recently committed meal.
    async fn delete_last_committed(&self, user_id: Uuid) -> anyhow::Result<Option<DeletedMeal>>;
    async fn recategorize_last(
        &self,
        user_id: Uuid,
        category: MealCategory,
    ) -> anyhow::Result<Option<Meal>>;
    async fn last_committed(&self, user_id: Uuid) -> anyhow::Result<Option<Meal>>;

    async fn daily_summary(&self, user_id: Uuid, date: Date)
        -> anyhow::Result<Option<DailySummary>>;
    async fn active_goal(&self, user_id: Uuid, kind: GoalKind) -> anyhow::Result<Option<Goal>>;
    async fn set_goal(&self, user_id: Uuid, kind: GoalKind, target: f64) -> anyhow::Result<Goal>;
}
