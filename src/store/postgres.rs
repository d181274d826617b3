use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use super::MealStore;
use crate::ledger::{self, DailySummary};
use crate::meals::repo as meals;
use crate::meals::repo_types::{
    meal_totals, AnalyzedFood, CommittedMeal, DeletedMeal, FailureReason, FoodEntry, Meal,
    MealCategory, NewMeal,
};
use crate::users::{self, Goal, GoalKind, User};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to postgres")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl MealStore for PgStore {
    async fn user(&self, address: &str) -> anyhow::Result<User> {
        users::repo::find_or_create(&self.db, address).await
    }

    async fn set_restrictions(
        &self,
        user_id: Uuid,
        restrictions: Option<String>,
    ) -> anyhow::Result<()> {
        users::repo::set_restrictions(&self.db, user_id, restrictions.as_deref()).await
    }

    async fn meal(&self, meal_id: Uuid) -> anyhow::Result<Option<Meal>> {
        meals::get(&self.db, meal_id).await
    }

    async fn meal_foods(&self, meal_id: Uuid) -> anyhow::Result<Vec<FoodEntry>> {
        meals::foods(&self.db, meal_id).await
    }

    async fn create_draft(&self, new: NewMeal) -> anyhow::Result<Meal> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let meal = meals::insert_draft_tx(&mut tx, &new).await?;
        users::repo::set_pending_tx(&mut tx, new.user_id, Some(meal.id)).await?;
        tx.commit().await.context("commit tx")?;
        Ok(meal)
    }

    async fn mark_recognized(
        &self,
        meal_id: Uuid,
        vision_raw: serde_json::Value,
    ) -> anyhow::Result<()> {
        meals::mark_recognized(&self.db, meal_id, &vision_raw).await
    }

    async fn fail_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        reason: FailureReason,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        meals::fail_tx(&mut tx, meal_id, reason).await?;
        users::repo::clear_pending_tx(&mut tx, user_id, meal_id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn store_analysis(
        &self,
        meal_id: Uuid,
        foods: Vec<AnalyzedFood>,
    ) -> anyhow::Result<Vec<FoodEntry>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let entries = meals::store_analysis_tx(&mut tx, meal_id, &foods).await?;
        tx.commit().await.context("commit tx")?;
        Ok(entries)
    }

    async fn commit_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        category: MealCategory,
    ) -> anyhow::Result<Option<CommittedMeal>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let Some(meal) = meals::commit_tx(&mut tx, meal_id, category).await? else {
            return Ok(None);
        };
        let foods = meals::foods(&mut *tx, meal.id).await?;
        let totals = meal_totals(&foods);
        let summary = ledger::repo::apply_tx(&mut tx, user_id, meal.ledger_date(), &totals).await?;
        users::repo::set_last_meal_tx(&mut tx, user_id, Some(meal.id)).await?;
        users::repo::clear_pending_tx(&mut tx, user_id, meal.id).await?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(CommittedMeal {
            meal,
            foods,
            totals,
            summary,
        }))
    }

    async fn cancel_open(&self, user_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let Some(meal) = meals::latest_open_tx(&mut tx, user_id).await? else {
            return Ok(None);
        };
        // pending_meal_id is cleared by ON DELETE SET NULL
        meals::delete_tx(&mut tx, meal.id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(Some(meal))
    }

    async fn delete_last_committed(&self, user_id: Uuid) -> anyhow::Result<Option<DeletedMeal>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let Some(meal) = meals::latest_committed(&mut *tx, user_id, None).await? else {
            return Ok(None);
        };
        let foods = meals::foods(&mut *tx, meal.id).await?;
        let totals = meal_totals(&foods);
        let summary =
            ledger::repo::reverse_tx(&mut tx, user_id, meal.ledger_date(), &totals).await?;

        let previous = meals::latest_committed(&mut *tx, user_id, Some(meal.id)).await?;
        users::repo::set_last_meal_tx(&mut tx, user_id, previous.map(|m| m.id)).await?;
        meals::delete_tx(&mut tx, meal.id).await?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(DeletedMeal {
            meal,
            totals,
            summary,
        }))
    }

    async fn recategorize_last(
        &self,
        user_id: Uuid,
        category: MealCategory,
    ) -> anyhow::Result<Option<Meal>> {
        let Some(meal) = meals::latest_committed(&self.db, user_id, None).await? else {
            return Ok(None);
        };
        meals::set_category(&self.db, meal.id, category).await
    }

    async fn last_committed(&self, user_id: Uuid) -> anyhow::Result<Option<Meal>> {
        meals::latest_committed(&self.db, user_id, None).await
    }

    async fn daily_summary(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> anyhow::Result<Option<DailySummary>> {
        ledger::repo::get(&self.db, user_id, date).await
    }

    async fn active_goal(&self, user_id: Uuid, kind: GoalKind) -> anyhow::Result<Option<Goal>> {
        users::repo::active_goal(&self.db, user_id, kind).await
    }

    async fn set_goal(&self, user_id: Uuid, kind: GoalKind, target: f64) -> anyhow::Result<Goal> {
        users::repo::replace_goal(&self.db, user_id, kind, target).await
    }
}
