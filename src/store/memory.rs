use std::collections::HashMap;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::MealStore;
use crate::ledger::DailySummary;
use crate::meals::repo_types::{
    meal_totals, AnalyzedFood, CommittedMeal, DeletedMeal, FailureReason, FoodEntry, FoodItem,
    Meal, MealCategory, MealStatus, NewMeal,
};
use crate::users::{Goal, GoalKind, User};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    by_address: HashMap<String, Uuid>,
    /// Insertion order breaks timestamp ties.
    meals: Vec<Meal>,
    foods: HashMap<Uuid, Vec<FoodEntry>>,
    summaries: HashMap<(Uuid, Date), DailySummary>,
    goals: Vec<Goal>,
}

impl Inner {
    fn meal_mut(&mut self, meal_id: Uuid) -> anyhow::Result<&mut Meal> {
        self.meals
            .iter_mut()
            .find(|m| m.id == meal_id)
            .ok_or_else(|| anyhow::anyhow!("meal {meal_id} not found"))
    }

    fn user_mut(&mut self, user_id: Uuid) -> anyhow::Result<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))
    }

    fn latest(&self, user_id: Uuid, pred: impl Fn(&Meal) -> bool) -> Option<&Meal> {
        self.meals
            .iter()
            .enumerate()
            .filter(|(_, m)| m.user_id == user_id && pred(*m))
            .max_by_key(|(i, m)| (m.created_at, *i))
            .map(|(_, m)| m)
    }

    fn remove_meal(&mut self, meal_id: Uuid) {
        self.meals.retain(|m| m.id != meal_id);
        self.foods.remove(&meal_id);
        for user in self.users.values_mut() {
            if user.pending_meal_id == Some(meal_id) {
                user.pending_meal_id = None;
            }
            if user.last_meal_id == Some(meal_id) {
                user.last_meal_id = None;
            }
        }
    }
}

/// Process-local store. Every method takes one lock, so each call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Operations whose next call fails before touching any state.
    fail_next: std::sync::Mutex<Vec<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of the named operation (`"mark_recognized"`,
    /// `"fail_meal"`, `"store_analysis"`) fail without writing anything.
    #[cfg(test)]
    pub fn fail_next(&self, op: &'static str) {
        self.fail_next
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(op);
    }

    fn injected(&self, op: &'static str) -> anyhow::Result<()> {
        let mut ops = self.fail_next.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(i) = ops.iter().position(|o| *o == op) {
            ops.remove(i);
            anyhow::bail!("injected {op} failure");
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn food_count(&self, meal_id: Uuid) -> usize {
        let inner = self.inner.lock().await;
        inner.foods.get(&meal_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MealStore for MemoryStore {
    async fn user(&self, address: &str) -> anyhow::Result<User> {
        let mut inner = self.inner.lock().await;
        if let Some(id) = inner.by_address.get(address).copied() {
            return Ok(inner.user_mut(id)?.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            address: address.to_string(),
            restrictions: None,
            last_meal_id: None,
            pending_meal_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.by_address.insert(user.address.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_restrictions(
        &self,
        user_id: Uuid,
        restrictions: Option<String>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.user_mut(user_id)?.restrictions = restrictions;
        Ok(())
    }

    async fn meal(&self, meal_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let inner = self.inner.lock().await;
        Ok(inner.meals.iter().find(|m| m.id == meal_id).cloned())
    }

    async fn meal_foods(&self, meal_id: Uuid) -> anyhow::Result<Vec<FoodEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner.foods.get(&meal_id).cloned().unwrap_or_default())
    }

    async fn create_draft(&self, new: NewMeal) -> anyhow::Result<Meal> {
        let mut inner = self.inner.lock().await;
        let meal = Meal {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            category: MealCategory::Uncategorized,
            status: MealStatus::Draft,
            failure_reason: None,
            photo_ref: new.photo_ref,
            note: new.note,
            vision_raw: None,
            created_at: new.created_at,
        };
        inner.user_mut(new.user_id)?.pending_meal_id = Some(meal.id);
        inner.meals.push(meal.clone());
        Ok(meal)
    }

    async fn mark_recognized(
        &self,
        meal_id: Uuid,
        vision_raw: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.injected("mark_recognized")?;
        let mut inner = self.inner.lock().await;
        let meal = inner.meal_mut(meal_id)?;
        meal.status = MealStatus::Recognized;
        meal.vision_raw = Some(vision_raw);
        Ok(())
    }

    async fn fail_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        reason: FailureReason,
    ) -> anyhow::Result<()> {
        self.injected("fail_meal")?;
        let mut inner = self.inner.lock().await;
        let meal = inner.meal_mut(meal_id)?;
        meal.status = MealStatus::Failed;
        meal.failure_reason = Some(reason);
        let user = inner.user_mut(user_id)?;
        if user.pending_meal_id == Some(meal_id) {
            user.pending_meal_id = None;
        }
        Ok(())
    }

    async fn store_analysis(
        &self,
        meal_id: Uuid,
        foods: Vec<AnalyzedFood>,
    ) -> anyhow::Result<Vec<FoodEntry>> {
        self.injected("store_analysis")?;
        let mut inner = self.inner.lock().await;
        let meal = inner.meal_mut(meal_id)?;
        if !matches!(meal.status, MealStatus::Draft | MealStatus::Recognized) {
            anyhow::bail!("meal {meal_id} is no longer open");
        }
        meal.status = MealStatus::AwaitingCategory;
        meal.category = MealCategory::Uncategorized;

        let entries: Vec<FoodEntry> = foods
            .into_iter()
            .enumerate()
            .map(|(position, f)| FoodEntry {
                item: FoodItem {
                    id: Uuid::new_v4(),
                    meal_id,
                    position: position as i32,
                    name: f.name,
                    mass_g: f.mass_g,
                    confidence: f.confidence,
                },
                nutrients: f.nutrients,
            })
            .collect();
        inner.foods.insert(meal_id, entries.clone());
        Ok(entries)
    }

    async fn commit_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        category: MealCategory,
    ) -> anyhow::Result<Option<CommittedMeal>> {
        let mut inner = self.inner.lock().await;
        let meal = inner.meal_mut(meal_id)?;
        if meal.status != MealStatus::AwaitingCategory {
            return Ok(None);
        }
        meal.status = MealStatus::Committed;
        meal.category = category;
        let meal = meal.clone();

        let foods = inner.foods.get(&meal_id).cloned().unwrap_or_default();
        let totals = meal_totals(&foods);
        let date = meal.ledger_date();
        let summary = inner
            .summaries
            .entry((user_id, date))
            .or_insert_with(|| DailySummary::empty(user_id, date));
        summary.apply(&totals);
        let summary = summary.clone();

        let user = inner.user_mut(user_id)?;
        user.last_meal_id = Some(meal.id);
        if user.pending_meal_id == Some(meal.id) {
            user.pending_meal_id = None;
        }

        Ok(Some(CommittedMeal {
            meal,
            foods,
            totals,
            summary,
        }))
    }

    async fn cancel_open(&self, user_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let mut inner = self.inner.lock().await;
        let Some(meal) = inner.latest(user_id, |m| m.status.is_open()).cloned() else {
            return Ok(None);
        };
        inner.remove_meal(meal.id);
        Ok(Some(meal))
    }

    async fn delete_last_committed(&self, user_id: Uuid) -> anyhow::Result<Option<DeletedMeal>> {
        let mut inner = self.inner.lock().await;
        let committed = |m: &Meal| m.status == MealStatus::Committed;
        let Some(meal) = inner.latest(user_id, committed).cloned() else {
            return Ok(None);
        };

        let foods = inner.foods.get(&meal.id).cloned().unwrap_or_default();
        let totals = meal_totals(&foods);
        let summary = inner
            .summaries
            .get_mut(&(user_id, meal.ledger_date()))
            .map(|s| {
                s.reverse(&totals);
                s.clone()
            });

        inner.remove_meal(meal.id);
        let previous = inner.latest(user_id, committed).map(|m| m.id);
        inner.user_mut(user_id)?.last_meal_id = previous;

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
        let mut inner = self.inner.lock().await;
        let Some(id) = inner
            .latest(user_id, |m| m.status == MealStatus::Committed)
            .map(|m| m.id)
        else {
            return Ok(None);
        };
        let meal = inner.meal_mut(id)?;
        meal.category = category;
        Ok(Some(meal.clone()))
    }

    async fn last_committed(&self, user_id: Uuid) -> anyhow::Result<Option<Meal>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .latest(user_id, |m| m.status == MealStatus::Committed)
            .cloned())
    }

    async fn daily_summary(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> anyhow::Result<Option<DailySummary>> {
        let inner = self.inner.lock().await;
        Ok(inner.summaries.get(&(user_id, date)).cloned())
    }

    async fn active_goal(&self, user_id: Uuid, kind: GoalKind) -> anyhow::Result<Option<Goal>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .goals
            .iter()
            .rev()
            .find(|g| g.user_id == user_id && g.kind == kind && g.is_active)
            .cloned())
    }

    async fn set_goal(&self, user_id: Uuid, kind: GoalKind, target: f64) -> anyhow::Result<Goal> {
        let mut inner = self.inner.lock().await;
        for g in inner
            .goals
            .iter_mut()
            .filter(|g| g.user_id == user_id && g.kind == kind)
        {
            g.is_active = false;
        }
        let goal = Goal {
            id: Uuid::new_v4(),
            user_id,
            kind,
            target_value: target,
            start_date: OffsetDateTime::now_utc().date(),
            is_active: true,
        };
        inner.goals.push(goal.clone());
        Ok(goal)
    }
}

#[cfg(test)]
mod memory_store_tests {
    use super::*;
    use crate::nutrients::NutrientProfile;

    fn food(name: &str, calories: f64) -> AnalyzedFood {
        AnalyzedFood {
            name: name.into(),
            mass_g: 100.0,
            confidence: 0.9,
            nutrients: NutrientProfile::basic(calories, 10.0, 20.0, 5.0, 2.0, 3.0, 100.0),
        }
    }

    async fn committed_meal(store: &MemoryStore, user: &User, calories: f64) -> CommittedMeal {
        let draft = store
            .create_draft(NewMeal {
                user_id: user.id,
                photo_ref: None,
                note: None,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        store
            .store_analysis(draft.id, vec![food("rice", calories)])
            .await
            .unwrap();
        store
            .commit_meal(user.id, draft.id, MealCategory::Lunch)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn user_is_created_once_per_address() {
        let store = MemoryStore::new();
        let a = store.user("whatsapp:+1").await.unwrap();
        let b = store.user("whatsapp:+1").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn commit_then_delete_restores_summary() {
        let store = MemoryStore::new();
        let user = store.user("whatsapp:+1").await.unwrap();
        let first = committed_meal(&store, &user, 300.0).await;
        let before = first.summary.clone();

        let second = committed_meal(&store, &user, 450.0).await;
        assert_eq!(second.summary.meal_count, 2);
        assert_eq!(second.summary.total_calories, 750.0);

        let deleted = store.delete_last_committed(user.id).await.unwrap().unwrap();
        assert_eq!(deleted.meal.id, second.meal.id);
        assert_eq!(deleted.summary.unwrap(), before);

        let user = store.user("whatsapp:+1").await.unwrap();
        assert_eq!(user.last_meal_id, Some(first.meal.id));
        assert!(store.meal(second.meal.id).await.unwrap().is_none());
        assert!(store.meal_foods(second.meal.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_requires_awaiting_category() {
        let store = MemoryStore::new();
        let user = store.user("whatsapp:+1").await.unwrap();
        let draft = store
            .create_draft(NewMeal {
                user_id: user.id,
                photo_ref: None,
                note: None,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        let res = store
            .commit_meal(user.id, draft.id, MealCategory::Dinner)
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn cancel_leaves_committed_meals_alone() {
        let store = MemoryStore::new();
        let user = store.user("whatsapp:+1").await.unwrap();
        committed_meal(&store, &user, 200.0).await;
        assert!(store.cancel_open(user.id).await.unwrap().is_none());
        assert!(store.last_committed(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = MemoryStore::new();
        let user = store.user("whatsapp:+1").await.unwrap();
        let draft = store
            .create_draft(NewMeal {
                user_id: user.id,
                photo_ref: None,
                note: None,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        store.fail_next("store_analysis");
        assert!(store
            .store_analysis(draft.id, vec![food("rice", 100.0)])
            .await
            .is_err());
        assert_eq!(store.food_count(draft.id).await, 0);
        assert_eq!(
            store.meal(draft.id).await.unwrap().unwrap().status,
            MealStatus::Draft
        );
    }

    #[tokio::test]
    async fn new_goal_replaces_previous() {
        let store = MemoryStore::new();
        let user = store.user("whatsapp:+1").await.unwrap();
        store.set_goal(user.id, GoalKind::CalorieTarget, 1800.0).await.unwrap();
        store.set_goal(user.id, GoalKind::CalorieTarget, 2000.0).await.unwrap();
        let goal = store
            .active_goal(user.id, GoalKind::CalorieTarget)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(goal.target_value, 2000.0);
        assert!(store
            .active_goal(user.id, GoalKind::ProteinTarget)
            .await
            .unwrap()
            .is_none());
    }
}
