//! Meal intake state machine: photo to draft, recognition, allergen gate,
//! nutrient lookup, category confirmation and ledger commit, plus cancel,
//! delete and recategorize.
//!
//! Every inbound message runs under the sender's lock, so at most one
//! transition per user is in flight.

pub mod command;
pub mod locks;
pub mod render;

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::allergens::{self, Restrictions};
use crate::meals::repo_types::{
    AnalyzedFood, FailureReason, Meal, MealCategory, MealStatus, NewMeal,
};
use crate::messaging::Messenger;
use crate::nutrients::{estimate, NutrientSource};
use crate::storage::{self, StorageClient};
use crate::store::MealStore;
use crate::users::{normalize_address, GoalKind, User};
use crate::vision::{self, FoodCandidate, FoodRecognizer, Photo};

use command::Command;
use locks::UserLocks;

/// What a message did. Returned to the HTTP layer and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    AwaitingCategory { meal_id: Uuid, foods: usize },
    NoFood { meal_id: Uuid },
    RecognitionFailed { meal_id: Uuid },
    Blocked { meal_id: Uuid, allergens: Vec<&'static str> },
    PersistenceFailed { meal_id: Uuid },
    /// A second photo arrived while a meal still waits for its category.
    PhotoRejected { pending_meal_id: Uuid },
    Committed { meal_id: Uuid, category: MealCategory },
    Reprompted { meal_id: Uuid },
    NothingPending,
    Cancelled { meal_id: Uuid },
    NothingToCancel,
    Deleted { meal_id: Uuid },
    NothingToDelete,
    Recategorized { meal_id: Uuid, category: MealCategory },
    NothingToUpdate,
    Details { pages: usize },
    Summary,
    RestrictionsUpdated,
    GoalSet,
    Replied,
}

/// Inbound photo plus where it came from.
#[derive(Debug, Clone)]
pub struct PhotoMessage {
    pub photo: Photo,
    pub source_url: Option<String>,
    pub note: Option<String>,
}

pub struct MealPipeline {
    store: Arc<dyn MealStore>,
    recognizer: Arc<dyn FoodRecognizer>,
    nutrients: Arc<dyn NutrientSource>,
    messenger: Arc<dyn Messenger>,
    storage: Option<Arc<dyn StorageClient>>,
    locks: UserLocks,
}

impl MealPipeline {
    pub fn new(
        store: Arc<dyn MealStore>,
        recognizer: Arc<dyn FoodRecognizer>,
        nutrients: Arc<dyn NutrientSource>,
        messenger: Arc<dyn Messenger>,
        storage: Option<Arc<dyn StorageClient>>,
    ) -> Self {
        Self {
            store,
            recognizer,
            nutrients,
            messenger,
            storage,
            locks: UserLocks::new(),
        }
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    /// Entry point for a photo. Unexpected failures are reported to the user
    /// before being returned.
    #[instrument(skip(self, msg))]
    pub async fn handle_photo(&self, address: &str, msg: PhotoMessage) -> anyhow::Result<Outcome> {
        let address = normalize_address(address);
        let _guard = self.locks.lock(&address).await;
        let res = self.intake(&address, msg).await;
        self.report_failure(&address, res).await
    }

    /// Entry point for a text message.
    #[instrument(skip(self, text))]
    pub async fn handle_text(&self, address: &str, text: &str) -> anyhow::Result<Outcome> {
        let address = normalize_address(address);
        let _guard = self.locks.lock(&address).await;
        let res = self.text(&address, text).await;
        self.report_failure(&address, res).await
    }

    async fn report_failure(
        &self,
        address: &str,
        res: anyhow::Result<Outcome>,
    ) -> anyhow::Result<Outcome> {
        if let Err(e) = &res {
            error!(error = %e, "message handling failed");
            self.messenger
                .send(address, render::SOMETHING_WENT_WRONG)
                .await;
        }
        res
    }

    async fn intake(&self, address: &str, msg: PhotoMessage) -> anyhow::Result<Outcome> {
        let user = self.store.user(address).await?;

        if let Some(pending) = self.pending_meal(&user).await? {
            if pending.status == MealStatus::AwaitingCategory {
                info!(user_id = %user.id, meal_id = %pending.id, "photo rejected, meal still awaiting category");
                self.messenger.send(address, render::PENDING_FIRST).await;
                return Ok(Outcome::PhotoRejected {
                    pending_meal_id: pending.id,
                });
            }
            // Nothing else is in flight under the lock, so an earlier intake
            // stopped midway.
            warn!(user_id = %user.id, meal_id = %pending.id, status = pending.status.as_str(), "failing stranded meal");
            self.store
                .fail_meal(user.id, pending.id, FailureReason::PersistenceError)
                .await?;
        }

        self.messenger.send(address, render::ANALYZING).await;

        let photo_ref = self.store_photo(user.id, &msg).await;
        let note = msg.note.filter(|n| !n.trim().is_empty());
        let meal = self
            .store
            .create_draft(NewMeal {
                user_id: user.id,
                photo_ref,
                note: note.clone(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;
        info!(user_id = %user.id, meal_id = %meal.id, "draft created");

        match self.analyze(address, &user, &meal, &msg.photo, note.as_deref()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(meal_id = %meal.id, error = %e, "intake failed after draft");
                if let Err(e) = self
                    .store
                    .fail_meal(user.id, meal.id, FailureReason::PersistenceError)
                    .await
                {
                    error!(meal_id = %meal.id, error = %e, "failed to mark meal failed");
                }
                self.messenger.send(address, render::SAVE_FAILED).await;
                Ok(Outcome::PersistenceFailed { meal_id: meal.id })
            }
        }
    }

    /// Drives a fresh draft to `awaiting_category` or a failed state. Errors
    /// leave the draft for the caller to fail.
    async fn analyze(
        &self,
        address: &str,
        user: &User,
        meal: &Meal,
        photo: &Photo,
        note: Option<&str>,
    ) -> anyhow::Result<Outcome> {
        let candidates = match self.recognizer.recognize(photo, note).await {
            Ok(c) => c,
            Err(e) => {
                warn!(meal_id = %meal.id, error = %e, "recognition failed");
                self.store
                    .fail_meal(user.id, meal.id, FailureReason::RecognitionError)
                    .await?;
                self.messenger.send(address, render::RECOGNITION_FAILED).await;
                return Ok(Outcome::RecognitionFailed { meal_id: meal.id });
            }
        };
        self.store
            .mark_recognized(meal.id, serde_json::to_value(&candidates)?)
            .await?;

        if vision::is_no_food(&candidates) {
            info!(meal_id = %meal.id, candidates = candidates.len(), "no food detected");
            self.store
                .fail_meal(user.id, meal.id, FailureReason::NoFood)
                .await?;
            self.messenger.send(address, render::NO_FOOD).await;
            return Ok(Outcome::NoFood { meal_id: meal.id });
        }

        let restrictions = Restrictions::parse(user.restrictions.as_deref().unwrap_or_default());
        let screen = allergens::screen(&candidates, &restrictions);
        if screen.is_blocked() {
            info!(meal_id = %meal.id, summary = %screen.summary, "meal blocked by restrictions");
            self.store
                .fail_meal(user.id, meal.id, FailureReason::AllergenBlocked)
                .await?;
            let alert = screen
                .alert_message()
                .unwrap_or_else(|| screen.summary.clone());
            self.messenger.send(address, &alert).await;
            let mut allergens: Vec<&'static str> = Vec::new();
            for v in &screen.violations {
                if !allergens.contains(&v.allergen) {
                    allergens.push(v.allergen);
                }
            }
            return Ok(Outcome::Blocked {
                meal_id: meal.id,
                allergens,
            });
        }

        let analyzed = self.lookup_all(&candidates).await;
        let foods = self.store.store_analysis(meal.id, analyzed).await?;

        info!(meal_id = %meal.id, foods = foods.len(), "meal awaiting category");
        self.messenger
            .send(address, &render::detected_foods(&foods))
            .await;
        Ok(Outcome::AwaitingCategory {
            meal_id: meal.id,
            foods: foods.len(),
        })
    }

    /// Lookup errors fall back to the local estimate for that food.
    async fn lookup_all(&self, candidates: &[FoodCandidate]) -> Vec<AnalyzedFood> {
        let mut out = Vec::with_capacity(candidates.len());
        for c in candidates {
            let nutrients = match self.nutrients.lookup(&c.name, c.mass_g).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(food = %c.name, error = %e, "nutrient lookup failed, using estimate");
                    estimate::estimate(&c.name, c.mass_g)
                }
            };
            out.push(AnalyzedFood {
                name: c.name.clone(),
                mass_g: c.mass_g,
                confidence: c.confidence,
                nutrients,
            });
        }
        out
    }

    /// Uploads the photo when storage is configured. Falls back to the source
    /// URL on failure.
    async fn store_photo(&self, user_id: Uuid, msg: &PhotoMessage) -> Option<String> {
        let Some(storage) = &self.storage else {
            return msg.source_url.clone();
        };
        let key = storage::photo_key(user_id, &msg.photo.content_type);
        match storage
            .put_object(&key, msg.photo.body.clone(), &msg.photo.content_type)
            .await
        {
            Ok(()) => Some(key),
            Err(e) => {
                warn!(error = %e, "photo upload failed");
                msg.source_url.clone()
            }
        }
    }

    async fn remove_photo(&self, meal: &Meal) {
        let (Some(storage), Some(key)) = (&self.storage, meal.photo_ref.as_deref()) else {
            return;
        };
        if !storage::is_stored_key(key) {
            return;
        }
        if let Err(e) = storage.delete_object(key).await {
            warn!(meal_id = %meal.id, error = %e, "failed to delete photo");
        }
    }

    /// The meal the pending pointer refers to, if it is still open.
    async fn pending_meal(&self, user: &User) -> anyhow::Result<Option<Meal>> {
        let Some(id) = user.pending_meal_id else {
            return Ok(None);
        };
        Ok(self.store.meal(id).await?.filter(|m| m.status.is_open()))
    }

    async fn awaiting_category(&self, user: &User) -> anyhow::Result<Option<Meal>> {
        Ok(self
            .pending_meal(user)
            .await?
            .filter(|m| m.status == MealStatus::AwaitingCategory))
    }

    async fn text(&self, address: &str, text: &str) -> anyhow::Result<Outcome> {
        let user = self.store.user(address).await?;
        let command = Command::parse(text);
        debug!(user_id = %user.id, ?command, "text message");

        if let Some(pending) = self.awaiting_category(&user).await? {
            match command {
                Command::ChangeCategory(Some(category)) => {
                    return self.commit(address, &user, &pending, category).await;
                }
                Command::ChangeCategory(None) | Command::Unrecognized => {
                    return match MealCategory::parse_reply(text) {
                        Some(category) => self.commit(address, &user, &pending, category).await,
                        None => {
                            self.messenger.send(address, render::CATEGORY_REPROMPT).await;
                            Ok(Outcome::Reprompted {
                                meal_id: pending.id,
                            })
                        }
                    };
                }
                _ => {}
            }
        }

        self.run(address, &user, command).await
    }

    async fn run(&self, address: &str, user: &User, command: Command) -> anyhow::Result<Outcome> {
        match command {
            Command::Cancel => self.cancel(address, user).await,
            Command::DeleteLast => self.delete_last(address, user).await,
            Command::ChangeCategory(Some(category)) => {
                match self.store.recategorize_last(user.id, category).await? {
                    Some(meal) => {
                        info!(meal_id = %meal.id, category = category.as_str(), "meal recategorized");
                        self.messenger
                            .send(address, &render::recategorized(&meal))
                            .await;
                        Ok(Outcome::Recategorized {
                            meal_id: meal.id,
                            category,
                        })
                    }
                    None => {
                        self.messenger.send(address, render::NOTHING_TO_UPDATE).await;
                        Ok(Outcome::NothingToUpdate)
                    }
                }
            }
            Command::ChangeCategory(None) => {
                self.messenger.send(address, render::CHANGE_TO_USAGE).await;
                Ok(Outcome::Replied)
            }
            Command::Details => self.details(address, user).await,
            Command::Today => self.today(address, user).await,
            Command::SetRestrictions(list) => {
                let parsed = Restrictions::parse(&list);
                if parsed.is_empty() {
                    self.messenger
                        .send(address, &render::restrictions_unknown())
                        .await;
                    return Ok(Outcome::Replied);
                }
                self.store
                    .set_restrictions(user.id, Some(parsed.to_list()))
                    .await?;
                info!(user_id = %user.id, restrictions = %parsed.to_list(), "restrictions updated");
                self.messenger
                    .send(address, &render::restrictions_saved(&parsed))
                    .await;
                Ok(Outcome::RestrictionsUpdated)
            }
            Command::ShowRestrictions => {
                let current =
                    Restrictions::parse(user.restrictions.as_deref().unwrap_or_default());
                self.messenger
                    .send(address, &render::restrictions_current(&current))
                    .await;
                Ok(Outcome::Replied)
            }
            Command::ClearRestrictions => {
                self.store.set_restrictions(user.id, None).await?;
                self.messenger
                    .send(address, render::restrictions_cleared())
                    .await;
                Ok(Outcome::RestrictionsUpdated)
            }
            Command::SetGoal { kind, target } => {
                let goal = self.store.set_goal(user.id, kind, target).await?;
                info!(user_id = %user.id, kind = kind.as_str(), target, "goal set");
                self.messenger
                    .send(address, &render::goal_saved(&goal))
                    .await;
                Ok(Outcome::GoalSet)
            }
            Command::Help | Command::Unrecognized => {
                self.messenger.send(address, &render::help()).await;
                Ok(Outcome::Replied)
            }
        }
    }

    async fn commit(
        &self,
        address: &str,
        user: &User,
        pending: &Meal,
        category: MealCategory,
    ) -> anyhow::Result<Outcome> {
        let Some(committed) = self
            .store
            .commit_meal(user.id, pending.id, category)
            .await?
        else {
            self.messenger.send(address, render::NOTHING_PENDING).await;
            return Ok(Outcome::NothingPending);
        };
        info!(
            meal_id = %committed.meal.id,
            category = category.as_str(),
            calories = committed.totals.calories,
            "meal committed"
        );

        let goal = self
            .store
            .active_goal(user.id, GoalKind::CalorieTarget)
            .await?;
        self.messenger
            .send(address, &render::confirmation(&committed, goal.as_ref()))
            .await;
        Ok(Outcome::Committed {
            meal_id: committed.meal.id,
            category,
        })
    }

    async fn cancel(&self, address: &str, user: &User) -> anyhow::Result<Outcome> {
        match self.store.cancel_open(user.id).await? {
            Some(meal) => {
                info!(meal_id = %meal.id, "meal cancelled");
                self.remove_photo(&meal).await;
                self.messenger.send(address, render::CANCELLED).await;
                Ok(Outcome::Cancelled { meal_id: meal.id })
            }
            None => {
                self.messenger.send(address, render::NOTHING_TO_CANCEL).await;
                Ok(Outcome::NothingToCancel)
            }
        }
    }

    async fn delete_last(&self, address: &str, user: &User) -> anyhow::Result<Outcome> {
        match self.store.delete_last_committed(user.id).await? {
            Some(deleted) => {
                info!(
                    meal_id = %deleted.meal.id,
                    calories = deleted.totals.calories,
                    "committed meal deleted"
                );
                self.remove_photo(&deleted.meal).await;
                self.messenger
                    .send(address, &render::deleted(&deleted))
                    .await;
                Ok(Outcome::Deleted {
                    meal_id: deleted.meal.id,
                })
            }
            None => {
                self.messenger.send(address, render::NOTHING_TO_DELETE).await;
                Ok(Outcome::NothingToDelete)
            }
        }
    }

    async fn details(&self, address: &str, user: &User) -> anyhow::Result<Outcome> {
        let Some(meal) = self.store.last_committed(user.id).await? else {
            self.messenger.send(address, render::NO_MEALS_YET).await;
            return Ok(Outcome::Details { pages: 0 });
        };
        let foods = self.store.meal_foods(meal.id).await?;
        let pages = render::detail_pages(&meal, &foods);
        for page in &pages {
            self.messenger.send(address, page).await;
        }
        Ok(Outcome::Details { pages: pages.len() })
    }

    async fn today(&self, address: &str, user: &User) -> anyhow::Result<Outcome> {
        let date = OffsetDateTime::now_utc().date();
        let summary = self.store.daily_summary(user.id, date).await?;
        let goal = match self
            .store
            .active_goal(user.id, GoalKind::CalorieTarget)
            .await?
        {
            Some(g) => Some(g),
            None => {
                self.store
                    .active_goal(user.id, GoalKind::ProteinTarget)
                    .await?
            }
        };
        self.messenger
            .send(address, &render::today(summary.as_ref(), goal.as_ref()))
            .await;
        Ok(Outcome::Summary)
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::error::{ClientError, ClientResult};
    use crate::ledger::DailySummary;
    use crate::nutrients::NutrientProfile;
    use crate::store::MemoryStore;

    const ADDR: &str = "+15550100";

    enum Reply {
        Foods(Vec<FoodCandidate>),
        Fail,
    }

    #[derive(Default)]
    struct ScriptedRecognizer {
        replies: Mutex<VecDeque<Reply>>,
    }

    impl ScriptedRecognizer {
        fn push(&self, reply: Reply) {
            self.replies.lock().unwrap().push_back(reply);
        }
    }

    #[async_trait]
    impl FoodRecognizer for ScriptedRecognizer {
        async fn recognize(&self, _photo: &Photo, _note: Option<&str>) -> ClientResult<Vec<FoodCandidate>> {
            match self.replies.lock().unwrap().pop_front() {
                Some(Reply::Foods(f)) => Ok(f),
                Some(Reply::Fail) => Err(ClientError::parse("vision", "garbled")),
                None => Ok(vec![]),
            }
        }
    }

    /// Fixed profiles by name; unknown names fail like an unreachable service.
    #[derive(Default)]
    struct TableNutrients {
        table: HashMap<String, NutrientProfile>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NutrientSource for TableNutrients {
        async fn lookup(&self, name: &str, _mass_g: f64) -> ClientResult<NutrientProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table
                .get(name)
                .cloned()
                .ok_or(ClientError::NotConfigured("table"))
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: tokio::sync::Mutex<Vec<(String, String)>>,
    }

    impl RecordingMessenger {
        async fn last(&self) -> String {
            self.sent
                .lock()
                .await
                .last()
                .map(|(_, t)| t.clone())
                .unwrap_or_default()
        }

        async fn all(&self) -> Vec<String> {
            self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, to: &str, text: &str) {
            self.sent.lock().await.push((to.to_string(), text.to_string()));
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        puts: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageClient for RecordingStorage {
        async fn put_object(&self, key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
            self.puts.lock().unwrap().push(key.to_string());
            Ok(())
        }
        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.deletes.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    struct Harness {
        pipeline: MealPipeline,
        store: Arc<MemoryStore>,
        recognizer: Arc<ScriptedRecognizer>,
        nutrients: Arc<TableNutrients>,
        messenger: Arc<RecordingMessenger>,
        storage: Arc<RecordingStorage>,
    }

    fn harness() -> Harness {
        let mut table = HashMap::new();
        table.insert(
            "rice".to_string(),
            NutrientProfile::basic(200.0, 4.0, 44.0, 1.0, 1.0, 0.0, 5.0),
        );
        table.insert(
            "grilled chicken".to_string(),
            NutrientProfile::basic(250.0, 30.0, 0.0, 12.0, 0.0, 0.0, 90.0),
        );
        table.insert(
            "lasagna".to_string(),
            NutrientProfile::basic(500.0, 25.0, 40.0, 22.0, 3.0, 6.0, 800.0),
        );

        let store = Arc::new(MemoryStore::new());
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let nutrients = Arc::new(TableNutrients {
            table,
            calls: AtomicUsize::new(0),
        });
        let messenger = Arc::new(RecordingMessenger::default());
        let storage = Arc::new(RecordingStorage::default());

        let pipeline = MealPipeline::new(
            store.clone(),
            recognizer.clone(),
            nutrients.clone(),
            messenger.clone(),
            Some(storage.clone() as Arc<dyn StorageClient>),
        );
        Harness {
            pipeline,
            store,
            recognizer,
            nutrients,
            messenger,
            storage,
        }
    }

    fn food(name: &str, mass_g: f64, confidence: f64) -> FoodCandidate {
        FoodCandidate {
            name: name.into(),
            mass_g,
            confidence,
            ingredients: vec![],
        }
    }

    fn photo() -> PhotoMessage {
        PhotoMessage {
            photo: Photo {
                body: Bytes::from_static(b"\xff\xd8\xff"),
                content_type: "image/jpeg".into(),
            },
            source_url: Some("https://api.twilio.com/media/ME1".into()),
            note: None,
        }
    }

    impl Harness {
        async fn send_photo(&self, foods: Vec<FoodCandidate>) -> Outcome {
            self.recognizer.push(Reply::Foods(foods));
            self.pipeline.handle_photo(ADDR, photo()).await.unwrap()
        }

        async fn text(&self, text: &str) -> Outcome {
            self.pipeline.handle_text(ADDR, text).await.unwrap()
        }

        async fn user(&self) -> User {
            self.store.user(&normalize_address(ADDR)).await.unwrap()
        }

        async fn summary_for(&self, meal_id: Uuid) -> Option<DailySummary> {
            let meal = self.store.meal(meal_id).await.unwrap().unwrap();
            let user = self.user().await;
            self.store
                .daily_summary(user.id, meal.ledger_date())
                .await
                .unwrap()
        }

        async fn status(&self, meal_id: Uuid) -> Option<MealStatus> {
            self.store.meal(meal_id).await.unwrap().map(|m| m.status)
        }

        fn lookups(&self) -> usize {
            self.nutrients.calls.load(Ordering::SeqCst)
        }
    }

    fn meal_id(outcome: &Outcome) -> Uuid {
        match outcome {
            Outcome::AwaitingCategory { meal_id, .. }
            | Outcome::NoFood { meal_id }
            | Outcome::RecognitionFailed { meal_id }
            | Outcome::Blocked { meal_id, .. }
            | Outcome::PersistenceFailed { meal_id }
            | Outcome::Committed { meal_id, .. } => *meal_id,
            other => panic!("no meal id in {other:?}"),
        }
    }

    #[tokio::test]
    async fn two_foods_commit_as_lunch() {
        let h = harness();
        let out = h
            .send_photo(vec![food("rice", 180.0, 0.9), food("grilled chicken", 150.0, 0.85)])
            .await;
        assert!(matches!(out, Outcome::AwaitingCategory { foods: 2, .. }));
        let id = meal_id(&out);
        assert_eq!(h.status(id).await, Some(MealStatus::AwaitingCategory));
        assert_eq!(h.user().await.pending_meal_id, Some(id));

        let sent = h.messenger.all().await;
        assert_eq!(sent[0], render::ANALYZING);
        assert!(sent[1].contains("rice (180g)"));
        assert!(sent[1].ends_with(render::CATEGORY_PROMPT));

        let out = h.text("lunch").await;
        assert_eq!(
            out,
            Outcome::Committed {
                meal_id: id,
                category: MealCategory::Lunch
            }
        );
        let summary = h.summary_for(id).await.unwrap();
        assert_eq!(summary.meal_count, 1);
        assert_eq!(summary.total_calories, 450.0);
        assert_eq!(summary.total_protein, 34.0);

        let user = h.user().await;
        assert_eq!(user.last_meal_id, Some(id));
        assert_eq!(user.pending_meal_id, None);
        assert!(h.messenger.last().await.starts_with("Meal logged as Lunch."));
    }

    #[tokio::test]
    async fn shellfish_restriction_blocks_whole_meal() {
        let h = harness();
        assert_eq!(h.text("restrictions: shellfish").await, Outcome::RestrictionsUpdated);
        assert_eq!(h.user().await.restrictions.as_deref(), Some("shellfish"));

        let out = h
            .send_photo(vec![food("shrimp pasta", 300.0, 0.9), food("rice", 100.0, 0.9)])
            .await;
        let id = meal_id(&out);
        assert!(matches!(&out, Outcome::Blocked { allergens, .. } if allergens.contains(&"shellfish")));

        let meal = h.store.meal(id).await.unwrap().unwrap();
        assert_eq!(meal.status, MealStatus::Failed);
        assert_eq!(meal.failure_reason, Some(FailureReason::AllergenBlocked));
        assert_eq!(h.store.food_count(id).await, 0);
        assert_eq!(h.lookups(), 0);
        assert!(h.summary_for(id).await.is_none());
        assert_eq!(h.user().await.pending_meal_id, None);

        let alert = h.messenger.last().await;
        assert!(alert.contains("shrimp pasta: Contains Shellfish (shrimp)"));
        assert!(alert.contains("Safe items: rice"));
    }

    #[tokio::test]
    async fn deleting_only_meal_returns_summary_to_zero() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("lasagna", 350.0, 0.9)]).await);
        h.text("dinner").await;
        assert_eq!(h.summary_for(id).await.unwrap().total_calories, 500.0);

        let user = h.user().await;
        let date = h.store.meal(id).await.unwrap().unwrap().ledger_date();
        assert_eq!(h.text("delete last meal").await, Outcome::Deleted { meal_id: id });

        let summary = h.store.daily_summary(user.id, date).await.unwrap().unwrap();
        assert_eq!(summary.total_calories, 0.0);
        assert_eq!(summary.total_sodium, 0.0);
        assert_eq!(summary.meal_count, 0);
        assert!(h.store.meal(id).await.unwrap().is_none());
        assert_eq!(h.user().await.last_meal_id, None);
        assert_eq!(h.storage.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_reply_reprompts_then_breakfast_commits() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);

        assert_eq!(h.text("xyz").await, Outcome::Reprompted { meal_id: id });
        assert_eq!(h.status(id).await, Some(MealStatus::AwaitingCategory));
        assert_eq!(h.messenger.last().await, render::CATEGORY_REPROMPT);

        assert_eq!(
            h.text("breakfast").await,
            Outcome::Committed {
                meal_id: id,
                category: MealCategory::Breakfast
            }
        );
    }

    #[tokio::test]
    async fn commit_then_delete_restores_prior_summary() {
        let h = harness();
        let first = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        h.text("1").await;
        let before = h.summary_for(first).await.unwrap();

        let second = meal_id(&h.send_photo(vec![food("lasagna", 300.0, 0.9)]).await);
        h.text("3").await;
        assert_eq!(h.summary_for(second).await.unwrap().meal_count, 2);

        h.text("undo").await;
        assert_eq!(h.summary_for(first).await.unwrap(), before);
        assert_eq!(h.user().await.last_meal_id, Some(first));
    }

    #[tokio::test]
    async fn no_food_fails_without_lookups() {
        let h = harness();
        let out = h.send_photo(vec![]).await;
        let id = meal_id(&out);
        assert!(matches!(out, Outcome::NoFood { .. }));
        assert_eq!(h.status(id).await, Some(MealStatus::Failed));
        assert_eq!(h.messenger.last().await, render::NO_FOOD);

        let out = h
            .send_photo(vec![food("blur", 100.0, 0.2), food("shadow", 100.0, 0.3)])
            .await;
        assert!(matches!(out, Outcome::NoFood { .. }));
        assert_eq!(h.lookups(), 0);
        assert_eq!(h.store.food_count(meal_id(&out)).await, 0);
    }

    #[tokio::test]
    async fn recognition_error_fails_meal_with_retry_prompt() {
        let h = harness();
        h.recognizer.push(Reply::Fail);
        let out = h.pipeline.handle_photo(ADDR, photo()).await.unwrap();
        let id = meal_id(&out);
        assert!(matches!(out, Outcome::RecognitionFailed { .. }));
        let meal = h.store.meal(id).await.unwrap().unwrap();
        assert_eq!(meal.failure_reason, Some(FailureReason::RecognitionError));
        assert_eq!(h.messenger.last().await, render::RECOGNITION_FAILED);
        assert_eq!(h.user().await.pending_meal_id, None);
    }

    #[tokio::test]
    async fn lookup_failure_falls_back_to_estimate() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("mystery stew", 250.0, 0.8)]).await);
        assert_eq!(h.lookups(), 1);
        let foods = h.store.meal_foods(id).await.unwrap();
        assert_eq!(
            foods[0].nutrients,
            estimate::estimate("mystery stew", 250.0)
        );
    }

    #[tokio::test]
    async fn storage_failure_marks_persistence_error() {
        let h = harness();
        h.store.fail_next("store_analysis");
        let out = h.send_photo(vec![food("rice", 150.0, 0.9)]).await;
        let id = meal_id(&out);
        assert!(matches!(out, Outcome::PersistenceFailed { .. }));
        let meal = h.store.meal(id).await.unwrap().unwrap();
        assert_eq!(meal.failure_reason, Some(FailureReason::PersistenceError));
        assert_eq!(h.store.food_count(id).await, 0);
        assert_eq!(h.messenger.last().await, render::SAVE_FAILED);
    }

    #[tokio::test]
    async fn store_error_after_draft_fails_the_meal() {
        let h = harness();
        h.store.fail_next("mark_recognized");
        let out = h.send_photo(vec![food("rice", 150.0, 0.9)]).await;
        let first = meal_id(&out);
        assert!(matches!(out, Outcome::PersistenceFailed { .. }));
        let meal = h.store.meal(first).await.unwrap().unwrap();
        assert_eq!(meal.status, MealStatus::Failed);
        assert_eq!(meal.failure_reason, Some(FailureReason::PersistenceError));
        assert_eq!(h.user().await.pending_meal_id, None);
        assert_eq!(h.messenger.last().await, render::SAVE_FAILED);

        let second = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        assert_eq!(h.text("cancel").await, Outcome::Cancelled { meal_id: second });
        assert_eq!(h.text("cancel").await, Outcome::NothingToCancel);
    }

    #[tokio::test]
    async fn stranded_draft_is_failed_before_next_photo() {
        let h = harness();
        h.store.fail_next("mark_recognized");
        h.store.fail_next("fail_meal");
        let first = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        assert_eq!(h.status(first).await, Some(MealStatus::Draft));
        assert_eq!(h.user().await.pending_meal_id, Some(first));

        let out = h.send_photo(vec![food("rice", 150.0, 0.9)]).await;
        let second = meal_id(&out);
        assert!(matches!(out, Outcome::AwaitingCategory { .. }));
        assert_eq!(h.status(first).await, Some(MealStatus::Failed));
        assert_eq!(h.user().await.pending_meal_id, Some(second));

        assert_eq!(h.text("cancel").await, Outcome::Cancelled { meal_id: second });
        assert_eq!(h.text("cancel").await, Outcome::NothingToCancel);
    }

    #[tokio::test]
    async fn cancel_and_delete_report_nothing_to_do() {
        let h = harness();
        assert_eq!(h.text("cancel").await, Outcome::NothingToCancel);
        assert_eq!(h.messenger.last().await, render::NOTHING_TO_CANCEL);
        assert_eq!(h.text("delete").await, Outcome::NothingToDelete);
        assert_eq!(h.messenger.last().await, render::NOTHING_TO_DELETE);
    }

    #[tokio::test]
    async fn cancel_removes_pending_meal_and_photo() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        let key = h.storage.puts.lock().unwrap()[0].clone();
        assert_eq!(h.store.meal(id).await.unwrap().unwrap().photo_ref, Some(key.clone()));

        assert_eq!(h.text("cancel").await, Outcome::Cancelled { meal_id: id });
        assert!(h.store.meal(id).await.unwrap().is_none());
        assert_eq!(h.user().await.pending_meal_id, None);
        assert_eq!(*h.storage.deletes.lock().unwrap(), vec![key]);

        let out = h.send_photo(vec![food("rice", 150.0, 0.9)]).await;
        assert!(matches!(out, Outcome::AwaitingCategory { .. }));
    }

    #[tokio::test]
    async fn cancel_does_not_touch_committed_meals() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        h.text("snack").await;
        assert_eq!(h.text("stop").await, Outcome::NothingToCancel);
        assert_eq!(h.status(id).await, Some(MealStatus::Committed));
        assert_eq!(h.summary_for(id).await.unwrap().meal_count, 1);
    }

    #[tokio::test]
    async fn second_photo_is_rejected_while_awaiting_category() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        let out = h.send_photo(vec![food("lasagna", 300.0, 0.9)]).await;
        assert_eq!(out, Outcome::PhotoRejected { pending_meal_id: id });
        assert_eq!(h.messenger.last().await, render::PENDING_FIRST);
        assert_eq!(h.user().await.pending_meal_id, Some(id));
        assert_eq!(h.lookups(), 1);
    }

    #[tokio::test]
    async fn concurrent_photos_are_serialized() {
        let h = harness();
        h.recognizer.push(Reply::Foods(vec![food("rice", 150.0, 0.9)]));
        h.recognizer.push(Reply::Foods(vec![food("lasagna", 300.0, 0.9)]));

        let (a, b) = tokio::join!(
            h.pipeline.handle_photo(ADDR, photo()),
            h.pipeline.handle_photo("whatsapp:+15550100", photo()),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let accepted = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::AwaitingCategory { .. }))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::PhotoRejected { .. }))
            .count();
        assert_eq!((accepted, rejected), (1, 1));
    }

    #[tokio::test]
    async fn change_to_while_pending_commits_with_that_category() {
        let h = harness();
        let id = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        assert_eq!(
            h.text("change to dinner").await,
            Outcome::Committed {
                meal_id: id,
                category: MealCategory::Dinner
            }
        );
    }

    #[tokio::test]
    async fn change_to_retargets_last_committed_meal() {
        let h = harness();
        assert_eq!(h.text("change to lunch").await, Outcome::NothingToUpdate);

        let id = meal_id(&h.send_photo(vec![food("rice", 150.0, 0.9)]).await);
        h.text("breakfast").await;
        let before = h.summary_for(id).await.unwrap();

        assert_eq!(
            h.text("change to snack").await,
            Outcome::Recategorized {
                meal_id: id,
                category: MealCategory::Snack
            }
        );
        let meal = h.store.meal(id).await.unwrap().unwrap();
        assert_eq!(meal.category, MealCategory::Snack);
        assert_eq!(meal.status, MealStatus::Committed);
        assert_eq!(h.summary_for(id).await.unwrap(), before);
        assert_eq!(
            h.messenger.last().await,
            "Updated! Your last meal is now logged as Snack."
        );
    }

    #[tokio::test]
    async fn details_and_today_after_commit() {
        let h = harness();
        assert_eq!(h.text("details").await, Outcome::Details { pages: 0 });
        assert_eq!(h.messenger.last().await, render::NO_MEALS_YET);

        let foods: Vec<FoodCandidate> = (0..6).map(|_| food("rice", 100.0, 0.9)).collect();
        h.send_photo(foods).await;
        h.text("lunch").await;
        assert_eq!(h.text("details").await, Outcome::Details { pages: 2 });
        assert!(h.messenger.last().await.starts_with("Lunch details (page 2/2)"));

        assert_eq!(h.text("my goal is 2000 calories").await, Outcome::GoalSet);
        assert_eq!(h.text("today").await, Outcome::Summary);
        let msg = h.messenger.last().await;
        assert!(msg.starts_with("Today: 1 meal\n1200 cal"));
        assert!(msg.contains("Goal: 2000 calories"));
    }

    #[tokio::test]
    async fn goal_shows_in_confirmation() {
        let h = harness();
        h.text("set calorie goal 1000").await;
        h.send_photo(vec![food("lasagna", 300.0, 0.9)]).await;
        h.text("dinner").await;
        let msg = h.messenger.last().await;
        assert!(msg.contains("Goal: 1000 calories\nProgress: 50%\n500 calories remaining\nGreat progress!"));
    }

    #[tokio::test]
    async fn unknown_text_without_pending_meal_gets_help() {
        let h = harness();
        assert_eq!(h.text("what's for dinner tonight?").await, Outcome::Replied);
        assert_eq!(h.messenger.last().await, render::help());
    }
}
