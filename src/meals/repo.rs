use anyhow::Context;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{
    AnalyzedFood, FailureReason, FoodEntry, FoodItem, Meal, MealCategory, MealRow, MealStatus,
    NewMeal,
};
use crate::nutrients::NutrientProfile;

const MEAL_COLUMNS: &str =
    "id, user_id, category, status, failure_reason, photo_ref, note, vision_raw, created_at";

/// Statuses an explicit cancel may remove.
const OPEN_STATUSES: [&str; 3] = [
    MealStatus::Draft.as_str(),
    MealStatus::Recognized.as_str(),
    MealStatus::AwaitingCategory.as_str(),
];

#[derive(Debug, FromRow)]
struct FoodEntryRow {
    #[sqlx(flatten)]
    item: FoodItem,
    #[sqlx(flatten)]
    nutrients: NutrientProfile,
}

impl From<FoodEntryRow> for FoodEntry {
    fn from(r: FoodEntryRow) -> Self {
        Self {
            item: r.item,
            nutrients: r.nutrients,
        }
    }
}

pub async fn insert_draft_tx(
    tx: &mut Transaction<'_, Postgres>,
    new: &NewMeal,
) -> anyhow::Result<Meal> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        r#"
        INSERT INTO meals (id, user_id, category, status, photo_ref, note, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.user_id)
    .bind(MealCategory::Uncategorized.as_str())
    .bind(MealStatus::Draft.as_str())
    .bind(&new.photo_ref)
    .bind(&new.note)
    .bind(new.created_at)
    .fetch_one(&mut **tx)
    .await
    .context("insert draft meal")?;
    Meal::try_from(row)
}

pub async fn get(db: &PgPool, meal_id: Uuid) -> anyhow::Result<Option<Meal>> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1"
    ))
    .bind(meal_id)
    .fetch_optional(db)
    .await
    .context("load meal")?;
    row.map(Meal::try_from).transpose()
}

pub async fn mark_recognized(
    db: &PgPool,
    meal_id: Uuid,
    vision_raw: &serde_json::Value,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE meals SET status = $3, vision_raw = $2 WHERE id = $1")
        .bind(meal_id)
        .bind(vision_raw)
        .bind(MealStatus::Recognized.as_str())
        .execute(db)
        .await
        .context("mark meal recognized")?;
    Ok(())
}

pub async fn fail_tx(
    tx: &mut Transaction<'_, Postgres>,
    meal_id: Uuid,
    reason: FailureReason,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE meals SET status = $3, failure_reason = $2 WHERE id = $1")
        .bind(meal_id)
        .bind(reason.as_str())
        .bind(MealStatus::Failed.as_str())
        .execute(&mut **tx)
        .await
        .context("mark meal failed")?;
    Ok(())
}

/// Inserts every food with its nutrient row and parks the meal in
/// `awaiting_category`.
pub async fn store_analysis_tx(
    tx: &mut Transaction<'_, Postgres>,
    meal_id: Uuid,
    foods: &[AnalyzedFood],
) -> anyhow::Result<Vec<FoodEntry>> {
    let mut out = Vec::with_capacity(foods.len());

    for (position, food) in foods.iter().enumerate() {
        let item = sqlx::query_as::<_, FoodItem>(
            r#"
            INSERT INTO food_items (id, meal_id, position, name, mass_g, confidence)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, meal_id, position, name, mass_g, confidence
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meal_id)
        .bind(position as i32)
        .bind(&food.name)
        .bind(food.mass_g)
        .bind(food.confidence)
        .fetch_one(&mut **tx)
        .await
        .context("insert food item")?;

        insert_nutrients_tx(tx, item.id, &food.nutrients).await?;
        out.push(FoodEntry {
            item,
            nutrients: food.nutrients.clone(),
        });
    }

    let updated = sqlx::query(
        r#"
        UPDATE meals SET status = $2, category = $3
         WHERE id = $1 AND status = ANY($4)
        "#,
    )
    .bind(meal_id)
    .bind(MealStatus::AwaitingCategory.as_str())
    .bind(MealCategory::Uncategorized.as_str())
    .bind(&[MealStatus::Draft.as_str(), MealStatus::Recognized.as_str()][..])
    .execute(&mut **tx)
    .await
    .context("park meal for category")?;
    if updated.rows_affected() != 1 {
        anyhow::bail!("meal {meal_id} is no longer open");
    }

    Ok(out)
}

async fn insert_nutrients_tx(
    tx: &mut Transaction<'_, Postgres>,
    food_item_id: Uuid,
    n: &NutrientProfile,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO food_nutrients (
            food_item_id, calories, protein_g, carbs_g, fat_g, fiber_g, sugar_g, sodium_mg,
            potassium_mg, calcium_mg, iron_mg, vitamin_c_mg, vitamin_d_ug, vitamin_a_ug,
            vitamin_b12_ug, magnesium_mg, zinc_mg, phosphorus_mg, cholesterol_mg,
            saturated_fat_g, monounsaturated_fat_g, polyunsaturated_fat_g, folate_ug,
            vitamin_b6_mg, choline_mg, selenium_ug
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
        "#,
    )
    .bind(food_item_id)
    .bind(n.calories)
    .bind(n.protein_g)
    .bind(n.carbs_g)
    .bind(n.fat_g)
    .bind(n.fiber_g)
    .bind(n.sugar_g)
    .bind(n.sodium_mg)
    .bind(n.potassium_mg)
    .bind(n.calcium_mg)
    .bind(n.iron_mg)
    .bind(n.vitamin_c_mg)
    .bind(n.vitamin_d_ug)
    .bind(n.vitamin_a_ug)
    .bind(n.vitamin_b12_ug)
    .bind(n.magnesium_mg)
    .bind(n.zinc_mg)
    .bind(n.phosphorus_mg)
    .bind(n.cholesterol_mg)
    .bind(n.saturated_fat_g)
    .bind(n.monounsaturated_fat_g)
    .bind(n.polyunsaturated_fat_g)
    .bind(n.folate_ug)
    .bind(n.vitamin_b6_mg)
    .bind(n.choline_mg)
    .bind(n.selenium_ug)
    .execute(&mut **tx)
    .await
    .context("insert food nutrients")?;
    Ok(())
}

pub async fn foods<'e, E>(exec: E, meal_id: Uuid) -> anyhow::Result<Vec<FoodEntry>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, FoodEntryRow>(
        r#"
        SELECT fi.id, fi.meal_id, fi.position, fi.name, fi.mass_g, fi.confidence,
               nu.calories, nu.protein_g, nu.carbs_g, nu.fat_g, nu.fiber_g, nu.sugar_g,
               nu.sodium_mg, nu.potassium_mg, nu.calcium_mg, nu.iron_mg, nu.vitamin_c_mg,
               nu.vitamin_d_ug, nu.vitamin_a_ug, nu.vitamin_b12_ug, nu.magnesium_mg,
               nu.zinc_mg, nu.phosphorus_mg, nu.cholesterol_mg, nu.saturated_fat_g,
               nu.monounsaturated_fat_g, nu.polyunsaturated_fat_g, nu.folate_ug,
               nu.vitamin_b6_mg, nu.choline_mg, nu.selenium_ug
          FROM food_items fi
          LEFT JOIN food_nutrients nu ON nu.food_item_id = fi.id
         WHERE fi.meal_id = $1
         ORDER BY fi.position
        "#,
    )
    .bind(meal_id)
    .fetch_all(exec)
    .await
    .context("load meal foods")?;
    Ok(rows.into_iter().map(FoodEntry::from).collect())
}

/// Moves an `awaiting_category` meal to `committed`. `None` if the meal was
/// not awaiting a category.
pub async fn commit_tx(
    tx: &mut Transaction<'_, Postgres>,
    meal_id: Uuid,
    category: MealCategory,
) -> anyhow::Result<Option<Meal>> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        r#"
        UPDATE meals SET status = $3, category = $2
         WHERE id = $1 AND status = $4
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(meal_id)
    .bind(category.as_str())
    .bind(MealStatus::Committed.as_str())
    .bind(MealStatus::AwaitingCategory.as_str())
    .fetch_optional(&mut **tx)
    .await
    .context("commit meal")?;
    row.map(Meal::try_from).transpose()
}

/// Most recent meal of the user that has not reached a terminal status.
pub async fn latest_open_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> anyhow::Result<Option<Meal>> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        r#"
        SELECT {MEAL_COLUMNS} FROM meals
         WHERE user_id = $1 AND status = ANY($2)
         ORDER BY created_at DESC, id DESC
         LIMIT 1
         FOR UPDATE
        "#
    ))
    .bind(user_id)
    .bind(&OPEN_STATUSES[..])
    .fetch_optional(&mut **tx)
    .await
    .context("load open meal")?;
    row.map(Meal::try_from).transpose()
}

/// Most recently committed meal, optionally skipping one id.
pub async fn latest_committed<'e, E>(
    exec: E,
    user_id: Uuid,
    skip: Option<Uuid>,
) -> anyhow::Result<Option<Meal>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, MealRow>(&format!(
        r#"
        SELECT {MEAL_COLUMNS} FROM meals
         WHERE user_id = $1 AND status = $3
           AND ($2::uuid IS NULL OR id <> $2)
         ORDER BY created_at DESC, id DESC
         LIMIT 1
        "#
    ))
    .bind(user_id)
    .bind(skip)
    .bind(MealStatus::Committed.as_str())
    .fetch_optional(exec)
    .await
    .context("load last committed meal")?;
    row.map(Meal::try_from).transpose()
}

pub async fn set_category(
    db: &PgPool,
    meal_id: Uuid,
    category: MealCategory,
) -> anyhow::Result<Option<Meal>> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        r#"
        UPDATE meals SET category = $2
         WHERE id = $1 AND status = $3
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(meal_id)
    .bind(category.as_str())
    .bind(MealStatus::Committed.as_str())
    .fetch_optional(db)
    .await
    .context("update meal category")?;
    row.map(Meal::try_from).transpose()
}

pub async fn delete_tx(tx: &mut Transaction<'_, Postgres>, meal_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM meals WHERE id = $1")
        .bind(meal_id)
        .execute(&mut **tx)
        .await
        .context("delete meal")?;
    Ok(())
}
