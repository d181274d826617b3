use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::Date;
use uuid::Uuid;

use super::{DailySummary, NutrientTotals};

const SUMMARY_COLUMNS: &str = "user_id, date, total_calories, total_protein, total_carbs, \
     total_fat, total_fiber, total_sugar, total_sodium, meal_count";

/// Adds a meal to the (user, date) row, creating it on first use.
pub async fn apply_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    date: Date,
    d: &NutrientTotals,
) -> anyhow::Result<DailySummary> {
    let row = sqlx::query_as::<_, DailySummary>(&format!(
        r#"
        INSERT INTO daily_summaries AS s
            (user_id, date, total_calories, total_protein, total_carbs,
             total_fat, total_fiber, total_sugar, total_sodium, meal_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1)
        ON CONFLICT (user_id, date) DO UPDATE SET
            total_calories = s.total_calories + EXCLUDED.total_calories,
            total_protein  = s.total_protein  + EXCLUDED.total_protein,
            total_carbs    = s.total_carbs    + EXCLUDED.total_carbs,
            total_fat      = s.total_fat      + EXCLUDED.total_fat,
            total_fiber    = s.total_fiber    + EXCLUDED.total_fiber,
            total_sugar    = s.total_sugar    + EXCLUDED.total_sugar,
            total_sodium   = s.total_sodium   + EXCLUDED.total_sodium,
            meal_count     = s.meal_count + 1
        RETURNING {SUMMARY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(date)
    .bind(d.calories)
    .bind(d.protein_g)
    .bind(d.carbs_g)
    .bind(d.fat_g)
    .bind(d.fiber_g)
    .bind(d.sugar_g)
    .bind(d.sodium_mg)
    .fetch_one(&mut **tx)
    .await
    .context("apply daily summary")?;
    Ok(row)
}

/// Subtracts a meal, flooring every column at zero. `None` when no row exists
/// for the date.
pub async fn reverse_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    date: Date,
    d: &NutrientTotals,
) -> anyhow::Result<Option<DailySummary>> {
    let row = sqlx::query_as::<_, DailySummary>(&format!(
        r#"
        UPDATE daily_summaries SET
            total_calories = GREATEST(total_calories - $3, 0),
            total_protein  = GREATEST(total_protein  - $4, 0),
            total_carbs    = GREATEST(total_carbs    - $5, 0),
            total_fat      = GREATEST(total_fat      - $6, 0),
            total_fiber    = GREATEST(total_fiber    - $7, 0),
            total_sugar    = GREATEST(total_sugar    - $8, 0),
            total_sodium   = GREATEST(total_sodium   - $9, 0),
            meal_count     = GREATEST(meal_count - 1, 0)
        WHERE user_id = $1 AND date = $2
        RETURNING {SUMMARY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(date)
    .bind(d.calories)
    .bind(d.protein_g)
    .bind(d.carbs_g)
    .bind(d.fat_g)
    .bind(d.fiber_g)
    .bind(d.sugar_g)
    .bind(d.sodium_mg)
    .fetch_optional(&mut **tx)
    .await
    .context("reverse daily summary")?;
    Ok(row)
}

pub async fn get(db: &PgPool, user_id: Uuid, date: Date) -> anyhow::Result<Option<DailySummary>> {
    let row = sqlx::query_as::<_, DailySummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM daily_summaries WHERE user_id = $1 AND date = $2"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_optional(db)
    .await
    .context("load daily summary")?;
    Ok(row)
}
