use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Goal, GoalKind, GoalRow, User};

const USER_COLUMNS: &str = "id, address, restrictions, last_meal_id, pending_meal_id, created_at";

/// Find the user for an address, creating it on first contact.
pub async fn find_or_create(db: &PgPool, address: &str) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, address)
        VALUES ($1, $2)
        ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(address)
    .fetch_one(db)
    .await
    .context("find or create user")?;
    Ok(user)
}

pub async fn set_restrictions(
    db: &PgPool,
    user_id: Uuid,
    restrictions: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET restrictions = $2 WHERE id = $1")
        .bind(user_id)
        .bind(restrictions)
        .execute(db)
        .await
        .context("update restrictions")?;
    Ok(())
}

pub async fn set_pending_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    meal_id: Option<Uuid>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET pending_meal_id = $2 WHERE id = $1")
        .bind(user_id)
        .bind(meal_id)
        .execute(&mut **tx)
        .await
        .context("update pending meal pointer")?;
    Ok(())
}

/// Clear the pending pointer only if it still refers to `meal_id`.
pub async fn clear_pending_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    meal_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET pending_meal_id = NULL WHERE id = $1 AND pending_meal_id = $2")
        .bind(user_id)
        .bind(meal_id)
        .execute(&mut **tx)
        .await
        .context("clear pending meal pointer")?;
    Ok(())
}

pub async fn set_last_meal_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    meal_id: Option<Uuid>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET last_meal_id = $2 WHERE id = $1")
        .bind(user_id)
        .bind(meal_id)
        .execute(&mut **tx)
        .await
        .context("update last meal pointer")?;
    Ok(())
}

pub async fn active_goal(
    db: &PgPool,
    user_id: Uuid,
    kind: GoalKind,
) -> anyhow::Result<Option<Goal>> {
    let row = sqlx::query_as::<_, GoalRow>(
        r#"
        SELECT id, user_id, goal_type, target_value, start_date, is_active
          FROM goals
         WHERE user_id = $1 AND goal_type = $2 AND is_active
         ORDER BY start_date DESC
         LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .fetch_optional(db)
    .await
    .context("load active goal")?;
    row.map(Goal::try_from).transpose()
}

/// Deactivate the previous goal of this kind and insert the new one.
pub async fn replace_goal(
    db: &PgPool,
    user_id: Uuid,
    kind: GoalKind,
    target: f64,
) -> anyhow::Result<Goal> {
    let mut tx = db.begin().await.context("begin tx")?;

    sqlx::query("UPDATE goals SET is_active = FALSE WHERE user_id = $1 AND goal_type = $2 AND is_active")
        .bind(user_id)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await
        .context("deactivate goals")?;

    let row = sqlx::query_as::<_, GoalRow>(
        r#"
        INSERT INTO goals (id, user_id, goal_type, target_value, start_date, is_active)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        RETURNING id, user_id, goal_type, target_value, start_date, is_active
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind.as_str())
    .bind(target)
    .bind(OffsetDateTime::now_utc().date())
    .fetch_one(&mut *tx)
    .await
    .context("insert goal")?;

    tx.commit().await.context("commit tx")?;
    Goal::try_from(row)
}
