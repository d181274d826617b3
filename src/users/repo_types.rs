use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub address: String,
    pub restrictions: Option<String>,
    pub last_meal_id: Option<Uuid>,
    pub pending_meal_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    CalorieTarget,
    ProteinTarget,
}

impl GoalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalKind::CalorieTarget => "calorie_target",
            GoalKind::ProteinTarget => "protein_target",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            GoalKind::CalorieTarget => "calories",
            GoalKind::ProteinTarget => "g protein",
        }
    }
}

#[derive(Debug, FromRow)]
pub struct GoalRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal_type: String,
    pub target_value: f64,
    pub start_date: Date,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: GoalKind,
    pub target_value: f64,
    pub start_date: Date,
    pub is_active: bool,
}

impl TryFrom<GoalRow> for Goal {
    type Error = anyhow::Error;

    fn try_from(r: GoalRow) -> Result<Self, Self::Error> {
        let kind = match r.goal_type.as_str() {
            "calorie_target" => GoalKind::CalorieTarget,
            "protein_target" => GoalKind::ProteinTarget,
            other => anyhow::bail!("unknown goal type {other:?}"),
        };
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            kind,
            target_value: r.target_value,
            start_date: r.start_date,
            is_active: r.is_active,
        })
    }
}
