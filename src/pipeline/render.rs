//! User-facing message text.

use crate::allergens::Restrictions;
use crate::ledger::{DailySummary, NutrientTotals};
use crate::meals::repo_types::{meal_totals, CommittedMeal, DeletedMeal, FoodEntry, Meal};
use crate::users::{Goal, GoalKind};

pub const ANALYZING: &str = "Analyzing your meal...";
pub const NO_FOOD: &str =
    "I don't see any food in this image. Please send a clear photo of your meal.";
pub const RECOGNITION_FAILED: &str =
    "Sorry, I couldn't analyze your meal. Please try again with better lighting.";
pub const SAVE_FAILED: &str = "Sorry, I couldn't save your meal. Please send the photo again.";
pub const CATEGORY_PROMPT: &str = "Is this breakfast, lunch, dinner, or snack?";
pub const CATEGORY_REPROMPT: &str =
    "Please reply with: breakfast, lunch, dinner, or snack. You can also use numbers 1 through 4.";
pub const PENDING_FIRST: &str = "You still have a meal waiting for its category. Reply breakfast, lunch, dinner, or snack, or send 'cancel' to discard it, then send the new photo.";
pub const CHANGE_TO_USAGE: &str =
    "Please specify: 'change to breakfast', 'change to lunch', 'change to dinner', or 'change to snack'";
pub const NOTHING_PENDING: &str = "No meal is waiting for a category.";
pub const NOTHING_TO_CANCEL: &str = "No pending meal to cancel.";
pub const CANCELLED: &str = "Cancelled. That meal was not logged.";
pub const NOTHING_TO_DELETE: &str = "No meals to delete.";
pub const NOTHING_TO_UPDATE: &str = "No recent meal found to update.";
pub const NO_MEALS_YET: &str = "No meals logged yet. Send a photo of your meal to get started.";
pub const NO_PHOTO: &str = "I couldn't download your photo. Please send it again.";
pub const SOMETHING_WENT_WRONG: &str = "Sorry, I encountered an error. Please try again.";

/// Daily sodium above this triggers a warning.
pub const SODIUM_LIMIT_MG: f64 = 2300.0;
/// Foods recognized below this confidence are called out as uncertain.
pub const LOW_CONFIDENCE: f64 = 0.6;
pub const DETAIL_PAGE_SIZE: usize = 5;

pub fn help() -> String {
    [
        "Send a photo of your meal to log it. Add a caption to describe it.",
        "",
        "Commands:",
        "- breakfast / lunch / dinner / snack (or 1-4): answer the category question",
        "- change to <category>: fix your last meal's category",
        "- cancel: discard the meal being logged",
        "- delete last meal: remove your last logged meal",
        "- details: full nutrients of your last meal",
        "- today: today's totals",
        "- restrictions: dairy, nuts, vegan: set dietary restrictions",
        "- my goal is 2000 calories: set a daily goal",
    ]
    .join("\n")
}

/// Detected foods with totals, followed by the category question.
pub fn detected_foods(foods: &[FoodEntry]) -> String {
    let mut msg = String::from("Got it! I detected:\n");
    for f in foods {
        msg.push_str(&format!("{} ({:.0}g)\n", f.item.name, f.item.mass_g));
    }
    let t = meal_totals(foods);
    msg.push_str(&format!(
        "\nTotal: {:.0} calories, {:.0}g protein\n\n{}",
        t.calories, t.protein_g, CATEGORY_PROMPT
    ));
    msg
}

fn carbs_with_context(carbs: f64, fiber: f64, sugar: Option<f64>) -> String {
    let mut s = format!("{carbs:.0}g carbs");
    match (fiber > 0.0, sugar.filter(|v| *v > 0.0)) {
        (true, Some(sugar)) => s.push_str(&format!(" ({fiber:.0}g fiber, {sugar:.0}g sugar)")),
        (true, None) => s.push_str(&format!(" ({fiber:.0}g fiber)")),
        (false, Some(sugar)) => s.push_str(&format!(" ({sugar:.0}g sugar)")),
        (false, None) => {}
    }
    s
}

fn totals_line(t: &NutrientTotals, sugar: bool) -> String {
    format!(
        "{:.0} cal | {:.0}g protein | {} | {:.0}g fat | {:.0}mg sodium",
        t.calories,
        t.protein_g,
        carbs_with_context(t.carbs_g, t.fiber_g, sugar.then_some(t.sugar_g)),
        t.fat_g,
        t.sodium_mg
    )
}

/// Progress lines for a calorie or protein goal against a day's totals.
fn goal_progress(goal: &Goal, day: &NutrientTotals) -> String {
    let current = match goal.kind {
        GoalKind::CalorieTarget => day.calories,
        GoalKind::ProteinTarget => day.protein_g,
    };
    let unit = goal.kind.unit();
    let pct = if goal.target_value > 0.0 {
        current / goal.target_value * 100.0
    } else {
        0.0
    };
    let remaining = goal.target_value - current;

    let mut msg = format!(
        "Goal: {:.0} {unit}\nProgress: {pct:.0}%\n",
        goal.target_value
    );
    if remaining > 0.0 {
        msg.push_str(&format!("{remaining:.0} {unit} remaining\n"));
    } else {
        msg.push_str(&format!("{:.0} {unit} over goal\n", remaining.abs()));
    }
    msg.push_str(if pct < 50.0 {
        "Keep going!"
    } else if pct < 90.0 {
        "Great progress!"
    } else if pct < 110.0 {
        "Almost there!"
    } else {
        "Over goal. Consider lighter meals."
    });
    msg
}

pub fn confirmation(c: &CommittedMeal, goal: Option<&Goal>) -> String {
    let mut msg = format!(
        "Meal logged as {}.\nWrong? Reply: 'change to breakfast', 'lunch', 'dinner', or 'snack'\n\nYou had:\n",
        c.meal.category.title()
    );

    for f in &c.foods {
        let t = NutrientTotals::from(&f.nutrients);
        msg.push_str(&format!("{} ({:.0}g)\n  {}\n", f.item.name, f.item.mass_g, totals_line(&t, true)));
    }

    msg.push_str("\n--- This Meal Total ---\n");
    msg.push_str(&totals_line(&c.totals, false));
    msg.push('\n');

    let day = c.summary.totals();
    msg.push_str("\n--- Today's Total ---\n");
    msg.push_str(&totals_line(&day, false));
    msg.push('\n');

    if let Some(goal) = goal {
        msg.push('\n');
        msg.push_str(&goal_progress(goal, &day));
        msg.push('\n');
    }

    if day.sodium_mg > SODIUM_LIMIT_MG {
        msg.push_str("\nHigh sodium intake today (recommended: 2300mg daily).\n");
    }

    let unsure: Vec<&str> = c
        .foods
        .iter()
        .filter(|f| f.item.confidence < LOW_CONFIDENCE)
        .map(|f| f.item.name.as_str())
        .take(2)
        .collect();
    if !unsure.is_empty() {
        msg.push_str(&format!(
            "\nNot completely sure about: {}\nSend a clearer photo next time for better accuracy.\n",
            unsure.join(", ")
        ));
    }

    msg.trim_end().to_string()
}

/// Full nutrient listing, `DETAIL_PAGE_SIZE` foods per message.
pub fn detail_pages(meal: &Meal, foods: &[FoodEntry]) -> Vec<String> {
    if foods.is_empty() {
        return vec![format!(
            "{} has no recorded foods.",
            meal.category.title()
        )];
    }
    let pages = foods.len().div_ceil(DETAIL_PAGE_SIZE);

    foods
        .chunks(DETAIL_PAGE_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut msg = format!(
                "{} details (page {}/{})\n",
                meal.category.title(),
                i + 1,
                pages
            );
            for f in chunk {
                msg.push_str(&format!("\n{} ({:.0}g)\n", f.item.name, f.item.mass_g));
                for (label, unit, value) in f.nutrients.entries() {
                    if let Some(v) = value {
                        msg.push_str(&format!("  {label}: {} {unit}\n", amount(v)));
                    }
                }
            }
            if i + 1 == pages {
                let t = meal_totals(foods);
                msg.push_str(&format!("\nMeal total: {}", totals_line(&t, true)));
            }
            msg.trim_end().to_string()
        })
        .collect()
}

/// Whole numbers above 10, one decimal below.
fn amount(v: f64) -> String {
    if v.abs() >= 10.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

pub fn today(summary: Option<&DailySummary>, goal: Option<&Goal>) -> String {
    let Some(s) = summary.filter(|s| s.meal_count > 0) else {
        return match goal {
            Some(g) => format!(
                "No meals logged today. Your goal is {:.0} {}.",
                g.target_value,
                g.kind.unit()
            ),
            None => "No meals logged today.".into(),
        };
    };
    let day = s.totals();
    let meals = if s.meal_count == 1 { "meal" } else { "meals" };
    let mut msg = format!(
        "Today: {} {meals}\n{}",
        s.meal_count,
        totals_line(&day, true)
    );
    if let Some(goal) = goal {
        msg.push_str("\n\n");
        msg.push_str(&goal_progress(goal, &day));
    }
    if day.sodium_mg > SODIUM_LIMIT_MG {
        msg.push_str("\n\nHigh sodium intake today (recommended: 2300mg daily).");
    }
    msg
}

pub fn deleted(d: &DeletedMeal) -> String {
    let mut msg = format!(
        "Deleted your last meal ({}, {:.0} cal).",
        d.meal.category.title(),
        d.totals.calories
    );
    if let Some(s) = &d.summary {
        msg.push_str(&format!(
            "\nThat day's total is now {:.0} cal across {} meal(s).",
            s.total_calories, s.meal_count
        ));
    }
    msg
}

pub fn recategorized(meal: &Meal) -> String {
    format!(
        "Updated! Your last meal is now logged as {}.",
        meal.category.title()
    )
}

pub fn restrictions_saved(r: &Restrictions) -> String {
    format!(
        "Dietary restrictions saved: {}\nMeals containing these will not be logged.",
        r.display()
    )
}

pub fn restrictions_unknown() -> String {
    format!(
        "I didn't recognize any of those restrictions.\n\n{}",
        crate::allergens::supported_restrictions()
    )
}

pub fn restrictions_current(r: &Restrictions) -> String {
    format!(
        "Your dietary restrictions: {}\n\n{}",
        r.display(),
        crate::allergens::supported_restrictions()
    )
}

pub fn restrictions_cleared() -> &'static str {
    "Dietary restrictions cleared."
}

pub fn goal_saved(goal: &Goal) -> String {
    format!(
        "Goal set: {:.0} {} per day.",
        goal.target_value,
        goal.kind.unit()
    )
}
