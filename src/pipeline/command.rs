use lazy_static::lazy_static;
use regex::Regex;

use crate::meals::repo_types::MealCategory;
use crate::users::GoalKind;

/// A text message that is not an answer to the category prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Drop the meal that is still being processed or awaiting a category.
    Cancel,
    /// Remove the most recently committed meal and reverse its totals.
    DeleteLast,
    /// `None` when the target category could not be read.
    ChangeCategory(Option<MealCategory>),
    Details,
    Today,
    SetRestrictions(String),
    ShowRestrictions,
    ClearRestrictions,
    SetGoal { kind: GoalKind, target: f64 },
    Help,
    Unrecognized,
}

const DELETE_WORDS: &[&str] = &["delete", "remove", "undo"];
const RESTRICTION_PREFIXES: &[&str] = &[
    "restrictions",
    "restriction",
    "allergies",
    "allergy",
    "diet",
];

impl Command {
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        let t = lower.trim_end_matches(['.', '!', '?']).trim();

        match t {
            "cancel" | "stop" => return Command::Cancel,
            "delete" | "remove" | "undo" => return Command::DeleteLast,
            "details" | "detail" => return Command::Details,
            "today" | "summary" => return Command::Today,
            "help" | "hi" | "hello" | "start" | "menu" => return Command::Help,
            "clear restrictions" | "clear allergies" => return Command::ClearRestrictions,
            _ => {}
        }

        let words: Vec<&str> = t.split_whitespace().collect();
        if words.iter().any(|w| DELETE_WORDS.contains(w))
            && words.iter().any(|w| matches!(*w, "last" | "recent"))
        {
            return Command::DeleteLast;
        }

        if let Some(idx) = t.find("change to") {
            let target = &t[idx + "change to".len()..];
            return Command::ChangeCategory(MealCategory::parse_reply(target));
        }

        if let Some(cmd) = parse_restrictions(t) {
            return cmd;
        }

        if let Some(cmd) = parse_goal(t) {
            return cmd;
        }

        Command::Unrecognized
    }
}

fn parse_restrictions(t: &str) -> Option<Command> {
    let prefix = RESTRICTION_PREFIXES
        .iter()
        .find(|p| {
            t.strip_prefix(**p)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([':', ' ']))
        })?;

    let rest = t[prefix.len()..].trim_start_matches([':', ' ']).trim();
    Some(match rest {
        "" => Command::ShowRestrictions,
        "none" | "clear" => Command::ClearRestrictions,
        list => Command::SetRestrictions(list.to_string()),
    })
}

fn parse_goal(t: &str) -> Option<Command> {
    lazy_static! {
        static ref GOAL_RE: Regex =
            Regex::new(r"(?:my goal is|goal is|set\b.*\bgoal)\D*(\d+(?:\.\d+)?)").unwrap();
    }
    let caps = GOAL_RE.captures(t)?;
    let target: f64 = caps.get(1)?.as_str().parse().ok()?;
    if target <= 0.0 {
        return None;
    }
    let kind = if t.contains("protein") {
        GoalKind::ProteinTarget
    } else {
        GoalKind::CalorieTarget
    };
    Some(Command::SetGoal { kind, target })
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn cancel_and_delete_keywords() {
        assert_eq!(Command::parse("Cancel"), Command::Cancel);
        assert_eq!(Command::parse("stop"), Command::Cancel);
        assert_eq!(Command::parse("undo"), Command::DeleteLast);
        assert_eq!(Command::parse("delete last meal"), Command::DeleteLast);
        assert_eq!(Command::parse("remove my recent meal"), Command::DeleteLast);
        assert_eq!(Command::parse("delete everything"), Command::Unrecognized);
    }

    #[test]
    fn change_to_reads_category() {
        assert_eq!(
            Command::parse("change to dinner"),
            Command::ChangeCategory(Some(MealCategory::Dinner))
        );
        assert_eq!(
            Command::parse("Please change to 4"),
            Command::ChangeCategory(Some(MealCategory::Snack))
        );
        assert_eq!(
            Command::parse("change to brunch"),
            Command::ChangeCategory(None)
        );
    }

    #[test]
    fn restriction_commands() {
        assert_eq!(
            Command::parse("Restrictions: Dairy, Nuts"),
            Command::SetRestrictions("dairy, nuts".into())
        );
        assert_eq!(
            Command::parse("allergies shellfish"),
            Command::SetRestrictions("shellfish".into())
        );
        assert_eq!(Command::parse("restrictions"), Command::ShowRestrictions);
        assert_eq!(Command::parse("restrictions none"), Command::ClearRestrictions);
        assert_eq!(Command::parse("clear restrictions"), Command::ClearRestrictions);
        assert_eq!(Command::parse("dietary fiber?"), Command::Unrecognized);
    }

    #[test]
    fn goal_commands() {
        assert_eq!(
            Command::parse("My goal is 2000 calories"),
            Command::SetGoal {
                kind: GoalKind::CalorieTarget,
                target: 2000.0
            }
        );
        assert_eq!(
            Command::parse("set protein goal 150"),
            Command::SetGoal {
                kind: GoalKind::ProteinTarget,
                target: 150.0
            }
        );
        assert_eq!(Command::parse("my goal is to eat better"), Command::Unrecognized);
    }

    #[test]
    fn simple_words() {
        assert_eq!(Command::parse("details"), Command::Details);
        assert_eq!(Command::parse("Today!"), Command::Today);
        assert_eq!(Command::parse("help"), Command::Help);
        assert_eq!(Command::parse("what should I eat?"), Command::Unrecognized);
    }
}
