pub mod repo;
pub mod repo_types;

pub use repo_types::{Goal, GoalKind, User};

const CHANNEL_PREFIX: &str = "whatsapp:";

/// Canonical account key: the channel prefix plus the number, whitespace removed.
pub fn normalize_address(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with(CHANNEL_PREFIX) {
        compact
    } else {
        format!("{CHANNEL_PREFIX}{compact}")
    }
}
