//! Food recognition from a meal photo.

pub mod gemini;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Mean confidence below which a photo is treated as containing no food.
pub const MIN_MEAN_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodCandidate {
    pub name: String,
    #[serde(alias = "portion_grams")]
    pub mass_g: f64,
    pub confidence: f64,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

/// Inbound photo handed to the recognizer.
#[derive(Debug, Clone)]
pub struct Photo {
    pub body: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait FoodRecognizer: Send + Sync {
    async fn recognize(&self, photo: &Photo, note: Option<&str>) -> ClientResult<Vec<FoodCandidate>>;
}

/// True when the recognizer saw nothing usable.
pub fn is_no_food(candidates: &[FoodCandidate]) -> bool {
    if candidates.is_empty() {
        return true;
    }
    let mean = candidates.iter().map(|c| c.confidence).sum::<f64>() / candidates.len() as f64;
    mean < MIN_MEAN_CONFIDENCE
}

/// Extracts the candidate array from a model reply that may be wrapped in a
/// markdown fence or surrounded by prose.
pub fn parse_candidates(service: &'static str, text: &str) -> ClientResult<Vec<FoodCandidate>> {
    let cleaned = strip_fence(text.trim());
    let parsed: Vec<FoodCandidate> = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(first) => {
            let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) else {
                return Err(ClientError::parse(service, first.to_string()));
            };
            if end <= start {
                return Err(ClientError::parse(service, first.to_string()));
            }
            serde_json::from_str(&cleaned[start..=end])
                .map_err(|e| ClientError::parse(service, e.to_string()))?
        }
    };

    Ok(parsed
        .into_iter()
        .filter(|c| !c.name.trim().is_empty() && c.mass_g.is_finite() && c.mass_g > 0.0)
        .map(|mut c| {
            c.name = c.name.trim().to_string();
            c.confidence = if c.confidence.is_finite() {
                c.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            c
        })
        .collect())
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the language tag line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod vision_tests {
    use super::*;

    fn cand(conf: f64) -> FoodCandidate {
        FoodCandidate {
            name: "rice".into(),
            mass_g: 100.0,
            confidence: conf,
            ingredients: vec![],
        }
    }

    #[test]
    fn no_food_on_empty_or_low_mean_confidence() {
        assert!(is_no_food(&[]));
        assert!(is_no_food(&[cand(0.2), cand(0.35)]));
        assert!(!is_no_food(&[cand(0.2), cand(0.4)]));
        assert!(!is_no_food(&[cand(0.3)]));
    }

    #[test]
    fn parses_fenced_reply() {
        let text = "```json\n[{\"name\":\"grilled chicken breast\",\"portion_grams\":150,\"confidence\":0.92}]\n```";
        let foods = parse_candidates("gemini", text).unwrap();
        assert_eq!(foods.len(), 1);
        assert_eq!(foods[0].name, "grilled chicken breast");
        assert_eq!(foods[0].mass_g, 150.0);
        assert!(foods[0].ingredients.is_empty());
    }

    #[test]
    fn parses_array_embedded_in_prose() {
        let text = "Here you go: [{\"name\":\"salad\",\"mass_g\":80,\"confidence\":1.4,\"ingredients\":[\"feta\"]}] enjoy";
        let foods = parse_candidates("gemini", text).unwrap();
        assert_eq!(foods[0].confidence, 1.0);
        assert_eq!(foods[0].ingredients, vec!["feta".to_string()]);
    }

    #[test]
    fn drops_nameless_or_massless_entries() {
        let text = r#"[{"name":" ","portion_grams":10,"confidence":0.9},
                       {"name":"toast","portion_grams":0,"confidence":0.9},
                       {"name":"egg","portion_grams":50,"confidence":0.9}]"#;
        let foods = parse_candidates("gemini", text).unwrap();
        assert_eq!(foods.len(), 1);
        assert_eq!(foods[0].name, "egg");
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_candidates("gemini", "I see a cat").is_err());
        assert!(parse_candidates("gemini", "] nope [").is_err());
    }
}
