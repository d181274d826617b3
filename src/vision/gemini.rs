use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::{parse_candidates, FoodCandidate, FoodRecognizer, Photo};
use crate::config::VisionConfig;
use crate::error::{with_timeout, ClientError, ClientResult};

const SERVICE: &str = "gemini";
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ContentResponse,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiRecognizer {
    api_key: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl GeminiRecognizer {
    pub fn new(config: &VisionConfig) -> ClientResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout,
            client,
        })
    }

    async fn generate(&self, request: GeminiRequest) -> ClientResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE_URL, self.model, self.api_key
        );

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "gemini api error");
            return Err(ClientError::Status {
                service: SERVICE,
                status,
                body,
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(SERVICE, e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| ClientError::parse(SERVICE, "no candidates in response"))
    }
}

#[async_trait]
impl FoodRecognizer for GeminiRecognizer {
    #[instrument(skip(self, photo, note), fields(bytes = photo.body.len()))]
    async fn recognize(&self, photo: &Photo, note: Option<&str>) -> ClientResult<Vec<FoodCandidate>> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: analysis_prompt(note),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: photo.content_type.clone(),
                            data: Base64::encode_string(&photo.body),
                        },
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".into(),
                temperature: 0.2,
            }),
        };

        let text = with_timeout(SERVICE, self.timeout, self.generate(request)).await?;
        let foods = parse_candidates(SERVICE, &text)?;
        info!(count = foods.len(), "foods recognized");
        Ok(foods)
    }
}

fn analysis_prompt(note: Option<&str>) -> String {
    let context = match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("The user described it as: \"{n}\"."),
        None => "No user description provided.".to_string(),
    };

    format!(
        r#"Analyze this food image. {context}

Identify every visible food item and estimate its portion size in grams.
Return ONLY a JSON array, no markdown and no explanations:
[
  {{
    "name": "specific food name, e.g. grilled chicken breast",
    "portion_grams": estimated_weight_in_grams,
    "confidence": score_between_0_and_1,
    "ingredients": ["main visible or typical ingredients"]
  }}
]

Guidelines:
- Be specific: "grilled chicken breast", not "chicken".
- Reference sizes: a 25cm plate, fist ~150g, palm ~100g, thumb ~30g.
- Estimate conservatively.
- If there is no food in the image, return []."#
    )
}
