use serde::{Deserialize, Serialize};

use crate::meals::repo_types::{FoodEntry, Meal};

/// Twilio's inbound message form. Only the fields the bot reads.
#[derive(Debug, Deserialize)]
pub struct TwilioInbound {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0")]
    pub media_url: Option<String>,
    #[serde(rename = "MediaContentType0")]
    pub media_content_type: Option<String>,
}

impl TwilioInbound {
    pub fn has_media(&self) -> bool {
        let count = self
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .unwrap_or(0);
        count > 0 && self.media_url.is_some()
    }
}

/// POST /dev/messages { address, text?, image?: [bytes], content_type? }
#[derive(Debug, Deserialize)]
pub struct DevMessage {
    pub address: String,
    pub text: Option<String>,
    pub image: Option<serde_bytes::ByteBuf>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DevMeal {
    pub meal: Meal,
    pub foods: Vec<FoodEntry>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}
