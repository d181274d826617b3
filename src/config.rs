use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UsdaConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct MinioConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub vision: VisionConfig,
    pub usda: UsdaConfig,
    /// Outbound messages are only logged when absent.
    pub twilio: Option<TwilioConfig>,
    pub send_timeout_secs: u64,
    pub media_timeout_secs: u64,
    /// Photos keep their source URL as reference when absent.
    pub minio: Option<MinioConfig>,
    pub dev_endpoints: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store: StoreBackend = std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .parse()?;

        let database_url = std::env::var("DATABASE_URL").ok();
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres store");
        }

        let vision = VisionConfig {
            api_key: std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY")?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into()),
            timeout_secs: env_u64("VISION_TIMEOUT_SECS", 30),
        };
        let usda = UsdaConfig {
            api_key: std::env::var("USDA_API_KEY").context("USDA_API_KEY")?,
            base_url: std::env::var("USDA_BASE_URL")
                .unwrap_or_else(|_| "https://api.nal.usda.gov/fdc/v1".into()),
            timeout_secs: env_u64("LOOKUP_TIMEOUT_SECS", 10),
        };

        let twilio = match (
            std::env::var("TWILIO_ACCOUNT_SID"),
            std::env::var("TWILIO_AUTH_TOKEN"),
        ) {
            (Ok(account_sid), Ok(auth_token)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number: std::env::var("TWILIO_WHATSAPP_NUMBER")
                    .unwrap_or_else(|_| "whatsapp:+14155238886".into()),
            }),
            _ => None,
        };

        let minio = match (
            std::env::var("MINIO_ENDPOINT"),
            std::env::var("MINIO_BUCKET"),
            std::env::var("MINIO_ACCESS_KEY"),
            std::env::var("MINIO_SECRET_KEY"),
        ) {
            (Ok(endpoint), Ok(bucket), Ok(access_key), Ok(secret_key)) => Some(MinioConfig {
                endpoint,
                bucket,
                access_key,
                secret_key,
            }),
            _ => None,
        };

        Ok(Self {
            store,
            database_url,
            vision,
            usda,
            twilio,
            send_timeout_secs: env_u64("SEND_TIMEOUT_SECS", 10),
            media_timeout_secs: env_u64("MEDIA_TIMEOUT_SECS", 20),
            minio,
            dev_endpoints: std::env::var("DEV_ENDPOINTS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
