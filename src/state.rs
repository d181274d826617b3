use crate::config::{AppConfig, StoreBackend};
use crate::messaging::{LogMessenger, MediaFetcher, Messenger, TwilioMessenger};
use crate::nutrients::usda::UsdaClient;
use crate::pipeline::MealPipeline;
use crate::storage::{Storage, StorageClient};
use crate::store::{MealStore, MemoryStore, PgStore};
use crate::vision::gemini::GeminiRecognizer;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Present only with the postgres backend; used for migrations.
    pub db: Option<PgPool>,
    pub store: Arc<dyn MealStore>,
    pub pipeline: Arc<MealPipeline>,
    pub media: Arc<MediaFetcher>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (db, store) = match (config.store, config.database_url.as_deref()) {
            (StoreBackend::Postgres, Some(url)) => {
                let pg = PgStore::connect(url).await?;
                (Some(pg.pool().clone()), Arc::new(pg) as Arc<dyn MealStore>)
            }
            (StoreBackend::Postgres, None) => {
                anyhow::bail!("DATABASE_URL is required for the postgres store")
            }
            (StoreBackend::Memory, _) => {
                tracing::warn!("using in-memory store; data is lost on restart");
                (None, Arc::new(MemoryStore::new()) as Arc<dyn MealStore>)
            }
        };

        let recognizer = Arc::new(GeminiRecognizer::new(&config.vision)?);
        let nutrients = Arc::new(UsdaClient::new(config.usda.clone())?);

        let messenger: Arc<dyn Messenger> = match &config.twilio {
            Some(twilio) => Arc::new(TwilioMessenger::new(twilio.clone(), config.send_timeout())?),
            None => {
                tracing::warn!("twilio not configured; outbound messages are only logged");
                Arc::new(LogMessenger)
            }
        };

        // Реальный S3/MinIO, если настроен
        let storage = match &config.minio {
            Some(minio) => Some(Arc::new(Storage::new(minio, "us-east-1").await?) as Arc<dyn StorageClient>),
            None => None,
        };

        let media = Arc::new(MediaFetcher::new(config.twilio.as_ref(), config.media_timeout())?);
        let pipeline = Arc::new(MealPipeline::new(
            store.clone(),
            recognizer,
            nutrients,
            messenger,
            storage,
        ));

        Ok(Self {
            config,
            db,
            store,
            pipeline,
            media,
        })
    }

    /// In-memory store, canned recognizer and nutrient source, log-only
    /// messenger. No network access.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{UsdaConfig, VisionConfig};
        use crate::error::ClientResult;
        use crate::nutrients::{NutrientProfile, NutrientSource};
        use crate::vision::{FoodCandidate, FoodRecognizer, Photo};
        use axum::async_trait;
        use std::time::Duration;

        struct FakeRecognizer;
        #[async_trait]
        impl FoodRecognizer for FakeRecognizer {
            async fn recognize(&self, _p: &Photo, _n: Option<&str>) -> ClientResult<Vec<FoodCandidate>> {
                Ok(vec![FoodCandidate {
                    name: "rice".into(),
                    mass_g: 150.0,
                    confidence: 0.9,
                    ingredients: vec![],
                }])
            }
        }

        struct FakeNutrients;
        #[async_trait]
        impl NutrientSource for FakeNutrients {
            async fn lookup(&self, _name: &str, _mass_g: f64) -> ClientResult<NutrientProfile> {
                Ok(NutrientProfile::basic(200.0, 4.0, 44.0, 1.0, 1.0, 0.0, 5.0))
            }
        }

        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            vision: VisionConfig {
                api_key: "test".into(),
                model: "test".into(),
                timeout_secs: 1,
            },
            usda: UsdaConfig {
                api_key: "test".into(),
                base_url: "http://localhost".into(),
                timeout_secs: 1,
            },
            twilio: None,
            send_timeout_secs: 1,
            media_timeout_secs: 1,
            minio: None,
            dev_endpoints: true,
        });

        let store = Arc::new(MemoryStore::new()) as Arc<dyn MealStore>;
        let pipeline = Arc::new(MealPipeline::new(
            store.clone(),
            Arc::new(FakeRecognizer),
            Arc::new(FakeNutrients),
            Arc::new(LogMessenger),
            None,
        ));
        let media = Arc::new(
            MediaFetcher::new(None, Duration::from_secs(1)).expect("media client builds"),
        );
        Self {
            config,
            db: None,
            store,
            pipeline,
            media,
        }
    }
}
