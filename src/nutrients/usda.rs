//! USDA FoodData Central lookup.
//!
//! Values reported by the search endpoint are per 100 g; they are cached per
//! core food name and scaled to the requested portion on every call. A miss or
//! a transport error degrades to [`estimate::estimate`], so `lookup` only
//! returns an error when the configured timeout expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{estimate, NutrientProfile, NutrientSource};
use crate::config::UsdaConfig;
use crate::error::{with_timeout, ClientError, ClientResult};

const SERVICE: &str = "usda";
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DATA_TYPES: [&str; 3] = ["Survey (FNDDS)", "Foundation", "SR Legacy"];

/// Words after which the rest of the name is garnish ("meatloaf with ketchup").
const CONNECTORS: &[&str] = &["with", "in", "on", "topped", "covered", "drizzled", "glazed"];

const DESCRIPTORS: &[&str] = &[
    "sliced", "diced", "chopped", "minced", "shredded", "grated", "steamed", "boiled", "grilled",
    "fried", "baked", "roasted", "sauteed", "pan-fried", "deep-fried", "stir-fried", "broiled",
    "braised", "fresh", "raw", "cooked", "prepared", "homemade", "frozen", "canned",
];

/// Composite dishes skipped when a simpler record exists.
const COMPOSITE: &[&str] = &[
    "sandwich", "casserole", "salad", "soup", "stew", "frozen meal", "dinner", "entree",
    "fast food", "restaurant", "chain", "pizza", "burger", "wrap", "burrito", "taco",
    "quesadilla", "pie", "cake",
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<SearchFood>,
}

#[derive(Debug, Deserialize)]
struct SearchFood {
    #[serde(default)]
    description: String,
    #[serde(rename = "foodNutrients", default)]
    food_nutrients: Vec<SearchNutrient>,
}

#[derive(Debug, Deserialize)]
struct SearchNutrient {
    #[serde(rename = "nutrientId")]
    nutrient_id: Option<u32>,
    #[serde(rename = "unitName", default)]
    unit_name: String,
    value: Option<f64>,
}

struct CacheEntry {
    per_100g: Option<NutrientProfile>,
    expires_at: Instant,
}

pub struct UsdaClient {
    config: UsdaConfig,
    http: Client,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl UsdaClient {
    pub fn new(config: UsdaConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn per_100g(&self, core: &str) -> Option<NutrientProfile> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(core) {
                if Instant::now() < entry.expires_at {
                    return entry.per_100g.clone();
                }
            }
        }

        let per_100g = match self.search(core).await {
            Ok(foods) => pick_record(&foods).map(profile_from),
            Err(e) => {
                warn!(error = %e, food = core, "usda search failed");
                return None;
            }
        };

        self.cache.write().await.insert(
            core.to_string(),
            CacheEntry {
                per_100g: per_100g.clone(),
                expires_at: Instant::now() + CACHE_TTL,
            },
        );
        per_100g
    }

    async fn search(&self, query: &str) -> ClientResult<Vec<SearchFood>> {
        let url = format!("{}/foods/search", self.config.base_url);
        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", self.config.api_key.as_str()),
            ("query", query),
            ("pageSize", "50"),
        ];
        params.extend(DATA_TYPES.iter().map(|t| ("dataType", *t)));

        let response = self.http.get(&url).query(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                service: SERVICE,
                status,
                body,
            });
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(SERVICE, e.to_string()))?;
        Ok(parsed.foods)
    }
}

#[async_trait]
impl NutrientSource for UsdaClient {
    async fn lookup(&self, name: &str, mass_g: f64) -> ClientResult<NutrientProfile> {
        if let Some(p) = estimate::beverage(name, mass_g) {
            debug!(food = name, "beverage table hit");
            return Ok(p);
        }

        let core = core_food_name(name);
        let after = Duration::from_secs(self.config.timeout_secs);
        let found = with_timeout(SERVICE, after, async { Ok(self.per_100g(&core).await) }).await?;

        match found {
            Some(per_100g) => {
                info!(food = name, core = %core, "usda match");
                Ok(per_100g.scaled(mass_g / 100.0))
            }
            None => {
                warn!(food = name, core = %core, "no usda match, estimating");
                Ok(estimate::estimate(name, mass_g))
            }
        }
    }
}

/// Drops cooking descriptors, stops at connector words, keeps at most three words.
pub fn core_food_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let core: Vec<&str> = lower
        .split_whitespace()
        .take_while(|w| !CONNECTORS.contains(w))
        .filter(|w| !DESCRIPTORS.contains(w))
        .take(3)
        .collect();
    if core.is_empty() {
        name.trim().to_lowercase()
    } else {
        core.join(" ")
    }
}

/// Prefers "not further specified" records, then any non-composite record,
/// then whatever came first.
fn pick_record(foods: &[SearchFood]) -> Option<&SearchFood> {
    let is_composite = |f: &SearchFood| {
        let desc = f.description.to_lowercase();
        COMPOSITE.iter().any(|k| desc.contains(k))
    };
    let is_nfs = |f: &SearchFood| {
        let desc = f.description.to_lowercase();
        desc.contains(", nfs") || desc.contains(" nfs")
    };
    foods
        .iter()
        .find(|f| is_nfs(f) && !is_composite(f))
        .or_else(|| foods.iter().find(|f| !is_composite(f)))
        .or_else(|| foods.first())
}

fn profile_from(food: &SearchFood) -> NutrientProfile {
    let mut p = NutrientProfile::default();
    for n in &food.food_nutrients {
        let (Some(id), Some(value)) = (n.nutrient_id, n.value) else {
            continue;
        };
        // energy is also reported in kJ under other ids; only kcal counts
        if id == 1008 && !n.unit_name.eq_ignore_ascii_case("kcal") {
            continue;
        }
        p.set_usda(id, value);
    }
    p
}
